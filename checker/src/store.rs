// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, StorageClass, TypeId, TypeKind};
use crate::k_limits;
use crate::regions::{MemSpace, RegionData, RegionId};
use crate::sval::{Loc, NonLoc, SVal};
use crate::symbols::SymbolReaper;
use crate::utils;
use crate::value_factory::ValueFactory;
use rpds::HashTrieMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};

/// Which store implementation the engine runs with.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreModel {
    /// Tracks scalar variables only; aggregates are conservatively unknown.
    Flat,
    /// Tracks field and element bindings with per-aggregate defaults.
    Region,
}

/// Immutable map from regions to values, with optional per-region default
/// values for aggregates. Lifetime equals the lifetime of the enclosing
/// program state.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct Store {
    bindings: HashTrieMap<RegionId, SVal>,
    defaults: HashTrieMap<RegionId, SVal>,
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.bindings.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl Hash for Store {
    fn hash<H: Hasher>(&self, state: &mut H) {
        utils::hash_unordered_map(&self.bindings, state);
        utils::hash_unordered_map(&self.defaults, state);
    }
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn binding(&self, region: RegionId) -> Option<&SVal> {
        self.bindings.get(&region)
    }

    pub fn default_of(&self, region: RegionId) -> Option<&SVal> {
        self.defaults.get(&region)
    }

    pub fn with_binding(&self, region: RegionId, val: SVal) -> Store {
        Store {
            bindings: self.bindings.insert(region, val),
            defaults: self.defaults.clone(),
        }
    }

    pub fn with_default(&self, region: RegionId, val: SVal) -> Store {
        Store {
            bindings: self.bindings.clone(),
            defaults: self.defaults.insert(region, val),
        }
    }

    pub fn without_binding(&self, region: RegionId) -> Store {
        Store {
            bindings: self.bindings.remove(&region),
            defaults: self.defaults.clone(),
        }
    }

    pub fn iter_bindings(&self) -> impl Iterator<Item = (&RegionId, &SVal)> {
        self.bindings.iter()
    }

    pub fn size(&self) -> usize {
        self.bindings.size()
    }
}

/// The outcome of a store write.
#[derive(Clone, Debug)]
pub enum BindOutcome {
    Bound(Store),
    /// The target location is undefined; the caller must report a defect
    /// and must not use the store.
    UndefinedTarget,
    /// The target is not representable in this store; the write is dropped.
    Untracked,
}

/// The contract shared by the two store implementations. Managers are
/// stateless; every operation threads the value factory for interning.
pub trait StoreManager: Debug {
    /// The store at function entry: globals and parameters are pre-bound to
    /// fresh symbols, scalar locals to Undefined, and static locals with no
    /// initializer to zero per the usual C rule.
    fn initial_store(&self, factory: &mut ValueFactory, ast: &AstContext) -> Store;

    fn bind(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        store: &Store,
        target: &SVal,
        val: SVal,
    ) -> BindOutcome;

    fn lookup(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        store: &Store,
        loc: &SVal,
        ty: Option<TypeId>,
    ) -> SVal;

    /// Mark and sweep keyed on the live regions already seeded in the
    /// reaper; drops bindings whose region is neither live nor referenced
    /// by any live binding's value. Marks every symbol reachable from
    /// surviving bindings.
    fn sweep(&self, factory: &ValueFactory, store: &Store, reaper: &mut SymbolReaper) -> Store {
        sweep_store(factory, store, reaper)
    }
}

/// Binds the initial value of one declared variable; shared by both
/// managers, which differ in which variables they track.
fn bind_initial_var(
    factory: &mut ValueFactory,
    ast: &AstContext,
    store: Store,
    var: crate::ast::VarId,
) -> Store {
    let decl = ast.var(var);
    let ty = decl.ty;
    let region = factory.regions.var_region(var, ast);
    match decl.storage {
        StorageClass::Param => {
            let sym = factory.symbols.param(var);
            let val = factory.symbol_value(sym, ty, ast);
            store.with_binding(region, val)
        }
        StorageClass::Global => {
            let sym = factory.symbols.global(var);
            let val = factory.symbol_value(sym, ty, ast);
            store.with_binding(region, val)
        }
        StorageClass::StaticLocal => {
            let val = factory.zero_value(ty, ast);
            store.with_binding(region, val)
        }
        StorageClass::Local => store.with_binding(region, SVal::Undefined),
    }
}

/// The shared mark and sweep. The reaper arrives seeded with root regions;
/// the walk closes over regions and symbols reachable through bound values
/// until a fixed point, then rebuilds the store from the live bindings.
fn sweep_store(factory: &ValueFactory, store: &Store, reaper: &mut SymbolReaper) -> Store {
    loop {
        let mut changed = false;
        for (region, val) in store.iter_bindings() {
            if !binding_live(factory, *region, reaper) {
                continue;
            }
            let mut symbols = vec![];
            val.collect_symbols(&factory.basic_values, &factory.regions, &mut symbols);
            for sym in symbols {
                changed |= reaper.mark_symbol(sym);
            }
            if let Some(pointee) = val.as_region() {
                changed |= reaper.mark_region(pointee);
                changed |= reaper.mark_region(factory.regions.base_region(pointee));
            }
        }
        if !changed {
            break;
        }
    }
    let mut bindings = HashTrieMap::new();
    for (region, val) in store.iter_bindings() {
        if binding_live(factory, *region, reaper) {
            bindings.insert_mut(*region, val.clone());
        }
    }
    let mut defaults = HashTrieMap::new();
    for (region, val) in store.defaults.iter() {
        if binding_live(factory, *region, reaper) {
            defaults.insert_mut(*region, val.clone());
        }
    }
    Store { bindings, defaults }
}

/// A binding survives the sweep when the base of its region chain is live:
/// a live variable, a marked block, or a symbolic block whose symbol is
/// still referenced.
fn binding_live(factory: &ValueFactory, region: RegionId, reaper: &SymbolReaper) -> bool {
    let base = factory.regions.base_region(region);
    if reaper.is_region_live(base) || reaper.is_region_live(region) {
        return true;
    }
    match factory.regions.data(base) {
        RegionData::Symbolic { sym, .. } => factory.symbols.symbol_live(*sym, reaper),
        RegionData::StringLit { .. } | RegionData::Code { .. } => true,
        _ => false,
    }
}

/// The flat store: a map from scalar variables to values. Writes through
/// anything other than a variable region are dropped; reads of untracked
/// locations are unknown.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatStoreManager;

impl StoreManager for FlatStoreManager {
    fn initial_store(&self, factory: &mut ValueFactory, ast: &AstContext) -> Store {
        let mut store = Store::new();
        for var in ast.var_ids() {
            let ty = ast.var(var).ty;
            if ast.is_aggregate(ty) {
                // Arrays and structs are conservatively unknown here.
                continue;
            }
            store = bind_initial_var(factory, ast, store, var);
        }
        store
    }

    fn bind(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        store: &Store,
        target: &SVal,
        val: SVal,
    ) -> BindOutcome {
        match target {
            SVal::Undefined => BindOutcome::UndefinedTarget,
            SVal::Loc(Loc::MemRegion(r)) => match factory.regions.data(*r) {
                RegionData::Var { decl, .. } => {
                    let ty = ast.var(*decl).ty;
                    if ast.is_aggregate(ty) {
                        BindOutcome::Untracked
                    } else {
                        BindOutcome::Bound(store.with_binding(*r, val))
                    }
                }
                _ => BindOutcome::Untracked,
            },
            _ => BindOutcome::Untracked,
        }
    }

    fn lookup(
        &self,
        factory: &mut ValueFactory,
        _ast: &AstContext,
        store: &Store,
        loc: &SVal,
        _ty: Option<TypeId>,
    ) -> SVal {
        match loc {
            SVal::Undefined => SVal::Undefined,
            SVal::Unknown => SVal::Unknown,
            // Reading through a literal address is a defect source.
            SVal::Loc(Loc::ConcreteInt(..)) => SVal::Undefined,
            SVal::Loc(Loc::MemRegion(r)) => {
                if matches!(factory.regions.data(*r), RegionData::Var { .. }) {
                    store.binding(*r).cloned().unwrap_or(SVal::Unknown)
                } else {
                    SVal::Unknown
                }
            }
            _ => SVal::Unknown,
        }
    }
}

/// The region store: tracks field and element bindings, string literal
/// element access, aggregate initialization and per-aggregate defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegionStoreManager;

impl RegionStoreManager {
    /// Element-wise initialization of a constant sized array, with a
    /// default value for the zero filled tail. Oversized arrays fall back
    /// to a default binding only.
    fn bind_array(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        mut store: Store,
        region: RegionId,
        element_ty: TypeId,
        length: Option<u64>,
        vals: &[SVal],
    ) -> Store {
        let tracked = match length {
            Some(n) if (n as usize) <= k_limits::MAX_ELEMENTS_TO_TRACK => {
                vals.len().min(n as usize)
            }
            _ => 0,
        };
        for (i, v) in vals.iter().take(tracked).enumerate() {
            let index = SVal::nonloc_int(factory.basic_values.intern_int(i as i128, 64, true));
            let elem = factory.regions.element_region(element_ty, index, region);
            store = store.with_binding(elem, v.clone());
        }
        let default = factory.zero_value(element_ty, ast);
        store.with_default(region, default)
    }

    fn bind_record(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        mut store: Store,
        region: RegionId,
        fields: &[crate::ast::FieldId],
        vals: &[SVal],
    ) -> Store {
        for (field, v) in fields.iter().zip(vals.iter()) {
            let f = factory.regions.field_region(*field, region);
            store = store.with_binding(f, v.clone());
        }
        store
    }

    /// Reads an element of a string literal: the character at a concrete
    /// index, zero at the terminator, undefined past it.
    fn string_element(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        literal: crate::ast::StringId,
        index: &SVal,
    ) -> SVal {
        let i = match index {
            SVal::NonLoc(NonLoc::ConcreteInt(i)) => factory.basic_values.int(*i).as_i128(),
            _ => return SVal::Unknown,
        };
        let text = ast.string(literal);
        if i < 0 || i > text.len() as i128 {
            return SVal::Undefined;
        }
        let byte = text.as_bytes().get(i as usize).copied().unwrap_or(0);
        SVal::nonloc_int(factory.basic_values.intern_int(i128::from(byte), 8, true))
    }
}

impl StoreManager for RegionStoreManager {
    fn initial_store(&self, factory: &mut ValueFactory, ast: &AstContext) -> Store {
        let mut store = Store::new();
        for var in ast.var_ids() {
            let ty = ast.var(var).ty;
            if ast.is_aggregate(ty) {
                // Aggregate locals read as undefined until initialized;
                // parameter and global aggregates resolve to region value
                // symbols on demand.
                if ast.var(var).storage == StorageClass::Local {
                    let region = factory.regions.var_region(var, ast);
                    store = store.with_default(region, SVal::Undefined);
                }
                continue;
            }
            store = bind_initial_var(factory, ast, store, var);
        }
        store
    }

    fn bind(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        store: &Store,
        target: &SVal,
        val: SVal,
    ) -> BindOutcome {
        let region = match target {
            SVal::Undefined => return BindOutcome::UndefinedTarget,
            SVal::Loc(Loc::MemRegion(r)) => *r,
            // Writing through a literal address or an untyped unknown is
            // dropped rather than modeled.
            _ => return BindOutcome::Untracked,
        };
        if let SVal::NonLoc(NonLoc::Compound { vals, .. }) = &val {
            let region_ty = factory.region_value_type(region, ast);
            match region_ty.map(|t| ast.type_kind(t).clone()) {
                Some(TypeKind::Array { element, length }) => {
                    let store = self.bind_array(
                        factory,
                        ast,
                        store.clone(),
                        region,
                        element,
                        length,
                        vals,
                    );
                    return BindOutcome::Bound(store);
                }
                Some(TypeKind::Record { fields, .. }) => {
                    let store =
                        self.bind_record(factory, ast, store.clone(), region, &fields, vals);
                    return BindOutcome::Bound(store);
                }
                _ => {}
            }
        }
        BindOutcome::Bound(store.with_binding(region, val))
    }

    fn lookup(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        store: &Store,
        loc: &SVal,
        ty: Option<TypeId>,
    ) -> SVal {
        let region = match loc {
            SVal::Undefined => return SVal::Undefined,
            SVal::Unknown => return SVal::Unknown,
            SVal::Loc(Loc::ConcreteInt(..)) => return SVal::Undefined,
            SVal::Loc(Loc::Symbol(s)) => {
                // A pure symbolic pointer names memory we only know through
                // its symbol; read it as that block's region.
                factory.regions.symbolic_region(*s, MemSpace::Unknown)
            }
            SVal::Loc(Loc::MemRegion(r)) => *r,
            _ => return SVal::Unknown,
        };
        if let Some(v) = store.binding(region) {
            return v.clone();
        }
        if let RegionData::Element { index, parent, .. } = factory.regions.data(region).clone() {
            if let RegionData::StringLit { literal, .. } = factory.regions.data(parent).clone() {
                return self.string_element(factory, ast, literal, &index);
            }
        }
        // Default values attached to any ancestor apply.
        let mut ancestor = Some(region);
        while let Some(a) = ancestor {
            if let Some(v) = store.default_of(a) {
                return v.clone();
            }
            ancestor = factory.regions.data(a).parent();
        }
        let base = factory.regions.base_region(region);
        let escaped = match factory.regions.data(base) {
            RegionData::Symbolic { .. } => {
                factory.regions.memory_space(base) != MemSpace::Heap
            }
            RegionData::Var { decl, .. } => !matches!(
                ast.var(*decl).storage,
                StorageClass::Local
            ),
            _ => false,
        };
        if escaped {
            // Escaped memory reads as a fresh region value symbol.
            let sym = factory.symbols.region_value(region);
            let sym_ty = ty.or_else(|| factory.region_value_type(region, ast));
            return match sym_ty {
                Some(t) => factory.symbol_value(sym, t, ast),
                None => SVal::NonLoc(NonLoc::Symbol(sym)),
            };
        }
        match factory.regions.memory_space(region) {
            // Uninitialized stack or heap storage.
            MemSpace::Stack | MemSpace::Heap => SVal::Undefined,
            _ => SVal::Unknown,
        }
    }
}

/// Selects the store implementation named by the configuration.
pub fn store_manager_for(model: StoreModel) -> Box<dyn StoreManager> {
    match model {
        StoreModel::Flat => Box::new(FlatStoreManager),
        StoreModel::Region => Box::new(RegionStoreManager),
    }
}
