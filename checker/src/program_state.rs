// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, StmtId};
use crate::constraints::{ConstraintManager, Constraints};
use crate::environment::Environment;
use crate::lifetime_checker::AllocState;
use crate::liveness::{LiveQuery, LivenessOracle};
use crate::regions::RegionData;
use crate::store::{Store, StoreManager};
use crate::symbols::{SymbolId, SymbolReaper};
use crate::utils;
use crate::value_factory::ValueFactory;
use rpds::{HashTrieMap, HashTrieSet};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Checker specific state carried inside every program state. The original
/// design keys opaque blobs by checker tag; with the checkers in-tree this
/// becomes two typed persistent structures, which keeps the map hashable
/// and comparable for state interning.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct GenericDataMap {
    /// Allocation lifetime facts, keyed by the allocation's symbol.
    pub alloc: HashTrieMap<SymbolId, AllocState>,
    /// Symbols carrying tainted data.
    pub taint: HashTrieSet<SymbolId>,
}

impl Debug for GenericDataMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("GenericDataMap")
            .field("alloc_count", &self.alloc.size())
            .field("taint_count", &self.taint.size())
            .finish()
    }
}

impl Hash for GenericDataMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        utils::hash_unordered_map(&self.alloc, state);
        utils::hash_unordered_set(&self.taint, state);
    }
}

impl GenericDataMap {
    pub fn with_alloc(&self, sym: SymbolId, fact: AllocState) -> GenericDataMap {
        GenericDataMap {
            alloc: self.alloc.insert(sym, fact),
            taint: self.taint.clone(),
        }
    }

    pub fn without_alloc(&self, sym: SymbolId) -> GenericDataMap {
        GenericDataMap {
            alloc: self.alloc.remove(&sym),
            taint: self.taint.clone(),
        }
    }

    pub fn with_taint(&self, sym: SymbolId) -> GenericDataMap {
        GenericDataMap {
            alloc: self.alloc.clone(),
            taint: self.taint.insert(sym),
        }
    }

    pub fn without_taint(&self, sym: SymbolId) -> GenericDataMap {
        GenericDataMap {
            alloc: self.alloc.clone(),
            taint: self.taint.remove(&sym),
        }
    }
}

/// The interned tuple labeling a vertex of the exploded graph: what is in
/// memory, what expressions evaluate to, what is known about symbols, and
/// whatever the checkers recorded.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct ProgramState {
    pub store: Store,
    pub env: Environment,
    pub constraints: Constraints,
    pub gdm: GenericDataMap,
}

impl Debug for ProgramState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("ProgramState")
            .field("store", &self.store)
            .field("env", &self.env)
            .field("constraints", &self.constraints)
            .finish()
    }
}

impl Hash for ProgramState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store.hash(state);
        self.env.hash(state);
        self.constraints.hash(state);
        self.gdm.hash(state);
    }
}

impl ProgramState {
    pub fn with_store(&self, store: Store) -> ProgramState {
        ProgramState {
            store,
            env: self.env.clone(),
            constraints: self.constraints.clone(),
            gdm: self.gdm.clone(),
        }
    }

    pub fn with_env(&self, env: Environment) -> ProgramState {
        ProgramState {
            store: self.store.clone(),
            env,
            constraints: self.constraints.clone(),
            gdm: self.gdm.clone(),
        }
    }

    pub fn with_constraints(&self, constraints: Constraints) -> ProgramState {
        ProgramState {
            store: self.store.clone(),
            env: self.env.clone(),
            constraints,
            gdm: self.gdm.clone(),
        }
    }

    pub fn with_gdm(&self, gdm: GenericDataMap) -> ProgramState {
        ProgramState {
            store: self.store.clone(),
            env: self.env.clone(),
            constraints: self.constraints.clone(),
            gdm,
        }
    }
}

/// Interns program states: two structurally equal tuples share one
/// allocation, and a state's identity is the id assigned at interning.
#[derive(Default)]
pub struct StateFactory {
    index: HashMap<Rc<ProgramState>, u32>,
}

impl Debug for StateFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "StateFactory".fmt(f)
    }
}

impl StateFactory {
    pub fn new() -> StateFactory {
        StateFactory::default()
    }

    pub fn intern(&mut self, state: ProgramState) -> (Rc<ProgramState>, u32) {
        if let Some((existing, id)) = self.index.get_key_value(&state) {
            return (existing.clone(), *id);
        }
        let id = self.index.len() as u32;
        let shared = Rc::new(state);
        self.index.insert(shared.clone(), id);
        (shared, id)
    }

    pub fn count(&self) -> usize {
        self.index.len()
    }
}

/// Removes bindings and facts that are dead at `point`:
/// 1. seed the live region set from surviving environment bindings and from
///    variables the oracle reports live;
/// 2. let the store sweep close over regions and symbols reachable from
///    live bindings;
/// 3. sweep constraint facts with the resulting closure;
/// 4. report the symbols that fell out, so checkers can audit them.
pub fn remove_dead(
    factory: &mut ValueFactory,
    store_manager: &dyn StoreManager,
    ast: &AstContext,
    liveness: &dyn LivenessOracle,
    state: &ProgramState,
    point: StmtId,
) -> (ProgramState, SymbolReaper) {
    let env = state.env.sweep(point, liveness);
    let mut reaper = SymbolReaper::new();

    // Symbols the state knew about before the sweep; used to report deaths.
    let mut candidates: Vec<SymbolId> = vec![];
    for (_, val) in state.store.iter_bindings() {
        val.collect_symbols(&factory.basic_values, &factory.regions, &mut candidates);
    }
    for (sym, _) in state.constraints.iter() {
        candidates.push(*sym);
    }
    for (sym, _) in state.gdm.alloc.iter() {
        candidates.push(*sym);
    }

    // Roots: live variables holding store bindings.
    for (region, _) in state.store.iter_bindings() {
        let base = factory.regions.base_region(*region);
        if let RegionData::Var { decl, .. } = factory.regions.data(base) {
            if liveness.is_live(point, LiveQuery::Var(*decl)) {
                reaper.mark_region(base);
            }
        }
    }
    // Roots: values still referenced by the environment.
    for (_, val) in env.iter() {
        let mut symbols = vec![];
        val.collect_symbols(&factory.basic_values, &factory.regions, &mut symbols);
        for sym in symbols {
            reaper.mark_symbol(sym);
        }
        if let Some(region) = val.as_region() {
            reaper.mark_region(region);
            reaper.mark_region(factory.regions.base_region(region));
        }
    }

    let store = store_manager.sweep(factory, &state.store, &mut reaper);
    let constraint_manager = ConstraintManager;
    let constraints = constraint_manager.sweep(factory, &state.constraints, &reaper);

    candidates.sort_unstable();
    candidates.dedup();
    for sym in candidates {
        if !factory.symbols.symbol_live(sym, &reaper) {
            reaper.note_dead(sym);
        }
    }

    (
        ProgramState {
            store,
            env,
            constraints,
            gdm: state.gdm.clone(),
        },
        reaper,
    )
}
