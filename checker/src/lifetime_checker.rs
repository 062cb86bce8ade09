// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use crate::checkers::Checker;
use crate::core_engine::NodeBuilder;
use crate::defects::DefectKind;
use crate::expr_engine::TAG_ALLOC;
use crate::known_names::KnownNames;
use crate::regions::{MemSpace, RegionData};
use crate::sval::{Loc, SVal};
use crate::symbols::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The lifetime of one heap allocation, tracked per allocation symbol in
/// the generic data map.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AllocState {
    Allocated,
    Released,
}

/// Models allocation and release and reports double free, use after free,
/// bad free and leaks. Enabled by `track_object_lifetimes`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifetimeChecker;

impl LifetimeChecker {
    /// The symbol a freed or dereferenced pointer value is rooted in.
    fn pointer_symbol(b: &NodeBuilder<'_, '_>, val: &SVal) -> Option<SymbolId> {
        match val {
            SVal::Loc(Loc::Symbol(sym)) => Some(*sym),
            SVal::Loc(Loc::MemRegion(r)) => b.core.factory.regions.region_symbol(*r),
            _ => None,
        }
    }

    fn process_free(&self, b: &mut NodeBuilder<'_, '_>, arg: &SVal) {
        // free(NULL) is a no-op.
        if arg.is_zero_constant(&b.core.factory.basic_values) {
            return;
        }
        if arg.is_unknown() || arg.is_undefined() {
            return;
        }
        if let SVal::Loc(Loc::MemRegion(r)) = arg {
            let base = b.core.factory.regions.base_region(*r);
            if !matches!(
                b.core.factory.regions.data(base),
                RegionData::Symbolic { .. }
            ) {
                // Releasing a variable, literal or alloca block.
                let state = b.state.clone();
                b.generate_sink(DefectKind::BadFree, state);
                b.mark_fatal();
                return;
            }
        }
        let sym = match Self::pointer_symbol(b, arg) {
            Some(sym) => sym,
            None => return,
        };
        match b.state.gdm.alloc.get(&sym).copied() {
            Some(AllocState::Released) => {
                let state = b.state.clone();
                b.generate_sink(DefectKind::DoubleFree, state);
                b.mark_fatal();
            }
            _ => {
                // Releasing an Allocated block, or a block of unknown
                // origin we now start tracking.
                b.state = b
                    .state
                    .with_gdm(b.state.gdm.with_alloc(sym, AllocState::Released));
            }
        }
    }
}

impl Checker for LifetimeChecker {
    fn name(&self) -> &'static str {
        "lifetime"
    }

    fn eval_call(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        call: StmtId,
        _callee: &SVal,
        args: &[SVal],
        known: KnownNames,
    ) -> bool {
        let ast = b.core.ast;
        if known.is_heap_allocator() {
            let count = b.visit_count_of(call);
            let ty = ast.stmt_type(call);
            let sym = b.core.factory.symbols.conjure(call, ty, count, TAG_ALLOC);
            let region = b.core.factory.regions.symbolic_region(sym, MemSpace::Heap);
            if known == KnownNames::Calloc {
                // calloc zero fills the block.
                let zero = SVal::nonloc_int(b.core.factory.basic_values.intern_int(0, 32, true));
                b.state = b.state.with_store(b.state.store.with_default(region, zero));
            }
            b.state = b
                .state
                .with_gdm(b.state.gdm.with_alloc(sym, AllocState::Allocated));
            let block_level = b.core.cfg.is_block_expr(call);
            b.state = b
                .state
                .with_env(b.state.env.bind(call, SVal::loc_region(region), block_level));
            return true;
        }
        match known {
            KnownNames::Alloca => {
                let count = b.visit_count_of(call);
                let region = b.core.factory.regions.alloca_region(call, count);
                let block_level = b.core.cfg.is_block_expr(call);
                b.state = b
                    .state
                    .with_env(b.state.env.bind(call, SVal::loc_region(region), block_level));
                true
            }
            KnownNames::Free => {
                let arg = args.first().cloned().unwrap_or(SVal::Unknown);
                self.process_free(b, &arg);
                true
            }
            _ => false,
        }
    }

    /// Any access through a released block is a use after free.
    fn check_location(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        _stmt: StmtId,
        loc: &SVal,
        _is_load: bool,
    ) -> bool {
        if let Some(sym) = Self::pointer_symbol(b, loc) {
            if b.state.gdm.alloc.get(&sym) == Some(&AllocState::Released) {
                let state = b.state.clone();
                b.generate_sink(DefectKind::UseAfterFree, state);
                return false;
            }
        }
        true
    }

    /// An allocation whose symbol died while still Allocated has leaked.
    fn check_dead_symbols(&self, b: &mut NodeBuilder<'_, '_>, dead: &[SymbolId]) {
        for sym in dead {
            match b.state.gdm.alloc.get(sym).copied() {
                Some(AllocState::Allocated) => {
                    let state = b.state.clone();
                    b.generate_sink(DefectKind::MemoryLeak, state);
                    b.state = b.state.with_gdm(b.state.gdm.without_alloc(*sym));
                }
                Some(AllocState::Released) => {
                    b.state = b.state.with_gdm(b.state.gdm.without_alloc(*sym));
                }
                None => {}
            }
        }
    }

    /// At the end of a path, every Allocated block that is not reachable
    /// from a surviving environment binding (e.g. the return value) has
    /// leaked.
    fn check_end_path(&self, b: &mut NodeBuilder<'_, '_>) {
        let mut reachable: Vec<SymbolId> = vec![];
        for (_, val) in b.state.env.iter() {
            val.collect_symbols(
                &b.core.factory.basic_values,
                &b.core.factory.regions,
                &mut reachable,
            );
        }
        let reachable: HashSet<SymbolId> = reachable.into_iter().collect();
        let leaked: Vec<SymbolId> = b
            .state
            .gdm
            .alloc
            .iter()
            .filter(|(sym, state)| {
                **state == AllocState::Allocated && !reachable.contains(*sym)
            })
            .map(|(sym, _)| *sym)
            .collect();
        for sym in leaked {
            let state = b.state.clone();
            b.generate_sink(DefectKind::MemoryLeak, state);
            b.state = b.state.with_gdm(b.state.gdm.without_alloc(sym));
        }
    }
}
