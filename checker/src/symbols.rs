// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{BinOp, StmtId, TypeId, VarId};
use crate::basic_values::IntId;
use crate::regions::RegionId;
use log_derive::logfn_inputs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter, Result};

/// An opaque, typed name for a value whose concrete value is unknown.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SymbolId(pub u32);

/// The immutable descriptor behind a symbol. Symbols are interned by
/// descriptor: equal descriptors yield the same id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SymbolData {
    /// The unknown initial value of a parameter.
    Param { var: VarId },
    /// The unknown initial value of a global.
    Global { var: VarId },
    /// The unknown value stored in a region that escaped precise tracking.
    RegionValue { region: RegionId },
    /// A fresh unknown materialized at a havoc point: "some value of type
    /// `ty` arising at `stmt` on block visitation `count`".
    Conjured {
        stmt: StmtId,
        ty: TypeId,
        count: u32,
        tag: u32,
    },
    /// A symbol combined with a concrete integer.
    IntExpr {
        lhs: SymbolId,
        op: BinOp,
        rhs: IntId,
        ty: TypeId,
    },
    /// A symbol combined with another symbol.
    SymExpr {
        lhs: SymbolId,
        op: BinOp,
        rhs: SymbolId,
        ty: TypeId,
    },
}

/// Allocates and interns symbols. Symbols are created lazily on demand and
/// never destroyed during the analysis of one function.
#[derive(Default)]
pub struct SymbolManager {
    table: Vec<SymbolData>,
    index: HashMap<SymbolData, SymbolId>,
}

impl Debug for SymbolManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "SymbolManager".fmt(f)
    }
}

impl SymbolManager {
    pub fn new() -> SymbolManager {
        SymbolManager::default()
    }

    #[logfn_inputs(TRACE)]
    pub fn intern(&mut self, data: SymbolData) -> SymbolId {
        if let Some(id) = self.index.get(&data) {
            return *id;
        }
        let id = SymbolId(self.table.len() as u32);
        self.table.push(data);
        self.index.insert(data, id);
        id
    }

    pub fn param(&mut self, var: VarId) -> SymbolId {
        self.intern(SymbolData::Param { var })
    }

    pub fn global(&mut self, var: VarId) -> SymbolId {
        self.intern(SymbolData::Global { var })
    }

    pub fn region_value(&mut self, region: RegionId) -> SymbolId {
        self.intern(SymbolData::RegionValue { region })
    }

    /// Materializes the unknown value of type `ty` arising at `stmt` on the
    /// `count`th visitation of its block. `tag` distinguishes multiple
    /// conjurings at one site (call result vs. argument invalidation).
    #[logfn_inputs(TRACE)]
    pub fn conjure(&mut self, stmt: StmtId, ty: TypeId, count: u32, tag: u32) -> SymbolId {
        self.intern(SymbolData::Conjured {
            stmt,
            ty,
            count,
            tag,
        })
    }

    pub fn sym_int_expr(&mut self, lhs: SymbolId, op: BinOp, rhs: IntId, ty: TypeId) -> SymbolId {
        self.intern(SymbolData::IntExpr { lhs, op, rhs, ty })
    }

    pub fn sym_sym_expr(
        &mut self,
        lhs: SymbolId,
        op: BinOp,
        rhs: SymbolId,
        ty: TypeId,
    ) -> SymbolId {
        self.intern(SymbolData::SymExpr { lhs, op, rhs, ty })
    }

    pub fn data(&self, id: SymbolId) -> &SymbolData {
        &self.table[id.0 as usize]
    }

    pub fn count(&self) -> usize {
        self.table.len()
    }

    /// Whether the sweep phase must keep facts about `sym`: a derived symbol
    /// is live exactly when the symbols it is built from are live.
    pub fn symbol_live(&self, sym: SymbolId, reaper: &SymbolReaper) -> bool {
        match self.data(sym) {
            SymbolData::RegionValue { region } => {
                reaper.is_symbol_marked(sym) || reaper.is_region_live(*region)
            }
            SymbolData::IntExpr { lhs, .. } => {
                reaper.is_symbol_marked(sym) || self.symbol_live(*lhs, reaper)
            }
            SymbolData::SymExpr { lhs, rhs, .. } => {
                reaper.is_symbol_marked(sym)
                    || (self.symbol_live(*lhs, reaper) && self.symbol_live(*rhs, reaper))
            }
            _ => reaper.is_symbol_marked(sym),
        }
    }
}

/// Accumulates the live roots for one dead-binding sweep: the symbols
/// reachable from live bindings and the regions that anchor them.
#[derive(Clone, Debug, Default)]
pub struct SymbolReaper {
    live_symbols: HashSet<SymbolId>,
    live_regions: HashSet<RegionId>,
    dead_symbols: Vec<SymbolId>,
}

impl SymbolReaper {
    pub fn new() -> SymbolReaper {
        SymbolReaper::default()
    }

    /// Returns true if the symbol was not already marked.
    pub fn mark_symbol(&mut self, sym: SymbolId) -> bool {
        self.live_symbols.insert(sym)
    }

    /// Returns true if the region was not already marked.
    pub fn mark_region(&mut self, region: RegionId) -> bool {
        self.live_regions.insert(region)
    }

    pub fn is_symbol_marked(&self, sym: SymbolId) -> bool {
        self.live_symbols.contains(&sym)
    }

    pub fn is_region_live(&self, region: RegionId) -> bool {
        self.live_regions.contains(&region)
    }

    pub fn live_regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.live_regions.iter().copied()
    }

    /// Records a symbol whose last reference was dropped by the sweep.
    pub fn note_dead(&mut self, sym: SymbolId) {
        if !self.dead_symbols.contains(&sym) {
            self.dead_symbols.push(sym);
        }
    }

    pub fn dead_symbols(&self) -> &[SymbolId] {
        &self.dead_symbols
    }
}
