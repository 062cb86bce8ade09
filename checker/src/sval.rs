// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{FuncId, LabelId, TypeId};
use crate::basic_values::{BasicValueFactory, ConstraintId, IntId};
use crate::regions::{RegionData, RegionFactory, RegionId};
use crate::symbols::SymbolId;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A pointer typed abstract value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Loc {
    /// An address expressed as a concrete integer.
    ConcreteInt(IntId),
    /// An address known only symbolically.
    Symbol(SymbolId),
    /// The address of a goto label, for computed gotos.
    GotoLabel(LabelId),
    /// The address of a function.
    Func(FuncId),
    /// The address of a memory region.
    MemRegion(RegionId),
}

/// A non pointer abstract value.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum NonLoc {
    ConcreteInt(IntId),
    Symbol(SymbolId),
    /// A symbolic comparison used as a value, e.g. the 0/1 of `x != 0`.
    SymIntConstraint(ConstraintId),
    /// The value of an aggregate initializer.
    Compound { ty: TypeId, vals: Rc<Vec<SVal>> },
    /// A pointer value observed at integer type.
    LocAsInteger { loc: Loc, bits: u32 },
}

/// The abstract interpretation of an r-value: the tagged sum over what the
/// analyzer can know about it at a program point.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SVal {
    /// No information; the top of the domain.
    Unknown,
    /// A value read from uninitialized storage. Undefined dominates
    /// propagation and its observable uses are defects.
    Undefined,
    Loc(Loc),
    NonLoc(NonLoc),
}

/// The projection of an abstract value onto branch feasibility.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConditionTruth {
    True,
    False,
    Unknown,
    Undefined,
}

impl SVal {
    pub fn loc_region(region: RegionId) -> SVal {
        SVal::Loc(Loc::MemRegion(region))
    }

    pub fn nonloc_int(id: IntId) -> SVal {
        SVal::NonLoc(NonLoc::ConcreteInt(id))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SVal::Unknown)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, SVal::Undefined)
    }

    pub fn is_loc(&self) -> bool {
        matches!(self, SVal::Loc(..))
    }

    /// The region this value points at, if it is a region address.
    pub fn as_region(&self) -> Option<RegionId> {
        match self {
            SVal::Loc(Loc::MemRegion(r)) => Some(*r),
            _ => None,
        }
    }

    /// The symbol directly carried by this value, if any. Constraint values
    /// and region addresses resolve through their own tables; see
    /// `collect_symbols`.
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            SVal::Loc(Loc::Symbol(s)) | SVal::NonLoc(NonLoc::Symbol(s)) => Some(*s),
            _ => None,
        }
    }

    /// True if this is the concrete integer zero (a null pointer when used
    /// in a pointer context).
    pub fn is_zero_constant(&self, basic_values: &BasicValueFactory) -> bool {
        match self {
            SVal::Loc(Loc::ConcreteInt(i)) | SVal::NonLoc(NonLoc::ConcreteInt(i)) => {
                basic_values.int(*i).is_zero()
            }
            _ => false,
        }
    }

    /// Appends every symbol reachable from this value: direct symbols, the
    /// subject of a constraint value, compound members, and the symbols a
    /// referenced region chain is built from.
    pub fn collect_symbols(
        &self,
        basic_values: &BasicValueFactory,
        regions: &RegionFactory,
        out: &mut Vec<SymbolId>,
    ) {
        match self {
            SVal::Unknown | SVal::Undefined => {}
            SVal::Loc(loc) => collect_loc_symbols(loc, basic_values, regions, out),
            SVal::NonLoc(nonloc) => match nonloc {
                NonLoc::ConcreteInt(..) => {}
                NonLoc::Symbol(s) => out.push(*s),
                NonLoc::SymIntConstraint(c) => out.push(basic_values.constraint(*c).sym),
                NonLoc::Compound { vals, .. } => {
                    for v in vals.iter() {
                        v.collect_symbols(basic_values, regions, out);
                    }
                }
                NonLoc::LocAsInteger { loc, .. } => {
                    collect_loc_symbols(loc, basic_values, regions, out)
                }
            },
        }
    }
}

fn collect_loc_symbols(
    loc: &Loc,
    basic_values: &BasicValueFactory,
    regions: &RegionFactory,
    out: &mut Vec<SymbolId>,
) {
    match loc {
        Loc::Symbol(s) => out.push(*s),
        Loc::MemRegion(r) => collect_region_symbols(*r, basic_values, regions, out),
        _ => {}
    }
}

/// Walks a region chain, collecting symbols embedded in symbolic anchors and
/// element indices.
pub fn collect_region_symbols(
    mut region: RegionId,
    basic_values: &BasicValueFactory,
    regions: &RegionFactory,
    out: &mut Vec<SymbolId>,
) {
    loop {
        match regions.data(region) {
            RegionData::Symbolic { sym, .. } => {
                out.push(*sym);
                return;
            }
            RegionData::Element { index, parent, .. } => {
                index.collect_symbols(basic_values, regions, out);
                region = *parent;
            }
            other => match other.parent() {
                Some(parent) => region = parent,
                None => return,
            },
        }
    }
}
