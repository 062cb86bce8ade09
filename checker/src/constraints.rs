// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::BinOp;
use crate::basic_values::IntId;
use crate::k_limits;
use crate::sval::{Loc, NonLoc, SVal};
use crate::symbols::{SymbolId, SymbolReaper};
use crate::utils;
use crate::value_factory::{ValueFactory, POINTER_WIDTH};
use log_derive::logfn_inputs;
use rpds::{HashTrieMap, HashTrieSet};
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};

/// The facts known about one symbol: at most one equality to a concrete
/// integer, a finite set of disequalities, and an optional bounded interval
/// over the symbol's value.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct SymbolFacts {
    eq: Option<IntId>,
    ne: HashTrieSet<IntId>,
    range: Option<(i128, i128)>,
}

impl Debug for SymbolFacts {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("SymbolFacts")
            .field("eq", &self.eq)
            .field("ne_count", &self.ne.size())
            .field("range", &self.range)
            .finish()
    }
}

impl Hash for SymbolFacts {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.eq.hash(state);
        utils::hash_unordered_set(&self.ne, state);
        self.range.hash(state);
    }
}

impl SymbolFacts {
    pub fn equality(&self) -> Option<IntId> {
        self.eq
    }

    pub fn disequalities(&self) -> impl Iterator<Item = IntId> + '_ {
        self.ne.iter().copied()
    }

    pub fn range(&self) -> Option<(i128, i128)> {
        self.range
    }
}

/// Immutable set of equality, disequality and range facts about symbols.
/// A contradiction makes the path infeasible and drops the state.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct Constraints {
    facts: HashTrieMap<SymbolId, SymbolFacts>,
}

impl Debug for Constraints {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.facts.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl Hash for Constraints {
    fn hash<H: Hasher>(&self, state: &mut H) {
        utils::hash_unordered_map(&self.facts, state);
    }
}

impl Constraints {
    pub fn new() -> Constraints {
        Constraints::default()
    }

    pub fn facts_for(&self, sym: SymbolId) -> Option<&SymbolFacts> {
        self.facts.get(&sym)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolId, &SymbolFacts)> {
        self.facts.iter()
    }

    pub fn size(&self) -> usize {
        self.facts.size()
    }
}

/// Answers `assume` and the equality queries over constraint sets. The
/// manager is stateless; constraint sets live inside program states.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintManager;

impl ConstraintManager {
    /// Conditions a constraint set on the truth of an abstract value.
    /// Returns None when the assumption is infeasible; an unknown condition
    /// keeps both branches feasible by returning the set unchanged.
    #[logfn_inputs(TRACE)]
    pub fn assume(
        &self,
        factory: &mut ValueFactory,
        constraints: &Constraints,
        cond: &SVal,
        assumption: bool,
    ) -> Option<Constraints> {
        match cond {
            SVal::Unknown | SVal::Undefined => Some(constraints.clone()),
            SVal::NonLoc(NonLoc::ConcreteInt(i)) | SVal::Loc(Loc::ConcreteInt(i)) => {
                let truthy = !factory.basic_values.int(*i).is_zero();
                if truthy == assumption {
                    Some(constraints.clone())
                } else {
                    None
                }
            }
            SVal::NonLoc(NonLoc::Symbol(s)) | SVal::Loc(Loc::Symbol(s)) => {
                self.assume_symbol_truth(factory, constraints, *s, assumption)
            }
            SVal::Loc(Loc::MemRegion(r)) => {
                match factory.regions.region_symbol(*r) {
                    Some(s) => self.assume_symbol_truth(factory, constraints, s, assumption),
                    // The address of a variable or literal is non null.
                    None => {
                        if assumption {
                            Some(constraints.clone())
                        } else {
                            None
                        }
                    }
                }
            }
            SVal::Loc(Loc::Func(..)) | SVal::Loc(Loc::GotoLabel(..)) => {
                if assumption {
                    Some(constraints.clone())
                } else {
                    None
                }
            }
            SVal::NonLoc(NonLoc::SymIntConstraint(c)) => {
                let data = *factory.basic_values.constraint(*c);
                let op = if assumption {
                    data.op
                } else {
                    match data.op.negated_comparison() {
                        Some(negated) => negated,
                        None => return Some(constraints.clone()),
                    }
                };
                self.assume_relation(factory, constraints, data.sym, op, data.rhs)
            }
            SVal::NonLoc(NonLoc::LocAsInteger { loc, .. }) => {
                self.assume(factory, constraints, &SVal::Loc(*loc), assumption)
            }
            _ => Some(constraints.clone()),
        }
    }

    /// "s is truthy" becomes s != 0; "s is falsy" becomes s == 0. The fact
    /// sets compare by semantic value, so the zero's width is immaterial.
    fn assume_symbol_truth(
        &self,
        factory: &mut ValueFactory,
        constraints: &Constraints,
        sym: SymbolId,
        assumption: bool,
    ) -> Option<Constraints> {
        let zero = factory.basic_values.intern_int(0, POINTER_WIDTH, true);
        let op = if assumption { BinOp::Ne } else { BinOp::Eq };
        self.assume_relation(factory, constraints, sym, op, zero)
    }

    /// Records "sym op K", tightening existing facts; None on contradiction.
    #[logfn_inputs(TRACE)]
    pub fn assume_relation(
        &self,
        factory: &mut ValueFactory,
        constraints: &Constraints,
        sym: SymbolId,
        op: BinOp,
        rhs: IntId,
    ) -> Option<Constraints> {
        let facts = constraints.facts_for(sym).cloned().unwrap_or_default();
        let k = factory.basic_values.int(rhs).as_i128();
        // An existing equality decides every further comparison.
        if let Some(e) = facts.eq {
            let outcome = factory.basic_values.evaluate(op, e, rhs)?;
            return if factory.basic_values.int(outcome).is_zero() {
                None
            } else {
                Some(constraints.clone())
            };
        }
        let mut updated = facts.clone();
        match op {
            BinOp::Eq => {
                if facts.ne.iter().any(|n| factory.basic_values.int(*n).as_i128() == k) {
                    return None;
                }
                if let Some((lo, hi)) = facts.range {
                    if k < lo || k > hi {
                        return None;
                    }
                }
                updated.eq = Some(rhs);
            }
            BinOp::Ne => {
                if facts.ne.iter().any(|n| factory.basic_values.int(*n).as_i128() == k) {
                    return Some(constraints.clone());
                }
                if facts.ne.size() >= k_limits::MAX_DISEQUALITIES_PER_SYMBOL {
                    // Stop tracking rather than grow without bound.
                    return Some(constraints.clone());
                }
                updated.ne = facts.ne.insert(rhs);
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (mut lo, mut hi) = facts.range.unwrap_or((i128::MIN, i128::MAX));
                match op {
                    BinOp::Lt => hi = hi.min(k.saturating_sub(1)),
                    BinOp::Le => hi = hi.min(k),
                    BinOp::Gt => lo = lo.max(k.saturating_add(1)),
                    BinOp::Ge => lo = lo.max(k),
                    _ => {}
                }
                if lo > hi {
                    return None;
                }
                updated.range = Some((lo, hi));
                if lo == hi {
                    let v = factory.basic_values.int(rhs);
                    let (width, signed) = (v.width, v.signed);
                    updated.eq = Some(factory.basic_values.intern_int(lo, width, signed));
                }
            }
            _ => return Some(constraints.clone()),
        }
        Some(Constraints {
            facts: constraints.facts.insert(sym, updated),
        })
    }

    /// Whether "sym == K" is known to hold (Some(true)), known not to hold
    /// (Some(false)), or open (None).
    pub fn is_equal(
        &self,
        factory: &ValueFactory,
        constraints: &Constraints,
        sym: SymbolId,
        k: i128,
    ) -> Option<bool> {
        let facts = constraints.facts_for(sym)?;
        if let Some(e) = facts.eq {
            return Some(factory.basic_values.int(e).as_i128() == k);
        }
        if facts
            .ne
            .iter()
            .any(|n| factory.basic_values.int(*n).as_i128() == k)
        {
            return Some(false);
        }
        if let Some((lo, hi)) = facts.range {
            if k < lo || k > hi {
                return Some(false);
            }
        }
        None
    }

    pub fn is_not_equal(
        &self,
        factory: &ValueFactory,
        constraints: &Constraints,
        sym: SymbolId,
        k: i128,
    ) -> Option<bool> {
        self.is_equal(factory, constraints, sym, k).map(|b| !b)
    }

    /// Drops facts about symbols the reaper no longer considers live.
    pub fn sweep(
        &self,
        factory: &ValueFactory,
        constraints: &Constraints,
        reaper: &SymbolReaper,
    ) -> Constraints {
        let mut facts = constraints.facts.clone();
        for (sym, _) in constraints.facts.iter() {
            if !factory.symbols.symbol_live(*sym, reaper) {
                facts.remove_mut(sym);
            }
        }
        Constraints { facts }
    }
}
