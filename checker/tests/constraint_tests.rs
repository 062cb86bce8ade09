// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Tests for the constraint manager: assume over the SVal forms, feasibility,
// monotone tightening, idempotence and the liveness sweep.

mod common;

use common::FunctionBuilder;
use corax::ast::BinOp;
use corax::constraints::{ConstraintManager, Constraints};
use corax::sval::{NonLoc, SVal};
use corax::symbols::{SymbolId, SymbolReaper};
use corax::value_factory::ValueFactory;

fn setup() -> (FunctionBuilder, ValueFactory, SymbolId) {
    let mut fb = FunctionBuilder::new();
    let x = fb.param("x", fb.int_ty);
    let mut factory = ValueFactory::new();
    let sym = factory.symbols.param(x);
    (fb, factory, sym)
}

#[test]
fn concrete_conditions_decide_feasibility() {
    let (fb, mut factory, _) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    let zero = factory.int_literal(0, fb.int_ty, &fb.ast);
    assert!(manager.assume(&mut factory, &constraints, &one, true).is_some());
    assert!(manager.assume(&mut factory, &constraints, &one, false).is_none());
    // A false condition assumed true is infeasible; assumed false it is a no-op.
    assert!(manager.assume(&mut factory, &constraints, &zero, true).is_none());
    assert!(manager.assume(&mut factory, &constraints, &zero, false).is_some());
}

#[test]
fn unknown_conditions_keep_both_branches_feasible() {
    let (_fb, mut factory, _) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let t = manager.assume(&mut factory, &constraints, &SVal::Unknown, true);
    let f = manager.assume(&mut factory, &constraints, &SVal::Unknown, false);
    assert_eq!(t.as_ref(), Some(&constraints));
    assert_eq!(f.as_ref(), Some(&constraints));
}

#[test]
fn symbol_truth_records_equality_and_disequality() {
    let (_fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let cond = SVal::NonLoc(NonLoc::Symbol(sym));

    let non_zero = manager
        .assume(&mut factory, &constraints, &cond, true)
        .expect("feasible");
    assert_eq!(manager.is_not_equal(&factory, &non_zero, sym, 0), Some(true));

    let zero = manager
        .assume(&mut factory, &constraints, &cond, false)
        .expect("feasible");
    assert_eq!(manager.is_equal(&factory, &zero, sym, 0), Some(true));

    // The two assumptions contradict.
    assert!(manager.assume(&mut factory, &non_zero, &cond, false).is_none());
    assert!(manager.assume(&mut factory, &zero, &cond, true).is_none());
}

#[test]
fn assume_is_idempotent() {
    let (_fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let cond = SVal::NonLoc(NonLoc::Symbol(sym));
    let once = manager
        .assume(&mut factory, &constraints, &cond, true)
        .expect("feasible");
    let twice = manager
        .assume(&mut factory, &once, &cond, true)
        .expect("still feasible");
    assert_eq!(once, twice);
}

#[test]
fn constraint_values_update_the_fact_sets() {
    let (fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let five = factory.int_literal(5, fb.int_ty, &fb.ast);
    let sym_val = SVal::NonLoc(NonLoc::Symbol(sym));
    let eq_five = factory.eval_binary(&fb.ast, BinOp::Eq, &sym_val, &five, fb.int_ty);

    let equal = manager
        .assume(&mut factory, &constraints, &eq_five, true)
        .expect("feasible");
    assert_eq!(manager.is_equal(&factory, &equal, sym, 5), Some(true));
    assert_eq!(manager.is_equal(&factory, &equal, sym, 6), Some(false));

    let not_equal = manager
        .assume(&mut factory, &constraints, &eq_five, false)
        .expect("feasible");
    assert_eq!(manager.is_equal(&factory, &not_equal, sym, 5), Some(false));
    // Other values stay open.
    assert_eq!(manager.is_equal(&factory, &not_equal, sym, 6), None);
}

#[test]
fn monotone_tightening_and_range_contradiction() {
    let (fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let sym_val = SVal::NonLoc(NonLoc::Symbol(sym));
    let ten = factory.int_literal(10, fb.int_ty, &fb.ast);
    let twenty = factory.int_literal(20, fb.int_ty, &fb.ast);
    let lt_ten = factory.eval_binary(&fb.ast, BinOp::Lt, &sym_val, &ten, fb.int_ty);
    let gt_twenty = factory.eval_binary(&fb.ast, BinOp::Gt, &sym_val, &twenty, fb.int_ty);

    let bounded = manager
        .assume(&mut factory, &constraints, &lt_ten, true)
        .expect("feasible");
    // Everything recorded before still holds afterwards.
    assert_eq!(manager.is_equal(&factory, &bounded, sym, 15), Some(false));
    assert!(manager.assume(&mut factory, &bounded, &gt_twenty, true).is_none());
}

#[test]
fn pinching_a_range_yields_an_equality() {
    let (fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let sym_val = SVal::NonLoc(NonLoc::Symbol(sym));
    let five = factory.int_literal(5, fb.int_ty, &fb.ast);
    let ge = factory.eval_binary(&fb.ast, BinOp::Ge, &sym_val, &five, fb.int_ty);
    let le = factory.eval_binary(&fb.ast, BinOp::Le, &sym_val, &five, fb.int_ty);
    let pinched = manager
        .assume(&mut factory, &constraints, &ge, true)
        .and_then(|c| manager.assume(&mut factory, &c, &le, true))
        .expect("feasible");
    assert_eq!(manager.is_equal(&factory, &pinched, sym, 5), Some(true));
}

#[test]
fn sweep_drops_facts_about_dead_symbols() {
    let (_fb, mut factory, sym) = setup();
    let manager = ConstraintManager;
    let constraints = Constraints::new();
    let cond = SVal::NonLoc(NonLoc::Symbol(sym));
    let with_fact = manager
        .assume(&mut factory, &constraints, &cond, true)
        .expect("feasible");
    assert_eq!(with_fact.size(), 1);

    let dead = SymbolReaper::new();
    let swept = manager.sweep(&factory, &with_fact, &dead);
    assert_eq!(swept.size(), 0);

    let mut live = SymbolReaper::new();
    live.mark_symbol(sym);
    let kept = manager.sweep(&factory, &with_fact, &live);
    assert_eq!(kept, with_fact);
}
