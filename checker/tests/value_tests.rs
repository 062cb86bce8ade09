// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Tests for the interned value domain: integer interning and arithmetic,
// the polymorphic binary operation over abstract values, truth projection,
// casts, and the region hierarchy.

mod common;

use common::FunctionBuilder;
use corax::ast::{BinOp, StorageClass, TypeKind};
use corax::basic_values::{BasicValueFactory, IntValue};
use corax::regions::{MemSpace, RegionData};
use corax::sval::{ConditionTruth, Loc, NonLoc, SVal};
use corax::symbols::SymbolData;
use corax::value_factory::ValueFactory;

#[test]
fn integer_interning_is_structural() {
    let mut bv = BasicValueFactory::new();
    let a = bv.intern_int(5, 32, true);
    let b = bv.intern_int(5, 32, true);
    let c = bv.intern_int(5, 64, true);
    let d = bv.intern_int(5, 32, false);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
    assert_eq!(bv.int(a).as_i128(), 5);
}

#[test]
fn integer_representation_wraps_to_width() {
    let v = IntValue::from_i128(300, 8, false);
    assert_eq!(v.as_unsigned(), 44);
    let v = IntValue::from_i128(-1, 8, true);
    assert_eq!(v.as_i128(), -1);
    assert_eq!(v.as_unsigned(), 255);
    let widened = v.convert(32, true);
    assert_eq!(widened.as_i128(), -1);
    let unsigned = v.convert(32, false);
    // Sign extension happens before reinterpretation.
    assert_eq!(unsigned.as_unsigned(), 0xffff_ffff);
}

#[test]
fn concrete_arithmetic() {
    let mut bv = BasicValueFactory::new();
    let two = bv.intern_int(2, 32, true);
    let three = bv.intern_int(3, 32, true);
    let five = bv.evaluate(BinOp::Add, two, three).expect("representable");
    assert_eq!(bv.int(five).as_i128(), 5);
    let rem = bv.evaluate(BinOp::Rem, three, two).expect("representable");
    assert_eq!(bv.int(rem).as_i128(), 1);
}

#[test]
fn division_by_zero_is_not_representable() {
    let mut bv = BasicValueFactory::new();
    let ten = bv.intern_int(10, 32, true);
    let zero = bv.intern_int(0, 32, true);
    assert!(bv.evaluate(BinOp::Div, ten, zero).is_none());
    assert!(bv.evaluate(BinOp::Rem, ten, zero).is_none());
}

#[test]
fn out_of_range_shifts_are_not_representable() {
    let mut bv = BasicValueFactory::new();
    let one = bv.intern_int(1, 32, true);
    let thirty_three = bv.intern_int(33, 32, true);
    let negative = bv.intern_int(-1, 32, true);
    assert!(bv.evaluate(BinOp::Shl, one, thirty_three).is_none());
    assert!(bv.evaluate(BinOp::Shr, one, negative).is_none());
    let two = bv.intern_int(1, 32, true);
    let shifted = bv.evaluate(BinOp::Shl, two, one).expect("in range");
    assert_eq!(bv.int(shifted).as_i128(), 2);
}

#[test]
fn comparisons_produce_int_zero_or_one() {
    let mut bv = BasicValueFactory::new();
    let two = bv.intern_int(2, 32, true);
    let three = bv.intern_int(3, 32, true);
    let lt = bv.evaluate(BinOp::Lt, two, three).expect("representable");
    let int = bv.int(lt);
    assert_eq!(int.as_i128(), 1);
    assert_eq!(int.width, 32);
    assert!(int.signed);
    let gt = bv.evaluate(BinOp::Gt, two, three).expect("representable");
    assert_eq!(bv.int(gt).as_i128(), 0);
}

#[test]
fn width_mismatch_widens_with_left_signedness() {
    let mut bv = BasicValueFactory::new();
    let short = bv.intern_int(-1, 16, true);
    let wide = bv.intern_int(1, 32, true);
    let sum = bv.evaluate(BinOp::Add, short, wide).expect("representable");
    let int = bv.int(sum);
    assert_eq!(int.width, 32);
    assert!(int.signed);
    assert_eq!(int.as_i128(), 0);
}

#[test]
fn undefined_dominates_binary_evaluation() {
    let fb = FunctionBuilder::new();
    let mut factory = ValueFactory::new();
    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    for op in [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Eq,
        BinOp::Lt,
        BinOp::BitAnd,
    ] {
        let left = factory.eval_binary(&fb.ast, op, &SVal::Undefined, &one, fb.int_ty);
        assert!(left.is_undefined(), "{op:?} with undefined lhs");
        let right = factory.eval_binary(&fb.ast, op, &one, &SVal::Undefined, fb.int_ty);
        assert!(right.is_undefined(), "{op:?} with undefined rhs");
    }
}

#[test]
fn unknown_is_absorbing_when_no_operand_is_undefined() {
    let fb = FunctionBuilder::new();
    let mut factory = ValueFactory::new();
    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    let result = factory.eval_binary(&fb.ast, BinOp::Add, &SVal::Unknown, &one, fb.int_ty);
    assert!(result.is_unknown());
}

#[test]
fn symbol_compared_with_constant_becomes_a_constraint_value() {
    let mut fb = FunctionBuilder::new();
    let x = fb.param("x", fb.int_ty);
    let mut factory = ValueFactory::new();
    let sym = factory.symbols.param(x);
    let sym_val = SVal::NonLoc(NonLoc::Symbol(sym));
    let five = factory.int_literal(5, fb.int_ty, &fb.ast);
    let cmp = factory.eval_binary(&fb.ast, BinOp::Ne, &sym_val, &five, fb.int_ty);
    match cmp {
        SVal::NonLoc(NonLoc::SymIntConstraint(c)) => {
            let data = factory.basic_values.constraint(c);
            assert_eq!(data.sym, sym);
            assert_eq!(data.op, BinOp::Ne);
        }
        other => panic!("expected a constraint value, got {other:?}"),
    }
    // The swapped form produces the mirrored comparison.
    let cmp = factory.eval_binary(&fb.ast, BinOp::Lt, &five, &sym_val, fb.int_ty);
    match cmp {
        SVal::NonLoc(NonLoc::SymIntConstraint(c)) => {
            assert_eq!(factory.basic_values.constraint(c).op, BinOp::Gt);
        }
        other => panic!("expected a constraint value, got {other:?}"),
    }
}

#[test]
fn additive_symbol_arithmetic_stays_symbolic_and_the_rest_does_not() {
    let mut fb = FunctionBuilder::new();
    let x = fb.param("x", fb.int_ty);
    let mut factory = ValueFactory::new();
    let sym = factory.symbols.param(x);
    let sym_val = SVal::NonLoc(NonLoc::Symbol(sym));
    let five = factory.int_literal(5, fb.int_ty, &fb.ast);
    let sum = factory.eval_binary(&fb.ast, BinOp::Add, &sym_val, &five, fb.int_ty);
    match sum {
        SVal::NonLoc(NonLoc::Symbol(s)) => {
            assert!(matches!(
                factory.symbols.data(s),
                SymbolData::IntExpr { op: BinOp::Add, .. }
            ));
        }
        other => panic!("expected a derived symbol, got {other:?}"),
    }
    let product = factory.eval_binary(&fb.ast, BinOp::Mul, &sym_val, &five, fb.int_ty);
    assert!(product.is_unknown());
}

#[test]
fn symbol_op_symbol_produces_a_sym_sym_expression() {
    let mut fb = FunctionBuilder::new();
    let x = fb.param("x", fb.int_ty);
    let y = fb.param("y", fb.int_ty);
    let mut factory = ValueFactory::new();
    let sx = factory.symbols.param(x);
    let sy = factory.symbols.param(y);
    let result = factory.eval_binary(
        &fb.ast,
        BinOp::Add,
        &SVal::NonLoc(NonLoc::Symbol(sx)),
        &SVal::NonLoc(NonLoc::Symbol(sy)),
        fb.int_ty,
    );
    match result {
        SVal::NonLoc(NonLoc::Symbol(s)) => {
            assert!(matches!(
                factory.symbols.data(s),
                SymbolData::SymExpr { .. }
            ));
        }
        other => panic!("expected a derived symbol, got {other:?}"),
    }
}

#[test]
fn pointer_identity_against_regions_and_null() {
    let mut fb = FunctionBuilder::new();
    let a = fb.local("a", fb.int_ty);
    let b = fb.local("b", fb.int_ty);
    let mut factory = ValueFactory::new();
    let ra = factory.regions.var_region(a, &fb.ast);
    let rb = factory.regions.var_region(b, &fb.ast);
    let va = SVal::loc_region(ra);
    let vb = SVal::loc_region(rb);
    let same = factory.eval_binary(&fb.ast, BinOp::Eq, &va, &va.clone(), fb.int_ty);
    assert_eq!(unwrap_concrete(&factory, &same), 1);
    let distinct = factory.eval_binary(&fb.ast, BinOp::Eq, &va, &vb, fb.int_ty);
    assert_eq!(unwrap_concrete(&factory, &distinct), 0);
    let null = factory.null_pointer();
    let vs_null = factory.eval_binary(&fb.ast, BinOp::Ne, &va, &null, fb.int_ty);
    assert_eq!(unwrap_concrete(&factory, &vs_null), 1);
    // Anything beyond identity is unknown for pointers.
    let ordered = factory.eval_binary(&fb.ast, BinOp::Lt, &va, &vb, fb.int_ty);
    assert!(ordered.is_unknown());
}

fn unwrap_concrete(factory: &ValueFactory, val: &SVal) -> i128 {
    match val {
        SVal::NonLoc(NonLoc::ConcreteInt(i)) => factory.basic_values.int(*i).as_i128(),
        other => panic!("expected a concrete integer, got {other:?}"),
    }
}

#[test]
fn truth_projection() {
    let mut fb = FunctionBuilder::new();
    let v = fb.local("v", fb.int_ty);
    let mut factory = ValueFactory::new();
    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    let zero = factory.int_literal(0, fb.int_ty, &fb.ast);
    let region = factory.regions.var_region(v, &fb.ast);
    assert_eq!(factory.condition_truth(&one), ConditionTruth::True);
    assert_eq!(factory.condition_truth(&zero), ConditionTruth::False);
    assert_eq!(
        factory.condition_truth(&SVal::loc_region(region)),
        ConditionTruth::True
    );
    assert_eq!(
        factory.condition_truth(&SVal::Unknown),
        ConditionTruth::Unknown
    );
    assert_eq!(
        factory.condition_truth(&SVal::Undefined),
        ConditionTruth::Undefined
    );
}

#[test]
fn casts_between_integers_and_pointers() {
    let mut fb = FunctionBuilder::new();
    let mut factory = ValueFactory::new();
    let char_val = factory.int_literal(300, fb.int_ty, &fb.ast);
    let narrowed = factory.eval_cast(&fb.ast, &char_val, fb.int_ty, fb.char_ty);
    assert_eq!(unwrap_concrete(&factory, &narrowed), 44);
    let zero = factory.int_literal(0, fb.int_ty, &fb.ast);
    let as_ptr = factory.eval_cast(&fb.ast, &zero, fb.int_ty, fb.int_ptr_ty);
    assert!(matches!(as_ptr, SVal::Loc(Loc::ConcreteInt(..))));
    assert!(as_ptr.is_zero_constant(&factory.basic_values));
    let v = fb.local("v", fb.int_ty);
    let region = factory.regions.var_region(v, &fb.ast);
    let addr = SVal::loc_region(region);
    let as_int = factory.eval_cast(&fb.ast, &addr, fb.int_ptr_ty, fb.int_ty);
    assert!(matches!(
        as_int,
        SVal::NonLoc(NonLoc::LocAsInteger { bits: 32, .. })
    ));
}

#[test]
fn array_values_decay_to_their_first_element() {
    let mut fb = FunctionBuilder::new();
    let arr_ty = fb.ast.add_type(TypeKind::Array {
        element: fb.int_ty,
        length: Some(4),
    });
    let a = fb.ast.add_var("a", arr_ty, StorageClass::Local);
    let mut factory = ValueFactory::new();
    let region = factory.regions.var_region(a, &fb.ast);
    let decayed = factory.eval_cast(&fb.ast, &SVal::loc_region(region), arr_ty, fb.int_ptr_ty);
    let elem = decayed.as_region().expect("an element region");
    match factory.regions.data(elem) {
        RegionData::Element { parent, .. } => assert_eq!(*parent, region),
        other => panic!("expected an element region, got {other:?}"),
    }
}

#[test]
fn region_interning_and_hierarchy() {
    let mut fb = FunctionBuilder::new();
    let v = fb.local("v", fb.int_ty);
    let f = fb.ast.add_field("f", fb.int_ty);
    let mut factory = ValueFactory::new();
    let r1 = factory.regions.var_region(v, &fb.ast);
    let r2 = factory.regions.var_region(v, &fb.ast);
    assert_eq!(r1, r2);
    let field = factory.regions.field_region(f, r1);
    let field_again = factory.regions.field_region(f, r1);
    assert_eq!(field, field_again);
    assert!(factory.regions.is_sub_region_of(field, r1));
    assert!(!factory.regions.is_sub_region_of(r1, field));
    assert_eq!(factory.regions.memory_space(field), MemSpace::Stack);
    assert_eq!(factory.regions.base_region(field), r1);
}

#[test]
fn pointer_casts_restructure_regions() {
    let mut fb = FunctionBuilder::new();
    let record_ty = fb.ast.add_type(TypeKind::Record {
        name: "S".to_owned(),
        fields: vec![],
    });
    let void_ptr = fb.ast.pointer_type(fb.void_ty);
    let record_ptr = fb.ast.pointer_type(record_ty);
    let v = fb.ast.add_var("v", fb.int_ty, StorageClass::Local);
    let mut factory = ValueFactory::new();
    let base = factory.regions.var_region(v, &fb.ast);
    let addr = SVal::loc_region(base);
    // int* -> struct S*: unrelated, wraps in a typed view.
    let viewed = factory.eval_cast(&fb.ast, &addr, fb.int_ptr_ty, record_ptr);
    let viewed_region = viewed.as_region().expect("a region");
    assert!(matches!(
        factory.regions.data(viewed_region),
        RegionData::TypedView { .. }
    ));
    // struct S* -> void*: strips the view again.
    let stripped = factory.eval_cast(&fb.ast, &viewed, record_ptr, void_ptr);
    assert_eq!(stripped.as_region(), Some(base));
    // void* -> char*: pointer-to-integer attaches a zero element.
    let char_ptr = fb.char_ptr_ty;
    let as_char = factory.eval_cast(&fb.ast, &stripped, void_ptr, char_ptr);
    let char_region = as_char.as_region().expect("a region");
    assert!(matches!(
        factory.regions.data(char_region),
        RegionData::Element { .. }
    ));
}

#[test]
fn symbol_interning_is_structural() {
    let mut fb = FunctionBuilder::new();
    let x = fb.param("x", fb.int_ty);
    let mut factory = ValueFactory::new();
    let a = factory.symbols.param(x);
    let b = factory.symbols.param(x);
    assert_eq!(a, b);
    let c1 = factory.symbols.conjure(corax::ast::StmtId(7), fb.int_ty, 1, 0);
    let c2 = factory.symbols.conjure(corax::ast::StmtId(7), fb.int_ty, 1, 0);
    let c3 = factory.symbols.conjure(corax::ast::StmtId(7), fb.int_ty, 2, 0);
    assert_eq!(c1, c2);
    assert_ne!(c1, c3);
}
