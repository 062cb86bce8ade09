// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Tests for the two store implementations: initial stores, bind/lookup,
// aggregate initialization, string literal access and the mark and sweep.

mod common;

use common::FunctionBuilder;
use corax::ast::{StmtId, StorageClass, TypeKind};
use corax::liveness::{AllLive, LiveQuery, LivenessOracle};
use corax::program_state::{remove_dead, ProgramState};
use corax::store::{BindOutcome, FlatStoreManager, RegionStoreManager, StoreManager};
use corax::sval::{NonLoc, SVal};
use corax::value_factory::ValueFactory;
use std::rc::Rc;

#[test]
fn initial_store_binds_params_locals_and_statics() {
    let mut fb = FunctionBuilder::new();
    let p = fb.param("p", fb.int_ty);
    let l = fb.local("l", fb.int_ty);
    let s = fb.ast.add_var("s", fb.int_ty, StorageClass::StaticLocal);
    let g = fb.ast.add_var("g", fb.int_ptr_ty, StorageClass::Global);
    let mut factory = ValueFactory::new();
    let manager = FlatStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);

    let rp = factory.regions.var_region(p, &fb.ast);
    let rl = factory.regions.var_region(l, &fb.ast);
    let rs = factory.regions.var_region(s, &fb.ast);
    let rg = factory.regions.var_region(g, &fb.ast);
    assert!(matches!(
        store.binding(rp),
        Some(SVal::NonLoc(NonLoc::Symbol(..)))
    ));
    assert_eq!(store.binding(rl), Some(&SVal::Undefined));
    // Static locals with no initializer are zero.
    assert!(store
        .binding(rs)
        .expect("static bound")
        .is_zero_constant(&factory.basic_values));
    // Pointer typed globals bind location symbols.
    assert!(matches!(store.binding(rg), Some(SVal::Loc(..))));
}

#[test]
fn flat_bind_then_lookup_round_trips() {
    let mut fb = FunctionBuilder::new();
    let v = fb.local("v", fb.int_ty);
    let mut factory = ValueFactory::new();
    let manager = FlatStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let region = factory.regions.var_region(v, &fb.ast);
    let loc = SVal::loc_region(region);

    let looked_up = manager.lookup(&mut factory, &fb.ast, &store, &loc, Some(fb.int_ty));
    let rebound = match manager.bind(&mut factory, &fb.ast, &store, &loc, looked_up) {
        BindOutcome::Bound(s) => s,
        other => panic!("expected a bound store, got {other:?}"),
    };
    // Rebinding what was read leaves the store equivalent for that location.
    assert_eq!(rebound, store);
}

#[test]
fn binding_through_an_undefined_location_is_flagged() {
    let fb = FunctionBuilder::new();
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    assert!(matches!(
        manager.bind(&mut factory, &fb.ast, &store, &SVal::Undefined, one),
        BindOutcome::UndefinedTarget
    ));
}

#[test]
fn reading_through_a_literal_address_is_undefined() {
    let fb = FunctionBuilder::new();
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let addr = factory.null_pointer();
    let read = manager.lookup(&mut factory, &fb.ast, &store, &addr, Some(fb.int_ty));
    assert!(read.is_undefined());
}

#[test]
fn region_store_tracks_fields() {
    let mut fb = FunctionBuilder::new();
    let f = fb.ast.add_field("f", fb.int_ty);
    let record_ty = fb.ast.add_type(TypeKind::Record {
        name: "S".to_owned(),
        fields: vec![f],
    });
    let v = fb.ast.add_var("v", record_ty, StorageClass::Local);
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);

    let base = factory.regions.var_region(v, &fb.ast);
    let field = factory.regions.field_region(f, base);
    let floc = SVal::loc_region(field);
    // Uninitialized local aggregate: fields read as undefined.
    let unset = manager.lookup(&mut factory, &fb.ast, &store, &floc, Some(fb.int_ty));
    assert!(unset.is_undefined());

    let seven = factory.int_literal(7, fb.int_ty, &fb.ast);
    let bound = match manager.bind(&mut factory, &fb.ast, &store, &floc, seven.clone()) {
        BindOutcome::Bound(s) => s,
        other => panic!("expected a bound store, got {other:?}"),
    };
    let read = manager.lookup(&mut factory, &fb.ast, &bound, &floc, Some(fb.int_ty));
    assert_eq!(read, seven);
}

#[test]
fn constant_sized_array_initialization_is_element_wise() {
    let mut fb = FunctionBuilder::new();
    let arr_ty = fb.ast.add_type(TypeKind::Array {
        element: fb.int_ty,
        length: Some(4),
    });
    let v = fb.ast.add_var("v", arr_ty, StorageClass::Local);
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let base = factory.regions.var_region(v, &fb.ast);

    let one = factory.int_literal(1, fb.int_ty, &fb.ast);
    let two = factory.int_literal(2, fb.int_ty, &fb.ast);
    let init = SVal::NonLoc(NonLoc::Compound {
        ty: arr_ty,
        vals: Rc::new(vec![one.clone(), two.clone()]),
    });
    let bound = match manager.bind(
        &mut factory,
        &fb.ast,
        &store,
        &SVal::loc_region(base),
        init,
    ) {
        BindOutcome::Bound(s) => s,
        other => panic!("expected a bound store, got {other:?}"),
    };
    let index1 = SVal::nonloc_int(factory.basic_values.intern_int(1, 64, true));
    let elem1 = factory.regions.element_region(fb.int_ty, index1, base);
    let read = manager.lookup(
        &mut factory,
        &fb.ast,
        &bound,
        &SVal::loc_region(elem1),
        Some(fb.int_ty),
    );
    assert_eq!(read, two);
    // The zero filled tail comes from the default binding.
    let index3 = SVal::nonloc_int(factory.basic_values.intern_int(3, 64, true));
    let elem3 = factory.regions.element_region(fb.int_ty, index3, base);
    let tail = manager.lookup(
        &mut factory,
        &fb.ast,
        &bound,
        &SVal::loc_region(elem3),
        Some(fb.int_ty),
    );
    assert!(tail.is_zero_constant(&factory.basic_values));
}

#[test]
fn string_literal_elements_read_their_characters() {
    let mut fb = FunctionBuilder::new();
    let lit = fb.ast.add_string("hi");
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let base = factory.regions.string_region(lit);

    let read_at = |factory: &mut ValueFactory, index: i128| {
        let idx = SVal::nonloc_int(factory.basic_values.intern_int(index, 64, true));
        let elem = factory.regions.element_region(fb.char_ty, idx, base);
        manager.lookup(factory, &fb.ast, &store, &SVal::loc_region(elem), Some(fb.char_ty))
    };
    let h = read_at(&mut factory, 0);
    match h {
        SVal::NonLoc(NonLoc::ConcreteInt(i)) => {
            assert_eq!(factory.basic_values.int(i).as_i128(), i128::from(b'h'))
        }
        other => panic!("expected a character, got {other:?}"),
    }
    // The terminator reads as zero, past it is undefined.
    assert!(read_at(&mut factory, 2).is_zero_constant(&factory.basic_values));
    assert!(read_at(&mut factory, 3).is_undefined());
}

/// A liveness oracle that reports a fixed set of variables dead.
#[derive(Debug)]
struct DeadVars(Vec<corax::ast::VarId>);

impl LivenessOracle for DeadVars {
    fn is_live(&self, _point: StmtId, query: LiveQuery) -> bool {
        match query {
            LiveQuery::Var(v) => !self.0.contains(&v),
            LiveQuery::Expr(..) => true,
        }
    }
}

#[test]
fn sweep_drops_dead_bindings_and_reports_dead_symbols() {
    let mut fb = FunctionBuilder::new();
    let live_var = fb.param("live", fb.int_ty);
    let dead_var = fb.param("dead", fb.int_ty);
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);
    let state = ProgramState::default().with_store(store);

    let oracle = DeadVars(vec![dead_var]);
    let point = StmtId(0);
    let (cleaned, reaper) = remove_dead(&mut factory, &manager, &fb.ast, &oracle, &state, point);

    let live_region = factory.regions.var_region(live_var, &fb.ast);
    let dead_region = factory.regions.var_region(dead_var, &fb.ast);
    assert!(cleaned.store.binding(live_region).is_some());
    assert!(cleaned.store.binding(dead_region).is_none());
    let dead_sym = factory.symbols.param(dead_var);
    assert!(reaper.dead_symbols().contains(&dead_sym));

    // Every binding that survived is reachable from a live root, so a
    // second sweep changes nothing.
    let (cleaned_again, _) =
        remove_dead(&mut factory, &manager, &fb.ast, &oracle, &cleaned, point);
    assert_eq!(cleaned, cleaned_again);
}

#[test]
fn sweep_keeps_heap_blocks_reachable_from_live_pointers() {
    let mut fb = FunctionBuilder::new();
    let p = fb.param("p", fb.int_ptr_ty);
    let mut factory = ValueFactory::new();
    let manager = RegionStoreManager;
    let store = manager.initial_store(&mut factory, &fb.ast);

    // Point p at a heap block holding 7.
    let heap_sym = factory.symbols.conjure(StmtId(9), fb.int_ptr_ty, 1, 0);
    let heap = factory
        .regions
        .symbolic_region(heap_sym, corax::regions::MemSpace::Heap);
    let rp = factory.regions.var_region(p, &fb.ast);
    let seven = factory.int_literal(7, fb.int_ty, &fb.ast);
    let store = store
        .with_binding(rp, SVal::loc_region(heap))
        .with_binding(heap, seven.clone());
    let state = ProgramState::default().with_store(store);

    let (kept, _) = remove_dead(&mut factory, &manager, &fb.ast, &AllLive, &state, StmtId(0));
    assert_eq!(kept.store.binding(heap), Some(&seven));

    // With p dead the heap block is unreachable and both bindings go.
    let oracle = DeadVars(vec![p]);
    let (dropped, reaper) =
        remove_dead(&mut factory, &manager, &fb.ast, &oracle, &state, StmtId(0));
    assert!(dropped.store.binding(rp).is_none());
    assert!(dropped.store.binding(heap).is_none());
    assert!(reaper.dead_symbols().contains(&heap_sym));
}
