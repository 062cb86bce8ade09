// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, BinOp, TypeId, TypeKind};
use crate::basic_values::{BasicValueFactory, IntId};
use crate::regions::{MemSpace, RegionData, RegionFactory, RegionId};
use crate::sval::{ConditionTruth, Loc, NonLoc, SVal};
use crate::symbols::{SymbolData, SymbolId, SymbolManager};
use log_derive::logfn_inputs;
use std::fmt::{Debug, Formatter, Result};

/// The width used for pointers observed at integer type.
pub const POINTER_WIDTH: u32 = 64;

/// Owns the three interning tables of the value domain and implements the
/// polymorphic operations over abstract values. One factory belongs to one
/// engine; dropping the engine drops every interned object wholesale.
#[derive(Default)]
pub struct ValueFactory {
    pub basic_values: BasicValueFactory,
    pub symbols: SymbolManager,
    pub regions: RegionFactory,
}

impl Debug for ValueFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "ValueFactory".fmt(f)
    }
}

impl ValueFactory {
    pub fn new() -> ValueFactory {
        ValueFactory::default()
    }

    /// An integer literal value of the given type.
    pub fn int_literal(&mut self, value: i128, ty: TypeId, ast: &AstContext) -> SVal {
        let (width, signed) = ast.integer_width(ty).unwrap_or((32, true));
        SVal::nonloc_int(self.basic_values.intern_int(value, width, signed))
    }

    /// The null pointer.
    pub fn null_pointer(&mut self) -> SVal {
        SVal::Loc(Loc::ConcreteInt(
            self.basic_values.intern_int(0, POINTER_WIDTH, false),
        ))
    }

    /// The zero of a type, per the C rule for static initialization.
    pub fn zero_value(&mut self, ty: TypeId, ast: &AstContext) -> SVal {
        if ast.is_pointer(ty) {
            self.null_pointer()
        } else if ast.is_integer(ty) {
            self.int_literal(0, ty, ast)
        } else {
            SVal::Unknown
        }
    }

    /// Wraps a symbol as an SVal of the given type: pointer typed symbols
    /// are locations, everything else is a non-location.
    pub fn symbol_value(&mut self, sym: SymbolId, ty: TypeId, ast: &AstContext) -> SVal {
        if ast.is_pointer(ty) {
            SVal::Loc(Loc::Symbol(sym))
        } else {
            SVal::NonLoc(NonLoc::Symbol(sym))
        }
    }

    /// The declared or derived type of a symbol, when one is known.
    pub fn symbol_type(&self, sym: SymbolId, ast: &AstContext) -> Option<TypeId> {
        match *self.symbols.data(sym) {
            SymbolData::Param { var } | SymbolData::Global { var } => Some(ast.var(var).ty),
            SymbolData::Conjured { ty, .. }
            | SymbolData::IntExpr { ty, .. }
            | SymbolData::SymExpr { ty, .. } => Some(ty),
            SymbolData::RegionValue { region } => self.region_value_type(region, ast),
        }
    }

    /// The type of the value a region holds, resolving symbolic anchors
    /// through the pointee type of their symbol.
    pub fn region_value_type(&self, region: RegionId, ast: &AstContext) -> Option<TypeId> {
        if let Some(ty) = self.regions.value_type(region, ast) {
            return Some(ty);
        }
        match self.regions.data(region) {
            RegionData::Symbolic { sym, .. } => self
                .symbol_type(*sym, ast)
                .and_then(|t| ast.pointee_type(t)),
            _ => None,
        }
    }

    /// The symbol standing behind a location, if the location is symbolic:
    /// either directly, or as the address of a symbolic region.
    pub fn loc_symbol(&self, loc: &Loc) -> Option<SymbolId> {
        match loc {
            Loc::Symbol(s) => Some(*s),
            Loc::MemRegion(r) => self.regions.region_symbol(*r),
            _ => None,
        }
    }

    /// Truth projection driving branch feasibility.
    pub fn condition_truth(&self, val: &SVal) -> ConditionTruth {
        match val {
            SVal::Undefined => ConditionTruth::Undefined,
            SVal::Unknown => ConditionTruth::Unknown,
            SVal::Loc(Loc::ConcreteInt(i)) | SVal::NonLoc(NonLoc::ConcreteInt(i)) => {
                if self.basic_values.int(*i).is_zero() {
                    ConditionTruth::False
                } else {
                    ConditionTruth::True
                }
            }
            // A region, function or label address is never null.
            SVal::Loc(Loc::MemRegion(..)) | SVal::Loc(Loc::Func(..)) | SVal::Loc(Loc::GotoLabel(..)) => {
                ConditionTruth::True
            }
            _ => ConditionTruth::Unknown,
        }
    }

    /// Polymorphic binary operation over abstract values. `result_ty` is the
    /// type of the produced value; comparisons produce `int`.
    #[logfn_inputs(TRACE)]
    pub fn eval_binary(
        &mut self,
        ast: &AstContext,
        op: BinOp,
        lhs: &SVal,
        rhs: &SVal,
        result_ty: TypeId,
    ) -> SVal {
        // Short circuit operators are evaluated by the CFG, never here.
        if matches!(op, BinOp::LogicalAnd | BinOp::LogicalOr) {
            return SVal::Unknown;
        }
        if matches!(op, BinOp::Comma) {
            return rhs.clone();
        }
        if lhs.is_undefined() || rhs.is_undefined() {
            return SVal::Undefined;
        }
        if lhs.is_unknown() || rhs.is_unknown() {
            return SVal::Unknown;
        }
        match (lhs, rhs) {
            (SVal::NonLoc(a), SVal::NonLoc(b)) => self.eval_nonloc(ast, op, a, b, result_ty),
            (SVal::Loc(a), SVal::Loc(b)) => self.eval_loc_loc(op, a, b),
            (SVal::Loc(a), SVal::NonLoc(b)) => self.eval_loc_nonloc(ast, op, a, b, result_ty),
            (SVal::NonLoc(a), SVal::Loc(b)) => {
                // Only symmetric forms are mirrored; pointer arithmetic with
                // the pointer on the right is normalized by commuting.
                match op {
                    BinOp::Eq | BinOp::Ne => self.eval_loc_nonloc(ast, op, b, a, result_ty),
                    BinOp::Add => self.eval_loc_nonloc(ast, op, b, a, result_ty),
                    _ => SVal::Unknown,
                }
            }
            _ => SVal::Unknown,
        }
    }

    fn eval_nonloc(
        &mut self,
        ast: &AstContext,
        op: BinOp,
        a: &NonLoc,
        b: &NonLoc,
        result_ty: TypeId,
    ) -> SVal {
        match (a, b) {
            (NonLoc::ConcreteInt(l), NonLoc::ConcreteInt(r)) => {
                match self.basic_values.evaluate(op, *l, *r) {
                    Some(result) => SVal::nonloc_int(result),
                    // Not representable: division by zero, bad shift count.
                    None => SVal::Undefined,
                }
            }
            (NonLoc::Symbol(s), NonLoc::ConcreteInt(k)) => {
                self.symbol_op_int(op, *s, *k, result_ty)
            }
            (NonLoc::ConcreteInt(k), NonLoc::Symbol(s)) => {
                if let Some(swapped) = op.swapped_comparison() {
                    let c = self.basic_values.intern_constraint(*s, swapped, *k);
                    SVal::NonLoc(NonLoc::SymIntConstraint(c))
                } else if op == BinOp::Add {
                    let sym = self.symbols.sym_int_expr(*s, op, *k, result_ty);
                    SVal::NonLoc(NonLoc::Symbol(sym))
                } else {
                    SVal::Unknown
                }
            }
            (NonLoc::Symbol(l), NonLoc::Symbol(r)) => {
                let sym = self.symbols.sym_sym_expr(*l, op, *r, result_ty);
                SVal::NonLoc(NonLoc::Symbol(sym))
            }
            (NonLoc::LocAsInteger { loc, .. }, NonLoc::ConcreteInt(k))
                if matches!(op, BinOp::Eq | BinOp::Ne) =>
            {
                self.eval_loc_nonloc(ast, op, &loc.clone(), &NonLoc::ConcreteInt(*k), result_ty)
            }
            _ => SVal::Unknown,
        }
    }

    fn symbol_op_int(&mut self, op: BinOp, s: SymbolId, k: IntId, result_ty: TypeId) -> SVal {
        if op.is_comparison() {
            let c = self.basic_values.intern_constraint(s, op, k);
            SVal::NonLoc(NonLoc::SymIntConstraint(c))
        } else if op.is_additive() {
            let sym = self.symbols.sym_int_expr(s, op, k, result_ty);
            SVal::NonLoc(NonLoc::Symbol(sym))
        } else {
            SVal::Unknown
        }
    }

    /// Pointer identity and pointer difference. Only EQ/NE and concrete
    /// address arithmetic have defined results.
    fn eval_loc_loc(&mut self, op: BinOp, a: &Loc, b: &Loc) -> SVal {
        match op {
            BinOp::Eq | BinOp::Ne => {
                if a == b {
                    return SVal::nonloc_int(self.basic_values.bool_int(op == BinOp::Eq));
                }
                match (a, b) {
                    (Loc::ConcreteInt(l), Loc::ConcreteInt(r)) => {
                        match self.basic_values.evaluate(op, *l, *r) {
                            Some(result) => SVal::nonloc_int(result),
                            None => SVal::Unknown,
                        }
                    }
                    (Loc::MemRegion(l), Loc::MemRegion(r)) => {
                        // Distinct non symbolic regions have distinct
                        // addresses; symbolic blocks may alias anything.
                        let l_sym = self.regions.region_symbol(*l).is_some();
                        let r_sym = self.regions.region_symbol(*r).is_some();
                        if !l_sym && !r_sym {
                            SVal::nonloc_int(self.basic_values.bool_int(op == BinOp::Ne))
                        } else {
                            SVal::Unknown
                        }
                    }
                    // A region address is never null.
                    (Loc::MemRegion(..), Loc::ConcreteInt(i))
                    | (Loc::ConcreteInt(i), Loc::MemRegion(..))
                        if self.basic_values.int(*i).is_zero() =>
                    {
                        SVal::nonloc_int(self.basic_values.bool_int(op == BinOp::Ne))
                    }
                    _ => SVal::Unknown,
                }
            }
            BinOp::Sub => match (a, b) {
                (Loc::ConcreteInt(l), Loc::ConcreteInt(r)) => {
                    match self.basic_values.evaluate(op, *l, *r) {
                        Some(result) => SVal::nonloc_int(result),
                        None => SVal::Unknown,
                    }
                }
                _ => SVal::Unknown,
            },
            _ => SVal::Unknown,
        }
    }

    /// Pointer compared with or offset by an integer.
    fn eval_loc_nonloc(
        &mut self,
        ast: &AstContext,
        op: BinOp,
        a: &Loc,
        b: &NonLoc,
        result_ty: TypeId,
    ) -> SVal {
        match b {
            NonLoc::ConcreteInt(k) => {
                if op.is_comparison() {
                    return self.compare_loc_int(op, a, *k);
                }
                if op.is_additive() {
                    return self.offset_loc(ast, op, a, &NonLoc::ConcreteInt(*k), result_ty);
                }
                SVal::Unknown
            }
            NonLoc::Symbol(s) => {
                if matches!(op, BinOp::Eq | BinOp::Ne) {
                    if let Some(l) = self.loc_symbol(a) {
                        let sym = self.symbols.sym_sym_expr(l, op, *s, result_ty);
                        return SVal::NonLoc(NonLoc::Symbol(sym));
                    }
                    return SVal::Unknown;
                }
                if op == BinOp::Add {
                    return self.offset_loc(ast, op, a, &NonLoc::Symbol(*s), result_ty);
                }
                SVal::Unknown
            }
            _ => SVal::Unknown,
        }
    }

    fn compare_loc_int(&mut self, op: BinOp, a: &Loc, k: IntId) -> SVal {
        match a {
            Loc::ConcreteInt(l) => match self.basic_values.evaluate(op, *l, k) {
                Some(result) => SVal::nonloc_int(result),
                None => SVal::Unknown,
            },
            Loc::Symbol(s) => {
                let c = self.basic_values.intern_constraint(*s, op, k);
                SVal::NonLoc(NonLoc::SymIntConstraint(c))
            }
            Loc::MemRegion(r) => {
                if self.basic_values.int(k).is_zero() {
                    if let Some(s) = self.regions.region_symbol(*r) {
                        let c = self.basic_values.intern_constraint(s, op, k);
                        SVal::NonLoc(NonLoc::SymIntConstraint(c))
                    } else if matches!(op, BinOp::Eq | BinOp::Ne) {
                        // The address of a variable or literal is not null.
                        SVal::nonloc_int(self.basic_values.bool_int(op == BinOp::Ne))
                    } else {
                        SVal::Unknown
                    }
                } else {
                    SVal::Unknown
                }
            }
            _ => SVal::Unknown,
        }
    }

    /// Additive pointer arithmetic: adjust an element index where one is
    /// already present, otherwise wrap the base in a fresh element region.
    fn offset_loc(
        &mut self,
        ast: &AstContext,
        op: BinOp,
        a: &Loc,
        offset: &NonLoc,
        result_ty: TypeId,
    ) -> SVal {
        let region = match a {
            Loc::MemRegion(r) => *r,
            _ => return SVal::Unknown,
        };
        let elem_ty = ast
            .pointee_type(result_ty)
            .or_else(|| self.regions.value_type(region, ast));
        let elem_ty = match elem_ty {
            Some(t) => t,
            None => return SVal::Unknown,
        };
        if let RegionData::Element {
            element_ty,
            index: SVal::NonLoc(NonLoc::ConcreteInt(i)),
            parent,
        } = self.regions.data(region).clone()
        {
            if let NonLoc::ConcreteInt(k) = offset {
                if let Some(adjusted) = self.basic_values.evaluate(op, i, *k) {
                    let index = SVal::nonloc_int(adjusted);
                    let r = self.regions.element_region(element_ty, index, parent);
                    return SVal::loc_region(r);
                }
                return SVal::Unknown;
            }
        }
        let index = match (op, offset) {
            (BinOp::Add, off) => SVal::NonLoc(off.clone()),
            (BinOp::Sub, NonLoc::ConcreteInt(k)) => {
                let zero = self.basic_values.intern_int(0, POINTER_WIDTH, true);
                match self.basic_values.evaluate(BinOp::Sub, zero, *k) {
                    Some(negated) => SVal::nonloc_int(negated),
                    None => return SVal::Unknown,
                }
            }
            _ => return SVal::Unknown,
        };
        let r = self.regions.element_region(elem_ty, index, region);
        SVal::loc_region(r)
    }

    /// Cast evaluation: identity casts pass through, integer casts convert
    /// representation, array values decay to their first element, pointer
    /// casts restructure the region per `cast_region`, and pointers observed
    /// at integer type become `LocAsInteger`.
    #[logfn_inputs(TRACE)]
    pub fn eval_cast(
        &mut self,
        ast: &AstContext,
        val: &SVal,
        source_ty: TypeId,
        target_ty: TypeId,
    ) -> SVal {
        if source_ty == target_ty {
            return val.clone();
        }
        if val.is_unknown() || val.is_undefined() {
            return val.clone();
        }
        // Array to pointer decay.
        if ast.is_array(source_ty) && ast.is_pointer(target_ty) {
            if let SVal::Loc(Loc::MemRegion(r)) = val {
                if let Some(elem_ty) = ast.element_type(source_ty) {
                    let zero = self.basic_values.intern_int(0, POINTER_WIDTH, false);
                    let elem =
                        self.regions
                            .element_region(elem_ty, SVal::nonloc_int(zero), *r);
                    return SVal::loc_region(elem);
                }
            }
            return val.clone();
        }
        if let Some((width, signed)) = ast.integer_width(target_ty) {
            return match val {
                SVal::NonLoc(NonLoc::ConcreteInt(i)) => {
                    let converted = self.basic_values.int(*i).convert(width, signed);
                    SVal::nonloc_int(self.basic_values.intern_value(converted))
                }
                SVal::Loc(loc) => SVal::NonLoc(NonLoc::LocAsInteger {
                    loc: *loc,
                    bits: width,
                }),
                SVal::NonLoc(NonLoc::LocAsInteger { loc, .. }) => SVal::NonLoc(
                    NonLoc::LocAsInteger {
                        loc: *loc,
                        bits: width,
                    },
                ),
                // Symbol and constraint values keep their identity across
                // integer conversions the analyzer does not model.
                other => other.clone(),
            };
        }
        if let Some(pointee) = ast.pointee_type(target_ty) {
            return match val {
                SVal::Loc(Loc::MemRegion(r)) => {
                    let cast = self
                        .regions
                        .cast_region(*r, pointee, ast, &mut self.basic_values);
                    SVal::loc_region(cast)
                }
                SVal::Loc(other) => SVal::Loc(*other),
                SVal::NonLoc(NonLoc::ConcreteInt(i)) => SVal::Loc(Loc::ConcreteInt(*i)),
                SVal::NonLoc(NonLoc::LocAsInteger { loc, .. }) => SVal::Loc(*loc),
                SVal::NonLoc(NonLoc::Symbol(s)) => SVal::Loc(Loc::Symbol(*s)),
                other => other.clone(),
            };
        }
        SVal::Unknown
    }

    /// A short human readable rendering used by the graph exports.
    pub fn describe(&self, val: &SVal, ast: &AstContext) -> String {
        match val {
            SVal::Unknown => "unknown".to_owned(),
            SVal::Undefined => "undef".to_owned(),
            SVal::Loc(loc) => self.describe_loc(loc, ast),
            SVal::NonLoc(nonloc) => match nonloc {
                NonLoc::ConcreteInt(i) => format!("{}", self.basic_values.int(*i)),
                NonLoc::Symbol(s) => format!("sym{}", s.0),
                NonLoc::SymIntConstraint(c) => {
                    let data = self.basic_values.constraint(*c);
                    format!(
                        "(sym{} {:?} {})",
                        data.sym.0,
                        data.op,
                        self.basic_values.int(data.rhs)
                    )
                }
                NonLoc::Compound { vals, .. } => {
                    let inner: Vec<String> =
                        vals.iter().map(|v| self.describe(v, ast)).collect();
                    format!("{{{}}}", inner.join(", "))
                }
                NonLoc::LocAsInteger { loc, .. } => {
                    format!("(int){}", self.describe_loc(loc, ast))
                }
            },
        }
    }

    fn describe_loc(&self, loc: &Loc, ast: &AstContext) -> String {
        match loc {
            Loc::ConcreteInt(i) => {
                if self.basic_values.int(*i).is_zero() {
                    "null".to_owned()
                } else {
                    format!("(addr){}", self.basic_values.int(*i))
                }
            }
            Loc::Symbol(s) => format!("sym{}", s.0),
            Loc::GotoLabel(l) => format!("&&{}", ast.label_name(*l)),
            Loc::Func(f) => format!("&{}", ast.func(*f).name),
            Loc::MemRegion(r) => format!("&{}", self.regions.describe(*r, ast)),
        }
    }

    /// A fresh symbolic region on the given space, wrapping a symbol.
    pub fn symbolic_region_value(&mut self, sym: SymbolId, space: MemSpace) -> SVal {
        let r = self.regions.symbolic_region(sym, space);
        SVal::loc_region(r)
    }
}
