// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, BinOp, DeclRef, StmtId, StmtKind, TypeId, UnaryOp};
use crate::cfg::BlockId;
use crate::checkers::Checker;
use crate::constraints::ConstraintManager;
use crate::core_engine::NodeBuilder;
use crate::defects::DefectKind;
use crate::errors::AnalysisError;
use crate::known_names::KnownNames;
use crate::lifetime_checker::LifetimeChecker;
use crate::options::Options;
use crate::program_state::ProgramState;
use crate::regions::MemSpace;
use crate::store::{store_manager_for, BindOutcome, StoreManager};
use crate::sval::{ConditionTruth, Loc, NonLoc, SVal};
use crate::symbols::SymbolId;
use crate::taint_checker::TaintChecker;
use crate::value_factory::ValueFactory;
use crate::worklist::BlockCounter;
use log::{debug, warn};
use log_derive::logfn_inputs;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

/// Tag for a symbol conjured as the result of a modeled call.
pub const TAG_CALL_RESULT: u32 = 0;
/// Tag for a symbol conjured as the result of an unmodelable operation.
pub const TAG_OPAQUE_RESULT: u32 = 1;
/// Tag for a symbol conjured for a fresh heap allocation.
pub const TAG_ALLOC: u32 = 2;
/// Base tag for symbols conjured to invalidate call arguments; the argument
/// index is added so each argument gets its own symbol.
pub const TAG_INVALIDATION_BASE: u32 = 100;

/// The transfer function layer: per statement, per branch, per switch
/// dispatch. It owns the store model and the registered checkers; the core
/// engine owns everything else and passes a node builder per statement.
pub struct ExprEngine {
    pub options: Options,
    store_manager: Box<dyn StoreManager>,
    checkers: Vec<Box<dyn Checker>>,
    constraint_manager: ConstraintManager,
    logged_unsupported: HashSet<&'static str>,
}

impl Debug for ExprEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        "ExprEngine".fmt(f)
    }
}

impl ExprEngine {
    pub fn new(options: &Options) -> ExprEngine {
        let mut checkers: Vec<Box<dyn Checker>> = vec![];
        if options.track_object_lifetimes {
            checkers.push(Box::new(LifetimeChecker));
        }
        if options.track_taint {
            checkers.push(Box::new(TaintChecker));
        }
        ExprEngine {
            options: options.clone(),
            store_manager: store_manager_for(options.store_model),
            checkers,
            constraint_manager: ConstraintManager,
            logged_unsupported: HashSet::new(),
        }
    }

    pub fn store_manager(&self) -> &dyn StoreManager {
        self.store_manager.as_ref()
    }

    /// The state analysis starts from.
    pub fn initial_state(&self, factory: &mut ValueFactory, ast: &AstContext) -> ProgramState {
        let store = self.store_manager.initial_store(factory, ast);
        ProgramState::default().with_store(store)
    }

    /// The block entrance hook: refuses paths that exceeded the per block
    /// revisit cap.
    pub fn process_block_entrance(&self, counter: &BlockCounter, block: BlockId) -> bool {
        counter.visit_count(block) <= self.options.block_revisit_cap
    }

    /// Conditions a state on the truth of a value: the constraint manager
    /// first, then every checker's `eval_assume`. None means the branch is
    /// infeasible.
    #[logfn_inputs(TRACE)]
    pub fn assume(
        &self,
        factory: &mut ValueFactory,
        _ast: &AstContext,
        state: &ProgramState,
        cond: &SVal,
        assumption: bool,
    ) -> Option<ProgramState> {
        let constraints =
            self.constraint_manager
                .assume(factory, &state.constraints, cond, assumption)?;
        let mut result = state.with_constraints(constraints);
        for checker in &self.checkers {
            result = checker.eval_assume(factory, result, cond, assumption)?;
        }
        Some(result)
    }

    pub fn run_pre_stmt(&self, b: &mut NodeBuilder<'_, '_>, stmt: StmtId) {
        for checker in &self.checkers {
            checker.pre_stmt(b, stmt);
        }
    }

    pub fn run_post_stmt(&self, b: &mut NodeBuilder<'_, '_>, stmt: StmtId) {
        for checker in &self.checkers {
            checker.post_stmt(b, stmt);
        }
    }

    pub fn run_dead_symbols(&self, b: &mut NodeBuilder<'_, '_>, dead: &[SymbolId]) {
        for checker in &self.checkers {
            checker.check_dead_symbols(b, dead);
        }
    }

    pub fn run_end_path(&self, b: &mut NodeBuilder<'_, '_>) {
        for checker in &self.checkers {
            checker.check_end_path(b);
        }
    }

    /// The value of an already processed sub-expression. The linearized CFG
    /// evaluates operands before their consumer, so this is an environment
    /// lookup, with a fallback for operands that are pure.
    fn operand(&self, b: &mut NodeBuilder<'_, '_>, s: StmtId) -> SVal {
        if let Some(v) = b.state.env.value_of(s) {
            return v.clone();
        }
        let ast = b.core.ast;
        match &ast.stmt(s).kind {
            StmtKind::IntLiteral { value } => {
                b.core
                    .factory
                    .int_literal(*value, ast.stmt_type(s), ast)
            }
            StmtKind::CharLiteral { value } => {
                b.core
                    .factory
                    .int_literal(*value as i128, ast.stmt_type(s), ast)
            }
            StmtKind::DeclRef {
                decl: DeclRef::Func(f),
            } => SVal::Loc(Loc::Func(*f)),
            StmtKind::DeclRef {
                decl: DeclRef::EnumConst(k),
            } => b.core.factory.int_literal(*k, ast.stmt_type(s), ast),
            StmtKind::AddrLabel { label } => SVal::Loc(Loc::GotoLabel(*label)),
            StmtKind::Paren { operand } => self.operand(b, *operand),
            _ => SVal::Unknown,
        }
    }

    /// Binds the value of an expression in the environment partition the
    /// CFG prescribes for it.
    fn bind_expr(&self, b: &mut NodeBuilder<'_, '_>, s: StmtId, val: SVal) {
        let block_level = b.core.cfg.is_block_expr(s);
        b.state = b.state.with_env(b.state.env.bind(s, val, block_level));
    }

    /// Computes the location an expression designates when used as an
    /// l-value. No memory is read.
    fn eval_lvalue(&self, b: &mut NodeBuilder<'_, '_>, s: StmtId) -> SVal {
        let ast = b.core.ast;
        match ast.stmt(s).kind.clone() {
            StmtKind::DeclRef { decl } => match decl {
                DeclRef::Var(v) => {
                    let region = b.core.factory.regions.var_region(v, ast);
                    SVal::loc_region(region)
                }
                DeclRef::Func(f) => SVal::Loc(Loc::Func(f)),
                DeclRef::EnumConst(..) => SVal::Unknown,
            },
            StmtKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.operand(b, operand),
            StmtKind::Member {
                base,
                field,
                through_pointer,
            } => {
                let base_loc = if through_pointer {
                    self.operand(b, base)
                } else {
                    self.eval_lvalue(b, base)
                };
                match base_loc {
                    SVal::Loc(Loc::MemRegion(r)) => {
                        let f = b.core.factory.regions.field_region(field, r);
                        SVal::loc_region(f)
                    }
                    SVal::Loc(Loc::Symbol(sym)) => {
                        let r = b
                            .core
                            .factory
                            .regions
                            .symbolic_region(sym, MemSpace::Unknown);
                        let f = b.core.factory.regions.field_region(field, r);
                        SVal::loc_region(f)
                    }
                    other => other,
                }
            }
            StmtKind::ArraySubscript { base, index } => {
                let mut base_val = self.operand(b, base);
                if base_val.as_region().is_none() {
                    base_val = self.eval_lvalue(b, base);
                }
                let index_val = self.operand(b, index);
                match base_val {
                    SVal::Loc(Loc::MemRegion(r)) => {
                        let elem_ty = ast.stmt_type(s);
                        let elem =
                            b.core.factory.regions.element_region(elem_ty, index_val, r);
                        SVal::loc_region(elem)
                    }
                    other => other,
                }
            }
            StmtKind::StringLiteral { literal } => {
                let r = b.core.factory.regions.string_region(literal);
                SVal::loc_region(r)
            }
            StmtKind::CompoundLiteral { .. } => {
                let r = b.core.factory.regions.compound_literal_region(s);
                SVal::loc_region(r)
            }
            StmtKind::Paren { operand } | StmtKind::Cast { operand } => {
                self.eval_lvalue(b, operand)
            }
            _ => SVal::Unknown,
        }
    }

    fn is_symbolic(&self, factory: &ValueFactory, val: &SVal) -> bool {
        match val {
            SVal::NonLoc(NonLoc::Symbol(..)) | SVal::NonLoc(NonLoc::SymIntConstraint(..)) => true,
            SVal::NonLoc(NonLoc::LocAsInteger { loc, .. }) => {
                factory.loc_symbol(loc).is_some()
            }
            SVal::Loc(loc) => factory.loc_symbol(loc).is_some(),
            _ => false,
        }
    }

    /// Null and undefined checks shared by every memory access, plus the
    /// checker location hooks. Returns None when the access sank the path;
    /// on a symbolic pointer the feasible-null side becomes a sink and the
    /// non-null side continues.
    fn check_access(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        loc: &SVal,
        is_load: bool,
    ) -> Option<()> {
        match loc {
            SVal::Undefined => {
                let defect = if is_load {
                    DefectKind::UndefDeref
                } else {
                    DefectKind::UndefStore
                };
                let state = b.state.clone();
                b.generate_sink(defect, state);
                b.mark_fatal();
                return None;
            }
            SVal::Unknown => return Some(()),
            _ => {}
        }
        if loc.is_zero_constant(&b.core.factory.basic_values) {
            let state = b.state.clone();
            b.generate_sink(DefectKind::NullDeref, state);
            b.mark_fatal();
            return None;
        }
        if self.is_symbolic(&b.core.factory, loc)
            && b.core.factory.condition_truth(loc) == ConditionTruth::Unknown
        {
            let ast = b.core.ast;
            let null_state = self.assume(&mut b.core.factory, ast, &b.state, loc, false);
            let non_null_state = self.assume(&mut b.core.factory, ast, &b.state, loc, true);
            match (null_state, non_null_state) {
                (Some(null), Some(non_null)) => {
                    // Implicit null dereference on the feasible-null side.
                    b.generate_sink(DefectKind::NullDeref, null);
                    b.state = non_null;
                }
                (Some(null), None) => {
                    b.generate_sink(DefectKind::NullDeref, null);
                    b.mark_fatal();
                    return None;
                }
                (None, Some(non_null)) => {
                    b.state = non_null;
                }
                (None, None) => {
                    b.mark_fatal();
                    return None;
                }
            }
        }
        for checker in &self.checkers {
            if !checker.check_location(b, s, loc, is_load) {
                b.mark_fatal();
                return None;
            }
        }
        Some(())
    }

    /// Reads through a location after access checking.
    fn load(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        loc: &SVal,
        ty: Option<TypeId>,
    ) -> Option<SVal> {
        self.check_access(b, s, loc, true)?;
        Some(
            self.store_manager
                .lookup(&mut b.core.factory, b.core.ast, &b.state.store, loc, ty),
        )
    }

    /// Writes through a location after access checking and the bind hooks.
    fn bind_loc(&self, b: &mut NodeBuilder<'_, '_>, s: StmtId, loc: &SVal, val: SVal) -> bool {
        if self.check_access(b, s, loc, false).is_none() {
            return false;
        }
        for checker in &self.checkers {
            if !checker.check_bind(b, s, loc, &val) {
                b.mark_fatal();
                return false;
            }
        }
        let outcome =
            self.store_manager
                .bind(&mut b.core.factory, b.core.ast, &b.state.store, loc, val);
        match outcome {
            BindOutcome::Bound(store) => {
                b.state = b.state.with_store(store);
                true
            }
            BindOutcome::UndefinedTarget => {
                let state = b.state.clone();
                b.generate_sink(DefectKind::UndefStore, state);
                b.mark_fatal();
                false
            }
            BindOutcome::Untracked => true,
        }
    }

    fn truncate_to_type(
        &self,
        factory: &mut ValueFactory,
        ast: &AstContext,
        val: &SVal,
        ty: TypeId,
    ) -> SVal {
        if let (SVal::NonLoc(NonLoc::ConcreteInt(i)), Some((width, signed))) =
            (val, ast.integer_width(ty))
        {
            let converted = factory.basic_values.int(*i).convert(width, signed);
            return SVal::nonloc_int(factory.basic_values.intern_value(converted));
        }
        val.clone()
    }

    /// Division and remainder bifurcate on a zero divisor. `implicit` marks
    /// the division hidden inside compound assignment.
    fn eval_divide(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        op: BinOp,
        lhs: &SVal,
        rhs: &SVal,
        result_ty: TypeId,
        implicit: bool,
    ) -> Option<SVal> {
        if lhs.is_undefined() || rhs.is_undefined() {
            return Some(SVal::Undefined);
        }
        let defect = if implicit {
            DefectKind::ImplicitBadDivide
        } else {
            DefectKind::ExplicitBadDivide
        };
        if rhs.is_zero_constant(&b.core.factory.basic_values) {
            let state = b.state.clone();
            b.generate_sink(defect, state);
            b.mark_fatal();
            return None;
        }
        if self.is_symbolic(&b.core.factory, rhs) {
            let ast = b.core.ast;
            if let Some(zero_state) = self.assume(&mut b.core.factory, ast, &b.state, rhs, false)
            {
                b.generate_sink(defect, zero_state);
            }
            match self.assume(&mut b.core.factory, ast, &b.state, rhs, true) {
                Some(non_zero) => b.state = non_zero,
                None => {
                    b.mark_fatal();
                    return None;
                }
            }
        }
        let ast = b.core.ast;
        let mut result = b.core.factory.eval_binary(ast, op, lhs, rhs, result_ty);
        if result.is_unknown() && self.is_symbolic(&b.core.factory, rhs) {
            // Keep the quotient symbolic so the divisor constraint stays
            // meaningful downstream.
            let count = b.visit_count_of(s);
            let sym = b
                .core
                .factory
                .symbols
                .conjure(s, result_ty, count, TAG_OPAQUE_RESULT);
            result = b.core.factory.symbol_value(sym, result_ty, ast);
        }
        Some(result)
    }

    fn log_unsupported(&mut self, kind: &'static str) {
        if self.logged_unsupported.insert(kind) {
            warn!(
                "{}",
                AnalysisError::Unsupported { kind }
            );
        }
    }

    /// The per statement transfer function. Computes the statement's value
    /// from its operands, updates the working state, and emits sinks and
    /// explicit successors where an abstract outcome forks the path.
    #[logfn_inputs(TRACE)]
    pub fn process_stmt(
        &mut self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
    ) -> Result<(), AnalysisError> {
        let ast = b.core.ast;
        let ty = ast.stmt_type(s);
        let kind = ast.stmt(s).kind.clone();
        match kind {
            StmtKind::IntLiteral { value } => {
                let v = b.core.factory.int_literal(value, ty, ast);
                self.bind_expr(b, s, v);
            }
            StmtKind::CharLiteral { value } => {
                let v = b.core.factory.int_literal(value as i128, ty, ast);
                self.bind_expr(b, s, v);
            }
            StmtKind::StringLiteral { literal } => {
                let r = b.core.factory.regions.string_region(literal);
                self.bind_expr(b, s, SVal::loc_region(r));
            }
            StmtKind::DeclRef { decl } => match decl {
                DeclRef::Var(v) => {
                    let region = b.core.factory.regions.var_region(v, ast);
                    let loc = SVal::loc_region(region);
                    let val = self.store_manager.lookup(
                        &mut b.core.factory,
                        ast,
                        &b.state.store,
                        &loc,
                        Some(ast.var(v).ty),
                    );
                    self.bind_expr(b, s, val);
                }
                DeclRef::Func(f) => {
                    self.bind_expr(b, s, SVal::Loc(Loc::Func(f)));
                }
                DeclRef::EnumConst(k) => {
                    let v = b.core.factory.int_literal(k, ty, ast);
                    self.bind_expr(b, s, v);
                }
            },
            StmtKind::Unary { op, operand } => {
                self.process_unary(b, s, op, operand, ty)?;
            }
            StmtKind::Binary { op, left, right } => {
                self.process_binary(b, s, op, left, right, ty)?;
            }
            StmtKind::Assign { target, source } => {
                let val = self.operand(b, source);
                let loc = self.eval_lvalue(b, target);
                if !self.bind_loc(b, s, &loc, val.clone()) {
                    return Ok(());
                }
                self.bind_expr(b, s, val);
            }
            StmtKind::CompoundAssign { op, target, source } => {
                let loc = self.eval_lvalue(b, target);
                let old = match self.load(b, s, &loc, Some(ty)) {
                    Some(v) => v,
                    None => return Ok(()),
                };
                let rhs = self.operand(b, source);
                let computed = if matches!(op, BinOp::Div | BinOp::Rem) {
                    match self.eval_divide(b, s, op, &old, &rhs, ty, true) {
                        Some(v) => v,
                        None => return Ok(()),
                    }
                } else {
                    b.core.factory.eval_binary(ast, op, &old, &rhs, ty)
                };
                // The computation happens in the widened type; the stored
                // value is truncated back to the target's type.
                let stored = self.truncate_to_type(&mut b.core.factory, ast, &computed, ty);
                if !self.bind_loc(b, s, &loc, stored.clone()) {
                    return Ok(());
                }
                self.bind_expr(b, s, stored);
            }
            StmtKind::Call { callee, arguments } => {
                self.process_call(b, s, callee, &arguments, ty)?;
            }
            StmtKind::Cast { operand } => {
                let val = self.operand(b, operand);
                let source_ty = ast.stmt_type(operand);
                let result = b.core.factory.eval_cast(ast, &val, source_ty, ty);
                self.bind_expr(b, s, result);
            }
            StmtKind::Member { .. } | StmtKind::ArraySubscript { .. } => {
                let loc = self.eval_lvalue(b, s);
                let val = match self.load(b, s, &loc, Some(ty)) {
                    Some(v) => v,
                    None => return Ok(()),
                };
                self.bind_expr(b, s, val);
            }
            StmtKind::Conditional {
                consequent,
                alternate,
                ..
            } => {
                // Exactly one arm was evaluated on the current path.
                let val = b
                    .state
                    .env
                    .value_of(consequent)
                    .or_else(|| b.state.env.value_of(alternate))
                    .cloned()
                    .unwrap_or(SVal::Unknown);
                self.bind_expr(b, s, val);
            }
            StmtKind::Return { value } => {
                let val = match value {
                    Some(v) => self.operand(b, v),
                    None => SVal::Unknown,
                };
                if val.is_undefined() {
                    let state = b.state.clone();
                    b.generate_sink(DefectKind::UndefResult, state);
                    b.mark_fatal();
                    return Ok(());
                }
                // The return value is a block level fact for block exit.
                b.state = b.state.with_env(b.state.env.bind(s, val, true));
            }
            StmtKind::DeclStmt { var, initializer } => {
                if let Some(init) = initializer {
                    let val = self.operand(b, init);
                    let region = b.core.factory.regions.var_region(var, ast);
                    let loc = SVal::loc_region(region);
                    if !self.bind_loc(b, s, &loc, val) {
                        return Ok(());
                    }
                }
            }
            StmtKind::StmtExpr { result } => {
                let val = result
                    .and_then(|r| b.state.env.value_of(r).cloned())
                    .unwrap_or(SVal::Unknown);
                self.bind_expr(b, s, val);
            }
            StmtKind::SizeOf { ty: queried } => {
                let val = match ast.type_size_bytes(queried) {
                    Some(size) => {
                        SVal::nonloc_int(b.core.factory.basic_values.intern_int(
                            size as i128,
                            64,
                            false,
                        ))
                    }
                    None => SVal::Unknown,
                };
                self.bind_expr(b, s, val);
            }
            StmtKind::AddrLabel { label } => {
                self.bind_expr(b, s, SVal::Loc(Loc::GotoLabel(label)));
            }
            StmtKind::InitList { elements } => {
                let vals: Vec<SVal> = elements.iter().map(|e| self.operand(b, *e)).collect();
                self.bind_expr(
                    b,
                    s,
                    SVal::NonLoc(NonLoc::Compound {
                        ty,
                        vals: Rc::new(vals),
                    }),
                );
            }
            StmtKind::CompoundLiteral { initializer } => {
                let val = self.operand(b, initializer);
                let region = b.core.factory.regions.compound_literal_region(s);
                let loc = SVal::loc_region(region);
                if !self.bind_loc(b, s, &loc, val) {
                    return Ok(());
                }
                self.bind_expr(b, s, loc);
            }
            StmtKind::Paren { operand } => {
                let val = self.operand(b, operand);
                self.bind_expr(b, s, val);
            }
            StmtKind::Nop => {}
        }
        Ok(())
    }

    fn process_unary(
        &mut self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        op: UnaryOp,
        operand: StmtId,
        ty: TypeId,
    ) -> Result<(), AnalysisError> {
        let ast = b.core.ast;
        match op {
            UnaryOp::Deref => {
                let pointer = self.operand(b, operand);
                let val = match self.load(b, s, &pointer, Some(ty)) {
                    Some(v) => v,
                    None => return Ok(()),
                };
                self.bind_expr(b, s, val);
            }
            UnaryOp::AddressOf => {
                let loc = self.eval_lvalue(b, operand);
                self.bind_expr(b, s, loc);
            }
            UnaryOp::Plus => {
                let val = self.operand(b, operand);
                self.bind_expr(b, s, val);
            }
            UnaryOp::Minus => {
                let val = self.operand(b, operand);
                let zero = b.core.factory.int_literal(0, ty, ast);
                let result = b.core.factory.eval_binary(ast, BinOp::Sub, &zero, &val, ty);
                self.bind_expr(b, s, result);
            }
            UnaryOp::BitNot => {
                let val = self.operand(b, operand);
                let all_ones = b.core.factory.int_literal(-1, ty, ast);
                let result = b
                    .core
                    .factory
                    .eval_binary(ast, BinOp::BitXor, &val, &all_ones, ty);
                self.bind_expr(b, s, result);
            }
            UnaryOp::LogicalNot => {
                // `!x` is evaluated as `0 == x`.
                let val = self.operand(b, operand);
                let zero = b
                    .core
                    .factory
                    .int_literal(0, ast.stmt_type(operand), ast);
                let result = b.core.factory.eval_binary(ast, BinOp::Eq, &zero, &val, ty);
                self.bind_expr(b, s, result);
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let loc = self.eval_lvalue(b, operand);
                let old = match self.load(b, s, &loc, Some(ty)) {
                    Some(v) => v,
                    None => return Ok(()),
                };
                let one = b.core.factory.int_literal(1, ty, ast);
                let delta_op = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
                    BinOp::Add
                } else {
                    BinOp::Sub
                };
                let new = b.core.factory.eval_binary(ast, delta_op, &old, &one, ty);
                if !self.bind_loc(b, s, &loc, new.clone()) {
                    return Ok(());
                }
                let result = if matches!(op, UnaryOp::PostInc | UnaryOp::PostDec) {
                    old
                } else {
                    new
                };
                self.bind_expr(b, s, result);
            }
        }
        Ok(())
    }

    fn process_binary(
        &mut self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        op: BinOp,
        left: StmtId,
        right: StmtId,
        ty: TypeId,
    ) -> Result<(), AnalysisError> {
        let ast = b.core.ast;
        if matches!(op, BinOp::LogicalAnd | BinOp::LogicalOr) {
            // The CFG's short circuit terminators decided the path; here we
            // only materialize the 0/1 the taken path implies.
            let val = match b.state.env.value_of(right).cloned() {
                Some(rv) => match b.core.factory.condition_truth(&rv) {
                    ConditionTruth::True => b.core.factory.int_literal(1, ty, ast),
                    ConditionTruth::False => b.core.factory.int_literal(0, ty, ast),
                    ConditionTruth::Undefined => SVal::Undefined,
                    ConditionTruth::Unknown => {
                        let zero = b.core.factory.int_literal(0, ast.stmt_type(right), ast);
                        b.core.factory.eval_binary(ast, BinOp::Ne, &rv, &zero, ty)
                    }
                },
                // Short circuited: the right operand never ran.
                None => {
                    let outcome = i128::from(op == BinOp::LogicalOr);
                    b.core.factory.int_literal(outcome, ty, ast)
                }
            };
            self.bind_expr(b, s, val);
            return Ok(());
        }
        let lhs = self.operand(b, left);
        let rhs = self.operand(b, right);
        let result = if matches!(op, BinOp::Div | BinOp::Rem) {
            match self.eval_divide(b, s, op, &lhs, &rhs, ty, false) {
                Some(v) => v,
                None => return Ok(()),
            }
        } else {
            b.core.factory.eval_binary(ast, op, &lhs, &rhs, ty)
        };
        if result.is_undefined() && !lhs.is_undefined() && !rhs.is_undefined() {
            // Defined operands produced an unrepresentable result.
            let state = b.state.clone();
            b.generate_sink(DefectKind::UndefResult, state);
            b.mark_fatal();
            return Ok(());
        }
        self.bind_expr(b, s, result);
        Ok(())
    }

    fn process_call(
        &mut self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        callee: StmtId,
        arguments: &[StmtId],
        ty: TypeId,
    ) -> Result<(), AnalysisError> {
        let ast = b.core.ast;
        let callee_val = self.operand(b, callee);
        match &callee_val {
            SVal::Undefined | SVal::NonLoc(NonLoc::ConcreteInt(..)) => {
                let state = b.state.clone();
                b.generate_sink(DefectKind::BadCall, state);
                b.mark_fatal();
                return Ok(());
            }
            SVal::Loc(Loc::ConcreteInt(..)) => {
                let state = b.state.clone();
                b.generate_sink(DefectKind::BadCall, state);
                b.mark_fatal();
                return Ok(());
            }
            _ => {}
        }
        // Argument collection must not build sinks; the checks below decide
        // what to report.
        let args: Vec<SVal> =
            b.with_sinks_suppressed(|b| arguments.iter().map(|a| self.operand(b, *a)).collect());
        for arg in &args {
            if arg.is_undefined() {
                let state = b.state.clone();
                b.generate_sink(DefectKind::UndefArg, state);
                b.mark_fatal();
                return Ok(());
            }
        }
        let (known, no_return) = match &callee_val {
            SVal::Loc(Loc::Func(f)) => {
                let decl = ast.func(*f);
                let known = KnownNames::resolve(&decl.name);
                (known, decl.no_return || known.is_no_return())
            }
            _ => (KnownNames::None, false),
        };
        for checker in &self.checkers {
            if !checker.pre_call(b, s, &callee_val, &args, known) {
                b.mark_fatal();
                return Ok(());
            }
        }
        if no_return {
            let state = b.state.clone();
            b.generate_sink(DefectKind::NoReturnCall, state);
            b.mark_fatal();
            return Ok(());
        }
        let mut modeled = false;
        for checker in &self.checkers {
            if checker.eval_call(b, s, &callee_val, &args, known) {
                modeled = true;
                break;
            }
        }
        if !modeled {
            self.default_call_model(b, s, &args, ty);
        }
        for checker in &self.checkers {
            checker.post_call(b, s, &callee_val, &args, known);
        }
        Ok(())
    }

    /// A call to an unknown function: every pointer argument's pointee is
    /// invalidated with a fresh conjured symbol, and the result is a fresh
    /// conjured symbol of the call's type.
    fn default_call_model(
        &mut self,
        b: &mut NodeBuilder<'_, '_>,
        s: StmtId,
        args: &[SVal],
        ty: TypeId,
    ) {
        let ast = b.core.ast;
        let count = b.visit_count_of(s);
        for (i, arg) in args.iter().enumerate() {
            let region = match arg {
                SVal::Loc(Loc::MemRegion(r)) => Some(*r),
                SVal::Loc(Loc::Symbol(sym)) => Some(
                    b.core
                        .factory
                        .regions
                        .symbolic_region(*sym, MemSpace::Unknown),
                ),
                _ => None,
            };
            if let Some(region) = region {
                let pointee_ty = b
                    .core
                    .factory
                    .region_value_type(region, ast)
                    .unwrap_or(ty);
                let sym = b.core.factory.symbols.conjure(
                    s,
                    pointee_ty,
                    count,
                    TAG_INVALIDATION_BASE + i as u32,
                );
                let havoc = b.core.factory.symbol_value(sym, pointee_ty, ast);
                let loc = SVal::loc_region(region);
                let outcome = self.store_manager.bind(
                    &mut b.core.factory,
                    ast,
                    &b.state.store,
                    &loc,
                    havoc,
                );
                if let BindOutcome::Bound(store) = outcome {
                    b.state = b.state.with_store(store);
                }
            }
        }
        if !ast.is_void(ty) {
            let sym = b.core.factory.symbols.conjure(s, ty, count, TAG_CALL_RESULT);
            let result = b.core.factory.symbol_value(sym, ty, ast);
            self.bind_expr(b, s, result);
        }
        debug!("modeled unknown call at s{} conservatively", s.0);
    }

    /// Logs an unsupported statement kind once and leaves the state
    /// untouched, per the recoverable error policy.
    pub fn note_unsupported(&mut self, kind: &'static str) {
        self.log_unsupported(kind);
    }
}
