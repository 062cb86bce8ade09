// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Shared fixtures: a small builder for the AST and CFG carriers an external
// front end would normally populate, plus helpers to run an analysis.

#![allow(dead_code)]

use corax::ast::{
    AstContext, BinOp, DeclRef, FuncId, StmtId, StmtKind, StorageClass, TypeId, TypeKind, UnaryOp,
    VarId,
};
use corax::cfg::{BlockId, Cfg, SwitchCase, Terminator};
use corax::core_engine::CoreEngine;
use corax::defects::DefectKind;
use corax::expr_engine::ExprEngine;
use corax::liveness::LivenessOracle;
use corax::options::Options;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles one function: declarations, linearized statements, blocks.
pub struct FunctionBuilder {
    pub ast: AstContext,
    pub cfg: Cfg,
    pub void_ty: TypeId,
    pub int_ty: TypeId,
    pub char_ty: TypeId,
    pub int_ptr_ty: TypeId,
    pub char_ptr_ty: TypeId,
}

impl FunctionBuilder {
    pub fn new() -> FunctionBuilder {
        let mut ast = AstContext::new();
        let void_ty = ast.void_type();
        let int_ty = ast.int_type(32, true);
        let char_ty = ast.int_type(8, true);
        let int_ptr_ty = ast.pointer_type(int_ty);
        let char_ptr_ty = ast.pointer_type(char_ty);
        FunctionBuilder {
            ast,
            cfg: Cfg::new(),
            void_ty,
            int_ty,
            char_ty,
            int_ptr_ty,
            char_ptr_ty,
        }
    }

    pub fn local(&mut self, name: &str, ty: TypeId) -> VarId {
        self.ast.add_var(name, ty, StorageClass::Local)
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> VarId {
        self.ast.add_var(name, ty, StorageClass::Param)
    }

    pub fn function(&mut self, name: &str, result: TypeId, no_return: bool) -> FuncId {
        let ty = self.ast.add_type(TypeKind::Function {
            result,
            params: vec![],
        });
        self.ast.add_func(name, ty, no_return)
    }

    pub fn block(&mut self) -> BlockId {
        self.cfg.add_block()
    }

    pub fn entry(&mut self, block: BlockId) {
        self.cfg.set_entry(block);
    }

    pub fn int_lit(&mut self, block: BlockId, value: i128) -> StmtId {
        let s = self
            .ast
            .add_stmt(StmtKind::IntLiteral { value }, self.int_ty);
        self.cfg.push_stmt(block, s);
        s
    }

    /// A decl-ref evaluated for its value.
    pub fn read_var(&mut self, block: BlockId, var: VarId) -> StmtId {
        let ty = self.ast.var(var).ty;
        let s = self.ast.add_stmt(
            StmtKind::DeclRef {
                decl: DeclRef::Var(var),
            },
            ty,
        );
        self.cfg.push_stmt(block, s);
        s
    }

    /// `var = source;`. The target decl-ref is an l-value and is not
    /// evaluated as its own statement.
    pub fn assign_var(&mut self, block: BlockId, var: VarId, source: StmtId) -> StmtId {
        let ty = self.ast.var(var).ty;
        let target = self.ast.add_stmt(
            StmtKind::DeclRef {
                decl: DeclRef::Var(var),
            },
            ty,
        );
        let s = self.ast.add_stmt(StmtKind::Assign { target, source }, ty);
        self.cfg.push_stmt(block, s);
        s
    }

    /// `*pointer = source;`.
    pub fn deref_assign(&mut self, block: BlockId, pointer: StmtId, source: StmtId) -> StmtId {
        let pointee = self
            .ast
            .pointee_type(self.ast.stmt_type(pointer))
            .unwrap_or(self.int_ty);
        let target = self.ast.add_stmt(
            StmtKind::Unary {
                op: UnaryOp::Deref,
                operand: pointer,
            },
            pointee,
        );
        let s = self
            .ast
            .add_stmt(StmtKind::Assign { target, source }, pointee);
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn decl_stmt(&mut self, block: BlockId, var: VarId, initializer: Option<StmtId>) -> StmtId {
        let s = self
            .ast
            .add_stmt(StmtKind::DeclStmt { var, initializer }, self.void_ty);
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn cast(&mut self, block: BlockId, operand: StmtId, ty: TypeId) -> StmtId {
        let s = self.ast.add_stmt(StmtKind::Cast { operand }, ty);
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn deref(&mut self, block: BlockId, pointer: StmtId) -> StmtId {
        let pointee = self
            .ast
            .pointee_type(self.ast.stmt_type(pointer))
            .unwrap_or(self.int_ty);
        let s = self.ast.add_stmt(
            StmtKind::Unary {
                op: UnaryOp::Deref,
                operand: pointer,
            },
            pointee,
        );
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn unary(&mut self, block: BlockId, op: UnaryOp, operand: StmtId, ty: TypeId) -> StmtId {
        let s = self.ast.add_stmt(StmtKind::Unary { op, operand }, ty);
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn binary(&mut self, block: BlockId, op: BinOp, left: StmtId, right: StmtId) -> StmtId {
        let s = self.ast.add_stmt(
            StmtKind::Binary { op, left, right },
            self.int_ty,
        );
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn ret(&mut self, block: BlockId, value: Option<StmtId>) -> StmtId {
        let s = self.ast.add_stmt(StmtKind::Return { value }, self.void_ty);
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn call(
        &mut self,
        block: BlockId,
        func: FuncId,
        arguments: Vec<StmtId>,
        result_ty: TypeId,
    ) -> StmtId {
        let func_ty = self.ast.func(func).ty;
        let callee = self.ast.add_stmt(
            StmtKind::DeclRef {
                decl: DeclRef::Func(func),
            },
            func_ty,
        );
        self.cfg.push_stmt(block, callee);
        let s = self.ast.add_stmt(
            StmtKind::Call {
                callee,
                arguments,
            },
            result_ty,
        );
        self.cfg.push_stmt(block, s);
        s
    }

    pub fn branch(&mut self, block: BlockId, cond: StmtId, then_block: BlockId, else_block: BlockId) {
        self.cfg.set_terminator(
            block,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
    }

    pub fn jump(&mut self, block: BlockId, target: BlockId) {
        self.cfg.set_terminator(block, Terminator::Jump(target));
    }

    pub fn switch(
        &mut self,
        block: BlockId,
        cond: StmtId,
        cases: Vec<(i128, i128, BlockId)>,
        default_block: Option<BlockId>,
    ) {
        self.cfg.set_terminator(
            block,
            Terminator::Switch {
                cond,
                cases: cases
                    .into_iter()
                    .map(|(lo, hi, target)| SwitchCase { lo, hi, target })
                    .collect(),
                default_block,
            },
        );
    }
}

/// Runs the engine to completion over one function.
pub fn analyze<'a>(
    ast: &'a AstContext,
    cfg: &'a Cfg,
    liveness: &'a dyn LivenessOracle,
    options: &Options,
) -> CoreEngine<'a> {
    let mut engine =
        CoreEngine::new(ast, cfg, liveness, options.clone()).expect("well formed cfg");
    let mut transfer = ExprEngine::new(options);
    let done = engine
        .run(&mut transfer, options.max_steps)
        .expect("no fatal analysis error");
    assert!(done, "exploration should finish within the step budget");
    engine
}

/// The witnessed defect kinds, sorted, duplicates kept.
pub fn defect_kinds(engine: &CoreEngine<'_>) -> Vec<DefectKind> {
    let mut kinds: Vec<DefectKind> = engine
        .graph
        .defects()
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    kinds.sort();
    kinds
}
