// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, BinOp, StmtId};
use crate::cfg::{BlockId, Cfg, Terminator};
use crate::defects::DefectKind;
use crate::errors::AnalysisError;
use crate::exploded_graph::{ExplodedGraph, NodeId};
use crate::expr_engine::ExprEngine;
use crate::k_limits;
use crate::liveness::LivenessOracle;
use crate::options::Options;
use crate::program_point::ProgramPoint;
use crate::program_state::{remove_dead, ProgramState, StateFactory};
use crate::sval::{Loc, NonLoc, SVal};
use crate::value_factory::ValueFactory;
use crate::worklist::{BlockCounter, WorkList, WorkListUnit};
use log::{debug, warn};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

/// The graph reachability worklist engine. It owns the interning tables,
/// the exploded graph and the frontier; the transfer function layer is
/// passed into `run` and consulted per dequeued node.
pub struct CoreEngine<'a> {
    pub factory: ValueFactory,
    pub states: StateFactory,
    pub graph: ExplodedGraph,
    pub worklist: WorkList,
    pub ast: &'a AstContext,
    pub cfg: &'a Cfg,
    pub liveness: &'a dyn LivenessOracle,
    pub options: Options,
    initialized: bool,
    steps_taken: u64,
    wide_range_warned: bool,
}

impl<'a> Debug for CoreEngine<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        "CoreEngine".fmt(f)
    }
}

/// Collects the successor nodes a transfer function proposes for one
/// dequeued node. If nothing is generated and no fatal sink was emitted,
/// the engine auto-transitions to the post statement point with the
/// builder's final working state.
pub struct NodeBuilder<'e, 'a> {
    pub core: &'e mut CoreEngine<'a>,
    pub pred: NodeId,
    pub counter: BlockCounter,
    /// The working state; single-outcome transfer functions mutate this in
    /// place instead of generating nodes explicitly.
    pub state: ProgramState,
    sink_point: ProgramPoint,
    generated: Vec<NodeId>,
    fatal: bool,
    build_sinks: bool,
}

impl<'e, 'a> Debug for NodeBuilder<'e, 'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        "NodeBuilder".fmt(f)
    }
}

impl<'e, 'a> NodeBuilder<'e, 'a> {
    pub fn new(
        core: &'e mut CoreEngine<'a>,
        pred: NodeId,
        counter: BlockCounter,
        state: ProgramState,
        sink_point: ProgramPoint,
    ) -> NodeBuilder<'e, 'a> {
        NodeBuilder {
            core,
            pred,
            counter,
            state,
            sink_point,
            generated: vec![],
            fatal: false,
            build_sinks: true,
        }
    }

    /// Runs `f` with sink building disabled, restoring the flag on every
    /// exit path. Used while collecting values that must not report, such
    /// as the arguments of a call about to be modeled.
    pub fn with_sinks_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.build_sinks;
        self.build_sinks = false;
        let result = f(self);
        self.build_sinks = saved;
        result
    }

    /// Generates an explicit successor node.
    pub fn generate(&mut self, point: ProgramPoint, state: ProgramState) -> NodeId {
        let id = self.core.propose(self.pred, point, state, &self.counter);
        self.generated.push(id);
        id
    }

    /// Emits a sink carrying a defect. The path through this sink ends, but
    /// sibling successors generated by the same builder still continue.
    /// While sink building is suppressed the witness is dropped and the
    /// predecessor is returned instead.
    pub fn generate_sink(&mut self, defect: DefectKind, state: ProgramState) -> NodeId {
        if !self.build_sinks {
            return self.pred;
        }
        self.core
            .propose_sink(self.pred, self.sink_point, state, defect)
    }

    /// Declares that no continuation exists for this statement: suppresses
    /// the automatic post statement transition.
    pub fn mark_fatal(&mut self) {
        self.fatal = true;
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }

    /// How many times the current path has entered the block holding `stmt`;
    /// conjured symbols are tied to this count.
    pub fn visit_count_of(&self, stmt: StmtId) -> u32 {
        match self.core.cfg.location_of(stmt) {
            Some((block, _)) => self.counter.visit_count(block),
            None => 0,
        }
    }
}

impl<'a> CoreEngine<'a> {
    /// Validates the CFG and sets up an empty engine around it.
    pub fn new(
        ast: &'a AstContext,
        cfg: &'a Cfg,
        liveness: &'a dyn LivenessOracle,
        options: Options,
    ) -> Result<CoreEngine<'a>, AnalysisError> {
        cfg.validate().map_err(AnalysisError::malformed)?;
        let worklist = WorkList::new(options.worklist);
        Ok(CoreEngine {
            factory: ValueFactory::new(),
            states: StateFactory::new(),
            graph: ExplodedGraph::new(),
            worklist,
            ast,
            cfg,
            liveness,
            options,
            initialized: false,
            steps_taken: 0,
            wide_range_warned: false,
        })
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Interns the state, converges on an existing node when one exists,
    /// records the edge, and enqueues fresh nodes.
    pub fn propose(
        &mut self,
        pred: NodeId,
        point: ProgramPoint,
        state: ProgramState,
        counter: &BlockCounter,
    ) -> NodeId {
        let (shared, state_id) = self.states.intern(state);
        let (id, fresh) = self.graph.get_or_add(point, shared, state_id);
        self.graph.add_edge(pred, id);
        if fresh {
            let priority = self
                .block_of_point(point)
                .map(|b| counter.visit_count(b))
                .unwrap_or(0);
            self.worklist.enqueue(
                WorkListUnit {
                    node: id,
                    counter: counter.clone(),
                },
                priority,
            );
        }
        id
    }

    /// Interns a sink node; sinks are never enqueued.
    pub fn propose_sink(
        &mut self,
        pred: NodeId,
        point: ProgramPoint,
        state: ProgramState,
        defect: DefectKind,
    ) -> NodeId {
        let (shared, state_id) = self.states.intern(state);
        let (id, _) = self.graph.get_or_add_sink(point, shared, state_id, defect);
        self.graph.add_edge(pred, id);
        debug!("sink {defect} at {point}");
        id
    }

    fn block_of_point(&self, point: ProgramPoint) -> Option<BlockId> {
        match point {
            ProgramPoint::BlockEdge(_, dst) => Some(dst),
            ProgramPoint::BlockEntrance(b) | ProgramPoint::BlockExit(b) => Some(b),
            ProgramPoint::PreStmt(s) | ProgramPoint::PostStmt(s) => {
                self.cfg.location_of(s).map(|(b, _)| b)
            }
        }
    }

    fn bootstrap(&mut self, tf: &mut ExprEngine) -> Result<(), AnalysisError> {
        let entry = self
            .cfg
            .entry_block()
            .ok_or_else(|| AnalysisError::malformed("no entry block"))?;
        let initial = tf.initial_state(&mut self.factory, self.ast);
        let (shared, state_id) = self.states.intern(initial);
        let (id, _) = self
            .graph
            .get_or_add(ProgramPoint::BlockEntrance(entry), shared, state_id);
        let counter = BlockCounter::new().incremented(entry);
        self.worklist.enqueue(WorkListUnit { node: id, counter }, 0);
        self.initialized = true;
        Ok(())
    }

    /// Drives exploration until the worklist drains or `max_steps` nodes
    /// have been dequeued. Returns whether exploration is complete; callers
    /// may resume an incomplete run with a fresh budget.
    pub fn run(&mut self, tf: &mut ExprEngine, max_steps: u64) -> Result<bool, AnalysisError> {
        if !self.initialized {
            self.bootstrap(tf)?;
        }
        let mut steps = 0;
        while steps < max_steps {
            let unit = match self.worklist.dequeue() {
                Some(unit) => unit,
                None => return Ok(true),
            };
            steps += 1;
            self.steps_taken += 1;
            let node = self.graph.node(unit.node).clone();
            if node.is_sink() {
                continue;
            }
            match node.point {
                ProgramPoint::BlockEdge(src, dst) => {
                    self.process_block_edge(tf, &unit, src, dst, node.state)?;
                }
                ProgramPoint::BlockEntrance(b) => {
                    self.process_block_entrance(tf, &unit, b, node.state)?;
                }
                ProgramPoint::PreStmt(s) => {
                    self.process_pre_stmt(tf, &unit, s)?;
                }
                ProgramPoint::PostStmt(s) => {
                    self.process_post_stmt(tf, &unit, s, node.state)?;
                }
                ProgramPoint::BlockExit(b) => {
                    self.process_block_exit(tf, &unit, b, node.state);
                }
            }
        }
        Ok(self.worklist.is_empty())
    }

    /// Crossing an edge charges the destination block against the per path
    /// revisit cap; the transfer layer's block entrance hook decides whether
    /// the path may continue. A denied path is dropped silently.
    fn process_block_edge(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        _src: BlockId,
        dst: BlockId,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let counter = unit.counter.incremented(dst);
        if !tf.process_block_entrance(&counter, dst) {
            debug!("block B{} capped after {} entries", dst.0, counter.visit_count(dst));
            return Ok(());
        }
        let (shared, state_id) = self.states.intern((*state).clone());
        let (id, fresh) = self
            .graph
            .get_or_add(ProgramPoint::BlockEntrance(dst), shared, state_id);
        self.graph.add_edge(unit.node, id);
        if fresh {
            let priority = counter.visit_count(dst);
            self.worklist
                .enqueue(WorkListUnit { node: id, counter }, priority);
        }
        Ok(())
    }

    fn process_block_entrance(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let data = self
            .cfg
            .block(block)
            .ok_or_else(|| AnalysisError::malformed(format!("missing block B{}", block.0)))?;
        match data.statements.first() {
            Some(first) => {
                self.propose(
                    unit.node,
                    ProgramPoint::PreStmt(*first),
                    (*state).clone(),
                    &unit.counter,
                );
                Ok(())
            }
            None => self.process_terminator(tf, unit, block, state),
        }
    }

    fn process_pre_stmt(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        stmt: StmtId,
    ) -> Result<(), AnalysisError> {
        let state = self.graph.node(unit.node).state.clone();
        let (cleaned, reaper) = {
            let store_manager = tf.store_manager();
            remove_dead(
                &mut self.factory,
                store_manager,
                self.ast,
                self.liveness,
                &state,
                stmt,
            )
        };
        let (generated, fatal, final_state) = {
            let mut builder = NodeBuilder::new(
                self,
                unit.node,
                unit.counter.clone(),
                cleaned,
                ProgramPoint::PostStmt(stmt),
            );
            if !reaper.dead_symbols().is_empty() {
                tf.run_dead_symbols(&mut builder, reaper.dead_symbols());
            }
            tf.run_pre_stmt(&mut builder, stmt);
            if !builder.is_fatal() {
                tf.process_stmt(&mut builder, stmt)?;
            }
            if !builder.is_fatal() {
                tf.run_post_stmt(&mut builder, stmt);
            }
            (
                builder.generated_count(),
                builder.is_fatal(),
                builder.state,
            )
        };
        if generated == 0 && !fatal {
            self.propose(
                unit.node,
                ProgramPoint::PostStmt(stmt),
                final_state,
                &unit.counter,
            );
        }
        Ok(())
    }

    fn process_post_stmt(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        stmt: StmtId,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let (block, index) = self.cfg.location_of(stmt).ok_or_else(|| {
            AnalysisError::malformed(format!("statement s{} has no location", stmt.0))
        })?;
        let data = self
            .cfg
            .block(block)
            .ok_or_else(|| AnalysisError::malformed(format!("missing block B{}", block.0)))?;
        if index + 1 < data.statements.len() {
            let next = data.statements[index + 1];
            self.propose(
                unit.node,
                ProgramPoint::PreStmt(next),
                (*state).clone(),
                &unit.counter,
            );
            Ok(())
        } else {
            self.process_terminator(tf, unit, block, state)
        }
    }

    /// End of a path: give the checkers their last look.
    fn process_block_exit(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        state: Rc<ProgramState>,
    ) {
        let mut builder = NodeBuilder::new(
            self,
            unit.node,
            unit.counter.clone(),
            (*state).clone(),
            ProgramPoint::BlockExit(block),
        );
        tf.run_end_path(&mut builder);
    }

    fn process_terminator(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let terminator = self
            .cfg
            .block(block)
            .ok_or_else(|| AnalysisError::malformed(format!("missing block B{}", block.0)))?
            .terminator
            .clone();
        match terminator {
            Terminator::None => {
                self.propose(
                    unit.node,
                    ProgramPoint::BlockExit(block),
                    (*state).clone(),
                    &unit.counter,
                );
                Ok(())
            }
            Terminator::Jump(target) => {
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, target),
                    (*state).clone(),
                    &unit.counter,
                );
                Ok(())
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => self.process_branch(tf, unit, block, cond, then_block, else_block, state),
            Terminator::Switch {
                cond,
                cases,
                default_block,
            } => self.process_switch(tf, unit, block, cond, &cases, default_block, state),
            Terminator::IndirectGoto { cond, targets } => {
                self.process_indirect_goto(tf, unit, block, cond, &targets, state)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_branch(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        cond: StmtId,
        then_block: BlockId,
        else_block: BlockId,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let cond_val = state.env.value_of(cond).cloned().unwrap_or(SVal::Unknown);
        use crate::sval::ConditionTruth::*;
        match self.factory.condition_truth(&cond_val) {
            Undefined => {
                self.propose_sink(
                    unit.node,
                    ProgramPoint::BlockExit(block),
                    (*state).clone(),
                    DefectKind::UndefControlFlow,
                );
            }
            True => {
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, then_block),
                    (*state).clone(),
                    &unit.counter,
                );
            }
            False => {
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, else_block),
                    (*state).clone(),
                    &unit.counter,
                );
            }
            Unknown => {
                // Bifurcate; infeasible sides are dropped by assume.
                for (target, assumption) in [(then_block, true), (else_block, false)] {
                    if let Some(assumed) =
                        tf.assume(&mut self.factory, self.ast, &state, &cond_val, assumption)
                    {
                        self.propose(
                            unit.node,
                            ProgramPoint::BlockEdge(block, target),
                            assumed,
                            &unit.counter,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_switch(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        cond: StmtId,
        cases: &[crate::cfg::SwitchCase],
        default_block: Option<BlockId>,
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let cond_val = state.env.value_of(cond).cloned().unwrap_or(SVal::Unknown);
        if cond_val.is_undefined() {
            self.propose_sink(
                unit.node,
                ProgramPoint::BlockExit(block),
                (*state).clone(),
                DefectKind::UndefControlFlow,
            );
            return Ok(());
        }
        // A concrete condition selects exactly one arm.
        if let SVal::NonLoc(NonLoc::ConcreteInt(i)) = &cond_val {
            let v = self.factory.basic_values.int(*i).as_i128();
            let target = cases
                .iter()
                .find(|c| c.lo <= v && v <= c.hi)
                .map(|c| c.target)
                .or(default_block);
            if let Some(target) = target {
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, target),
                    (*state).clone(),
                    &unit.counter,
                );
            }
            return Ok(());
        }
        let cond_ty = self.ast.stmt_type(cond);
        let (width, signed) = self.ast.integer_width(cond_ty).unwrap_or((32, true));
        let mut residual: Option<ProgramState> = Some((*state).clone());
        for case in cases {
            let too_wide =
                case.hi.saturating_sub(case.lo) >= k_limits::MAX_SWITCH_RANGE_CONCRETIZATION;
            if too_wide {
                if !self.wide_range_warned {
                    warn!(
                        "case range {}..={} too wide to concretize; taking it unconstrained",
                        case.lo, case.hi
                    );
                    self.wide_range_warned = true;
                }
                // TODO: constrain the residual state with an interval fact
                // instead of leaving the wide case unconstrained.
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, case.target),
                    (*state).clone(),
                    &unit.counter,
                );
                continue;
            }
            let mut v = case.lo;
            while v <= case.hi {
                let k = self.factory.basic_values.intern_int(v, width, signed);
                let eq = self.factory.eval_binary(
                    self.ast,
                    BinOp::Eq,
                    &cond_val,
                    &SVal::nonloc_int(k),
                    cond_ty,
                );
                if let Some(matched) =
                    tf.assume(&mut self.factory, self.ast, &state, &eq, true)
                {
                    self.propose(
                        unit.node,
                        ProgramPoint::BlockEdge(block, case.target),
                        matched,
                        &unit.counter,
                    );
                }
                residual = match residual {
                    Some(r) => tf.assume(&mut self.factory, self.ast, &r, &eq, false),
                    None => None,
                };
                v += 1;
            }
        }
        // Whatever survived every case disequality flows to the default arm.
        if let (Some(rest), Some(target)) = (residual, default_block) {
            self.propose(
                unit.node,
                ProgramPoint::BlockEdge(block, target),
                rest,
                &unit.counter,
            );
        }
        Ok(())
    }

    fn process_indirect_goto(
        &mut self,
        tf: &mut ExprEngine,
        unit: &WorkListUnit,
        block: BlockId,
        cond: StmtId,
        targets: &[(crate::ast::LabelId, BlockId)],
        state: Rc<ProgramState>,
    ) -> Result<(), AnalysisError> {
        let _ = tf;
        let cond_val = state.env.value_of(cond).cloned().unwrap_or(SVal::Unknown);
        match &cond_val {
            SVal::Loc(Loc::GotoLabel(label)) => {
                let target = targets
                    .iter()
                    .find(|(l, _)| l == label)
                    .map(|(_, b)| *b)
                    .ok_or_else(|| {
                        AnalysisError::malformed(format!(
                            "computed goto label {} has no successor in B{}",
                            label.0, block.0
                        ))
                    })?;
                self.propose(
                    unit.node,
                    ProgramPoint::BlockEdge(block, target),
                    (*state).clone(),
                    &unit.counter,
                );
            }
            SVal::Undefined | SVal::Loc(Loc::ConcreteInt(..)) | SVal::NonLoc(NonLoc::ConcreteInt(..)) => {
                // A computed goto to a non-label is undefined control flow.
                self.propose_sink(
                    unit.node,
                    ProgramPoint::BlockExit(block),
                    (*state).clone(),
                    DefectKind::UndefControlFlow,
                );
            }
            _ => {
                for (_, target) in targets {
                    self.propose(
                        unit.node,
                        ProgramPoint::BlockEdge(block, *target),
                        (*state).clone(),
                        &unit.counter,
                    );
                }
            }
        }
        Ok(())
    }
}
