// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use crate::core_engine::NodeBuilder;
use crate::known_names::KnownNames;
use crate::program_state::ProgramState;
use crate::sval::SVal;
use crate::symbols::SymbolId;
use crate::value_factory::ValueFactory;
use std::fmt::Debug;

/// Observation callbacks a checker can implement. Each hook may mutate the
/// builder's working state, add transitions, or emit sinks; hooks that
/// return a bool use `false` to say "a fatal sink was emitted, stop
/// processing this statement".
///
/// Checkers are stateless: per-path facts live in the generic data map of
/// the program state, which keeps them part of state identity.
pub trait Checker: Debug {
    fn name(&self) -> &'static str;

    /// Called before the transfer function of every statement.
    fn pre_stmt(&self, _b: &mut NodeBuilder<'_, '_>, _stmt: StmtId) {}

    /// Called after the transfer function of every statement.
    fn post_stmt(&self, _b: &mut NodeBuilder<'_, '_>, _stmt: StmtId) {}

    /// Called before a call is modeled. Returning false aborts the call.
    fn pre_call(
        &self,
        _b: &mut NodeBuilder<'_, '_>,
        _call: StmtId,
        _callee: &SVal,
        _args: &[SVal],
        _known: KnownNames,
    ) -> bool {
        true
    }

    /// Called after a call has been modeled and its result bound.
    fn post_call(
        &self,
        _b: &mut NodeBuilder<'_, '_>,
        _call: StmtId,
        _callee: &SVal,
        _args: &[SVal],
        _known: KnownNames,
    ) {
    }

    /// Offered the chance to model a call entirely. Returning true
    /// short-circuits the default call modeling.
    fn eval_call(
        &self,
        _b: &mut NodeBuilder<'_, '_>,
        _call: StmtId,
        _callee: &SVal,
        _args: &[SVal],
        _known: KnownNames,
    ) -> bool {
        false
    }

    /// Called on every load or store through a location, after the engine's
    /// own null and undefined checks. Returning false aborts the access.
    fn check_location(
        &self,
        _b: &mut NodeBuilder<'_, '_>,
        _stmt: StmtId,
        _loc: &SVal,
        _is_load: bool,
    ) -> bool {
        true
    }

    /// Called before a value is bound through a location.
    fn check_bind(
        &self,
        _b: &mut NodeBuilder<'_, '_>,
        _stmt: StmtId,
        _loc: &SVal,
        _val: &SVal,
    ) -> bool {
        true
    }

    /// Called with the symbols the liveness sweep just retired.
    fn check_dead_symbols(&self, _b: &mut NodeBuilder<'_, '_>, _dead: &[SymbolId]) {}

    /// Called when a path reaches the end of the function.
    fn check_end_path(&self, _b: &mut NodeBuilder<'_, '_>) {}

    /// Called after the constraint manager accepted an assumption; the
    /// checker may refine its own facts or veto the branch with None.
    fn eval_assume(
        &self,
        _factory: &mut ValueFactory,
        state: ProgramState,
        _cond: &SVal,
        _assumption: bool,
    ) -> Option<ProgramState> {
        Some(state)
    }
}
