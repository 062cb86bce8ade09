// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, DeclRef, StmtId, StmtKind, StorageClass, UnaryOp, VarId};
use crate::cfg::{BlockId, Cfg};
use std::collections::{HashMap, HashSet};

/// What a liveness query asks about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LiveQuery {
    Var(VarId),
    Expr(StmtId),
}

/// The liveness oracle consumed by the dead-binding sweep. `point` is the
/// statement about to be processed; the oracle answers whether the queried
/// variable or expression value can still be observed at or after it.
pub trait LivenessOracle {
    fn is_live(&self, point: StmtId, query: LiveQuery) -> bool;
}

/// An oracle that keeps everything alive. Disables the sweep; useful for
/// debugging and for callers that do their own garbage collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllLive;

impl LivenessOracle for AllLive {
    fn is_live(&self, _point: StmtId, _query: LiveQuery) -> bool {
        true
    }
}

/// A reference oracle computed from the CFG itself.
///
/// Variable liveness is the usual backward may-be-used analysis at statement
/// granularity: a decl-ref read is a use, an assignment or declaration kills,
/// taking a variable's address escapes it (conservatively live everywhere).
/// Globals and statics are always live.
///
/// Expression liveness follows the consumption structure of the linearized
/// CFG: an environment binding for `e` is live while the statement that
/// consumes `e`'s value has not yet been processed, and a binding with no
/// consumer (a terminator condition) dies when its block is left.
#[derive(Clone, Debug)]
pub struct ComputedLiveness {
    /// live_before[block][index] = variables live just before that statement.
    live_before: HashMap<BlockId, Vec<HashSet<VarId>>>,
    always_live: HashSet<VarId>,
    /// Where each statement is evaluated.
    stmt_loc: HashMap<StmtId, (BlockId, usize)>,
    /// Where the consumer of each statement's value is evaluated.
    parent_loc: HashMap<StmtId, (BlockId, usize)>,
    /// reach[b] = blocks reachable from b by one or more edges.
    reach: HashMap<BlockId, HashSet<BlockId>>,
}

impl ComputedLiveness {
    pub fn new(ast: &AstContext, cfg: &Cfg) -> ComputedLiveness {
        let mut always_live: HashSet<VarId> = ast
            .var_ids()
            .filter(|v| {
                matches!(
                    ast.var(*v).storage,
                    StorageClass::Global | StorageClass::StaticLocal
                )
            })
            .collect();
        let mut stmt_loc = HashMap::new();
        let mut parent_loc = HashMap::new();
        for b in cfg.block_ids() {
            let data = cfg.block(b).expect("block ids are dense");
            for (i, s) in data.statements.iter().enumerate() {
                stmt_loc.insert(*s, (b, i));
            }
        }
        for (s, _) in stmt_loc.clone() {
            if let Some(p) = ast.parent_of(s) {
                if let Some(loc) = stmt_loc.get(&p) {
                    parent_loc.insert(s, *loc);
                }
            }
            // Escape analysis: &v keeps v live for the rest of the function.
            if let StmtKind::Unary {
                op: UnaryOp::AddressOf,
                operand,
            } = &ast.stmt(s).kind
            {
                if let StmtKind::DeclRef {
                    decl: DeclRef::Var(v),
                } = &ast.stmt(*operand).kind
                {
                    always_live.insert(*v);
                }
            }
        }
        let reach: HashMap<BlockId, HashSet<BlockId>> = cfg
            .block_ids()
            .map(|b| (b, cfg.reachable_from(b)))
            .collect();

        // Backward fixed point over block live-out sets.
        let mut live_out: HashMap<BlockId, HashSet<VarId>> =
            cfg.block_ids().map(|b| (b, HashSet::new())).collect();
        let mut live_in: HashMap<BlockId, HashSet<VarId>> =
            cfg.block_ids().map(|b| (b, HashSet::new())).collect();
        loop {
            let mut changed = false;
            for b in cfg.block_ids() {
                let mut out: HashSet<VarId> = HashSet::new();
                for succ in cfg.successors(b) {
                    out.extend(live_in[&succ].iter().copied());
                }
                let before = Self::scan_block(ast, cfg, b, &out);
                let new_in = before.first().cloned().unwrap_or_else(|| out.clone());
                if live_out[&b] != out || live_in[&b] != new_in {
                    changed = true;
                }
                live_out.insert(b, out);
                live_in.insert(b, new_in);
            }
            if !changed {
                break;
            }
        }
        let live_before = cfg
            .block_ids()
            .map(|b| (b, Self::scan_block(ast, cfg, b, &live_out[&b])))
            .collect();
        ComputedLiveness {
            live_before,
            always_live,
            stmt_loc,
            parent_loc,
            reach,
        }
    }

    /// Walks one block backwards from `out`, producing the live set before
    /// each statement.
    fn scan_block(
        ast: &AstContext,
        cfg: &Cfg,
        block: BlockId,
        out: &HashSet<VarId>,
    ) -> Vec<HashSet<VarId>> {
        let data = cfg.block(block).expect("block ids are dense");
        let n = data.statements.len();
        let mut result = vec![HashSet::new(); n];
        let mut live = out.clone();
        for i in (0..n).rev() {
            let s = data.statements[i];
            match &ast.stmt(s).kind {
                StmtKind::Assign { target, .. } => {
                    if let StmtKind::DeclRef {
                        decl: DeclRef::Var(v),
                    } = &ast.stmt(*target).kind
                    {
                        live.remove(v);
                    }
                }
                StmtKind::DeclStmt { var, .. } => {
                    live.remove(var);
                }
                StmtKind::DeclRef {
                    decl: DeclRef::Var(v),
                } => {
                    if !Self::is_pure_store_target(ast, s) {
                        live.insert(*v);
                    }
                }
                _ => {}
            }
            result[i] = live.clone();
        }
        result
    }

    /// True if this decl-ref is only written through by its parent, so the
    /// reference itself does not read the variable.
    fn is_pure_store_target(ast: &AstContext, s: StmtId) -> bool {
        match ast.parent_of(s) {
            Some(p) => matches!(&ast.stmt(p).kind, StmtKind::Assign { target, .. } if *target == s),
            None => false,
        }
    }
}

impl LivenessOracle for ComputedLiveness {
    fn is_live(&self, point: StmtId, query: LiveQuery) -> bool {
        let (pb, pi) = match self.stmt_loc.get(&point) {
            Some(loc) => *loc,
            // An unknown point cannot justify dropping anything.
            None => return true,
        };
        match query {
            LiveQuery::Var(v) => {
                if self.always_live.contains(&v) {
                    return true;
                }
                self.live_before
                    .get(&pb)
                    .and_then(|per_stmt| per_stmt.get(pi))
                    .map(|set| set.contains(&v))
                    .unwrap_or(true)
            }
            LiveQuery::Expr(e) => {
                if e == point {
                    return true;
                }
                match self.parent_loc.get(&e) {
                    Some((bp, jp)) => {
                        if *bp == pb {
                            // Still live if the consumer has not run yet, or
                            // can run again on a cycle through this block.
                            *jp >= pi || self.reach[&pb].contains(&pb)
                        } else {
                            self.reach[&pb].contains(bp)
                        }
                    }
                    None => {
                        // No consumer statement: the value is used by this
                        // block's terminator and dies with the block.
                        match self.stmt_loc.get(&e) {
                            Some((eb, _)) => *eb == pb,
                            None => true,
                        }
                    }
                }
            }
        }
    }
}
