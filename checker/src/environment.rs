// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use crate::liveness::{LiveQuery, LivenessOracle};
use crate::sval::SVal;
use crate::utils;
use rpds::HashTrieMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};

/// Immutable map from expressions to their abstract values, split into
/// block level bindings (those the CFG says must survive block boundaries)
/// and sub-expression bindings (scratch, dropped between statements by the
/// liveness sweep).
#[derive(Clone, Eq, PartialEq, Default)]
pub struct Environment {
    block_bindings: HashTrieMap<StmtId, SVal>,
    sub_expr_bindings: HashTrieMap<StmtId, SVal>,
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.block_bindings.iter().map(|(k, v)| (k, v)))
            .entries(self.sub_expr_bindings.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl Hash for Environment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        utils::hash_unordered_map(&self.block_bindings, state);
        utils::hash_unordered_map(&self.sub_expr_bindings, state);
    }
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// The value bound to an expression, if any. Sub-expression bindings
    /// shadow block level ones, though in a well formed CFG an expression is
    /// only ever one of the two.
    pub fn value_of(&self, stmt: StmtId) -> Option<&SVal> {
        self.sub_expr_bindings
            .get(&stmt)
            .or_else(|| self.block_bindings.get(&stmt))
    }

    /// Binds an expression to a value in the appropriate partition.
    pub fn bind(&self, stmt: StmtId, val: SVal, block_level: bool) -> Environment {
        if block_level {
            Environment {
                block_bindings: self.block_bindings.insert(stmt, val),
                sub_expr_bindings: self.sub_expr_bindings.clone(),
            }
        } else {
            Environment {
                block_bindings: self.block_bindings.clone(),
                sub_expr_bindings: self.sub_expr_bindings.insert(stmt, val),
            }
        }
    }

    /// All bindings, block level first.
    pub fn iter(&self) -> impl Iterator<Item = (&StmtId, &SVal)> {
        self.block_bindings
            .iter()
            .chain(self.sub_expr_bindings.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.block_bindings.is_empty() && self.sub_expr_bindings.is_empty()
    }

    pub fn size(&self) -> usize {
        self.block_bindings.size() + self.sub_expr_bindings.size()
    }

    /// Drops every binding the liveness oracle no longer justifies at
    /// `point`. Sub-expression bindings die as soon as their consumer has
    /// run; block level bindings die when their block is left behind.
    pub fn sweep(&self, point: StmtId, liveness: &dyn LivenessOracle) -> Environment {
        let mut block_bindings = self.block_bindings.clone();
        for (stmt, _) in self.block_bindings.iter() {
            if !liveness.is_live(point, LiveQuery::Expr(*stmt)) {
                block_bindings.remove_mut(stmt);
            }
        }
        let mut sub_expr_bindings = self.sub_expr_bindings.clone();
        for (stmt, _) in self.sub_expr_bindings.iter() {
            if !liveness.is_live(point, LiveQuery::Expr(*stmt)) {
                sub_expr_bindings.remove_mut(stmt);
            }
        }
        Environment {
            block_bindings,
            sub_expr_bindings,
        }
    }
}
