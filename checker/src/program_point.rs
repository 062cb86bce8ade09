// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use crate::cfg::BlockId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

/// Where in the control flow graph an exploded node sits. Together with an
/// interned state id this is the identity of the node.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ProgramPoint {
    /// Control is transferring along the edge src -> dst.
    BlockEdge(BlockId, BlockId),
    /// Control is about to enter the block.
    BlockEntrance(BlockId),
    /// The statement is about to be processed.
    PreStmt(StmtId),
    /// The statement has been processed.
    PostStmt(StmtId),
    /// Control has reached the end of a block with no successor.
    BlockExit(BlockId),
}

impl Display for ProgramPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ProgramPoint::BlockEdge(src, dst) => write!(f, "edge B{} -> B{}", src.0, dst.0),
            ProgramPoint::BlockEntrance(b) => write!(f, "enter B{}", b.0),
            ProgramPoint::PreStmt(s) => write!(f, "pre s{}", s.0),
            ProgramPoint::PostStmt(s) => write!(f, "post s{}", s.0),
            ProgramPoint::BlockExit(b) => write!(f, "exit B{}", b.0),
        }
    }
}
