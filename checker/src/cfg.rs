// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identifies a basic block of the control flow graph.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockId(pub u32);

/// A `case lo ... hi:` label. Plain `case K:` labels have `lo == hi`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SwitchCase {
    pub lo: i128,
    pub hi: i128,
    pub target: BlockId,
}

/// How control leaves a basic block.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum Terminator {
    /// The block has no successor; reaching its end terminates the path.
    None,
    /// Unconditional transfer.
    Jump(BlockId),
    /// Two way branch on the value of a block level condition expression.
    Branch {
        cond: StmtId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Multi way branch on the value of a block level condition expression.
    Switch {
        cond: StmtId,
        cases: Vec<SwitchCase>,
        default_block: Option<BlockId>,
    },
    /// Computed goto on a block level label valued expression.
    IndirectGoto {
        cond: StmtId,
        targets: Vec<(crate::ast::LabelId, BlockId)>,
    },
}

impl Terminator {
    /// The blocks control may transfer to, in declaration order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::None => vec![],
            Terminator::Jump(b) => vec![*b],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch {
                cases,
                default_block,
                ..
            } => {
                let mut result: Vec<BlockId> = cases.iter().map(|c| c.target).collect();
                if let Some(d) = default_block {
                    result.push(*d);
                }
                result
            }
            Terminator::IndirectGoto { targets, .. } => {
                targets.iter().map(|(_, b)| *b).collect()
            }
        }
    }
}

/// A basic block: sub-expressions and statements in evaluation order,
/// followed by a terminator.
#[derive(Clone, Debug)]
pub struct BasicBlockData {
    pub statements: Vec<StmtId>,
    pub terminator: Terminator,
}

/// The per-function control flow graph handed to the engine by an external
/// builder. Sub-expressions are linearized into the statement lists; the
/// `block_exprs` set records which expression values the CFG requires to
/// survive block boundaries (terminator conditions, short circuit values,
/// return values).
#[derive(Clone, Debug, Default)]
pub struct Cfg {
    blocks: Vec<BasicBlockData>,
    entry: Option<BlockId>,
    block_exprs: HashSet<StmtId>,
    locations: HashMap<StmtId, (BlockId, usize)>,
}

impl Cfg {
    pub fn new() -> Cfg {
        Cfg::default()
    }

    /// Adds an empty block with a `None` terminator and returns its id.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlockData {
            statements: vec![],
            terminator: Terminator::None,
        });
        BlockId((self.blocks.len() - 1) as u32)
    }

    /// Appends a statement to the given block and records its location.
    pub fn push_stmt(&mut self, block: BlockId, stmt: StmtId) {
        let data = &mut self.blocks[block.0 as usize];
        self.locations
            .insert(stmt, (block, data.statements.len()));
        data.statements.push(stmt);
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        if let Terminator::Branch { cond, .. }
        | Terminator::Switch { cond, .. }
        | Terminator::IndirectGoto { cond, .. } = &terminator
        {
            self.block_exprs.insert(*cond);
        }
        self.blocks[block.0 as usize].terminator = terminator;
    }

    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = Some(block);
    }

    /// Marks an expression as block level: its environment binding must
    /// survive across block boundaries.
    pub fn mark_block_expr(&mut self, stmt: StmtId) {
        self.block_exprs.insert(stmt);
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlockData> {
        self.blocks.get(id.0 as usize)
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.block(id)
            .map(|b| b.terminator.successors())
            .unwrap_or_default()
    }

    pub fn is_block_expr(&self, stmt: StmtId) -> bool {
        self.block_exprs.contains(&stmt)
    }

    /// The block and statement index where `stmt` is evaluated.
    pub fn location_of(&self, stmt: StmtId) -> Option<(BlockId, usize)> {
        self.locations.get(&stmt).copied()
    }

    /// The set of blocks reachable from `from`, not including `from` itself
    /// unless it sits on a cycle.
    pub fn reachable_from(&self, from: BlockId) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut worklist = self.successors(from);
        while let Some(b) = worklist.pop() {
            if seen.insert(b) {
                worklist.extend(self.successors(b));
            }
        }
        seen
    }

    /// A structural well-formedness check run once before exploration:
    /// the entry block and every terminator target must exist, and every
    /// statement must have a recorded location.
    pub fn validate(&self) -> Result<(), String> {
        let entry = match self.entry {
            Some(e) => e,
            None => return Err("control flow graph has no entry block".to_owned()),
        };
        if self.block(entry).is_none() {
            return Err(format!("entry block {:?} does not exist", entry));
        }
        for id in self.block_ids() {
            for succ in self.successors(id) {
                if self.block(succ).is_none() {
                    return Err(format!(
                        "block {:?} names a missing successor {:?}",
                        id, succ
                    ));
                }
            }
            let data = &self.blocks[id.0 as usize];
            for stmt in &data.statements {
                match self.locations.get(stmt) {
                    Some((b, _)) if *b == id => {}
                    _ => {
                        return Err(format!(
                            "statement {:?} in block {:?} has a bad location record",
                            stmt, id
                        ));
                    }
                }
            }
            if let Terminator::Switch { cases, .. } = &data.terminator {
                for case in cases {
                    if case.lo > case.hi {
                        return Err(format!(
                            "block {:?} has an empty case range {}..={}",
                            id, case.lo, case.hi
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
