// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

/// The categories a sink node can be tagged with. The engine witnesses a
/// defect on some feasible looking path; rendering diagnostics from these
/// tags is the consumer's job.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum DefectKind {
    NullDeref,
    UndefDeref,
    UndefStore,
    UndefControlFlow,
    ExplicitBadDivide,
    ImplicitBadDivide,
    UndefResult,
    BadCall,
    UndefArg,
    NoReturnCall,
    DoubleFree,
    UseAfterFree,
    MemoryLeak,
    BadFree,
    TaintReachesSink,
}

impl DefectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DefectKind::NullDeref => "null-deref",
            DefectKind::UndefDeref => "undef-deref",
            DefectKind::UndefStore => "undef-store",
            DefectKind::UndefControlFlow => "undef-control-flow",
            DefectKind::ExplicitBadDivide => "explicit-bad-divide",
            DefectKind::ImplicitBadDivide => "implicit-bad-divide",
            DefectKind::UndefResult => "undef-result",
            DefectKind::BadCall => "bad-call",
            DefectKind::UndefArg => "undef-arg",
            DefectKind::NoReturnCall => "no-return-call",
            DefectKind::DoubleFree => "double-free",
            DefectKind::UseAfterFree => "use-after-free",
            DefectKind::MemoryLeak => "memory-leak",
            DefectKind::BadFree => "bad-free",
            DefectKind::TaintReachesSink => "taint-reaches-sink",
        }
    }
}

impl Display for DefectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.as_str().fmt(f)
    }
}
