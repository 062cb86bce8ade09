// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt::{Display, Formatter};

/// Analyzer internal failures. Defects in the analyzed code are never
/// reported this way; they become sink nodes in the exploded graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AnalysisError {
    /// A statement form the transfer layer does not model. Recoverable: the
    /// engine logs it once per kind and propagates the state unchanged.
    Unsupported { kind: &'static str },
    /// An internal interning or bookkeeping invariant was broken. Fatal for
    /// the analysis of the current function.
    InvariantViolation { message: String },
    /// The control flow graph handed to the engine is malformed. Fatal for
    /// the analysis of the current function.
    CfgMalformed { message: String },
}

impl AnalysisError {
    pub fn invariant(message: impl Into<String>) -> AnalysisError {
        AnalysisError::InvariantViolation {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> AnalysisError {
        AnalysisError::CfgMalformed {
            message: message.into(),
        }
    }
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Unsupported { kind } => {
                write!(f, "unsupported statement kind: {kind}")
            }
            AnalysisError::InvariantViolation { message } => {
                write!(f, "invariant violation: {message}")
            }
            AnalysisError::CfgMalformed { message } => {
                write!(f, "malformed control flow graph: {message}")
            }
        }
    }
}

impl std::error::Error for AnalysisError {}
