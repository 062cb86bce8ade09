// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::BinOp;
use crate::symbols::SymbolId;
use log_derive::logfn_inputs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result};

/// A stable reference to an interned integer value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IntId(pub u32);

/// A stable reference to an interned symbolic comparison.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConstraintId(pub u32);

/// The width of the C `int` type assumed by the analyzer; relational
/// operators produce values of this type.
pub const INT_WIDTH: u32 = 32;

/// An integer with an explicit bit width and signedness. The payload holds
/// the two's complement bit pattern truncated to `width` bits, so equal
/// value, width and signedness have equal representation; interning depends
/// on this.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IntValue {
    bits: u128,
    pub width: u32,
    pub signed: bool,
}

impl IntValue {
    fn mask(width: u32) -> u128 {
        if width >= 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        }
    }

    pub fn from_i128(value: i128, width: u32, signed: bool) -> IntValue {
        IntValue {
            bits: (value as u128) & Self::mask(width),
            width,
            signed,
        }
    }

    pub fn as_unsigned(&self) -> u128 {
        self.bits
    }

    /// The represented value, sign extended when the type is signed.
    pub fn as_i128(&self) -> i128 {
        if self.signed && self.width < 128 && (self.bits >> (self.width - 1)) & 1 == 1 {
            (self.bits | !Self::mask(self.width)) as i128
        } else {
            self.bits as i128
        }
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    /// Reinterprets the value with a new width and signedness: the value is
    /// read under the old signedness and re-truncated, which widens by sign
    /// or zero extension and narrows by truncation.
    pub fn convert(&self, width: u32, signed: bool) -> IntValue {
        IntValue::from_i128(self.as_i128(), width, signed)
    }
}

impl Debug for IntValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for IntValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.signed {
            write!(f, "{}", self.as_i128())
        } else {
            write!(f, "{}U", self.as_unsigned())
        }
    }
}

/// An interned "symbol op constant" fact, referenced by
/// `NonLoc::SymIntConstraint` values and consumed by the constraint manager.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConstraintData {
    pub sym: SymbolId,
    pub op: BinOp,
    pub rhs: IntId,
}

/// Interns integers and symbolic comparisons and evaluates concrete integer
/// arithmetic. Single writer, single reader: one factory belongs to one
/// engine and is dropped wholesale with it.
#[derive(Default)]
pub struct BasicValueFactory {
    ints: Vec<IntValue>,
    int_index: HashMap<IntValue, IntId>,
    constraints: Vec<ConstraintData>,
    constraint_index: HashMap<ConstraintData, ConstraintId>,
}

impl Debug for BasicValueFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Debug::fmt("BasicValueFactory", f)
    }
}

impl BasicValueFactory {
    pub fn new() -> BasicValueFactory {
        BasicValueFactory::default()
    }

    /// Interns an integer; structurally equal integers share one id.
    #[logfn_inputs(TRACE)]
    pub fn intern_int(&mut self, value: i128, width: u32, signed: bool) -> IntId {
        self.intern_value(IntValue::from_i128(value, width, signed))
    }

    pub fn intern_value(&mut self, value: IntValue) -> IntId {
        if let Some(id) = self.int_index.get(&value) {
            return *id;
        }
        let id = IntId(self.ints.len() as u32);
        self.ints.push(value);
        self.int_index.insert(value, id);
        id
    }

    pub fn int(&self, id: IntId) -> &IntValue {
        &self.ints[id.0 as usize]
    }

    /// The interned 0 or 1 of `int` type produced by relational operators.
    pub fn bool_int(&mut self, value: bool) -> IntId {
        self.intern_int(i128::from(value), INT_WIDTH, true)
    }

    /// Interns a symbolic comparison; structurally equal facts share one id.
    #[logfn_inputs(TRACE)]
    pub fn intern_constraint(&mut self, sym: SymbolId, op: BinOp, rhs: IntId) -> ConstraintId {
        let data = ConstraintData { sym, op, rhs };
        if let Some(id) = self.constraint_index.get(&data) {
            return *id;
        }
        let id = ConstraintId(self.constraints.len() as u32);
        self.constraints.push(data);
        self.constraint_index.insert(data, id);
        id
    }

    pub fn constraint(&self, id: ConstraintId) -> &ConstraintData {
        &self.constraints[id.0 as usize]
    }

    /// Widens two operands to a common representation: the wider operand's
    /// width, the left operand's signedness.
    fn widen(&self, left: IntId, right: IntId) -> (IntValue, IntValue) {
        let l = *self.int(left);
        let r = *self.int(right);
        let width = l.width.max(r.width);
        (l.convert(width, l.signed), r.convert(width, l.signed))
    }

    /// Evaluates a binary operator over two interned integers. Returns None
    /// when the result is not representable: division or remainder by zero,
    /// or a shift count outside `[0, width)`.
    #[logfn_inputs(TRACE)]
    pub fn evaluate(&mut self, op: BinOp, left: IntId, right: IntId) -> Option<IntId> {
        let (l, r) = self.widen(left, right);
        let width = l.width;
        let signed = l.signed;
        if op.is_comparison() {
            let outcome = if signed {
                let (a, b) = (l.as_i128(), r.as_i128());
                Self::compare(op, a.cmp(&b))
            } else {
                let (a, b) = (l.as_unsigned(), r.as_unsigned());
                Self::compare(op, a.cmp(&b))
            };
            return Some(self.bool_int(outcome));
        }
        let result: i128 = match op {
            BinOp::Add => l.as_i128().wrapping_add(r.as_i128()),
            BinOp::Sub => l.as_i128().wrapping_sub(r.as_i128()),
            BinOp::Mul => l.as_i128().wrapping_mul(r.as_i128()),
            BinOp::Div => {
                if r.is_zero() {
                    return None;
                }
                if signed {
                    l.as_i128().wrapping_div(r.as_i128())
                } else {
                    (l.as_unsigned() / r.as_unsigned()) as i128
                }
            }
            BinOp::Rem => {
                if r.is_zero() {
                    return None;
                }
                if signed {
                    l.as_i128().wrapping_rem(r.as_i128())
                } else {
                    (l.as_unsigned() % r.as_unsigned()) as i128
                }
            }
            BinOp::Shl => {
                let count = r.as_i128();
                if count < 0 || count >= i128::from(width) {
                    return None;
                }
                ((l.as_unsigned() << count) & IntValue::mask(width)) as i128
            }
            BinOp::Shr => {
                let count = r.as_i128();
                if count < 0 || count >= i128::from(width) {
                    return None;
                }
                if signed {
                    l.as_i128() >> count
                } else {
                    (l.as_unsigned() >> count) as i128
                }
            }
            BinOp::BitAnd => (l.as_unsigned() & r.as_unsigned()) as i128,
            BinOp::BitOr => (l.as_unsigned() | r.as_unsigned()) as i128,
            BinOp::BitXor => (l.as_unsigned() ^ r.as_unsigned()) as i128,
            // Short circuit and sequencing operators never reach the
            // arithmetic primitive; the CFG evaluates them.
            BinOp::LogicalAnd | BinOp::LogicalOr | BinOp::Comma => return None,
            _ => return None,
        };
        Some(self.intern_value(IntValue::from_i128(result, width, signed)))
    }

    fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match op {
            BinOp::Lt => ordering == Less,
            BinOp::Le => ordering != Greater,
            BinOp::Gt => ordering == Greater,
            BinOp::Ge => ordering != Less,
            BinOp::Eq => ordering == Equal,
            BinOp::Ne => ordering != Equal,
            _ => false,
        }
    }
}
