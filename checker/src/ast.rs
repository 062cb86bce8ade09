// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a statement (which, in a linearized CFG, includes every
/// sub-expression) in the statement table of an `AstContext`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StmtId(pub u32);

/// Identifies a type in the type table of an `AstContext`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TypeId(pub u32);

/// Identifies a variable or parameter declaration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarId(pub u32);

/// Identifies a field declaration of a record type.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FieldId(pub u32);

/// Identifies a function declaration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FuncId(pub u32);

/// Identifies a goto label.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LabelId(pub u32);

/// Identifies a string literal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StringId(pub u32);

/// The storage duration and linkage of a variable declaration, as far as the
/// analyzer cares about it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum StorageClass {
    /// An automatic local of the analyzed function.
    Local,
    /// A function local with static storage duration.
    StaticLocal,
    /// A parameter of the analyzed function.
    Param,
    /// A global, known to the whole translation unit.
    Global,
}

/// A variable declaration.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeId,
    pub storage: StorageClass,
}

/// A field declaration belonging to some record type.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeId,
}

/// A function declaration. The body, if any, is not represented; the engine
/// only models calls through the declaration.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FuncDecl {
    pub name: String,
    pub ty: TypeId,
    /// True if the declaration carries a no-return attribute.
    pub no_return: bool,
}

/// The structure of a type, reduced to what the value domain needs.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TypeKind {
    Void,
    /// A (signed or unsigned) integer or character type of the given bit width.
    Integer { width: u32, signed: bool },
    Pointer { pointee: TypeId },
    Array {
        element: TypeId,
        /// None for incomplete and variable length arrays.
        length: Option<u64>,
    },
    Record { name: String, fields: Vec<FieldId> },
    Function { result: TypeId, params: Vec<TypeId> },
}

/// What a decl-ref expression names.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum DeclRef {
    Var(VarId),
    Func(FuncId),
    /// An enumerator; its value is known at parse time.
    EnumConst(i128),
}

/// Unary operators.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum UnaryOp {
    Deref,
    AddressOf,
    Plus,
    Minus,
    BitNot,
    LogicalNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

/// Binary operators. Assignment and compound assignment are separate
/// statement kinds; this enum covers only value-producing operators.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
    Comma,
}

impl BinOp {
    /// True for the six relational operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    /// True for operators whose symbolic combination with one concrete
    /// operand stays tractable.
    pub fn is_additive(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub)
    }

    /// The comparison that holds for swapped operands, if self is a comparison.
    pub fn swapped_comparison(self) -> Option<BinOp> {
        match self {
            BinOp::Lt => Some(BinOp::Gt),
            BinOp::Gt => Some(BinOp::Lt),
            BinOp::Le => Some(BinOp::Ge),
            BinOp::Ge => Some(BinOp::Le),
            BinOp::Eq => Some(BinOp::Eq),
            BinOp::Ne => Some(BinOp::Ne),
            _ => None,
        }
    }

    /// The comparison that holds exactly when self does not, if self is a
    /// comparison.
    pub fn negated_comparison(self) -> Option<BinOp> {
        match self {
            BinOp::Lt => Some(BinOp::Ge),
            BinOp::Gt => Some(BinOp::Le),
            BinOp::Le => Some(BinOp::Gt),
            BinOp::Ge => Some(BinOp::Lt),
            BinOp::Eq => Some(BinOp::Ne),
            BinOp::Ne => Some(BinOp::Eq),
            _ => None,
        }
    }
}

/// The statement-kind discriminator exposed by the AST provider. In the
/// linearized CFG every sub-expression appears as its own statement, in
/// evaluation order, before the statement that consumes it.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum StmtKind {
    IntLiteral { value: i128 },
    CharLiteral { value: char },
    StringLiteral { literal: StringId },
    DeclRef { decl: DeclRef },
    Unary { op: UnaryOp, operand: StmtId },
    Binary { op: BinOp, left: StmtId, right: StmtId },
    Assign { target: StmtId, source: StmtId },
    CompoundAssign { op: BinOp, target: StmtId, source: StmtId },
    Call { callee: StmtId, arguments: Vec<StmtId> },
    Cast { operand: StmtId },
    Member { base: StmtId, field: FieldId, through_pointer: bool },
    ArraySubscript { base: StmtId, index: StmtId },
    Conditional { condition: StmtId, consequent: StmtId, alternate: StmtId },
    Return { value: Option<StmtId> },
    DeclStmt { var: VarId, initializer: Option<StmtId> },
    StmtExpr { result: Option<StmtId> },
    SizeOf { ty: TypeId },
    AddrLabel { label: LabelId },
    InitList { elements: Vec<StmtId> },
    CompoundLiteral { initializer: StmtId },
    Paren { operand: StmtId },
    Nop,
}

impl StmtKind {
    /// A stable name for the kind, used when logging unsupported forms.
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::IntLiteral { .. } => "IntLiteral",
            StmtKind::CharLiteral { .. } => "CharLiteral",
            StmtKind::StringLiteral { .. } => "StringLiteral",
            StmtKind::DeclRef { .. } => "DeclRef",
            StmtKind::Unary { .. } => "Unary",
            StmtKind::Binary { .. } => "Binary",
            StmtKind::Assign { .. } => "Assign",
            StmtKind::CompoundAssign { .. } => "CompoundAssign",
            StmtKind::Call { .. } => "Call",
            StmtKind::Cast { .. } => "Cast",
            StmtKind::Member { .. } => "Member",
            StmtKind::ArraySubscript { .. } => "ArraySubscript",
            StmtKind::Conditional { .. } => "Conditional",
            StmtKind::Return { .. } => "Return",
            StmtKind::DeclStmt { .. } => "DeclStmt",
            StmtKind::StmtExpr { .. } => "StmtExpr",
            StmtKind::SizeOf { .. } => "SizeOf",
            StmtKind::AddrLabel { .. } => "AddrLabel",
            StmtKind::InitList { .. } => "InitList",
            StmtKind::CompoundLiteral { .. } => "CompoundLiteral",
            StmtKind::Paren { .. } => "Paren",
            StmtKind::Nop => "Nop",
        }
    }

    /// The direct sub-expressions of this statement, in evaluation order.
    pub fn children(&self) -> Vec<StmtId> {
        match self {
            StmtKind::Unary { operand, .. }
            | StmtKind::Cast { operand }
            | StmtKind::Paren { operand } => vec![*operand],
            StmtKind::Binary { left, right, .. } => vec![*left, *right],
            StmtKind::Assign { target, source }
            | StmtKind::CompoundAssign { target, source, .. } => vec![*target, *source],
            StmtKind::Call { callee, arguments } => {
                let mut children = vec![*callee];
                children.extend_from_slice(arguments);
                children
            }
            StmtKind::Member { base, .. } => vec![*base],
            StmtKind::ArraySubscript { base, index } => vec![*base, *index],
            StmtKind::Conditional {
                condition,
                consequent,
                alternate,
            } => vec![*condition, *consequent, *alternate],
            StmtKind::Return { value } => value.iter().copied().collect(),
            StmtKind::DeclStmt { initializer, .. } => initializer.iter().copied().collect(),
            StmtKind::StmtExpr { result } => result.iter().copied().collect(),
            StmtKind::InitList { elements } => elements.clone(),
            StmtKind::CompoundLiteral { initializer } => vec![*initializer],
            _ => vec![],
        }
    }
}

/// A statement together with the type of the value it produces. Statements
/// that produce no value carry the void type.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Stmt {
    pub kind: StmtKind,
    pub ty: TypeId,
}

/// The statement, type and declaration tables that an external front end
/// populates and the engine queries. The engine never mutates these.
#[derive(Clone, Debug, Default)]
pub struct AstContext {
    stmts: Vec<Stmt>,
    types: Vec<TypeKind>,
    vars: Vec<VarDecl>,
    fields: Vec<FieldDecl>,
    funcs: Vec<FuncDecl>,
    strings: Vec<String>,
    labels: Vec<String>,
    /// Maps a statement to the statement that consumes its value, if any.
    parents: HashMap<StmtId, StmtId>,
}

impl AstContext {
    pub fn new() -> AstContext {
        AstContext::default()
    }

    /// Adds a type and returns its id. Structural duplicates are collapsed so
    /// that type ids can be compared for equality.
    pub fn add_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(i) = self.types.iter().position(|k| *k == kind) {
            return TypeId(i as u32);
        }
        self.types.push(kind);
        TypeId((self.types.len() - 1) as u32)
    }

    pub fn void_type(&mut self) -> TypeId {
        self.add_type(TypeKind::Void)
    }

    pub fn int_type(&mut self, width: u32, signed: bool) -> TypeId {
        self.add_type(TypeKind::Integer { width, signed })
    }

    pub fn pointer_type(&mut self, pointee: TypeId) -> TypeId {
        self.add_type(TypeKind::Pointer { pointee })
    }

    pub fn add_var(&mut self, name: &str, ty: TypeId, storage: StorageClass) -> VarId {
        self.vars.push(VarDecl {
            name: name.to_owned(),
            ty,
            storage,
        });
        VarId((self.vars.len() - 1) as u32)
    }

    pub fn add_field(&mut self, name: &str, ty: TypeId) -> FieldId {
        self.fields.push(FieldDecl {
            name: name.to_owned(),
            ty,
        });
        FieldId((self.fields.len() - 1) as u32)
    }

    pub fn add_func(&mut self, name: &str, ty: TypeId, no_return: bool) -> FuncId {
        self.funcs.push(FuncDecl {
            name: name.to_owned(),
            ty,
            no_return,
        });
        FuncId((self.funcs.len() - 1) as u32)
    }

    pub fn add_string(&mut self, text: &str) -> StringId {
        self.strings.push(text.to_owned());
        StringId((self.strings.len() - 1) as u32)
    }

    pub fn add_label(&mut self, name: &str) -> LabelId {
        self.labels.push(name.to_owned());
        LabelId((self.labels.len() - 1) as u32)
    }

    /// Adds a statement and records it as the parent of its children.
    pub fn add_stmt(&mut self, kind: StmtKind, ty: TypeId) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        for child in kind.children() {
            self.parents.insert(child, id);
        }
        self.stmts.push(Stmt { kind, ty });
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_type(&self, id: StmtId) -> TypeId {
        self.stmts[id.0 as usize].ty
    }

    /// The statement that consumes the value of `id`, if any.
    pub fn parent_of(&self, id: StmtId) -> Option<StmtId> {
        self.parents.get(&id).copied()
    }

    pub fn type_kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &FieldDecl {
        &self.fields[id.0 as usize]
    }

    pub fn func(&self, id: FuncId) -> &FuncDecl {
        &self.funcs[id.0 as usize]
    }

    pub fn string(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn label_name(&self, id: LabelId) -> &str {
        &self.labels[id.0 as usize]
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// All variable ids, in declaration order.
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len() as u32).map(VarId)
    }

    pub fn is_integer(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Integer { .. })
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Pointer { .. })
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Array { .. })
    }

    pub fn is_record(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Record { .. })
    }

    pub fn is_void(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Void)
    }

    /// True if the type is an aggregate the flat store will not track.
    pub fn is_aggregate(&self, ty: TypeId) -> bool {
        self.is_array(ty) || self.is_record(ty)
    }

    pub fn is_unsigned(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::Integer { signed: false, .. })
    }

    pub fn integer_width(&self, ty: TypeId) -> Option<(u32, bool)> {
        match self.type_kind(ty) {
            TypeKind::Integer { width, signed } => Some((*width, *signed)),
            _ => None,
        }
    }

    pub fn pointee_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Array { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// The size of a type in bytes, if it is known. Pointers are 8 bytes.
    pub fn type_size_bytes(&self, ty: TypeId) -> Option<u64> {
        match self.type_kind(ty) {
            TypeKind::Void => None,
            TypeKind::Integer { width, .. } => Some(u64::from(*width / 8).max(1)),
            TypeKind::Pointer { .. } | TypeKind::Function { .. } => Some(8),
            TypeKind::Array { element, length } => {
                let elem = self.type_size_bytes(*element)?;
                length.map(|n| elem * n)
            }
            TypeKind::Record { fields, .. } => {
                let mut total = 0;
                for f in fields {
                    total += self.type_size_bytes(self.field(*f).ty)?;
                }
                Some(total)
            }
        }
    }
}
