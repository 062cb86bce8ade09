// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::{AstContext, FieldId, FuncId, StmtId, StorageClass, StringId, TypeId, TypeKind, VarId};
use crate::basic_values::BasicValueFactory;
use crate::sval::{NonLoc, SVal};
use crate::symbols::SymbolId;
use log_derive::logfn_inputs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};

/// A stable reference to an interned memory region.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RegionId(pub u32);

/// The memory space a region chain is anchored in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum MemSpace {
    Stack,
    Heap,
    Globals,
    Code,
    Unknown,
}

/// The structure of a region. Every region except a space anchor has a
/// parent; a region is a sub-region of R exactly when the parent chain from
/// it reaches R, and its memory space is the terminal anchor of that chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegionData {
    Space(MemSpace),
    /// The region of a declared variable.
    Var { decl: VarId, parent: RegionId },
    /// A field of the record stored in `parent`.
    Field { decl: FieldId, parent: RegionId },
    /// An element of the array stored in `parent`.
    Element {
        element_ty: TypeId,
        index: SVal,
        parent: RegionId,
    },
    /// Memory known only through a symbol, e.g. the pointee of an unknown
    /// pointer parameter or a heap block returned by an allocator.
    Symbolic { sym: SymbolId, parent: RegionId },
    /// The storage of a string literal.
    StringLit { literal: StringId, parent: RegionId },
    /// The unnamed object introduced by a compound literal expression.
    CompoundLiteral { expr: StmtId, parent: RegionId },
    /// A stack block produced by `alloca` at a specific visitation.
    Alloca {
        expr: StmtId,
        count: u32,
        parent: RegionId,
    },
    /// A view of `parent` at an unrelated type, produced by pointer casts.
    TypedView { view_ty: TypeId, parent: RegionId },
    /// The code of a function, for function pointers.
    Code { func: FuncId, parent: RegionId },
}

impl RegionData {
    pub fn parent(&self) -> Option<RegionId> {
        match self {
            RegionData::Space(..) => None,
            RegionData::Var { parent, .. }
            | RegionData::Field { parent, .. }
            | RegionData::Element { parent, .. }
            | RegionData::Symbolic { parent, .. }
            | RegionData::StringLit { parent, .. }
            | RegionData::CompoundLiteral { parent, .. }
            | RegionData::Alloca { parent, .. }
            | RegionData::TypedView { parent, .. }
            | RegionData::Code { parent, .. } => Some(*parent),
        }
    }
}

/// Interns the typed tree of memory regions. Equal (variant, payload,
/// parent) triples yield the same region id; the parent chain is finite by
/// construction.
pub struct RegionFactory {
    table: Vec<RegionData>,
    index: HashMap<RegionData, RegionId>,
    stack: RegionId,
    heap: RegionId,
    globals: RegionId,
    code: RegionId,
    unknown: RegionId,
}

impl Debug for RegionFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "RegionFactory".fmt(f)
    }
}

impl Default for RegionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionFactory {
    pub fn new() -> RegionFactory {
        let mut factory = RegionFactory {
            table: vec![],
            index: HashMap::new(),
            stack: RegionId(0),
            heap: RegionId(0),
            globals: RegionId(0),
            code: RegionId(0),
            unknown: RegionId(0),
        };
        factory.stack = factory.intern(RegionData::Space(MemSpace::Stack));
        factory.heap = factory.intern(RegionData::Space(MemSpace::Heap));
        factory.globals = factory.intern(RegionData::Space(MemSpace::Globals));
        factory.code = factory.intern(RegionData::Space(MemSpace::Code));
        factory.unknown = factory.intern(RegionData::Space(MemSpace::Unknown));
        factory
    }

    fn intern(&mut self, data: RegionData) -> RegionId {
        if let Some(id) = self.index.get(&data) {
            return *id;
        }
        let id = RegionId(self.table.len() as u32);
        self.table.push(data.clone());
        self.index.insert(data, id);
        id
    }

    pub fn data(&self, id: RegionId) -> &RegionData {
        &self.table[id.0 as usize]
    }

    pub fn space(&self, space: MemSpace) -> RegionId {
        match space {
            MemSpace::Stack => self.stack,
            MemSpace::Heap => self.heap,
            MemSpace::Globals => self.globals,
            MemSpace::Code => self.code,
            MemSpace::Unknown => self.unknown,
        }
    }

    /// The region of a declared variable, anchored by its storage class.
    #[logfn_inputs(TRACE)]
    pub fn var_region(&mut self, decl: VarId, ast: &AstContext) -> RegionId {
        let parent = match ast.var(decl).storage {
            StorageClass::Local | StorageClass::Param => self.stack,
            StorageClass::StaticLocal | StorageClass::Global => self.globals,
        };
        self.intern(RegionData::Var { decl, parent })
    }

    pub fn field_region(&mut self, decl: FieldId, parent: RegionId) -> RegionId {
        self.intern(RegionData::Field { decl, parent })
    }

    pub fn element_region(
        &mut self,
        element_ty: TypeId,
        index: SVal,
        parent: RegionId,
    ) -> RegionId {
        self.intern(RegionData::Element {
            element_ty,
            index,
            parent,
        })
    }

    pub fn symbolic_region(&mut self, sym: SymbolId, space: MemSpace) -> RegionId {
        let parent = self.space(space);
        self.intern(RegionData::Symbolic { sym, parent })
    }

    pub fn string_region(&mut self, literal: StringId) -> RegionId {
        let parent = self.globals;
        self.intern(RegionData::StringLit { literal, parent })
    }

    pub fn compound_literal_region(&mut self, expr: StmtId) -> RegionId {
        let parent = self.stack;
        self.intern(RegionData::CompoundLiteral { expr, parent })
    }

    pub fn alloca_region(&mut self, expr: StmtId, count: u32) -> RegionId {
        let parent = self.stack;
        self.intern(RegionData::Alloca {
            expr,
            count,
            parent,
        })
    }

    pub fn typed_view_region(&mut self, view_ty: TypeId, parent: RegionId) -> RegionId {
        self.intern(RegionData::TypedView { view_ty, parent })
    }

    pub fn code_region(&mut self, func: FuncId) -> RegionId {
        let parent = self.code;
        self.intern(RegionData::Code { func, parent })
    }

    /// Walks the parent chain to its memory space anchor.
    pub fn memory_space(&self, mut id: RegionId) -> MemSpace {
        loop {
            match self.data(id) {
                RegionData::Space(space) => return *space,
                other => id = other.parent().expect("non space regions have parents"),
            }
        }
    }

    /// The outermost region under the space anchor: the variable, symbolic
    /// block, literal or code region the chain is built over.
    pub fn base_region(&self, mut id: RegionId) -> RegionId {
        loop {
            let data = self.data(id);
            match data.parent() {
                None => return id,
                Some(parent) => {
                    if matches!(self.data(parent), RegionData::Space(..)) {
                        return id;
                    }
                    id = parent;
                }
            }
        }
    }

    /// True when the parent chain from `id` reaches `ancestor`.
    pub fn is_sub_region_of(&self, mut id: RegionId, ancestor: RegionId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.data(id).parent() {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// The symbol a region chain is rooted in, if any.
    pub fn region_symbol(&self, id: RegionId) -> Option<SymbolId> {
        match self.data(self.base_region(id)) {
            RegionData::Symbolic { sym, .. } => Some(*sym),
            _ => None,
        }
    }

    /// The type of the value stored in the region, where the region itself
    /// determines it. Symbolic regions are resolved by the value factory,
    /// which knows the symbol's type.
    pub fn value_type(&self, id: RegionId, ast: &AstContext) -> Option<TypeId> {
        match self.data(id) {
            RegionData::Var { decl, .. } => Some(ast.var(*decl).ty),
            RegionData::Field { decl, .. } => Some(ast.field(*decl).ty),
            RegionData::Element { element_ty, .. } => Some(*element_ty),
            RegionData::TypedView { view_ty, .. } => Some(*view_ty),
            RegionData::CompoundLiteral { expr, .. } => Some(ast.stmt_type(*expr)),
            _ => None,
        }
    }

    /// Strips the typed wrappers pointer casts may have piled on a region.
    fn strip_views(&self, mut id: RegionId) -> RegionId {
        loop {
            match self.data(id) {
                RegionData::TypedView { parent, .. } | RegionData::Element { parent, .. } => {
                    id = *parent;
                }
                _ => return id,
            }
        }
    }

    /// Implements pointer casts over regions:
    /// - a cast to `void*` strips `TypedView`/`Element` wrappers;
    /// - a cast to pointer-to-integer attaches a zero index `Element` over
    ///   the stripped base;
    /// - a cast between unrelated pointer types wraps the stripped base in a
    ///   `TypedView`.
    #[logfn_inputs(TRACE)]
    pub fn cast_region(
        &mut self,
        id: RegionId,
        target_pointee: TypeId,
        ast: &AstContext,
        basic_values: &mut BasicValueFactory,
    ) -> RegionId {
        let base = self.strip_views(id);
        match ast.type_kind(target_pointee) {
            TypeKind::Void => base,
            TypeKind::Integer { .. } => {
                let zero = basic_values.intern_int(0, 64, false);
                self.element_region(target_pointee, SVal::NonLoc(NonLoc::ConcreteInt(zero)), base)
            }
            _ => {
                if self.value_type(base, ast) == Some(target_pointee) {
                    base
                } else {
                    self.typed_view_region(target_pointee, base)
                }
            }
        }
    }

    /// A short human readable rendering used by the graph exports.
    pub fn describe(&self, id: RegionId, ast: &AstContext) -> String {
        match self.data(id) {
            RegionData::Space(space) => format!("{space:?}"),
            RegionData::Var { decl, .. } => ast.var(*decl).name.clone(),
            RegionData::Field { decl, parent } => {
                format!("{}.{}", self.describe(*parent, ast), ast.field(*decl).name)
            }
            RegionData::Element { parent, .. } => {
                format!("{}[..]", self.describe(*parent, ast))
            }
            RegionData::Symbolic { sym, .. } => format!("sym{}", sym.0),
            RegionData::StringLit { literal, .. } => format!("{:?}", ast.string(*literal)),
            RegionData::CompoundLiteral { expr, .. } => format!("compound@s{}", expr.0),
            RegionData::Alloca { expr, count, .. } => {
                format!("alloca@s{}#{}", expr.0, count)
            }
            RegionData::TypedView { parent, .. } => {
                format!("view({})", self.describe(*parent, ast))
            }
            RegionData::Code { func, .. } => ast.func(*func).name.clone(),
        }
    }
}
