//! Declarations and the declaration table.

use std::sync::Arc;

use peek_ir::{ExprId, Name, Span, Type};

use crate::ScopeId;

/// Index into a [`DeclTable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclId(u32);

impl DeclId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        DeclId(index)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Top-level, visible to every compilation unit.
    Public,
    /// Top-level, visible only inside the program's own unit.
    Private,
    /// Locals, parameters, local functions and lambdas.
    Local,
}

/// Which compilation unit introduced a declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Program,
    Fragment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclKind {
    /// Top-level function; `index` is its position in `Module::functions`.
    Function { inline: bool, index: usize },
    /// Function declared inside a block. `expr` is the `LocalFun` node.
    LocalFunction { expr: ExprId },
    /// `val` / `var`.
    Local,
    /// Parameter of a function, local function or lambda.
    Parameter,
    /// A function literal. `expr` is the `Lambda` node.
    Lambda {
        inline: bool,
        label: Option<Name>,
        expr: ExprId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// For lambdas: the explicit label, else the name of the function the
    /// lambda is passed to, else `lambda`.
    pub name: Name,
    pub kind: DeclKind,
    /// Value type. Functions and lambdas carry their function type,
    /// including the receiver if any.
    pub ty: Type,
    pub visibility: Visibility,
    pub origin: Origin,
    /// Scope the declaration is introduced into.
    pub scope: ScopeId,
    /// For functions and lambdas: the scope of their body.
    pub body_scope: Option<ScopeId>,
    pub span: Span,
    pub mutable: bool,
}

impl Declaration {
    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Function { .. } | DeclKind::LocalFunction { .. } | DeclKind::Lambda { .. }
        )
    }

    /// Receiver type, for extension functions and lambdas with a receiver.
    pub fn receiver_type(&self) -> Option<&Type> {
        if !self.is_callable() {
            return None;
        }
        self.ty.as_function().and_then(|f| f.receiver.as_ref())
    }

    pub fn is_inline_function(&self) -> bool {
        matches!(self.kind, DeclKind::Function { inline: true, .. })
    }
}

/// Append-only declaration storage, optionally layered over a frozen parent.
#[derive(Clone, Debug, Default)]
pub struct DeclTable {
    parent: Option<Arc<DeclTable>>,
    base: u32,
    decls: Vec<Declaration>,
}

impl DeclTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layered(parent: Arc<DeclTable>) -> Self {
        let base = parent.end();
        DeclTable {
            parent: Some(parent),
            base,
            decls: Vec::new(),
        }
    }

    fn end(&self) -> u32 {
        self.base + u32::try_from(self.decls.len()).unwrap_or(u32::MAX - self.base)
    }

    pub fn push(&mut self, decl: Declaration) -> DeclId {
        let id = DeclId::new(self.end());
        self.decls.push(decl);
        id
    }

    /// # Panics
    /// Panics if `id` does not belong to this table chain.
    pub fn get(&self, id: DeclId) -> &Declaration {
        if id.raw() >= self.base {
            return &self.decls[(id.raw() - self.base) as usize];
        }
        match &self.parent {
            Some(parent) => parent.get(id),
            None => panic!("{id:?} is not part of this declaration table"),
        }
    }

    /// Mutable access to a declaration of this layer.
    pub(crate) fn get_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        let index = id.raw().checked_sub(self.base)?;
        self.decls.get_mut(index as usize)
    }

    /// Declarations of this layer only, with their IDs.
    pub fn iter_own(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        let base = self.base;
        self.decls
            .iter()
            .enumerate()
            .map(move |(i, d)| (DeclId::new(base + u32::try_from(i).unwrap_or(0)), d))
    }
}
