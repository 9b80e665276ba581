//! Lexical scope tree.

use std::sync::Arc;

use crate::DeclId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        ScopeId(index)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    TopLevel,
    /// Body of a top-level function.
    Function(DeclId),
    /// Body of a local function. Always compiled as a separate closure.
    LocalFunction(DeclId),
    /// Body of a lambda; inlined lambdas are compiled into their caller.
    Lambda { decl: DeclId, inline: bool },
    Block,
    /// Root scope of a debugger fragment, parented to the breakpoint's scope.
    Fragment,
}

impl ScopeKind {
    /// Whether code in this scope runs in a frame of its own.
    pub fn is_closure_boundary(self) -> bool {
        matches!(
            self,
            ScopeKind::LocalFunction(_) | ScopeKind::Lambda { inline: false, .. }
        )
    }

    /// The function or lambda owning this scope's frame.
    pub fn owner(self) -> Option<DeclId> {
        match self {
            ScopeKind::Function(decl)
            | ScopeKind::LocalFunction(decl)
            | ScopeKind::Lambda { decl, .. } => Some(decl),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScopeData {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
}

/// Scope storage, layered like [`DeclTable`](crate::DeclTable).
#[derive(Clone, Debug, Default)]
pub struct ScopeTree {
    parent: Option<Arc<ScopeTree>>,
    base: u32,
    scopes: Vec<ScopeData>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layered(parent: Arc<ScopeTree>) -> Self {
        let base = parent.end();
        ScopeTree {
            parent: Some(parent),
            base,
            scopes: Vec::new(),
        }
    }

    fn end(&self) -> u32 {
        self.base + u32::try_from(self.scopes.len()).unwrap_or(u32::MAX - self.base)
    }

    pub fn push(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId::new(self.end());
        self.scopes.push(ScopeData { kind, parent });
        id
    }

    /// # Panics
    /// Panics if `id` does not belong to this tree chain.
    pub fn get(&self, id: ScopeId) -> ScopeData {
        if id.raw() >= self.base {
            return self.scopes[(id.raw() - self.base) as usize];
        }
        match &self.parent {
            Some(parent) => parent.get(id),
            None => panic!("{id:?} is not part of this scope tree"),
        }
    }

    pub fn kind(&self, id: ScopeId) -> ScopeKind {
        self.get(id).kind
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).parent
    }

    /// Scopes from `from` up to the root, `from` first.
    pub fn ancestors(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(from), move |&id| self.parent(id))
    }

    pub fn is_ancestor_or_self(&self, ancestor: ScopeId, of: ScopeId) -> bool {
        self.ancestors(of).any(|id| id == ancestor)
    }

    /// Closure boundaries strictly between `from` (inclusive) and `to`
    /// (exclusive), innermost first. If `to` is not an ancestor of `from`
    /// the walk runs to the root.
    pub fn closures_between(&self, from: ScopeId, to: ScopeId) -> Vec<ScopeId> {
        self.ancestors(from)
            .take_while(|&id| id != to)
            .filter(|&id| self.kind(id).is_closure_boundary())
            .collect()
    }

    /// Whether walking from `from` up to `to` leaves a non-inlined lambda or
    /// a local function.
    pub fn crosses_closure_boundary(&self, from: ScopeId, to: ScopeId) -> bool {
        !self.closures_between(from, to).is_empty()
    }

    /// Nearest enclosing scope that owns a frame (function, local function
    /// or non-inlined lambda).
    pub fn frame_owner(&self, from: ScopeId) -> Option<DeclId> {
        self.ancestors(from).find_map(|id| match self.kind(id) {
            ScopeKind::Function(decl) | ScopeKind::LocalFunction(decl) => Some(decl),
            ScopeKind::Lambda {
                decl,
                inline: false,
            } => Some(decl),
            _ => None,
        })
    }
}
