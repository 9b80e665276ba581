//! Per-expression resolution results.

use std::hash::Hash;
use std::sync::Arc;

use peek_ir::{ExprId, Type};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{DeclId, ScopeId};

/// What a name or `this` expression refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A declared value, parameter or function.
    Decl(DeclId),
    /// The receiver of the given function or lambda.
    Receiver(DeclId),
}

/// Free functions provided by the runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `println(value)`.
    Println,
    /// `error(message)`; throws.
    Error,
}

/// Members available on every value of a primitive type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberBuiltin {
    /// `str.length`.
    Length,
    /// `value.toString()`.
    ToString,
}

/// How a call expression is dispatched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Top-level function; for method-call syntax the receiver is the first
    /// argument.
    Static(DeclId),
    /// Inline top-level function; its body is expanded at the call site.
    Inline(DeclId),
    /// Local function called by name.
    LocalFunction(DeclId),
    /// Invocation of a function-typed value computed by the callee
    /// expression.
    Closure,
    Builtin(Builtin),
    Member(MemberBuiltin),
}

/// A value a closure carries from its defining frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capture {
    Value(DeclId),
    /// The receiver of the given function or lambda.
    Receiver(DeclId),
}

fn lookup<'a, K: Eq + Hash, V>(
    own: &'a FxHashMap<K, V>,
    parent: Option<&'a Bindings>,
    key: &K,
    select: impl Fn(&'a Bindings) -> &'a FxHashMap<K, V>,
) -> Option<&'a V> {
    own.get(key)
        .or_else(|| parent.and_then(|p| lookup(select(p), p.parent.as_deref(), key, select)))
}

/// Side tables filled in by the resolver, layered like the declaration table
/// so a fragment sees the program's bindings as well as its own.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    parent: Option<Arc<Bindings>>,
    pub(crate) references: FxHashMap<ExprId, Reference>,
    /// Scope each reference expression appears in.
    pub(crate) ref_scopes: FxHashMap<ExprId, ScopeId>,
    pub(crate) types: FxHashMap<ExprId, Type>,
    pub(crate) calls: FxHashMap<ExprId, CallKind>,
    /// `Member` expressions resolved to a primitive member.
    pub(crate) members: FxHashMap<ExprId, MemberBuiltin>,
    /// Declaration introduced by a `Let`, `LocalFun` or `Lambda` node.
    pub(crate) definitions: FxHashMap<ExprId, DeclId>,
    /// Parameter declarations of every function and lambda, in order.
    pub(crate) params: FxHashMap<DeclId, Vec<DeclId>>,
    /// Values captured by each local function and non-inlined lambda, in
    /// order of first use.
    pub(crate) captures: FxHashMap<DeclId, Vec<Capture>>,
    /// Mutable locals captured by a closure; they live in a shared box.
    pub(crate) boxed: FxHashSet<DeclId>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layered(parent: Arc<Bindings>) -> Self {
        Bindings {
            parent: Some(parent),
            ..Self::default()
        }
    }

    fn parent(&self) -> Option<&Bindings> {
        self.parent.as_deref()
    }

    pub fn reference(&self, id: ExprId) -> Option<Reference> {
        lookup(&self.references, self.parent(), &id, |b| &b.references).copied()
    }

    pub fn reference_scope(&self, id: ExprId) -> Option<ScopeId> {
        lookup(&self.ref_scopes, self.parent(), &id, |b| &b.ref_scopes).copied()
    }

    pub fn type_of(&self, id: ExprId) -> Option<&Type> {
        lookup(&self.types, self.parent(), &id, |b| &b.types)
    }

    pub fn call(&self, id: ExprId) -> Option<CallKind> {
        lookup(&self.calls, self.parent(), &id, |b| &b.calls).copied()
    }

    pub fn member(&self, id: ExprId) -> Option<MemberBuiltin> {
        lookup(&self.members, self.parent(), &id, |b| &b.members).copied()
    }

    pub fn definition(&self, id: ExprId) -> Option<DeclId> {
        lookup(&self.definitions, self.parent(), &id, |b| &b.definitions).copied()
    }

    pub fn params(&self, decl: DeclId) -> &[DeclId] {
        lookup(&self.params, self.parent(), &decl, |b| &b.params)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn captures(&self, decl: DeclId) -> &[Capture] {
        lookup(&self.captures, self.parent(), &decl, |b| &b.captures)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_boxed(&self, decl: DeclId) -> bool {
        self.boxed.contains(&decl) || self.parent().is_some_and(|p| p.is_boxed(decl))
    }

    /// Reference expressions recorded in this layer, in no particular order.
    pub fn own_references(&self) -> impl Iterator<Item = (ExprId, Reference)> + '_ {
        self.references.iter().map(|(id, r)| (*id, *r))
    }

    pub(crate) fn add_capture(&mut self, closure: DeclId, capture: Capture) {
        let list = self.captures.entry(closure).or_default();
        if !list.contains(&capture) {
            list.push(capture);
        }
    }
}
