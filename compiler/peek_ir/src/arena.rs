//! Expression arena.

use std::sync::Arc;

use crate::{Expr, ExprId, ExprKind, Span};

/// Contiguous storage for expressions.
///
/// An arena may be layered over a frozen parent arena: IDs below `base`
/// belong to the parent chain and IDs from `base` upward belong to this
/// arena. A fragment arena is layered over the program arena it is
/// evaluated against.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    parent: Option<Arc<ExprArena>>,
    base: u32,
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty arena whose IDs continue after `parent`'s.
    pub fn layered(parent: Arc<ExprArena>) -> Self {
        let base = parent.end();
        ExprArena {
            parent: Some(parent),
            base,
            exprs: Vec::new(),
        }
    }

    /// One past the highest ID allocated in this arena or its parents.
    pub fn end(&self) -> u32 {
        self.base + u32::try_from(self.exprs.len()).unwrap_or(u32::MAX - self.base)
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.end());
        self.exprs.push(expr);
        id
    }

    pub fn alloc_kind(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.alloc(Expr::new(kind, span))
    }

    /// Whether `id` was allocated in this layer rather than a parent.
    pub fn owns(&self, id: ExprId) -> bool {
        id.raw() >= self.base && id.raw() < self.end()
    }

    pub fn parent(&self) -> Option<&Arc<ExprArena>> {
        self.parent.as_ref()
    }

    /// Get an expression from this arena or any parent layer.
    ///
    /// # Panics
    /// Panics if the ID was not allocated in this arena chain.
    pub fn get(&self, id: ExprId) -> &Expr {
        let mut arena = self;
        loop {
            if id.raw() >= arena.base {
                return &arena.exprs[(id.raw() - arena.base) as usize];
            }
            match &arena.parent {
                Some(parent) => arena = parent.as_ref(),
                None => panic!("{id:?} is not part of this arena"),
            }
        }
    }

    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.get(id).kind
    }

    #[inline]
    pub fn span(&self, id: ExprId) -> Span {
        self.get(id).span
    }

    /// Number of expressions in this layer only.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}
