//! Lexical environments and breakpoint context snapshots.

use peek_ir::{Name, Type};
use rustc_hash::FxHashMap;

use crate::{DeclId, ScopeId};

/// An implicit receiver in scope: the receiver of an extension function or
/// of a lambda with receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverFrame {
    /// Function or lambda declaring the receiver.
    pub owner: DeclId,
    /// Name usable in `this@label`.
    pub label: Name,
    pub ty: Type,
}

/// Names and receivers visible at a given point.
#[derive(Debug, Default)]
pub(crate) struct Env<'p> {
    names: FxHashMap<Name, DeclId>,
    /// Outermost first.
    receivers: Vec<ReceiverFrame>,
    parent: Option<&'p Env<'p>>,
}

impl<'p> Env<'p> {
    pub(crate) fn root() -> Self {
        Env::default()
    }

    pub(crate) fn child(&'p self) -> Env<'p> {
        Env {
            names: FxHashMap::default(),
            receivers: Vec::new(),
            parent: Some(self),
        }
    }

    /// Rebuild the environment captured at a breakpoint line.
    pub(crate) fn from_site(site: &ContextSite) -> Env<'static> {
        Env {
            names: site.names.iter().copied().collect(),
            receivers: site.receivers.clone(),
            parent: None,
        }
    }

    pub(crate) fn define(&mut self, name: Name, decl: DeclId) {
        self.names.insert(name, decl);
    }

    pub(crate) fn push_receiver(&mut self, frame: ReceiverFrame) {
        self.receivers.push(frame);
    }

    pub(crate) fn lookup(&self, name: Name) -> Option<DeclId> {
        match self.names.get(&name) {
            Some(decl) => Some(*decl),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }

    /// Innermost receiver, or the innermost one carrying `label`.
    pub(crate) fn receiver(&self, label: Option<Name>) -> Option<&ReceiverFrame> {
        let local = self
            .receivers
            .iter()
            .rev()
            .find(|frame| label.is_none() || label == Some(frame.label));
        local.or_else(|| self.parent.and_then(|p| p.receiver(label)))
    }

    /// Every visible name, innermost binding winning, sorted by declaration.
    fn visible_names(&self) -> Vec<(Name, DeclId)> {
        let mut seen: FxHashMap<Name, DeclId> = FxHashMap::default();
        let mut env = Some(self);
        while let Some(current) = env {
            for (name, decl) in &current.names {
                seen.entry(*name).or_insert(*decl);
            }
            env = current.parent;
        }
        let mut names: Vec<_> = seen.into_iter().collect();
        names.sort_by_key(|(_, decl)| *decl);
        names
    }

    fn visible_receivers(&self) -> Vec<ReceiverFrame> {
        let mut chain = Vec::new();
        let mut env = Some(self);
        while let Some(current) = env {
            chain.push(current);
            env = current.parent;
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|env| env.receivers.iter().cloned())
            .collect()
    }

    pub(crate) fn snapshot(&self, line: u32, scope: ScopeId, function: DeclId) -> ContextSite {
        ContextSite {
            line,
            scope,
            function,
            names: self.visible_names(),
            receivers: self.visible_receivers(),
        }
    }
}

/// Everything a fragment evaluated at a breakpoint line can see.
///
/// Recorded for the first statement starting on each line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSite {
    /// 1-based source line.
    pub line: u32,
    /// Innermost scope enclosing the statement.
    pub scope: ScopeId,
    /// Top-level function the statement belongs to.
    pub function: DeclId,
    pub names: Vec<(Name, DeclId)>,
    /// Outermost first.
    pub receivers: Vec<ReceiverFrame>,
}
