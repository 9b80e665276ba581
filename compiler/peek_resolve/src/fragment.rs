//! Resolution of debugger fragments against a suspended program.

use std::sync::Arc;

use peek_diagnostic::Diagnostic;
use peek_ir::Type;
use peek_parse::FragmentAst;
use tracing::debug;

use crate::env::{ContextSite, Env};
use crate::walker::Walker;
use crate::{
    Bindings, DebugPosition, DeclTable, Origin, Program, ResolveError, Resolver, ScopeId,
    ScopeKind, ScopeTree,
};

/// Result of resolving a fragment at a breakpoint.
///
/// Its tables are layered over the program's, so program declarations,
/// scopes and bindings can be looked up through them too.
#[derive(Debug)]
pub struct FragmentResolution {
    pub decls: DeclTable,
    pub scopes: ScopeTree,
    pub bindings: Bindings,
    /// Root scope of the fragment; its parent is `context.scope`.
    pub scope: ScopeId,
    pub context: ContextSite,
    /// Type of the fragment's value: its expression, or its last statement.
    pub ty: Type,
    pub diagnostics: Vec<Diagnostic>,
}

impl FragmentResolution {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

impl Resolver for Program {
    #[tracing::instrument(level = "debug", skip_all, fields(line = position.line))]
    fn resolve_fragment(
        &self,
        fragment: &FragmentAst,
        position: DebugPosition,
    ) -> Result<FragmentResolution, ResolveError> {
        let Some(site) = self.site(position.line) else {
            return Err(ResolveError::InvalidPosition {
                line: position.line,
            });
        };

        let mut walker = Walker::new(
            self.interner(),
            &fragment.arena,
            self.module(),
            Arc::clone(&self.globals),
            DeclTable::layered(Arc::clone(self.decls())),
            ScopeTree::layered(Arc::clone(self.scopes())),
            Bindings::layered(Arc::clone(self.bindings())),
            Origin::Fragment,
            None,
            Some(self.top_scope),
        );
        let scope = walker.scopes.push(ScopeKind::Fragment, Some(site.scope));
        let mut env = Env::from_site(site);
        let ty = walker.resolve_statements(fragment.statements(), &mut env, scope, None);
        walker.record_type(fragment.root, ty.clone());
        walker.report_unused();

        debug!(
            ty = %ty,
            diagnostics = walker.diagnostics.len(),
            "fragment resolved"
        );
        Ok(FragmentResolution {
            decls: walker.decls,
            scopes: walker.scopes,
            bindings: walker.bindings,
            scope,
            context: site.clone(),
            ty,
            diagnostics: walker.diagnostics,
        })
    }
}
