//! A resolved program.

use std::sync::Arc;

use peek_diagnostic::Diagnostic;
use peek_ir::{ExprArena, Function, LineIndex, Module, Name, SharedInterner};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::env::ContextSite;
use crate::walker::{Globals, Walker};
use crate::{Bindings, DeclId, DeclKind, DeclTable, Origin, ScopeId, ScopeTree};

/// A parsed and resolved source file.
///
/// Immutable once built; fragments are resolved in layers on top of it.
#[derive(Debug)]
pub struct Program {
    source: String,
    interner: SharedInterner,
    module: Module,
    arena: Arc<ExprArena>,
    decls: Arc<DeclTable>,
    scopes: Arc<ScopeTree>,
    bindings: Arc<Bindings>,
    pub(crate) globals: Arc<Globals>,
    pub(crate) top_scope: ScopeId,
    sites: FxHashMap<u32, ContextSite>,
    line_index: LineIndex,
    diagnostics: Vec<Diagnostic>,
}

impl Program {
    /// Parse and resolve `source`. Always succeeds; problems are reported
    /// through [`Program::diagnostics`].
    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    pub fn analyze(source: &str, interner: &SharedInterner) -> Program {
        let parsed = peek_parse::parse_program(source, interner);
        let line_index = LineIndex::new(source);

        let mut walker = Walker::new(
            interner,
            &parsed.arena,
            &parsed.module,
            Arc::default(),
            DeclTable::new(),
            ScopeTree::new(),
            Bindings::new(),
            Origin::Program,
            Some(&line_index),
            None,
        );
        walker.declare_functions();
        walker.resolve_functions();
        walker.check_inline_recursion();
        walker.report_unused();

        let Walker {
            decls,
            scopes,
            bindings,
            globals,
            top_scope,
            sites,
            diagnostics: resolve_errors,
            ..
        } = walker;

        let mut diagnostics = parsed.errors;
        diagnostics.extend(resolve_errors);
        debug!(
            functions = parsed.module.functions.len(),
            sites = sites.len(),
            errors = diagnostics.iter().filter(|d| d.is_error()).count(),
            "program analyzed"
        );

        Program {
            source: source.to_owned(),
            interner: interner.clone(),
            module: parsed.module,
            arena: Arc::new(parsed.arena),
            decls: Arc::new(decls),
            scopes: Arc::new(scopes),
            bindings: Arc::new(bindings),
            globals,
            top_scope,
            sites,
            line_index,
            diagnostics,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn arena(&self) -> &Arc<ExprArena> {
        &self.arena
    }

    pub fn decls(&self) -> &Arc<DeclTable> {
        &self.decls
    }

    pub fn scopes(&self) -> &Arc<ScopeTree> {
        &self.scopes
    }

    pub fn bindings(&self) -> &Arc<Bindings> {
        &self.bindings
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Top-level declarations in source order.
    pub fn function_decls(&self) -> &[DeclId] {
        &self.globals.by_index
    }

    /// Non-extension top-level function named `name`.
    pub fn function_named(&self, name: &str) -> Option<DeclId> {
        let name: Name = self.interner.get(name)?;
        self.globals.functions.get(&name).copied()
    }

    /// Syntax of a top-level function.
    pub fn function(&self, decl: DeclId) -> Option<&Function> {
        match self.decls.get(decl).kind {
            DeclKind::Function { index, .. } => self.module.functions.get(index),
            _ => None,
        }
    }

    /// Context recorded for the first statement starting on `line`.
    pub fn site(&self, line: u32) -> Option<&ContextSite> {
        self.sites.get(&line)
    }

    /// Lines a breakpoint can be set on, ascending.
    pub fn breakpoint_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.sites.keys().copied().collect();
        lines.sort_unstable();
        lines
    }
}
