//! Recursive descent parser for Peek.
//!
//! Produces the flat syntax tree defined in `peek_ir`. Two entry points:
//!
//! - [`parse_program`] parses a whole source file into a [`Module`].
//! - [`parse_fragment`] parses a debugger code fragment into an arena
//!   layered over the program's arena (see [`ExprArena::layered`]).
//!
//! Newlines terminate statements. A binary operator must stay on the line
//! of its left operand; a newline is allowed after it, inside parentheses,
//! and before a `.` member access.

mod cursor;
mod grammar;

use std::sync::Arc;

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{ExprArena, ExprId, ExprKind, Module, Span, StringInterner, TokenKind, TokenList};

pub use cursor::Cursor;

/// Output of [`parse_program`].
#[derive(Debug)]
pub struct ParseOutput {
    pub module: Module,
    pub arena: ExprArena,
    /// Lexer errors first, then parser errors, in source order.
    pub errors: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Diagnostic::is_error)
    }
}

/// Whether a fragment is a single expression or a statement sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FragmentKind {
    Expression,
    Block,
}

/// A parsed debugger fragment.
#[derive(Debug)]
pub struct FragmentAst {
    pub kind: FragmentKind,
    /// A `Block` holding the fragment's statements.
    pub root: ExprId,
    /// Layered over the program arena the fragment was parsed against.
    pub arena: ExprArena,
    pub text: String,
}

impl FragmentAst {
    /// Statements of the fragment in source order.
    pub fn statements(&self) -> &[ExprId] {
        match self.arena.kind(self.root) {
            ExprKind::Block { stmts } => stmts,
            _ => &[],
        }
    }

    /// The fragment's value-producing expression, when it is an expression
    /// fragment.
    pub fn expression(&self) -> Option<ExprId> {
        match self.kind {
            FragmentKind::Expression => self.statements().first().copied(),
            FragmentKind::Block => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements().is_empty()
    }
}

/// Output of [`parse_fragment`].
#[derive(Debug)]
pub struct FragmentParse {
    pub fragment: FragmentAst,
    pub errors: Vec<Diagnostic>,
}

/// Parse a whole program.
pub fn parse_program(source: &str, interner: &StringInterner) -> ParseOutput {
    let lexed = peek_lexer::lex(source, interner);
    let mut parser = Parser::new(&lexed.tokens, ExprArena::new());
    let module = parser.parse_module();
    let mut errors = lexed.errors;
    errors.extend(parser.errors);
    ParseOutput {
        module,
        arena: parser.arena,
        errors,
    }
}

/// Parse a debugger fragment on top of `program_arena`.
pub fn parse_fragment(
    text: &str,
    interner: &StringInterner,
    program_arena: Arc<ExprArena>,
) -> FragmentParse {
    let lexed = peek_lexer::lex(text, interner);
    let mut parser = Parser::new(&lexed.tokens, ExprArena::layered(program_arena));
    let start = parser.cursor.current_span().start;
    let stmts = parser.parse_statements_until_eof();
    let kind = match stmts.as_slice() {
        [only] if !parser.arena.kind(*only).is_declaration_or_statement() => {
            FragmentKind::Expression
        }
        _ => FragmentKind::Block,
    };
    let span = Span::new(start, parser.cursor.previous_span().end.max(start));
    let root = parser.arena.alloc_kind(ExprKind::Block { stmts }, span);

    let mut errors = lexed.errors;
    errors.extend(parser.errors);
    FragmentParse {
        fragment: FragmentAst {
            kind,
            root,
            arena: parser.arena,
            text: text.to_owned(),
        },
        errors,
    }
}

/// Parser state.
pub struct Parser<'a> {
    cursor: Cursor<'a>,
    arena: ExprArena,
    errors: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a TokenList, arena: ExprArena) -> Self {
        Parser {
            cursor: Cursor::new(tokens),
            arena,
            errors: Vec::new(),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.cursor.check(kind)
    }

    /// Consume the current token if it matches `kind`.
    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.cursor.advance();
            true
        } else {
            false
        }
    }

    /// Consume `kind` or report what was expected.
    fn expect(&mut self, kind: &TokenKind) -> bool {
        if self.eat(kind) {
            return true;
        }
        let found = self.cursor.current();
        let code = match kind {
            TokenKind::RParen | TokenKind::RBrace => ErrorCode::E1003,
            _ => ErrorCode::E1001,
        };
        let diag = Diagnostic::error(code)
            .with_message(format!(
                "expected {}, found {}",
                kind.display_name(),
                found.kind.display_name()
            ))
            .with_label(found.span, "unexpected token");
        self.report(diag);
        false
    }

    /// Record an error unless it sits on a token the lexer already rejected.
    fn report(&mut self, diag: Diagnostic) {
        if matches!(self.cursor.current_kind(), TokenKind::Error) {
            return;
        }
        self.errors.push(diag);
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Newline) || self.eat(&TokenKind::Semicolon) {}
    }

    /// Skip to the end of the current statement after an error.
    fn recover_to_statement_end(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.cursor.current_kind() {
                TokenKind::Eof => return,
                TokenKind::Newline | TokenKind::Semicolon if depth == 0 => return,
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::LBrace | TokenKind::LParen => depth += 1,
                TokenKind::RBrace | TokenKind::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.cursor.advance();
        }
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.cursor.previous_span().end.max(start))
    }

    fn error_expr(&mut self, span: Span) -> ExprId {
        self.arena.alloc_kind(ExprKind::Error, span)
    }
}

#[cfg(test)]
mod tests;
