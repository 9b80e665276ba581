//! Statements and blocks.

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{ExprId, ExprKind, TokenKind};

use crate::Parser;

impl Parser<'_> {
    /// `{ stmt* }` as a `Block` expression.
    pub(crate) fn parse_block(&mut self) -> ExprId {
        let start = self.cursor.current_span().start;
        if !self.expect(&TokenKind::LBrace) {
            let span = self.cursor.current_span();
            return self.error_expr(span);
        }
        let stmts = self.parse_statements(&TokenKind::RBrace);
        self.expect(&TokenKind::RBrace);
        let span = self.span_from(start);
        self.arena.alloc_kind(ExprKind::Block { stmts }, span)
    }

    pub(crate) fn parse_statements_until_eof(&mut self) -> Vec<ExprId> {
        let stmts = self.parse_statements(&TokenKind::Eof);
        if !self.cursor.is_at_end() {
            let found = self.cursor.current().clone();
            self.report(
                Diagnostic::error(ErrorCode::E1001)
                    .with_message(format!("unexpected {}", found.kind.display_name()))
                    .with_label(found.span, "unexpected token"),
            );
        }
        stmts
    }

    /// Statements separated by newlines or `;`, up to (not including) `end`.
    pub(crate) fn parse_statements(&mut self, end: &TokenKind) -> Vec<ExprId> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.check(end) || self.cursor.is_at_end() {
                return stmts;
            }
            let before = self.cursor.position();
            let errors_before = self.errors.len();
            stmts.push(self.parse_statement());

            if self.errors.len() > errors_before {
                self.recover_to_statement_end();
            } else if !self.check(&TokenKind::Newline)
                && !self.check(&TokenKind::Semicolon)
                && !self.check(end)
                && !self.cursor.is_at_end()
            {
                let found = self.cursor.current().clone();
                self.report(
                    Diagnostic::error(ErrorCode::E1001)
                        .with_message(format!(
                            "expected newline or `;` after statement, found {}",
                            found.kind.display_name()
                        ))
                        .with_label(found.span, "unexpected token"),
                );
                self.recover_to_statement_end();
            }

            if self.cursor.position() == before {
                self.cursor.advance();
            }
        }
    }

    fn parse_statement(&mut self) -> ExprId {
        match self.cursor.current_kind() {
            TokenKind::Val | TokenKind::Var => self.parse_let(),
            TokenKind::While => self.parse_while(),
            TokenKind::Fun | TokenKind::Inline | TokenKind::Private => self.parse_local_function(),
            TokenKind::Ident(_) if self.cursor.check_nth(1, &TokenKind::Eq) => self.parse_assign(),
            _ => self.parse_expr(),
        }
    }

    /// `val name[: T] = init` / `var name[: T] = init`.
    fn parse_let(&mut self) -> ExprId {
        let start = self.cursor.current_span().start;
        let mutable = matches!(self.cursor.advance().kind, TokenKind::Var);
        let Some((name, name_span)) = self.expect_ident() else {
            let span = self.span_from(start);
            return self.error_expr(span);
        };
        let ty = if self.eat(&TokenKind::Colon) {
            self.parse_type()
        } else {
            None
        };
        if !self.expect(&TokenKind::Eq) {
            let span = self.span_from(start);
            return self.error_expr(span);
        }
        self.skip_newlines();
        let init = self.parse_expr();
        let span = self.span_from(start);
        self.arena.alloc_kind(
            ExprKind::Let {
                name,
                name_span,
                mutable,
                ty,
                init,
            },
            span,
        )
    }

    fn parse_assign(&mut self) -> ExprId {
        let start = self.cursor.current_span().start;
        let target = self.parse_primary();
        self.expect(&TokenKind::Eq);
        self.skip_newlines();
        let value = self.parse_expr();
        let span = self.span_from(start);
        self.arena
            .alloc_kind(ExprKind::Assign { target, value }, span)
    }

    /// `while (cond) body`.
    fn parse_while(&mut self) -> ExprId {
        let start = self.cursor.current_span().start;
        self.cursor.advance();
        let cond = self.parse_parenthesized_condition();
        let body = self.parse_branch();
        let span = self.span_from(start);
        self.arena.alloc_kind(ExprKind::While { cond, body }, span)
    }

    /// `( expr )` as used by `if` and `while`.
    pub(crate) fn parse_parenthesized_condition(&mut self) -> ExprId {
        if !self.expect(&TokenKind::LParen) {
            let span = self.cursor.current_span();
            return self.error_expr(span);
        }
        self.skip_newlines();
        let cond = self.parse_expr();
        self.skip_newlines();
        self.expect(&TokenKind::RParen);
        cond
    }

    /// Body of `if`/`while`: a block, or a single statement on its own.
    pub(crate) fn parse_branch(&mut self) -> ExprId {
        self.skip_newlines();
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_statement()
        }
    }
}
