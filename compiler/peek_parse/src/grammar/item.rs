//! Top-level items and function declarations.

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{ExprKind, Function, Modifiers, Module, Name, Param, ParsedType, Span, TokenKind};

use crate::Parser;

impl Parser<'_> {
    pub(crate) fn parse_module(&mut self) -> Module {
        let mut module = Module::default();
        loop {
            self.skip_separators();
            if self.cursor.is_at_end() {
                break;
            }
            let before = self.cursor.position();
            let errors_before = self.errors.len();
            if let Some(function) = self.parse_function(true) {
                module.functions.push(function);
            }
            if self.errors.len() > errors_before {
                self.recover_to_item();
            }
            if self.cursor.position() == before {
                // Guarantee progress on garbage at the top level.
                self.cursor.advance();
            }
        }
        module
    }

    /// Skip to the next line that starts a declaration.
    fn recover_to_item(&mut self) {
        loop {
            self.recover_to_statement_end();
            match self.cursor.current_kind() {
                TokenKind::Eof => return,
                TokenKind::Newline => {
                    self.skip_newlines();
                    if matches!(
                        self.cursor.current_kind(),
                        TokenKind::Fun | TokenKind::Inline | TokenKind::Private | TokenKind::Eof
                    ) {
                        return;
                    }
                }
                _ => {
                    self.cursor.advance();
                }
            }
        }
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            if self.eat(&TokenKind::Inline) {
                modifiers.inline = true;
            } else if self.eat(&TokenKind::Private) {
                modifiers.private = true;
            } else {
                return modifiers;
            }
        }
    }

    /// `[modifiers] fun [Recv.]name(params)[: Ret] (block | = expr)`.
    ///
    /// Local functions (`top_level == false`) take no modifiers and no
    /// receiver.
    pub(crate) fn parse_function(&mut self, top_level: bool) -> Option<Function> {
        let start = self.cursor.current_span().start;
        let modifier_span = self.cursor.current_span();
        let modifiers = self.parse_modifiers();
        if !top_level && (modifiers.inline || modifiers.private) {
            self.report(
                Diagnostic::error(ErrorCode::E1001)
                    .with_message("modifiers are not allowed on local functions")
                    .with_label(modifier_span, "remove this modifier"),
            );
        }
        if !self.expect(&TokenKind::Fun) {
            return None;
        }

        let (mut name, mut name_span) = self.expect_ident()?;
        let mut receiver = None;
        if self.check(&TokenKind::Dot) {
            self.cursor.advance();
            if !top_level {
                self.report(
                    Diagnostic::error(ErrorCode::E1001)
                        .with_message("local functions cannot declare a receiver")
                        .with_label(name_span, "receiver type"),
                );
            }
            receiver = Some(ParsedType::Named {
                name,
                span: name_span,
            });
            (name, name_span) = self.expect_ident()?;
        }

        let params = self.parse_function_params()?;
        let ret = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let (body, expr_body) = if self.eat(&TokenKind::Eq) {
            self.skip_newlines();
            (self.parse_expr(), true)
        } else if self.check(&TokenKind::LBrace) {
            (self.parse_block(), false)
        } else {
            let found = self.cursor.current().clone();
            self.report(
                Diagnostic::error(ErrorCode::E1001)
                    .with_message(format!(
                        "expected function body, found {}",
                        found.kind.display_name()
                    ))
                    .with_label(found.span, "expected `{` or `=`"),
            );
            return None;
        };

        Some(Function {
            name,
            name_span,
            modifiers,
            receiver,
            params,
            ret,
            body,
            expr_body,
            span: self.span_from(start),
        })
    }

    fn parse_function_params(&mut self) -> Option<Vec<Param>> {
        if !self.expect(&TokenKind::LParen) {
            return None;
        }
        let mut params = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RParen) && !self.cursor.is_at_end() {
            let (name, span) = self.expect_ident()?;
            if !self.expect(&TokenKind::Colon) {
                return None;
            }
            let ty = self.parse_type()?;
            params.push(Param {
                name,
                ty: Some(ty),
                span: span.merge(self.cursor.previous_span()),
            });
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.skip_newlines();
        if !self.expect(&TokenKind::RParen) {
            return None;
        }
        Some(params)
    }

    pub(crate) fn expect_ident(&mut self) -> Option<(Name, Span)> {
        if let TokenKind::Ident(name) = *self.cursor.current_kind() {
            let span = self.cursor.advance().span;
            return Some((name, span));
        }
        let found = self.cursor.current().clone();
        self.report(
            Diagnostic::error(ErrorCode::E1004)
                .with_message(format!(
                    "expected identifier, found {}",
                    found.kind.display_name()
                ))
                .with_label(found.span, "expected a name"),
        );
        None
    }

    /// Local function declaration statement.
    pub(crate) fn parse_local_function(&mut self) -> peek_ir::ExprId {
        let start = self.cursor.current_span().start;
        match self.parse_function(false) {
            Some(function) => {
                let span = function.span;
                self.arena
                    .alloc_kind(ExprKind::LocalFun(Box::new(function)), span)
            }
            None => {
                let span = self.span_from(start);
                self.error_expr(span)
            }
        }
    }
}
