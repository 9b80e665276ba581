//! Expressions, from binary operators down to primaries and lambdas.

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::stack::ensure_sufficient_stack;
use peek_ir::{
    BinaryOp, ExprId, ExprKind, Lambda, LambdaReceiver, Name, Param, Span, TokenKind, UnaryOp,
};

use crate::Parser;

/// Binary operator and its binding power (higher binds tighter).
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let op = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::NotEq, 3),
        TokenKind::Lt => (BinaryOp::Lt, 4),
        TokenKind::LtEq => (BinaryOp::LtEq, 4),
        TokenKind::Gt => (BinaryOp::Gt, 4),
        TokenKind::GtEq => (BinaryOp::GtEq, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    };
    Some(op)
}

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> ExprId {
        ensure_sufficient_stack(|| self.parse_binary(0))
    }

    fn parse_binary(&mut self, min_power: u8) -> ExprId {
        let mut left = self.parse_unary();
        while let Some((op, power)) = binary_op(self.cursor.current_kind()) {
            if power < min_power {
                break;
            }
            self.cursor.advance();
            self.skip_newlines();
            let right = ensure_sufficient_stack(|| self.parse_binary(power + 1));
            let span = self.arena.span(left).merge(self.arena.span(right));
            left = self
                .arena
                .alloc_kind(ExprKind::Binary { op, left, right }, span);
        }
        left
    }

    fn parse_unary(&mut self) -> ExprId {
        let op = match self.cursor.current_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.cursor.advance().span.start;
        let operand = ensure_sufficient_stack(|| self.parse_unary());
        let span = self.span_from(start);
        self.arena
            .alloc_kind(ExprKind::Unary { op, operand }, span)
    }

    fn parse_postfix(&mut self) -> ExprId {
        let mut expr = self.parse_primary();
        loop {
            match self.cursor.current_kind() {
                TokenKind::LParen => expr = self.parse_call(expr),
                // `f { ... }` calls `f` with a single trailing lambda.
                TokenKind::LBrace if matches!(self.arena.kind(expr), ExprKind::Ident(_)) => {
                    let lambda = self.parse_lambda(None);
                    let span = self.arena.span(expr).merge(self.arena.span(lambda));
                    expr = self.arena.alloc_kind(
                        ExprKind::Call {
                            callee: expr,
                            args: vec![lambda],
                        },
                        span,
                    );
                }
                _ => {
                    // A member access may continue on the next line.
                    let ahead = self.cursor.skip_newlines_lookahead();
                    if !self.cursor.check_nth(ahead, &TokenKind::Dot) {
                        return expr;
                    }
                    self.skip_newlines();
                    self.cursor.advance();
                    expr = self.parse_member(expr);
                }
            }
        }
    }

    /// `callee(args) [trailing-lambda]`.
    fn parse_call(&mut self, callee: ExprId) -> ExprId {
        let args = self.parse_args();
        let span = self.arena.span(callee).merge(self.cursor.previous_span());
        self.arena
            .alloc_kind(ExprKind::Call { callee, args }, span)
    }

    /// `(a, b) [{ trailing lambda }]`, starting at `(`.
    fn parse_args(&mut self) -> Vec<ExprId> {
        self.cursor.advance();
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RParen) && !self.cursor.is_at_end() {
            args.push(self.parse_expr());
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::RParen);
        if self.check(&TokenKind::LBrace) {
            args.push(self.parse_lambda(None));
        }
        args
    }

    /// After `receiver.`: `selector` or `selector(args)`.
    fn parse_member(&mut self, receiver: ExprId) -> ExprId {
        let Some((name, span)) = self.expect_ident() else {
            let span = self.arena.span(receiver);
            return self.error_expr(span);
        };
        let selector = self.arena.alloc_kind(ExprKind::Ident(name), span);
        if self.check(&TokenKind::LParen) {
            let args = self.parse_args();
            let span = self.arena.span(receiver).merge(self.cursor.previous_span());
            return self.arena.alloc_kind(
                ExprKind::MethodCall {
                    receiver,
                    selector,
                    args,
                },
                span,
            );
        }
        let span = self.arena.span(receiver).merge(span);
        self.arena
            .alloc_kind(ExprKind::Member { receiver, selector }, span)
    }

    pub(crate) fn parse_primary(&mut self) -> ExprId {
        let token = self.cursor.current().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.cursor.advance();
                self.arena.alloc_kind(ExprKind::Int(value), token.span)
            }
            TokenKind::String(value) => {
                self.cursor.advance();
                self.arena.alloc_kind(ExprKind::Str(value), token.span)
            }
            TokenKind::True | TokenKind::False => {
                self.cursor.advance();
                let value = matches!(token.kind, TokenKind::True);
                self.arena.alloc_kind(ExprKind::Bool(value), token.span)
            }
            TokenKind::Ident(name) => {
                self.cursor.advance();
                if self.check(&TokenKind::At) && self.cursor.check_nth(1, &TokenKind::LBrace) {
                    self.cursor.advance();
                    return self.parse_lambda(Some((name, token.span.start)));
                }
                self.arena.alloc_kind(ExprKind::Ident(name), token.span)
            }
            TokenKind::This => {
                self.cursor.advance();
                let label = self.parse_reference_label();
                let span = self.span_from(token.span.start);
                self.arena.alloc_kind(ExprKind::This { label }, span)
            }
            TokenKind::Super => {
                self.cursor.advance();
                let label = self.parse_reference_label();
                let span = self.span_from(token.span.start);
                self.arena.alloc_kind(ExprKind::Super { label }, span)
            }
            TokenKind::LParen => {
                self.cursor.advance();
                self.skip_newlines();
                let inner = self.parse_expr();
                self.skip_newlines();
                self.expect(&TokenKind::RParen);
                inner
            }
            TokenKind::If => self.parse_if(),
            TokenKind::LBrace => self.parse_lambda(None),
            TokenKind::Error => {
                self.cursor.advance();
                self.error_expr(token.span)
            }
            _ => {
                self.report(
                    Diagnostic::error(ErrorCode::E1002)
                        .with_message(format!(
                            "expected expression, found {}",
                            token.kind.display_name()
                        ))
                        .with_label(token.span, "expected expression"),
                );
                self.error_expr(token.span)
            }
        }
    }

    /// Optional `@label` after `this`/`super`.
    fn parse_reference_label(&mut self) -> Option<Name> {
        if !self.check(&TokenKind::At) {
            return None;
        }
        self.cursor.advance();
        self.expect_ident().map(|(name, _)| name)
    }

    /// `if (cond) branch [else branch]`.
    fn parse_if(&mut self) -> ExprId {
        let start = self.cursor.advance().span.start;
        let cond = self.parse_parenthesized_condition();
        let then_branch = self.parse_branch();
        let ahead = self.cursor.skip_newlines_lookahead();
        let else_branch = if self.cursor.check_nth(ahead, &TokenKind::Else) {
            self.skip_newlines();
            self.cursor.advance();
            Some(self.parse_branch())
        } else {
            None
        };
        let span = self.span_from(start);
        self.arena.alloc_kind(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        )
    }

    /// `{ [params ->] stmts }`, optionally preceded by `label@`.
    pub(crate) fn parse_lambda(&mut self, label: Option<(Name, u32)>) -> ExprId {
        let brace = self.cursor.current_span();
        let start = label.map_or(brace.start, |(_, start)| start);
        self.expect(&TokenKind::LBrace);

        let (receiver, params) = self.try_parse_lambda_params().unwrap_or_default();
        let body_stmts = self.parse_statements(&TokenKind::RBrace);
        self.expect(&TokenKind::RBrace);
        let body_span = Span::new(brace.start, self.cursor.previous_span().end);
        let body = self
            .arena
            .alloc_kind(ExprKind::Block { stmts: body_stmts }, body_span);

        let span = self.span_from(start);
        self.arena.alloc_kind(
            ExprKind::Lambda(Box::new(Lambda {
                label: label.map(|(name, _)| name),
                receiver,
                params,
                body,
            })),
            span,
        )
    }

    /// Speculatively parse `p1[: T], p2 ->`. Restores the cursor and returns
    /// `None` when the lambda has no parameter list.
    fn try_parse_lambda_params(&mut self) -> Option<(Option<LambdaReceiver>, Vec<Param>)> {
        let checkpoint = self.cursor.position();
        let result = self.lambda_params_inner();
        if result.is_none() {
            self.cursor.set_position(checkpoint);
        }
        result
    }

    fn lambda_params_inner(&mut self) -> Option<(Option<LambdaReceiver>, Vec<Param>)> {
        self.skip_newlines();
        let mut receiver = None;
        let mut params = Vec::new();
        loop {
            let token = self.cursor.current().clone();
            match token.kind {
                TokenKind::This if receiver.is_none() && params.is_empty() => {
                    self.cursor.advance();
                    let ty = if self.eat(&TokenKind::Colon) {
                        Some(self.try_parse_type()?)
                    } else {
                        None
                    };
                    receiver = Some(LambdaReceiver {
                        ty,
                        span: self.span_from(token.span.start),
                    });
                }
                TokenKind::Ident(name) => {
                    self.cursor.advance();
                    let ty = if self.eat(&TokenKind::Colon) {
                        Some(self.try_parse_type()?)
                    } else {
                        None
                    };
                    params.push(Param {
                        name,
                        ty,
                        span: self.span_from(token.span.start),
                    });
                }
                _ => return None,
            }
            if self.eat(&TokenKind::Arrow) {
                return Some((receiver, params));
            }
            if !self.eat(&TokenKind::Comma) {
                return None;
            }
            self.skip_newlines();
        }
    }
}
