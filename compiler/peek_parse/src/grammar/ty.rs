//! Type annotations.
//!
//! ```text
//! type     := Name | Name '.' fn_type | fn_type
//! fn_type  := '(' [type {',' type}] ')' '->' type
//! ```

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{ParsedType, TokenKind};

use crate::Parser;

impl Parser<'_> {
    /// Parse a type, reporting an error if there is none.
    pub(crate) fn parse_type(&mut self) -> Option<ParsedType> {
        let checkpoint = self.cursor.position();
        if let Some(ty) = self.try_parse_type() {
            return Some(ty);
        }
        self.cursor.set_position(checkpoint);
        let found = self.cursor.current().clone();
        self.report(
            Diagnostic::error(ErrorCode::E1005)
                .with_message(format!("expected type, found {}", found.kind.display_name()))
                .with_label(found.span, "expected a type"),
        );
        None
    }

    /// Parse a type without reporting; used by speculative lambda parsing.
    pub(crate) fn try_parse_type(&mut self) -> Option<ParsedType> {
        let start = self.cursor.current_span().start;
        match *self.cursor.current_kind() {
            TokenKind::Ident(name) => {
                let span = self.cursor.advance().span;
                let named = ParsedType::Named { name, span };
                if self.check(&TokenKind::Dot) && self.cursor.check_nth(1, &TokenKind::LParen) {
                    self.cursor.advance();
                    return self.try_parse_function_type(Some(named), start);
                }
                Some(named)
            }
            TokenKind::LParen => self.try_parse_function_type(None, start),
            _ => None,
        }
    }

    fn try_parse_function_type(
        &mut self,
        receiver: Option<ParsedType>,
        start: u32,
    ) -> Option<ParsedType> {
        if !self.eat(&TokenKind::LParen) {
            return None;
        }
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.try_parse_type()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(&TokenKind::RParen) || !self.eat(&TokenKind::Arrow) {
            return None;
        }
        let ret = self.try_parse_type()?;
        Some(ParsedType::Function {
            receiver: receiver.map(Box::new),
            params,
            ret: Box::new(ret),
            span: self.span_from(start),
        })
    }
}
