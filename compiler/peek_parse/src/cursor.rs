//! Token cursor for navigating the token stream.

use peek_ir::{Span, Token, TokenKind, TokenList};

/// Cursor over a token list that always ends in `Eof`.
///
/// Positions past the end read as the final `Eof` token, so lookahead never
/// needs bounds checks at the call site.
pub struct Cursor<'a> {
    tokens: &'a TokenList,
    eof: Token,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a TokenList) -> Self {
        let end = tokens.iter().last().map_or(0, |t| t.span.end);
        Cursor {
            tokens,
            eof: Token::new(TokenKind::Eof, Span::point(end)),
            pos: 0,
        }
    }

    /// Current position, for progress checks and speculative parsing.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Roll back to a position returned by [`Cursor::position`].
    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos <= self.tokens.len());
        self.pos = pos;
    }

    #[inline]
    pub fn current(&self) -> &Token {
        self.nth(0)
    }

    /// Token `n` positions ahead of the current one.
    #[inline]
    pub fn nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    #[inline]
    pub fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.current().span
    }

    #[inline]
    pub fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1) {
            Some(prev) => self.tokens.get(prev).map_or(Span::DUMMY, |t| t.span),
            None => Span::DUMMY,
        }
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    /// Check if the current token has the same variant as `kind`.
    #[inline]
    pub fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    #[inline]
    pub fn check_nth(&self, n: usize, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.nth(n).kind) == std::mem::discriminant(kind)
    }

    /// Index of the first token at or after the cursor that is not a newline.
    pub fn skip_newlines_lookahead(&self) -> usize {
        let mut n = 0;
        while matches!(self.nth(n).kind, TokenKind::Newline) {
            n += 1;
        }
        n
    }

    /// Consume the current token and return it.
    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }
}
