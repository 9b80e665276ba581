//! Lexer for Peek using logos with string interning.
//!
//! Newlines are significant (they terminate statements) and are kept as
//! tokens; horizontal whitespace and `//` comments are dropped. Lexical
//! errors are reported as diagnostics and leave an `Error` token behind so
//! the parser can recover without reporting the same problem twice.

use logos::Logos;
use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{Span, StringInterner, Token, TokenKind, TokenList};

/// Raw token from logos (before interning).
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("\n")]
    Newline,

    #[token("fun")]
    Fun,
    #[token("val")]
    Val,
    #[token("var")]
    Var,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("this")]
    This,
    #[token("super")]
    Super,
    #[token("inline")]
    Inline,
    #[token("private")]
    Private,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("@")]
    At,

    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    #[regex(r"[0-9][0-9_]*")]
    Int,

    #[regex(r#""([^"\\\n\r]|\\.)*""#)]
    String,

    /// A string literal that runs into the end of the line.
    #[regex(r#""([^"\\\n\r]|\\.)*"#)]
    UnterminatedString,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

/// Tokens plus the lexical errors found while producing them.
#[derive(Clone, Debug, Default)]
pub struct LexOutput {
    pub tokens: TokenList,
    pub errors: Vec<Diagnostic>,
}

/// Lex source code into a `TokenList`.
pub fn lex(source: &str, interner: &StringInterner) -> LexOutput {
    let mut output = LexOutput::default();
    let mut logos = RawToken::lexer(source);

    while let Some(token_result) = logos.next() {
        let span = Span::from_range(logos.span());
        let slice = logos.slice();

        let kind = match token_result {
            Ok(RawToken::LineComment) => continue,
            Ok(raw) => convert_token(raw, slice, span, interner, &mut output.errors),
            Err(()) => {
                output.errors.push(
                    Diagnostic::error(ErrorCode::E0002)
                        .with_message(format!("invalid character `{slice}`"))
                        .with_label(span, "not valid here"),
                );
                TokenKind::Error
            }
        };
        output.tokens.push(Token::new(kind, span));
    }

    let eof = u32::try_from(source.len()).unwrap_or(u32::MAX);
    output.tokens.push(Token::new(TokenKind::Eof, Span::point(eof)));
    output
}

fn convert_token(
    raw: RawToken,
    slice: &str,
    span: Span,
    interner: &StringInterner,
    errors: &mut Vec<Diagnostic>,
) -> TokenKind {
    match raw {
        RawToken::Int => {
            let digits: String = slice.chars().filter(|c| *c != '_').collect();
            if let Ok(value) = digits.parse::<i64>() {
                TokenKind::Int(value)
            } else {
                errors.push(
                    Diagnostic::error(ErrorCode::E0003)
                        .with_message(format!("integer literal `{slice}` is too large"))
                        .with_label(span, "does not fit in 64 bits"),
                );
                TokenKind::Error
            }
        }
        RawToken::String => {
            let content = &slice[1..slice.len() - 1];
            match unescape_string(content) {
                Ok(text) => TokenKind::String(interner.intern(&text)),
                Err(bad) => {
                    errors.push(
                        Diagnostic::error(ErrorCode::E0004)
                            .with_message(format!("invalid escape sequence `\\{bad}`"))
                            .with_label(span, "in this string"),
                    );
                    TokenKind::Error
                }
            }
        }
        RawToken::UnterminatedString => {
            errors.push(
                Diagnostic::error(ErrorCode::E0001)
                    .with_message("unterminated string literal")
                    .with_label(span, "missing closing `\"`"),
            );
            TokenKind::Error
        }
        RawToken::Ident => TokenKind::Ident(interner.intern(slice)),

        RawToken::Newline => TokenKind::Newline,
        RawToken::Fun => TokenKind::Fun,
        RawToken::Val => TokenKind::Val,
        RawToken::Var => TokenKind::Var,
        RawToken::If => TokenKind::If,
        RawToken::Else => TokenKind::Else,
        RawToken::While => TokenKind::While,
        RawToken::True => TokenKind::True,
        RawToken::False => TokenKind::False,
        RawToken::This => TokenKind::This,
        RawToken::Super => TokenKind::Super,
        RawToken::Inline => TokenKind::Inline,
        RawToken::Private => TokenKind::Private,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::At => TokenKind::At,
        RawToken::Eq => TokenKind::Eq,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::NotEq => TokenKind::NotEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::Gt => TokenKind::Gt,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::AndAnd => TokenKind::AndAnd,
        RawToken::OrOr => TokenKind::OrOr,
        RawToken::Bang => TokenKind::Bang,

        RawToken::LineComment => unreachable!("comments are filtered before conversion"),
    }
}

/// Process escape sequences, returning the offending character on failure.
fn unescape_string(s: &str) -> Result<String, char> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') | None => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => return Err(other),
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
