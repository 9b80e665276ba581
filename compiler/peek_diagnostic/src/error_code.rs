use std::fmt;

/// Error codes for all diagnostics.
///
/// Format: E#### / W#### where the first digit indicates the phase:
/// - 0xxx: Lexer
/// - 1xxx: Parser
/// - 2xxx: Name resolution and types
/// - 9xxx: Internal
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Lexer Errors (E0xxx)
    /// Unterminated string literal
    E0001,
    /// Invalid character in source
    E0002,
    /// Integer literal out of range
    E0003,
    /// Invalid escape sequence
    E0004,

    // Parser Errors (E1xxx)
    /// Unexpected token
    E1001,
    /// Expected expression
    E1002,
    /// Unclosed delimiter
    E1003,
    /// Expected identifier
    E1004,
    /// Expected type
    E1005,
    /// Invalid assignment target
    E1006,

    // Resolution and Type Errors (E2xxx)
    /// Type mismatch
    E2001,
    /// Unresolved reference
    E2002,
    /// Argument count mismatch
    E2003,
    /// Cannot infer a lambda parameter type
    E2004,
    /// Reference to a declaration that is invisible from this unit
    E2005,
    /// Duplicate definition
    E2006,
    /// `val` cannot be reassigned
    E2007,
    /// `this` is not available here
    E2008,
    /// `super` is not allowed here
    E2009,
    /// Expression is not callable
    E2010,
    /// Unknown member
    E2011,
    /// Recursive inline function
    E2012,
    /// Return type cannot be inferred for a recursive function
    E2013,
    /// Variable of the suspended frame assigned from a fragment
    E2014,
    /// Function-typed parameter of an inline function used as a value
    E2015,

    // Internal Errors (E9xxx)
    /// Internal compiler error
    E9001,

    // Warnings (W2xxx)
    /// Local value is never used
    W2001,
}

impl ErrorCode {
    /// Check if this is a lexer or parser error.
    pub fn is_syntax_error(&self) -> bool {
        let code = self.as_str();
        code.starts_with("E0") || code.starts_with("E1")
    }

    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with('W')
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E0001 => "E0001",
            ErrorCode::E0002 => "E0002",
            ErrorCode::E0003 => "E0003",
            ErrorCode::E0004 => "E0004",
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E2006 => "E2006",
            ErrorCode::E2007 => "E2007",
            ErrorCode::E2008 => "E2008",
            ErrorCode::E2009 => "E2009",
            ErrorCode::E2010 => "E2010",
            ErrorCode::E2011 => "E2011",
            ErrorCode::E2012 => "E2012",
            ErrorCode::E2013 => "E2013",
            ErrorCode::E2014 => "E2014",
            ErrorCode::E2015 => "E2015",
            ErrorCode::E9001 => "E9001",
            ErrorCode::W2001 => "W2001",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
