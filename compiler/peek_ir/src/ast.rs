//! Flat syntax tree.
//!
//! Expressions live in an [`ExprArena`](crate::ExprArena) and refer to each
//! other by [`ExprId`]. Statements are expressions too: a block is a list of
//! expression IDs whose value is the value of its last element, and `val`,
//! assignment, `while` and local `fun` declarations evaluate to `Unit`.

use crate::{ExprId, Name, Span};

/// An expression node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Str(Name),

    /// Simple name reference.
    Ident(Name),
    /// `this` or `this@label`.
    This {
        label: Option<Name>,
    },
    /// `super` or `super@label`. Parsed so that it can be reported.
    Super {
        label: Option<Name>,
    },

    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },

    /// `callee(args)`, including trailing lambdas.
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    /// `receiver.selector`. The selector is an `Ident` node naming a member;
    /// it is not a reference in its own right.
    Member {
        receiver: ExprId,
        selector: ExprId,
    },
    /// `receiver.selector(args)`.
    MethodCall {
        receiver: ExprId,
        selector: ExprId,
        args: Vec<ExprId>,
    },

    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    Block {
        stmts: Vec<ExprId>,
    },
    Lambda(Box<Lambda>),

    /// `val name: T = init` / `var name = init`.
    Let {
        name: Name,
        name_span: Span,
        mutable: bool,
        ty: Option<ParsedType>,
        init: ExprId,
    },
    /// `target = value` where `target` is an `Ident`.
    Assign {
        target: ExprId,
        value: ExprId,
    },
    While {
        cond: ExprId,
        body: ExprId,
    },
    /// A function declared inside a block.
    LocalFun(Box<Function>),

    /// Placeholder for a node that failed to parse.
    Error,
}

impl ExprKind {
    /// Statement-only forms that never produce a value.
    pub fn is_declaration_or_statement(&self) -> bool {
        matches!(
            self,
            ExprKind::Let { .. }
                | ExprKind::Assign { .. }
                | ExprKind::While { .. }
                | ExprKind::LocalFun(_)
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// A function literal: `label@{ this: Int, a: Int, b -> body }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lambda {
    pub label: Option<Name>,
    /// Present when the first parameter is spelled `this`.
    pub receiver: Option<LambdaReceiver>,
    pub params: Vec<Param>,
    /// Always a `Block`.
    pub body: ExprId,
}

/// Explicit receiver parameter of a lambda.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LambdaReceiver {
    pub ty: Option<ParsedType>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: Name,
    pub ty: Option<ParsedType>,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub inline: bool,
    pub private: bool,
}

/// `[modifiers] fun [Recv.]name(params)[: Ret] body`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: Name,
    pub name_span: Span,
    pub modifiers: Modifiers,
    pub receiver: Option<ParsedType>,
    pub params: Vec<Param>,
    pub ret: Option<ParsedType>,
    pub body: ExprId,
    /// `= expr` form rather than a block.
    pub expr_body: bool,
    pub span: Span,
}

/// A type as written in source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedType {
    Named {
        name: Name,
        span: Span,
    },
    Function {
        receiver: Option<Box<ParsedType>>,
        params: Vec<ParsedType>,
        ret: Box<ParsedType>,
        span: Span,
    },
}

impl ParsedType {
    pub fn span(&self) -> Span {
        match self {
            ParsedType::Named { span, .. } | ParsedType::Function { span, .. } => *span,
        }
    }
}

/// A parsed source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    pub functions: Vec<Function>,
}
