//! AST node types for Ember scripts.
//!
//! Nodes are plain data: the parser builds them, the compiler consumes them,
//! and both are discarded after one compile. Every node carries a span for
//! error attribution.

use crate::span::Span;

/// A parsed script: the ordered top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// A statement with its source extent.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name [= expr];` — global when declared outside any block or function.
    Let {
        name: String,
        init: Option<Expr>,
        global: bool,
    },
    /// `fn name(params) { ... }`
    Function(FnDecl),
    /// `fn onInit(params) { ... }` — host-invoked once per scenario load.
    OnInit(FnDecl),
    /// `fn onTick(params) { ... }` — host-invoked once per frame.
    OnTick(FnDecl),
    /// `return [expr];`
    Return(Option<Expr>),
    /// `if (cond) stmt [else stmt]`
    If {
        condition: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    /// `while (cond) stmt`
    While { condition: Expr, body: Box<Stmt> },
    /// `{ stmt* }`
    Block(Vec<Stmt>),
    /// `schedule(delay, task);`
    Schedule { delay: Expr, task: Expr },
    /// A bare expression followed by `;`.
    Expression(Expr),
}

/// A function declaration body shared by the three function statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

/// An expression with its source extent.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Grouping(Box<Expr>),
    /// `target = value`; the target must be a bare identifier.
    Assign { target: String, value: Box<Expr> },
    /// `call name(args)` — invocation of a host-supplied native.
    NativeCall { name: String, args: Vec<Expr> },
    /// Postfix `callee(args)` — parsed, but not executable (no user calls).
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Placeholder produced by parser error recovery. Distinct from a script
    /// writing `null` so later passes can tell the two apart.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}
