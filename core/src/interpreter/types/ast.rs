//! Syntax tree of guest programs
//!
//! Programs travel inside kernel snapshots, so every node is serializable.
//! Source positions only matter to the parser and validator and are left out
//! of the serialized form.

use serde::{Deserialize, Serialize};

/// Byte range of a node plus the 0-indexed line and column it starts at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self {
            start,
            end,
            line,
            col,
        }
    }

    /// Smallest span covering both
    pub fn to(self, other: Span) -> Span {
        let first = if self.start <= other.start { self } else { other };
        Span {
            start: first.start,
            end: self.end.max(other.end),
            line: first.line,
            col: first.col,
        }
    }
}

/// One step of an assignment target: `.name` or `[expr]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum MemberAccess {
    Prop {
        property: String,
        #[serde(skip)]
        span: Span,
    },
    Index {
        expr: Expr,
        #[serde(skip)]
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(skip)]
        span: Span,
    },
    /// `let name [= init]`
    Declare {
        name: String,
        init: Option<Expr>,
        #[serde(skip)]
        span: Span,
    },
    Assign {
        var: String,
        path: Vec<MemberAccess>,
        value: Expr,
        #[serde(skip)]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(skip)]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(skip)]
        span: Span,
    },
    Return {
        value: Option<Expr>,
        #[serde(skip)]
        span: Span,
    },
    /// `try { .. } catch (e) { .. }`
    Try {
        body: Box<Stmt>,
        catch_var: String,
        catch_body: Box<Stmt>,
        #[serde(skip)]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(skip)]
        span: Span,
    },
    Break {
        #[serde(skip)]
        span: Span,
    },
    Continue {
        #[serde(skip)]
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. }
            | Stmt::Declare { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span } => *span,
        }
    }
}

/// Short-circuit operators; everything else is a native call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitBool {
        v: bool,
        #[serde(skip)]
        span: Span,
    },
    LitNum {
        v: f64,
        #[serde(skip)]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(skip)]
        span: Span,
    },
    LitNull {
        #[serde(skip)]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(skip)]
        span: Span,
    },
    LitObj {
        properties: Vec<(String, Expr)>,
        #[serde(skip)]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(skip)]
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        #[serde(skip)]
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        #[serde(skip)]
        span: Span,
    },
    /// Suspend the coroutine, handing `inner` to the host
    Yield {
        inner: Option<Box<Expr>>,
        #[serde(skip)]
        span: Span,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::LitBool { span, .. }
            | Expr::LitNum { span, .. }
            | Expr::LitStr { span, .. }
            | Expr::LitNull { span }
            | Expr::LitList { span, .. }
            | Expr::LitObj { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::Call { span, .. }
            | Expr::Yield { span, .. }
            | Expr::BinaryOp { span, .. } => *span,
        }
    }
}
