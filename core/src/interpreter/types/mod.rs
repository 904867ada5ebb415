//! Type definitions for the guest interpreter
//!
//! - AST nodes (Stmt, Expr)
//! - Runtime values (Val)
//! - Control flow (Control, Frame, FrameKind)
//! - Execution phases for each statement type

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

pub use ast::{BinaryOp, Expr, MemberAccess, Span, Stmt};
pub use control::{Binding, Control, Frame, FrameKind};
pub use phase::*;
pub use values::{BoundCall, Val};
