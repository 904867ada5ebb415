//! Control flow and execution frame types

use super::ast::Stmt;
use super::phase::{TryPhase, WhilePhase};
use super::values::Val;
use serde::{Deserialize, Serialize};

/* ===================== Control Flow ===================== */

/// Control flow state
///
/// When control != None, the VM unwinds the stack to find the appropriate handler.
/// For Suspend, the VM stops execution and becomes serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Control {
    None,
    Break,
    Continue,
    Return(Val),
    Throw(Val),
    /// Value handed to the host by `yield`
    Suspend(Val),
}

/* ===================== Frames ===================== */

/// Frame kind - the type and state of a statement being executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameKind {
    Block { idx: usize },
    Declare,
    Assign,
    If,
    While { phase: WhilePhase },
    Return,
    Try { phase: TryPhase },
    Expr,
    Break,
    Continue,
}

/// Execution frame - one per active statement
///
/// The frame stack replaces the host call stack, making execution serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub kind: FrameKind,

    /// Environment height when this frame was pushed
    pub scope_base_sp: usize,

    /// The statement this frame represents
    pub node: Stmt,
}

/// A named variable in the environment stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: Val,
}
