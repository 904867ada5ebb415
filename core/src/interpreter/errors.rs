//! Guest-visible error values
//!
//! These are ordinary values the guest can catch with `try/catch`; they are
//! distinct from interpreter [`Fault`]s, which abort a resume.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WRONG_ARG_COUNT: &str = "WRONG_ARG_COUNT";
pub const WRONG_ARG_TYPE: &str = "WRONG_ARG_TYPE";
pub const UNDEFINED_VARIABLE: &str = "UNDEFINED_VARIABLE";
pub const NOT_CALLABLE: &str = "NOT_CALLABLE";
pub const BAD_ACCESS: &str = "BAD_ACCESS";
pub const BAD_CONTROL: &str = "BAD_CONTROL";
pub const SYNCHRONIZED_ONLY: &str = "SYNCHRONIZED_ONLY";
pub const SERIALIZATION: &str = "SERIALIZATION";
/// Raised by the guest itself through `error(...)`
pub const USER: &str = "USER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Failure that aborts a resume and cannot be caught by the guest
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// A binding write pushed the interpreter past its memory ceiling
    #[error("memory limit exceeded")]
    AllocationLimit,

    /// The guest left the protected region with an error
    #[error("runtime fault: {0}")]
    Runtime(String),

    /// The interpreter reached a state its own invariants rule out
    #[error("internal fault: {0}")]
    Internal(String),

    /// A value crossed the host boundary in the wrong shape
    #[error("protocol violation: {0}")]
    Protocol(String),
}
