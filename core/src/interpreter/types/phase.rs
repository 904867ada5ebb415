//! Execution phase enums for each statement type
//!
//! Each statement type tracks which execution step it is at. These are
//! serialized as part of the coroutine snapshot.

use serde::{Deserialize, Serialize};

/// Execution phase for While statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WhilePhase {
    /// Evaluate the loop condition
    Test = 0,
}

/// Execution phase for Try statements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TryPhase {
    /// Body not yet pushed
    Start = 0,
    /// Executing the try block
    ExecuteTry = 1,
    /// Executing the catch block (error was caught)
    ExecuteCatch = 2,
}
