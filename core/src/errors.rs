//! Error taxonomy for machine instances
//!
//! Every variant is terminal for the current run: nothing is retried, and an
//! explicit `start()` is required to recover.

use thiserror::Error;

/// Message shown when the kernel fails without saying why
pub const UNKNOWN_ERROR: &str = "unknown error";
pub const NOT_ENOUGH_MEMORY: &str = "not enough memory";
pub const KERNEL_PANIC: &str = "kernel panic";
pub const PROTOCOL_ERROR: &str = "protocol error";

#[derive(Debug, Error)]
pub enum MachineError {
    /// Guest program or host operation exceeded the memory ceiling
    #[error("allocation limit exceeded")]
    AllocationLimit,

    /// Guest program raised an uncaught error
    #[error("runtime fault: {0}")]
    RuntimeFault(String),

    /// Synchronized call or yield returned something outside the contract
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Snapshot blob missing or of the wrong reconstructed type during load
    #[error("persisted state corrupt: {0}")]
    PersistedStateCorrupt(String),

    /// Resume invoked from an unexpected state, or the interpreter slot was empty
    #[error("scheduling bug: {0}")]
    SchedulingBug(String),

    #[error("boot failed: {0}")]
    Boot(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MachineError {
    /// Text rendered to attached displays after teardown, if any
    pub fn user_message(&self) -> Option<String> {
        match self {
            MachineError::AllocationLimit => Some(NOT_ENOUGH_MEMORY.to_string()),
            MachineError::RuntimeFault(msg) if msg.is_empty() => Some(UNKNOWN_ERROR.to_string()),
            MachineError::RuntimeFault(msg) => Some(msg.clone()),
            MachineError::ProtocolViolation(_) => Some(PROTOCOL_ERROR.to_string()),
            MachineError::Boot(msg) => Some(msg.clone()),
            MachineError::PersistedStateCorrupt(_)
            | MachineError::SchedulingBug(_)
            | MachineError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MachineError>;
