pub mod accounting;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod errors;
pub mod host;
pub mod interpreter;
pub mod machine;
pub mod parser;
pub mod persistence;
pub mod signals;
pub mod snapshot;
pub mod types;

// Re-export main types
pub use types::*;

pub use config::Config;
pub use engine::Engine;
pub use errors::MachineError;
pub use machine::{Collaborators, Instance};
