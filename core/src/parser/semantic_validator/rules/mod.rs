//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `undefined_variable.rs` - Variables used before declaration
//! - `nested_yield.rs` - Yield expressions nested inside other expressions
//! - `loop_control.rs` - `break`/`continue` outside a loop

mod loop_control;
mod nested_yield;
mod undefined_variable;

pub use loop_control::LoopControlRule;
pub use nested_yield::NestedYieldRule;
pub use undefined_variable::UndefinedVariableRule;
