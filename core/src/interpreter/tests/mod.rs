//! Tests for the guest interpreter
//!
//! Organized by feature area

mod helpers;

mod error_tests;
