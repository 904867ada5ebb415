//! Test helpers for interpreter tests
//!
//! Common utilities for parsing programs and driving coroutines

use crate::interpreter::natives::{self, Host};
use crate::interpreter::types::{Stmt, Val};
use crate::interpreter::vm::{CoResult, Coroutine, Runtime};
use crate::parser::{parse_program, semantic_validator};
use crate::types::Value;
use std::cell::RefCell;
use maplit::btreemap;
use std::collections::BTreeMap;

/// Host double that records prints and answers sends from a fixed table
#[derive(Default)]
pub struct TestHost {
    pub printed: RefCell<Vec<String>>,
    pub sent: RefCell<Vec<(String, String, Vec<Value>)>>,
    /// Known components and the results they answer with
    pub components: BTreeMap<String, Vec<Value>>,
    pub total_memory: f64,
}

impl TestHost {
    pub fn with_component(mut self, address: &str, results: Vec<Value>) -> Self {
        self.components.insert(address.to_string(), results);
        self
    }
}

impl Host for TestHost {
    fn cpu_clock(&self) -> f64 {
        1.5
    }

    fn world_time(&self) -> f64 {
        24000.0
    }

    fn uptime(&self) -> f64 {
        3.0
    }

    fn total_memory(&self) -> f64 {
        self.total_memory
    }

    fn address(&self) -> String {
        "computer-1".to_string()
    }

    fn boot_address(&self) -> Option<String> {
        Some("disk-1".to_string())
    }

    fn print(&self, text: &str) {
        self.printed.borrow_mut().push(text.to_string());
    }

    fn send(&self, target: &str, method: &str, args: &[Value]) -> Option<Vec<Value>> {
        self.sent
            .borrow_mut()
            .push((target.to_string(), method.to_string(), args.to_vec()));
        self.components.get(target).cloned()
    }

    fn peer_name(&self, address: &str) -> Option<String> {
        self.components.get(address).map(|_| "peer".to_string())
    }
}

/// Parse and validate a program, passing it through a serde round-trip
pub fn parse(source: &str) -> Stmt {
    let program = parse_program(source).expect("Parse program failed");
    let errors = semantic_validator::validate_program(&program);
    assert!(errors.is_empty(), "Validation failed: {:?}", errors);

    let json = serde_json::to_string(&program).expect("Program serialization failed");
    serde_json::from_str(&json).expect("Program deserialization failed")
}

pub fn globals() -> BTreeMap<String, Val> {
    let drivers = btreemap! { "gpu".to_string() => "return 1".to_string() };
    natives::library(5.0, &drivers)
}

/// Run `source` to its first yield or its end
pub fn run(source: &str) -> CoResult {
    run_with(source, &TestHost::default())
}

pub fn run_with(source: &str, host: &TestHost) -> CoResult {
    let globals = globals();
    let mut rt = Runtime::new(&globals, host);
    let mut co = Coroutine::new(parse(source), true);
    co.resume(Val::Null, &mut rt).expect("resume faulted")
}

/// Value returned by `source`, failing on a yield or error
pub fn returned(source: &str) -> Val {
    match run(source) {
        CoResult::Returned(value) => value,
        other => panic!("Expected a return, got {:?}", other),
    }
}

/// Error thrown by `source`
pub fn thrown(source: &str) -> Val {
    match run(source) {
        CoResult::Threw(error) => error,
        other => panic!("Expected a throw, got {:?}", other),
    }
}

pub fn num(n: f64) -> Val {
    Val::Num(n)
}

pub fn text(s: &str) -> Val {
    Val::Str(s.to_string())
}
