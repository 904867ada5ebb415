//! Checks a parsed program for mistakes the grammar cannot express
//!
//! Each check is a [`ValidationRule`] in `rules/`; [`Validator`] runs them
//! all. Boot payloads and kernels go through the same rules before they are
//! loaded, and `machine check` prints whatever they report.

pub mod rules;

use crate::interpreter::types::{Span, Stmt};

/// One problem found in a program
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
    /// Id of the rule that reported it
    pub rule_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(span, message, rule_id)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} at {}:{}: {} [{}]",
            severity,
            self.span.line + 1,
            self.span.col + 1,
            self.message,
            self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

pub trait ValidationRule: Send + Sync {
    /// Stable id, e.g. `undefined-variable`
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn validate(&self, program: &Stmt) -> Vec<ValidationError>;
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// All built-in rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UndefinedVariableRule),
                Box::new(rules::NestedYieldRule),
                Box::new(rules::LoopControlRule),
            ],
        }
    }

    pub fn validate(&self, program: &Stmt) -> Vec<ValidationError> {
        let mut problems: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(program))
            .collect();
        problems.sort_by_key(|p| p.span.start);
        problems
    }

    /// `(id, description)` of each rule
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every built-in rule, problems ordered by position
pub fn validate_program(program: &Stmt) -> Vec<ValidationError> {
    Validator::new().validate(program)
}

/// True if any rule reports an error rather than a warning
pub fn has_errors(program: &Stmt) -> bool {
    validate_program(program).iter().any(ValidationError::is_error)
}
