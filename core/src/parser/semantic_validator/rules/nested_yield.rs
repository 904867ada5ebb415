//! Rule: Nested Yield
//!
//! A statement that suspends is evaluated again when the coroutine resumes,
//! with the `yield` producing the delivered value. `yield` may therefore only
//! appear as the whole value of a statement: an expression statement, a
//! `let` initializer, an assignment value or a `return` value. Its operand
//! may not contain another `yield`.
//!
//! ```text
//! let signal = yield 0.5        // OK
//! print("got", yield 0.5)       // Error: nested in a call
//! ```

use crate::interpreter::types::{Expr, MemberAccess, Stmt};

use super::super::{ValidationError, ValidationRule};

pub struct NestedYieldRule;

impl ValidationRule for NestedYieldRule {
    fn id(&self) -> &'static str {
        "nested-yield"
    }

    fn description(&self) -> &'static str {
        "yield must be the whole value of a statement"
    }

    fn validate(&self, program: &Stmt) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_stmt(program, &mut errors, self.id());
        errors
    }
}

fn check_stmt(stmt: &Stmt, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match stmt {
        Stmt::Block { body, .. } => {
            for stmt in body {
                check_stmt(stmt, errors, rule_id);
            }
        }
        Stmt::Declare { init, .. } => {
            if let Some(init) = init {
                check_statement_value(init, errors, rule_id);
            }
        }
        Stmt::Assign { path, value, .. } => {
            for segment in path {
                if let MemberAccess::Index { expr, .. } = segment {
                    check_nested(expr, errors, rule_id);
                }
            }
            check_statement_value(value, errors, rule_id);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                check_statement_value(value, errors, rule_id);
            }
        }
        Stmt::Expr { expr, .. } => check_statement_value(expr, errors, rule_id),
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_nested(test, errors, rule_id);
            check_stmt(then_s, errors, rule_id);
            if let Some(else_s) = else_s {
                check_stmt(else_s, errors, rule_id);
            }
        }
        Stmt::While { test, body, .. } => {
            check_nested(test, errors, rule_id);
            check_stmt(body, errors, rule_id);
        }
        Stmt::Try {
            body, catch_body, ..
        } => {
            check_stmt(body, errors, rule_id);
            check_stmt(catch_body, errors, rule_id);
        }
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

/// A statement's value may itself be a yield, but nothing below it may
fn check_statement_value(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::Yield {
            inner: Some(inner), ..
        } => check_nested(inner, errors, rule_id),
        Expr::Yield { inner: None, .. } => {}
        other => check_nested(other, errors, rule_id),
    }
}

/// Report every yield inside `expr`
fn check_nested(expr: &Expr, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match expr {
        Expr::Yield { inner, span } => {
            errors.push(ValidationError::error(
                *span,
                "yield cannot be nested inside another expression; \
                 assign it to a variable first",
                rule_id,
            ));
            if let Some(inner) = inner {
                check_nested(inner, errors, rule_id);
            }
        }
        Expr::Member { object, .. } => check_nested(object, errors, rule_id),
        Expr::Index { object, index, .. } => {
            check_nested(object, errors, rule_id);
            check_nested(index, errors, rule_id);
        }
        Expr::Call { callee, args, .. } => {
            check_nested(callee, errors, rule_id);
            for arg in args {
                check_nested(arg, errors, rule_id);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            check_nested(left, errors, rule_id);
            check_nested(right, errors, rule_id);
        }
        Expr::LitList { elements, .. } => {
            for element in elements {
                check_nested(element, errors, rule_id);
            }
        }
        Expr::LitObj { properties, .. } => {
            for (_, value) in properties {
                check_nested(value, errors, rule_id);
            }
        }
        Expr::Ident { .. }
        | Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull { .. } => {}
    }
}
