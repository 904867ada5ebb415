//! Rule: Loop Control
//!
//! `break` and `continue` are only meaningful inside a `while` body. Outside
//! one they escape the coroutine and surface as a runtime error.

use crate::interpreter::types::Stmt;

use super::super::{ValidationError, ValidationRule};

pub struct LoopControlRule;

impl ValidationRule for LoopControlRule {
    fn id(&self) -> &'static str {
        "loop-control"
    }

    fn description(&self) -> &'static str {
        "break and continue must appear inside a loop"
    }

    fn validate(&self, program: &Stmt) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_stmt(program, false, &mut errors, self.id());
        errors
    }
}

fn check_stmt(
    stmt: &Stmt,
    in_loop: bool,
    errors: &mut Vec<ValidationError>,
    rule_id: &'static str,
) {
    match stmt {
        Stmt::Break { span } if !in_loop => errors.push(ValidationError::error(
            *span,
            "'break' outside of a loop",
            rule_id,
        )),
        Stmt::Continue { span } if !in_loop => errors.push(ValidationError::error(
            *span,
            "'continue' outside of a loop",
            rule_id,
        )),
        Stmt::Block { body, .. } => {
            for stmt in body {
                check_stmt(stmt, in_loop, errors, rule_id);
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            check_stmt(then_s, in_loop, errors, rule_id);
            if let Some(else_s) = else_s {
                check_stmt(else_s, in_loop, errors, rule_id);
            }
        }
        Stmt::While { body, .. } => check_stmt(body, true, errors, rule_id),
        Stmt::Try {
            body, catch_body, ..
        } => {
            check_stmt(body, in_loop, errors, rule_id);
            check_stmt(catch_body, in_loop, errors, rule_id);
        }
        _ => {}
    }
}
