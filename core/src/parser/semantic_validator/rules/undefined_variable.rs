//! Rule: a name must be declared (or be a library global) before it is read
//! or assigned.
//!
//! ```text
//! let y = x + 1   // error: 'x' is not declared yet
//! let x = 5
//! ```

use std::collections::HashSet;

use crate::interpreter::natives;
use crate::interpreter::types::{Expr, MemberAccess, Stmt};

use super::super::{ValidationError, ValidationRule};

pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "Variables must be declared before use"
    }

    fn validate(&self, program: &Stmt) -> Vec<ValidationError> {
        let mut walker = Walker {
            scopes: vec![natives::global_names().into_iter().map(str::to_string).collect()],
            errors: Vec::new(),
            rule_id: self.id(),
        };
        walker.stmt(program);
        walker.errors
    }
}

/// Scope stack: the library globals at the bottom, one frame per block
struct Walker {
    scopes: Vec<HashSet<String>>,
    errors: Vec<ValidationError>,
    rule_id: &'static str,
}

impl Walker {
    fn declared(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    /// Run `f` inside a fresh frame, optionally pre-seeded with `binding`
    fn nested(&mut self, binding: Option<&str>, f: impl FnOnce(&mut Self)) {
        self.scopes.push(binding.into_iter().map(str::to_string).collect());
        f(self);
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declare { name, init, .. } => {
                // Initializer first, so `let x = x` is caught
                if let Some(init) = init {
                    self.expr(init);
                }
                self.declare(name);
            }
            Stmt::Assign {
                var,
                path,
                value,
                span,
            } => {
                if !self.declared(var) {
                    self.errors.push(ValidationError::error(
                        *span,
                        format!("Assignment to undeclared variable '{}'", var),
                        self.rule_id,
                    ));
                }
                for segment in path {
                    if let MemberAccess::Index { expr, .. } = segment {
                        self.expr(expr);
                    }
                }
                self.expr(value);
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                ..
            } => {
                self.expr(test);
                self.nested(None, |w| w.stmt(then_s));
                if let Some(else_s) = else_s {
                    self.nested(None, |w| w.stmt(else_s));
                }
            }
            Stmt::While { test, body, .. } => {
                self.expr(test);
                self.nested(None, |w| w.stmt(body));
            }
            Stmt::Try {
                body,
                catch_var,
                catch_body,
                ..
            } => {
                self.nested(None, |w| w.stmt(body));
                self.nested(Some(catch_var), |w| w.stmt(catch_body));
            }
            Stmt::Block { body, .. } => self.nested(None, |w| body.iter().for_each(|s| w.stmt(s))),
            Stmt::Return { value: Some(expr), .. } | Stmt::Expr { expr, .. } => self.expr(expr),
            Stmt::Return { value: None, .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident { name, span } => {
                if !self.declared(name) {
                    self.errors.push(ValidationError::error(
                        *span,
                        format!("Undefined variable '{}'", name),
                        self.rule_id,
                    ));
                }
            }
            // The property is a key, not a name
            Expr::Member { object, .. } => self.expr(object),
            Expr::Index { object, index, .. } => {
                self.expr(object);
                self.expr(index);
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                args.iter().for_each(|arg| self.expr(arg));
            }
            Expr::Yield { inner, .. } => {
                if let Some(inner) = inner {
                    self.expr(inner);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::LitList { elements, .. } => elements.iter().for_each(|e| self.expr(e)),
            Expr::LitObj { properties, .. } => properties.iter().for_each(|(_, v)| self.expr(v)),
            Expr::LitBool { .. } | Expr::LitNum { .. } | Expr::LitStr { .. } | Expr::LitNull { .. } => {}
        }
    }
}
