//! Expression evaluation
//!
//! Expressions evaluate recursively on the host stack; only statements are
//! resumable. The parser restricts `yield` to positions where re-evaluating
//! the enclosing statement on resume has no side effects before the `yield`.

use super::errors::{self, Fault};
use super::natives::{self, error_val};
use super::types::{BinaryOp, Binding, Expr, Val};
use super::vm::Runtime;
use std::collections::BTreeMap;

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    /// Expression evaluated to a value
    Value(Val),
    /// A `yield` suspended the coroutine with this value
    Suspend(Val),
    /// A guest error was raised
    Throw(Val),
}

/// Unwrap a value or propagate suspend/throw to the caller
macro_rules! eval_value {
    ($e:expr) => {
        match $e? {
            EvalResult::Value(v) => v,
            other => return Ok(other),
        }
    };
}

/// Evaluate an expression to a value
pub fn eval_expr(
    expr: &Expr,
    env: &[Binding],
    resume_value: &mut Option<Val>,
    rt: &mut Runtime,
) -> Result<EvalResult, Fault> {
    match expr {
        Expr::LitBool { v, .. } => Ok(EvalResult::Value(Val::Bool(*v))),
        Expr::LitNum { v, .. } => Ok(EvalResult::Value(Val::Num(*v))),
        Expr::LitStr { v, .. } => Ok(EvalResult::Value(Val::Str(v.clone()))),
        Expr::LitNull { .. } => Ok(EvalResult::Value(Val::Null)),

        Expr::LitList { elements, .. } => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval_value!(eval_expr(element, env, resume_value, rt)));
            }
            Ok(EvalResult::Value(Val::List(items)))
        }

        Expr::LitObj { properties, .. } => {
            let mut map = BTreeMap::new();
            for (key, value_expr) in properties {
                let value = eval_value!(eval_expr(value_expr, env, resume_value, rt));
                map.insert(key.clone(), value);
            }
            Ok(EvalResult::Value(Val::Obj(map)))
        }

        Expr::Ident { name, .. } => {
            let found = env
                .iter()
                .rev()
                .find(|b| b.name == *name)
                .map(|b| &b.value)
                .or_else(|| rt.globals.get(name));
            Ok(match found {
                Some(value) => EvalResult::Value(value.clone()),
                None => EvalResult::Throw(error_val(
                    errors::UNDEFINED_VARIABLE,
                    format!("undefined variable '{}'", name),
                )),
            })
        }

        Expr::Member {
            object, property, ..
        } => {
            let object = eval_value!(eval_expr(object, env, resume_value, rt));
            Ok(index(&object, &Val::Str(property.clone())))
        }

        Expr::Index { object, index: key, .. } => {
            let object = eval_value!(eval_expr(object, env, resume_value, rt));
            let key = eval_value!(eval_expr(key, env, resume_value, rt));
            Ok(index(&object, &key))
        }

        Expr::Call { callee, args, .. } => {
            let callee = eval_value!(eval_expr(callee, env, resume_value, rt));
            let mut arg_vals = Vec::with_capacity(args.len());
            for arg in args {
                arg_vals.push(eval_value!(eval_expr(arg, env, resume_value, rt)));
            }

            let result = match callee {
                Val::Native(native) => natives::call(native, arg_vals, rt),
                Val::Bound(bound) => {
                    let mut full = bound.args;
                    full.extend(arg_vals);
                    natives::call(bound.native, full, rt)
                }
                other => Err(error_val(
                    errors::NOT_CALLABLE,
                    format!("cannot call a {} value", other.type_name()),
                )),
            };
            Ok(match result {
                Ok(value) => EvalResult::Value(value),
                Err(error) => EvalResult::Throw(error),
            })
        }

        Expr::Yield { inner, .. } => {
            // Resuming: the yield evaluates to what the host delivered
            if let Some(value) = resume_value.take() {
                return Ok(EvalResult::Value(value));
            }
            let value = match inner {
                Some(inner) => eval_value!(eval_expr(inner, env, resume_value, rt)),
                None => Val::Null,
            };
            Ok(EvalResult::Suspend(value))
        }

        Expr::BinaryOp {
            op, left, right, ..
        } => {
            let left = eval_value!(eval_expr(left, env, resume_value, rt));
            let short_circuit = match op {
                BinaryOp::And => !left.is_truthy(),
                BinaryOp::Or => left.is_truthy(),
            };
            if short_circuit {
                return Ok(EvalResult::Value(left));
            }
            eval_expr(right, env, resume_value, rt)
        }
    }
}

/// Read `object[key]`; a missing key on an object or list reads as null
fn index(object: &Val, key: &Val) -> EvalResult {
    match (object, key) {
        (Val::Obj(map), Val::Str(prop)) => {
            EvalResult::Value(map.get(prop).cloned().unwrap_or(Val::Null))
        }
        (Val::List(items), Val::Num(n)) => {
            let item = if *n >= 0.0 && n.fract() == 0.0 {
                items.get(*n as usize).cloned()
            } else {
                None
            };
            EvalResult::Value(item.unwrap_or(Val::Null))
        }
        (Val::Error(info), Val::Str(prop)) if prop == "message" => {
            EvalResult::Value(Val::Str(info.message.clone()))
        }
        (Val::Error(info), Val::Str(prop)) if prop == "code" => {
            EvalResult::Value(Val::Str(info.code.clone()))
        }
        (object, key) => EvalResult::Throw(error_val(
            errors::BAD_ACCESS,
            format!(
                "cannot index {} with {}",
                object.type_name(),
                key.type_name()
            ),
        )),
    }
}
