//! Runtime value types

use super::super::errors::ErrorInfo;
use super::super::natives::Native;
use super::super::vm::Coroutine;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Footprint of a scalar value or an empty container header
const SCALAR_COST: usize = 16;
const STRING_COST: usize = 24;
const LIST_COST: usize = 32;
const OBJ_COST: usize = 48;
const ENTRY_COST: usize = 24;

/// Runtime value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(BTreeMap<String, Val>),
    /// Host or builtin function
    Native(Native),
    /// Native function with captured leading arguments
    Bound(Box<BoundCall>),
    /// A coroutine
    Thread(Box<Coroutine>),
    /// Error value with code and message
    Error(ErrorInfo),
}

/// A callable that remembers its leading arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundCall {
    pub native: Native,
    pub args: Vec<Val>,
}

impl Val {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Bool(b) => *b,
            Val::Null => false,
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Val::Native(_) | Val::Bound(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "list",
            Val::Obj(_) => "object",
            Val::Native(_) | Val::Bound(_) => "function",
            Val::Thread(_) => "thread",
            Val::Error(_) => "error",
        }
    }

    /// Deterministic memory footprint in bytes
    pub fn footprint(&self) -> usize {
        match self {
            Val::Null | Val::Bool(_) | Val::Num(_) | Val::Native(_) => SCALAR_COST,
            Val::Str(s) => STRING_COST + s.len(),
            Val::List(items) => LIST_COST + items.iter().map(Val::footprint).sum::<usize>(),
            Val::Obj(map) => table_footprint(map),
            Val::Bound(bound) => {
                LIST_COST + bound.args.iter().map(Val::footprint).sum::<usize>()
            }
            Val::Thread(co) => co.footprint(),
            Val::Error(err) => LIST_COST + err.code.len() + err.message.len(),
        }
    }

    /// Human-readable rendering used by `print` and `str`
    pub fn to_display(&self) -> String {
        match self {
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::List(items) => {
                let parts: Vec<String> = items.iter().map(Val::to_display).collect();
                format!("[{}]", parts.join(", "))
            }
            Val::Obj(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_display()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Val::Native(native) => format!("function: {}", native.name()),
            Val::Bound(bound) => format!("function: {} (bound)", bound.native.name()),
            Val::Thread(_) => "thread".to_string(),
            Val::Error(err) => err.message.clone(),
        }
    }
}

/// Footprint of an object's entries plus its header
pub fn table_footprint(map: &BTreeMap<String, Val>) -> usize {
    OBJ_COST
        + map
            .iter()
            .map(|(k, v)| ENTRY_COST + k.len() + v.footprint())
            .sum::<usize>()
}

/// Integers print without a trailing `.0`
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<Value> for Val {
    fn from(value: Value) -> Self {
        match value {
            Value::Nothing => Val::Null,
            Value::Bool(b) => Val::Bool(b),
            Value::Number(n) => Val::Num(n),
            Value::Str(s) => Val::Str(s),
        }
    }
}

impl TryFrom<&Val> for Value {
    type Error = &'static str;

    /// Only the closed signal kinds cross the host boundary
    fn try_from(val: &Val) -> Result<Self, Self::Error> {
        match val {
            Val::Null => Ok(Value::Nothing),
            Val::Bool(b) => Ok(Value::Bool(*b)),
            Val::Num(n) => Ok(Value::Number(*n)),
            Val::Str(s) => Ok(Value::Str(s.clone())),
            other => Err(other.type_name()),
        }
    }
}
