//! Native library
//!
//! Natives are identified by a serializable enum so they survive a snapshot.
//! Host-facing natives reach the embedding application through [`Host`].

use super::errors::{self, ErrorInfo};
use super::types::{BoundCall, Val};
use super::vm::Runtime;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a send the host could not route
const NO_SUCH_COMPONENT: &str = "no such component";

/// Services the embedding application exposes to guest code
pub trait Host {
    /// Seconds of CPU time the guest has consumed
    fn cpu_clock(&self) -> f64;

    /// Simulated world time in ticks
    fn world_time(&self) -> f64;

    /// Seconds since the current run started
    fn uptime(&self) -> f64;

    /// Bytes the user program may use in total
    fn total_memory(&self) -> f64;

    fn address(&self) -> String;

    fn boot_address(&self) -> Option<String>;

    fn print(&self, text: &str);

    /// Send a message to another component. `None` if the target is unknown.
    fn send(&self, target: &str, method: &str, args: &[Value]) -> Option<Vec<Value>>;

    fn peer_name(&self, address: &str) -> Option<String>;
}

/// Native function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Native {
    // Operator builtins
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Not,
    Neg,

    // General builtins
    Len,
    Str,
    Type,
    Push,
    Error,
    Defer,

    // Host library
    ComputerClock,
    ComputerTime,
    ComputerUptime,
    ComputerFreeMemory,
    ComputerTotalMemory,
    ComputerAddress,
    ComputerBootAddress,
    Print,
    ComponentInvoke,
    ComponentSend,
    ComponentName,
    Persist,
    Unpersist,
}

impl Native {
    pub fn name(&self) -> &'static str {
        match self {
            Native::Add => "add",
            Native::Sub => "sub",
            Native::Mul => "mul",
            Native::Div => "div",
            Native::Mod => "mod",
            Native::Eq => "eq",
            Native::Ne => "ne",
            Native::Lt => "lt",
            Native::Lte => "lte",
            Native::Gt => "gt",
            Native::Gte => "gte",
            Native::Not => "not",
            Native::Neg => "neg",
            Native::Len => "len",
            Native::Str => "str",
            Native::Type => "type",
            Native::Push => "push",
            Native::Error => "error",
            Native::Defer => "defer",
            Native::ComputerClock => "computer.clock",
            Native::ComputerTime => "computer.time",
            Native::ComputerUptime => "computer.uptime",
            Native::ComputerFreeMemory => "computer.freeMemory",
            Native::ComputerTotalMemory => "computer.totalMemory",
            Native::ComputerAddress => "computer.address",
            Native::ComputerBootAddress => "computer.bootAddress",
            Native::Print => "print",
            Native::ComponentInvoke => "component.invoke",
            Native::ComponentSend => "component.send",
            Native::ComponentName => "component.name",
            Native::Persist => "persistence.persist",
            Native::Unpersist => "persistence.unpersist",
        }
    }

    /// Natives that may only run on the controlling thread
    pub fn is_synchronized(&self) -> bool {
        matches!(self, Native::ComponentSend)
    }
}

/// Top-level builtins, keyed by the name the parser and guest use
const BUILTINS: &[Native] = &[
    Native::Add,
    Native::Sub,
    Native::Mul,
    Native::Div,
    Native::Mod,
    Native::Eq,
    Native::Ne,
    Native::Lt,
    Native::Lte,
    Native::Gt,
    Native::Gte,
    Native::Not,
    Native::Neg,
    Native::Len,
    Native::Str,
    Native::Type,
    Native::Push,
    Native::Error,
    Native::Defer,
    Native::Print,
];

/// Names of every global the library installs
pub fn global_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTINS.iter().map(Native::name).collect();
    names.extend(["computer", "component", "system", "drivers", "persistence"]);
    names
}

/// Build the global table installed into a fresh interpreter
pub fn library(timeout: f64, drivers: &BTreeMap<String, String>) -> BTreeMap<String, Val> {
    let mut globals: BTreeMap<String, Val> = BUILTINS
        .iter()
        .map(|native| (native.name().to_string(), Val::Native(*native)))
        .collect();

    globals.insert(
        "computer".to_string(),
        table(&[
            ("clock", Native::ComputerClock),
            ("time", Native::ComputerTime),
            ("uptime", Native::ComputerUptime),
            ("freeMemory", Native::ComputerFreeMemory),
            ("totalMemory", Native::ComputerTotalMemory),
            ("address", Native::ComputerAddress),
            ("bootAddress", Native::ComputerBootAddress),
        ]),
    );
    globals.insert(
        "component".to_string(),
        table(&[
            ("invoke", Native::ComponentInvoke),
            ("name", Native::ComponentName),
        ]),
    );
    globals.insert(
        "persistence".to_string(),
        table(&[
            ("persist", Native::Persist),
            ("unpersist", Native::Unpersist),
        ]),
    );

    let mut system = BTreeMap::new();
    system.insert("timeout".to_string(), Val::Num(timeout));
    globals.insert("system".to_string(), Val::Obj(system));

    let drivers = drivers
        .iter()
        .map(|(name, source)| (name.clone(), Val::Str(source.clone())))
        .collect();
    globals.insert("drivers".to_string(), Val::Obj(drivers));

    globals
}

fn table(entries: &[(&str, Native)]) -> Val {
    Val::Obj(
        entries
            .iter()
            .map(|(key, native)| (key.to_string(), Val::Native(*native)))
            .collect(),
    )
}

/* ===================== Dispatch ===================== */

/// Outcome of a native call: a value, or a guest error to throw
pub type NativeResult = Result<Val, Val>;

/// Call a native with the full runtime available
pub fn call(native: Native, args: Vec<Val>, rt: &mut Runtime) -> NativeResult {
    if native.is_synchronized() && !rt.synchronized {
        return Err(error_val(
            errors::SYNCHRONIZED_ONLY,
            format!("{} must be yielded to the host", native.name()),
        ));
    }

    match native {
        Native::ComputerClock => Ok(Val::Num(rt.host.cpu_clock())),
        Native::ComputerTime => Ok(Val::Num(rt.host.world_time())),
        Native::ComputerUptime => Ok(Val::Num(rt.host.uptime())),
        Native::ComputerFreeMemory => Ok(Val::Num(rt.free_memory(rt.host.total_memory()))),
        Native::ComputerTotalMemory => Ok(Val::Num(rt.host.total_memory())),
        Native::ComputerAddress => Ok(Val::Str(rt.host.address())),
        Native::ComputerBootAddress => Ok(rt.host.boot_address().map_or(Val::Null, Val::Str)),
        Native::Print => {
            let parts: Vec<String> = args.iter().map(Val::to_display).collect();
            rt.host.print(&parts.join(" "));
            Ok(Val::Null)
        }
        Native::ComponentName => {
            let address = string_arg(native, &args, 0)?;
            Ok(rt.host.peer_name(&address).map_or(Val::Null, Val::Str))
        }
        Native::ComponentSend => component_send(&args, rt),
        _ => call_pure(native, args),
    }
}

/// Call a native that needs nothing from the host
pub fn call_pure(native: Native, args: Vec<Val>) -> NativeResult {
    match native {
        Native::Add => add(args),
        Native::Sub => arith(native, &args, |a, b| Ok(a - b)),
        Native::Mul => arith(native, &args, |a, b| Ok(a * b)),
        Native::Div => arith(native, &args, |a, b| {
            if b == 0.0 {
                Err("division by zero")
            } else {
                Ok(a / b)
            }
        }),
        Native::Mod => arith(native, &args, |a, b| {
            if b == 0.0 {
                Err("modulo by zero")
            } else {
                Ok(a - (a / b).floor() * b)
            }
        }),
        Native::Eq => {
            let (a, b) = two_args(native, &args)?;
            Ok(Val::Bool(a == b))
        }
        Native::Ne => {
            let (a, b) = two_args(native, &args)?;
            Ok(Val::Bool(a != b))
        }
        Native::Lt => compare(native, &args, |o| o.is_lt()),
        Native::Lte => compare(native, &args, |o| o.is_le()),
        Native::Gt => compare(native, &args, |o| o.is_gt()),
        Native::Gte => compare(native, &args, |o| o.is_ge()),
        Native::Not => {
            let value = one_arg(native, &args)?;
            Ok(Val::Bool(!value.is_truthy()))
        }
        Native::Neg => match one_arg(native, &args)? {
            Val::Num(n) => Ok(Val::Num(-n)),
            other => Err(wrong_type(native, "number", other)),
        },
        Native::Len => match one_arg(native, &args)? {
            Val::Str(s) => Ok(Val::Num(s.chars().count() as f64)),
            Val::List(items) => Ok(Val::Num(items.len() as f64)),
            Val::Obj(map) => Ok(Val::Num(map.len() as f64)),
            other => Err(wrong_type(native, "string, list or object", other)),
        },
        Native::Str => Ok(Val::Str(one_arg(native, &args)?.to_display())),
        Native::Type => Ok(Val::Str(one_arg(native, &args)?.type_name().to_string())),
        Native::Push => {
            let (list, item) = two_args(native, &args)?;
            match list {
                Val::List(items) => {
                    let mut items = items.clone();
                    items.push(item.clone());
                    Ok(Val::List(items))
                }
                other => Err(wrong_type(native, "list", other)),
            }
        }
        Native::Error => {
            let message = args
                .first()
                .map(Val::to_display)
                .unwrap_or_else(|| "error".to_string());
            Err(error_val(errors::USER, message))
        }
        Native::Defer => defer(args),
        Native::ComponentInvoke => {
            string_arg(native, &args, 0)?;
            string_arg(native, &args, 1)?;
            Ok(Val::Bound(Box::new(BoundCall {
                native: Native::ComponentSend,
                args,
            })))
        }
        Native::Persist => {
            let value = one_arg(native, &args)?;
            serde_json::to_string(value)
                .map(Val::Str)
                .map_err(|e| error_val(errors::SERIALIZATION, e.to_string()))
        }
        Native::Unpersist => {
            let blob = string_arg(native, &args, 0)?;
            serde_json::from_str(&blob).map_err(|e| error_val(errors::SERIALIZATION, e.to_string()))
        }
        host_native => Err(error_val(
            errors::SYNCHRONIZED_ONLY,
            format!("{} is not available here", host_native.name()),
        )),
    }
}

fn component_send(args: &[Val], rt: &mut Runtime) -> NativeResult {
    let target = string_arg(Native::ComponentSend, args, 0)?;
    let method = string_arg(Native::ComponentSend, args, 1)?;
    let payload = args[2..]
        .iter()
        .map(|arg| {
            Value::try_from(arg).map_err(|kind| {
                error_val(
                    errors::WRONG_ARG_TYPE,
                    format!("cannot send a {} to a component", kind),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let container = match rt.host.send(&target, &method, &payload) {
        Some(results) => std::iter::once(Val::Bool(true))
            .chain(results.into_iter().map(Val::from))
            .collect(),
        None => vec![Val::Bool(false), Val::Str(NO_SUCH_COMPONENT.to_string())],
    };
    Ok(Val::List(container))
}

fn defer(args: Vec<Val>) -> NativeResult {
    let mut args = args.into_iter();
    match args.next() {
        Some(Val::Native(native)) => Ok(Val::Bound(Box::new(BoundCall {
            native,
            args: args.collect(),
        }))),
        Some(Val::Bound(bound)) => {
            let mut bound = *bound;
            bound.args.extend(args);
            Ok(Val::Bound(Box::new(bound)))
        }
        Some(other) => Err(wrong_type(Native::Defer, "function", &other)),
        None => Err(wrong_count(Native::Defer, 1, 0)),
    }
}

fn add(args: Vec<Val>) -> NativeResult {
    let (a, b) = two_args(Native::Add, &args)?;
    match (a, b) {
        (Val::Num(x), Val::Num(y)) => Ok(Val::Num(x + y)),
        (Val::List(x), Val::List(y)) => Ok(Val::List(x.iter().chain(y).cloned().collect())),
        (Val::Str(_), _) | (_, Val::Str(_)) => {
            Ok(Val::Str(format!("{}{}", a.to_display(), b.to_display())))
        }
        (other, Val::Num(_)) | (_, other) => Err(wrong_type(Native::Add, "number or string", other)),
    }
}

fn arith(
    native: Native,
    args: &[Val],
    op: impl Fn(f64, f64) -> Result<f64, &'static str>,
) -> NativeResult {
    match two_args(native, args)? {
        (Val::Num(a), Val::Num(b)) => op(*a, *b)
            .map(Val::Num)
            .map_err(|msg| error_val(errors::WRONG_ARG_TYPE, msg)),
        (Val::Num(_), other) | (other, _) => Err(wrong_type(native, "number", other)),
    }
}

fn compare(
    native: Native,
    args: &[Val],
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> NativeResult {
    let ordering = match two_args(native, args)? {
        (Val::Num(a), Val::Num(b)) => a.partial_cmp(b),
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(error_val(
                errors::WRONG_ARG_TYPE,
                format!("cannot compare {} with {}", a.type_name(), b.type_name()),
            ))
        }
    };
    Ok(Val::Bool(ordering.map_or(false, test)))
}

/* ===================== Argument Helpers ===================== */

fn one_arg(native: Native, args: &[Val]) -> Result<&Val, Val> {
    args.first().ok_or_else(|| wrong_count(native, 1, 0))
}

fn two_args(native: Native, args: &[Val]) -> Result<(&Val, &Val), Val> {
    match args {
        [a, b, ..] => Ok((a, b)),
        _ => Err(wrong_count(native, 2, args.len())),
    }
}

fn string_arg(native: Native, args: &[Val], index: usize) -> Result<String, Val> {
    match args.get(index) {
        Some(Val::Str(s)) => Ok(s.clone()),
        Some(other) => Err(wrong_type(native, "string", other)),
        None => Err(wrong_count(native, index + 1, args.len())),
    }
}

pub(crate) fn error_val(code: &str, message: impl Into<String>) -> Val {
    Val::Error(ErrorInfo::new(code, message))
}

fn wrong_count(native: Native, expected: usize, got: usize) -> Val {
    error_val(
        errors::WRONG_ARG_COUNT,
        format!(
            "{} expects at least {} argument(s), got {}",
            native.name(),
            expected,
            got
        ),
    )
}

fn wrong_type(native: Native, expected: &str, got: &Val) -> Val {
    error_val(
        errors::WRONG_ARG_TYPE,
        format!("{} expects a {}, got {}", native.name(), expected, got.type_name()),
    )
}
