//! Statement execution handlers
//!
//! Each statement type has its own handler function that processes
//! the statement based on its current execution phase.
//!
//! A handler that evaluates an expression leaves its frame on the stack when
//! the expression suspends, so the statement is re-evaluated on resume and
//! the `yield` picks up the resume value.

use super::errors::{self, Fault};
use super::expressions::{eval_expr, EvalResult};
use super::natives::error_val;
use super::types::{Binding, Control, Expr, FrameKind, MemberAccess, Stmt, TryPhase, Val, WhilePhase};
use super::vm::{push_stmt, Coroutine, Runtime, Step};

/// Evaluate an expression, or hand suspend/throw to the control state
macro_rules! eval_or_yield {
    ($co:expr, $rt:expr, $expr:expr) => {
        match eval_expr($expr, &$co.env, &mut $co.resume_value, $rt)? {
            EvalResult::Value(v) => v,
            EvalResult::Suspend(v) => {
                $co.control = Control::Suspend(v);
                return Ok(Step::Done);
            }
            EvalResult::Throw(e) => {
                $co.control = Control::Throw(e);
                return Ok(Step::Continue);
            }
        }
    };
}

/* ===================== Statement Handlers ===================== */

/// Execute Block statement
pub fn execute_block(co: &mut Coroutine, frame_idx: usize, idx: usize, body: &[Stmt]) -> Step {
    let Some(child) = body.get(idx) else {
        // Block complete: drop its bindings and pop
        let base = co.frames[frame_idx].scope_base_sp;
        co.env.truncate(base);
        co.frames.pop();
        return Step::Continue;
    };

    co.frames[frame_idx].kind = FrameKind::Block { idx: idx + 1 };
    push_stmt(co, child);
    Step::Continue
}

/// Execute Declare statement
pub fn execute_declare(
    co: &mut Coroutine,
    rt: &mut Runtime,
    name: String,
    init: Option<&Expr>,
) -> Result<Step, Fault> {
    let value = match init {
        Some(expr) => eval_or_yield!(co, rt, expr),
        None => Val::Null,
    };

    co.frames.pop();
    co.env.push(Binding { name, value });
    rt.check_memory(co)?;
    Ok(Step::Continue)
}

/// Execute Assign statement
pub fn execute_assign(
    co: &mut Coroutine,
    rt: &mut Runtime,
    var: &str,
    path: &[MemberAccess],
    value: &Expr,
) -> Result<Step, Fault> {
    let value = eval_or_yield!(co, rt, value);

    let mut keys = Vec::with_capacity(path.len());
    for segment in path {
        keys.push(match segment {
            MemberAccess::Prop { property, .. } => Val::Str(property.clone()),
            MemberAccess::Index { expr, .. } => eval_or_yield!(co, rt, expr),
        });
    }

    let Some(slot) = co.env.iter().rposition(|b| b.name == var) else {
        co.control = Control::Throw(error_val(
            errors::UNDEFINED_VARIABLE,
            format!("cannot assign to undeclared variable '{}'", var),
        ));
        return Ok(Step::Continue);
    };

    if let Err(error) = assign_path(&mut co.env[slot].value, &keys, value) {
        co.control = Control::Throw(error);
        return Ok(Step::Continue);
    }

    co.frames.pop();
    rt.check_memory(co)?;
    Ok(Step::Continue)
}

/// Write `value` at `keys` inside `target`
fn assign_path(target: &mut Val, keys: &[Val], value: Val) -> Result<(), Val> {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };

    let slot = match (target, key) {
        (Val::Obj(map), Val::Str(prop)) => map.entry(prop.clone()).or_insert(Val::Null),
        (Val::List(items), Val::Num(n)) => {
            let idx = *n as usize;
            if n.fract() != 0.0 || *n < 0.0 || idx > items.len() {
                return Err(error_val(
                    errors::BAD_ACCESS,
                    format!("list index {} out of range", n),
                ));
            }
            if idx == items.len() {
                items.push(Val::Null);
            }
            &mut items[idx]
        }
        (target, key) => {
            return Err(error_val(
                errors::BAD_ACCESS,
                format!(
                    "cannot index {} with {}",
                    target.type_name(),
                    key.type_name()
                ),
            ))
        }
    };
    assign_path(slot, rest, value)
}

/// Execute If statement
pub fn execute_if(
    co: &mut Coroutine,
    rt: &mut Runtime,
    test: &Expr,
    then_s: Stmt,
    else_s: Option<Stmt>,
) -> Result<Step, Fault> {
    let cond = eval_or_yield!(co, rt, test);

    co.frames.pop();
    if cond.is_truthy() {
        push_stmt(co, &then_s);
    } else if let Some(else_s) = else_s {
        push_stmt(co, &else_s);
    }
    Ok(Step::Continue)
}

/// Execute While statement
///
/// The frame stays on the stack while the body runs; when the body frame
/// pops, the test is evaluated again.
pub fn execute_while(
    co: &mut Coroutine,
    rt: &mut Runtime,
    phase: WhilePhase,
    test: &Expr,
    body: &Stmt,
) -> Result<Step, Fault> {
    match phase {
        WhilePhase::Test => {
            let cond = eval_or_yield!(co, rt, test);
            if cond.is_truthy() {
                push_stmt(co, body);
            } else {
                co.frames.pop();
            }
            Ok(Step::Continue)
        }
    }
}

/// Execute Return statement
pub fn execute_return(
    co: &mut Coroutine,
    rt: &mut Runtime,
    value: Option<&Expr>,
) -> Result<Step, Fault> {
    let val = match value {
        Some(expr) => eval_or_yield!(co, rt, expr),
        None => Val::Null,
    };

    co.control = Control::Return(val);
    co.frames.pop();
    Ok(Step::Continue)
}

/// Execute Try statement
///
/// Reaching the frame in `ExecuteTry` or `ExecuteCatch` means the pushed
/// body completed normally. Errors are routed to the catch block by unwind.
pub fn execute_try(co: &mut Coroutine, frame_idx: usize, phase: TryPhase, body: &Stmt) -> Step {
    match phase {
        TryPhase::Start => {
            co.frames[frame_idx].kind = FrameKind::Try {
                phase: TryPhase::ExecuteTry,
            };
            push_stmt(co, body);
        }
        TryPhase::ExecuteTry | TryPhase::ExecuteCatch => {
            let base = co.frames[frame_idx].scope_base_sp;
            co.env.truncate(base);
            co.frames.pop();
        }
    }
    Step::Continue
}

/// Execute an expression statement
pub fn execute_expr(co: &mut Coroutine, rt: &mut Runtime, expr: &Expr) -> Result<Step, Fault> {
    eval_or_yield!(co, rt, expr);
    co.frames.pop();
    Ok(Step::Continue)
}
