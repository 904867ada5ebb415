//! Core execution loop
//!
//! This module contains the step() function - the heart of the interpreter.
//! It processes one frame at a time, advancing execution phases and managing the frame stack.
//!
//! ## Function Organization
//! 1. run_until_done() - Top-level driver (calls step repeatedly)
//! 2. step() - Main execution loop (dispatches to statement handlers)
//! 3. unwind() - Pops frames while break/continue/return/throw is active

use super::errors::Fault;
use super::statements::{
    execute_assign, execute_block, execute_declare, execute_expr, execute_if, execute_return,
    execute_try, execute_while,
};
use super::types::{Binding, Control, FrameKind, Stmt, TryPhase, WhilePhase};
use super::vm::{push_stmt, Coroutine, Runtime, Step};

/* ===================== Public API ===================== */

/// Run the coroutine until it completes or suspends
///
/// After completion, inspect `co.control` for the final state.
pub fn run_until_done(co: &mut Coroutine, rt: &mut Runtime) -> Result<(), Fault> {
    loop {
        match step(co, rt)? {
            Step::Continue => continue,
            Step::Done => return Ok(()),
        }
    }
}

/// Execute one step of the coroutine
pub fn step(co: &mut Coroutine, rt: &mut Runtime) -> Result<Step, Fault> {
    match co.control {
        Control::None => {}
        // Suspended: the frame that yielded stays on the stack
        Control::Suspend(_) => return Ok(Step::Done),
        _ => return Ok(unwind(co)),
    }

    let Some(frame_idx) = co.frames.len().checked_sub(1) else {
        return Ok(Step::Done);
    };

    // Clone frame data we need (to avoid borrow checker issues)
    let (kind, node) = {
        let f = &co.frames[frame_idx];
        (f.kind.clone(), f.node.clone())
    };

    match (kind, node) {
        (FrameKind::Block { idx }, Stmt::Block { body, .. }) => {
            Ok(execute_block(co, frame_idx, idx, &body))
        }
        (FrameKind::Declare, Stmt::Declare { name, init, .. }) => {
            execute_declare(co, rt, name, init.as_ref())
        }
        (FrameKind::Assign, Stmt::Assign { var, path, value, .. }) => {
            execute_assign(co, rt, &var, &path, &value)
        }
        (FrameKind::If, Stmt::If { test, then_s, else_s, .. }) => {
            execute_if(co, rt, &test, *then_s, else_s.map(|s| *s))
        }
        (FrameKind::While { phase }, Stmt::While { test, body, .. }) => {
            execute_while(co, rt, phase, &test, &body)
        }
        (FrameKind::Return, Stmt::Return { value, .. }) => execute_return(co, rt, value.as_ref()),
        (FrameKind::Try { phase }, Stmt::Try { body, .. }) => {
            Ok(execute_try(co, frame_idx, phase, &body))
        }
        (FrameKind::Expr, Stmt::Expr { expr, .. }) => execute_expr(co, rt, &expr),
        (FrameKind::Break, Stmt::Break { .. }) => {
            co.control = Control::Break;
            co.frames.pop();
            Ok(Step::Continue)
        }
        (FrameKind::Continue, Stmt::Continue { .. }) => {
            co.control = Control::Continue;
            co.frames.pop();
            Ok(Step::Continue)
        }
        (kind, _) => Err(Fault::Internal(format!(
            "frame kind {:?} does not match its statement",
            kind
        ))),
    }
}

/* ===================== Control Flow ===================== */

/// Unwind the stack while control flow is active
///
/// Break and Continue stop at the nearest While, Throw stops at the nearest
/// Try still running its body, and Return empties the stack.
fn unwind(co: &mut Coroutine) -> Step {
    while let Some(mut frame) = co.frames.pop() {
        co.env.truncate(frame.scope_base_sp);

        match (&co.control, &frame.kind) {
            (Control::Break, FrameKind::While { .. }) => {
                co.control = Control::None;
                return Step::Continue;
            }
            (Control::Continue, FrameKind::While { .. }) => {
                co.control = Control::None;
                frame.kind = FrameKind::While {
                    phase: WhilePhase::Test,
                };
                co.frames.push(frame);
                return Step::Continue;
            }
            (
                Control::Throw(error),
                FrameKind::Try {
                    phase: TryPhase::ExecuteTry,
                },
            ) => {
                if let Stmt::Try {
                    catch_var,
                    catch_body,
                    ..
                } = &frame.node
                {
                    let binding = Binding {
                        name: catch_var.clone(),
                        value: error.clone(),
                    };
                    let catch_body = (**catch_body).clone();

                    co.control = Control::None;
                    frame.kind = FrameKind::Try {
                        phase: TryPhase::ExecuteCatch,
                    };
                    co.frames.push(frame);
                    co.env.push(binding);
                    push_stmt(co, &catch_body);
                    return Step::Continue;
                }
            }
            _ => continue,
        }
    }

    // Fell off the bottom: return completes the coroutine, throw is uncaught
    Step::Done
}
