//! Coroutine state
//!
//! A coroutine holds all execution state:
//! - frames: Stack of active statements
//! - env: Stack of variable bindings
//! - control: Current control flow state (return, break, throw, suspend)
//!
//! Nothing lives on the host call stack between steps, so a suspended
//! coroutine serializes as plain data.

use super::errors::{self, Fault};
use super::exec_loop::run_until_done;
use super::natives::{error_val, Host};
use super::types::{Binding, Control, Frame, FrameKind, Stmt, TryPhase, Val, WhilePhase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const COROUTINE_COST: usize = 128;
const FRAME_COST: usize = 64;
const BINDING_COST: usize = 24;

/* ===================== Coroutine ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    /// Created, never resumed
    Fresh,
    /// Stopped at a `yield`
    Suspended,
    Running,
    /// Returned or threw
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coroutine {
    /// Stack of execution frames
    pub frames: Vec<Frame>,

    /// Variable bindings, innermost last
    pub env: Vec<Binding>,

    /// Current control flow state
    pub control: Control,

    /// Value delivered by the host on resume, consumed by the pending `yield`
    pub resume_value: Option<Val>,

    pub status: ThreadStatus,

    /// Errors escaping a protected coroutine are reported as a failed result
    /// instead of a bare termination
    pub protected: bool,
}

/// How a resume ended
#[derive(Debug, Clone, PartialEq)]
pub enum CoResult {
    Yielded(Val),
    Returned(Val),
    Threw(Val),
}

impl Coroutine {
    /// Create a coroutine that will run `program` on its first resume
    pub fn new(program: Stmt, protected: bool) -> Self {
        let mut co = Coroutine {
            frames: vec![],
            env: vec![],
            control: Control::None,
            resume_value: None,
            status: ThreadStatus::Fresh,
            protected,
        };
        push_stmt(&mut co, &program);
        co
    }

    /// Run until the next `yield`, `return`, or uncaught error
    ///
    /// `args` becomes the value of the `yield` the coroutine is suspended at.
    /// A fresh coroutine ignores it.
    pub fn resume(&mut self, args: Val, rt: &mut Runtime) -> Result<CoResult, Fault> {
        match self.status {
            ThreadStatus::Dead => {
                return Err(Fault::Runtime("cannot resume dead coroutine".to_string()))
            }
            ThreadStatus::Running => {
                return Err(Fault::Internal("coroutine is already running".to_string()))
            }
            ThreadStatus::Suspended => self.resume_value = Some(args),
            ThreadStatus::Fresh => {}
        }
        self.status = ThreadStatus::Running;

        if let Err(fault) = run_until_done(self, rt) {
            self.status = ThreadStatus::Dead;
            return Err(fault);
        }

        let outcome = match std::mem::replace(&mut self.control, Control::None) {
            Control::Suspend(value) => {
                self.status = ThreadStatus::Suspended;
                self.resume_value = None;
                return Ok(CoResult::Yielded(value));
            }
            Control::Return(value) => CoResult::Returned(value),
            Control::None => CoResult::Returned(Val::Null),
            Control::Throw(error) => CoResult::Threw(error),
            Control::Break | Control::Continue => CoResult::Threw(error_val(
                errors::BAD_CONTROL,
                "break or continue outside of a loop",
            )),
        };
        self.status = ThreadStatus::Dead;
        self.frames.clear();
        self.env.clear();
        Ok(outcome)
    }

    pub fn is_dead(&self) -> bool {
        self.status == ThreadStatus::Dead
    }

    /// Deterministic memory footprint in bytes
    pub fn footprint(&self) -> usize {
        let bindings: usize = self
            .env
            .iter()
            .map(|b| BINDING_COST + b.name.len() + b.value.footprint())
            .sum();
        let resume = self.resume_value.as_ref().map_or(0, Val::footprint);
        let control = match &self.control {
            Control::Return(v) | Control::Throw(v) | Control::Suspend(v) => v.footprint(),
            _ => 0,
        };
        COROUTINE_COST + self.frames.len() * FRAME_COST + bindings + resume + control
    }
}

/* ===================== Runtime ===================== */

/// Everything outside the coroutine that execution can touch
pub struct Runtime<'a> {
    pub globals: &'a BTreeMap<String, Val>,
    pub host: &'a dyn Host,

    /// Bytes used by everything except the running coroutine
    pub baseline: usize,

    /// Memory ceiling, `None` when lifted
    pub limit: Option<usize>,

    /// Bytes used as of the last check
    pub used: usize,

    /// True only on the controlling thread, inside a synchronized call
    pub synchronized: bool,
}

impl<'a> Runtime<'a> {
    pub fn new(globals: &'a BTreeMap<String, Val>, host: &'a dyn Host) -> Self {
        Self {
            globals,
            host,
            baseline: 0,
            limit: None,
            used: 0,
            synchronized: false,
        }
    }

    /// Re-measure the coroutine and fail if the ceiling is crossed
    pub fn check_memory(&mut self, co: &Coroutine) -> Result<(), Fault> {
        self.used = self.baseline + co.footprint();
        match self.limit {
            Some(limit) if self.used > limit => Err(Fault::AllocationLimit),
            _ => Ok(()),
        }
    }

    /// Bytes left under the ceiling; `total` when no ceiling is installed
    pub fn free_memory(&self, total: f64) -> f64 {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.used) as f64,
            None => total,
        }
    }
}

/* ===================== Frame Management ===================== */

/// Push a new frame for a statement onto the stack
pub fn push_stmt(co: &mut Coroutine, stmt: &Stmt) {
    let kind = match stmt {
        Stmt::Block { .. } => FrameKind::Block { idx: 0 },
        Stmt::Declare { .. } => FrameKind::Declare,
        Stmt::Assign { .. } => FrameKind::Assign,
        Stmt::If { .. } => FrameKind::If,
        Stmt::While { .. } => FrameKind::While {
            phase: WhilePhase::Test,
        },
        Stmt::Return { .. } => FrameKind::Return,
        Stmt::Try { .. } => FrameKind::Try {
            phase: TryPhase::Start,
        },
        Stmt::Expr { .. } => FrameKind::Expr,
        Stmt::Break { .. } => FrameKind::Break,
        Stmt::Continue { .. } => FrameKind::Continue,
    };

    co.frames.push(Frame {
        kind,
        scope_base_sp: co.env.len(),
        node: stmt.clone(),
    });
}

/* ===================== Step Result ===================== */

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue to next step
    Continue,
    /// Execution complete or suspended
    Done,
}
