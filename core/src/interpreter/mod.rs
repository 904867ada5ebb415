//! Embedded guest interpreter
//!
//! A small stack-driven coroutine VM. The [`Interpreter`] handle owns the
//! global table, the boot entry points and two stack slots: slot 1 holds the
//! kernel coroutine and slot 2 the pending synchronized call (a callable while
//! pending, a result container once invoked).

pub mod errors;
pub mod natives;
pub mod types;
pub mod vm;

mod exec_loop;
mod expressions;
mod statements;

#[cfg(test)]
mod tests;

pub use errors::{ErrorInfo, Fault};
pub use natives::{Host, Native};
pub use types::{Stmt, Val};
pub use vm::{CoResult, Coroutine, ThreadStatus};

use crate::types::Signal;
use std::collections::BTreeMap;
use types::values::table_footprint;
use vm::Runtime;

/// What the kernel coroutine receives when resumed
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeArgs {
    /// Resume with no arguments
    Empty,
    /// Deliver a queued signal as `[name, args...]`
    Signal(Signal),
    /// Deliver the result container sitting in the pending-call slot
    CallReturn,
}

/// Meaning of a value the kernel yielded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Yield {
    /// Sleep for this many seconds
    Sleep(f64),
    /// A callable was parked in the pending-call slot
    Call,
    /// Shut down, restarting if `reboot`
    Shutdown { reboot: bool },
    Other,
}

/// How the kernel coroutine ended
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The protected kernel returned or raised
    Protected { ok: bool, error: Option<String> },
    /// The coroutine ended outside the protected region
    Unprotected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    Yielded(Yield),
    Terminated(Termination),
}

/// Handle to one guest interpreter
#[derive(Debug, Default)]
pub struct Interpreter {
    globals: BTreeMap<String, Val>,

    /// Entry points published by the boot payload
    boot: BTreeMap<String, Val>,

    /// Slot 1: the kernel coroutine
    kernel: Option<Val>,

    /// Slot 2: the pending call or its result container
    pending: Option<Val>,

    memory_limit: Option<usize>,
    used: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the native library and host constants
    pub fn install_library(&mut self, timeout: f64, drivers: &BTreeMap<String, String>) {
        self.globals = natives::library(timeout, drivers);
        self.collect_garbage();
    }

    /// Run the boot payload to completion and keep the table it returns
    pub fn run_boot(&mut self, program: Stmt, host: &dyn Host) -> Result<(), Fault> {
        let mut co = Coroutine::new(program, false);
        let mut rt = Runtime::new(&self.globals, host);

        let table = match co.resume(Val::Null, &mut rt)? {
            CoResult::Returned(Val::Obj(table)) => table,
            CoResult::Returned(Val::Null) => BTreeMap::new(),
            CoResult::Returned(other) => {
                return Err(Fault::Protocol(format!(
                    "boot payload returned a {}",
                    other.type_name()
                )))
            }
            CoResult::Yielded(_) => {
                return Err(Fault::Protocol("boot payload yielded".to_string()))
            }
            CoResult::Threw(error) => {
                return Err(Fault::Runtime(
                    error_message(&error).unwrap_or_else(|| "boot failed".to_string()),
                ))
            }
        };

        self.boot = table;
        self.collect_garbage();
        Ok(())
    }

    /// Wrap `program` in a fresh protected coroutine and place it in slot 1
    pub fn load_kernel(&mut self, program: Stmt) {
        self.kernel = Some(Val::Thread(Box::new(Coroutine::new(program, true))));
        self.pending = None;
    }

    /// Resume the kernel once and classify the outcome
    pub fn resume(&mut self, args: ResumeArgs, host: &dyn Host) -> Result<Resumed, Fault> {
        let args = match args {
            ResumeArgs::Empty => {
                self.pending = None;
                Val::List(vec![])
            }
            ResumeArgs::Signal(signal) => {
                self.pending = None;
                let mut items = Vec::with_capacity(signal.args.len() + 1);
                items.push(Val::Str(signal.name));
                items.extend(signal.args.into_iter().map(Val::from));
                Val::List(items)
            }
            ResumeArgs::CallReturn => match self.pending.take() {
                Some(container @ Val::List(_)) => container,
                Some(other) => {
                    return Err(Fault::Protocol(format!(
                        "expected a call result, found a {}",
                        other.type_name()
                    )))
                }
                None => return Err(Fault::Internal("no call result to deliver".to_string())),
            },
        };

        let mut thread = match self.kernel.take() {
            Some(Val::Thread(thread)) => thread,
            other => {
                self.kernel = other;
                return Err(Fault::Internal("slot 1 does not hold a coroutine".to_string()));
            }
        };

        let baseline = self.baseline();
        let mut rt = Runtime::new(&self.globals, host);
        rt.baseline = baseline;
        rt.limit = self.memory_limit;
        rt.used = baseline + thread.footprint();

        let outcome = thread.resume(args, &mut rt);
        let protected = thread.protected;
        self.used = baseline + thread.footprint();
        self.kernel = Some(Val::Thread(thread));

        Ok(match outcome? {
            CoResult::Yielded(value) => Resumed::Yielded(match value {
                Val::Num(secs) => Yield::Sleep(secs),
                Val::Bool(reboot) => Yield::Shutdown { reboot },
                value if value.is_callable() => {
                    self.used += value.footprint();
                    self.pending = Some(value);
                    Yield::Call
                }
                _ => Yield::Other,
            }),
            CoResult::Returned(_) if protected => Resumed::Terminated(Termination::Protected {
                ok: true,
                error: None,
            }),
            CoResult::Threw(error) if protected => Resumed::Terminated(Termination::Protected {
                ok: false,
                error: error_message(&error),
            }),
            _ => Resumed::Terminated(Termination::Unprotected),
        })
    }

    /// Invoke the callable in slot 2 on the calling thread
    ///
    /// The callable must produce a result container (a list), which replaces
    /// it in the slot.
    pub fn invoke_pending(&mut self, host: &dyn Host) -> Result<(), Fault> {
        let (native, args) = match self.pending.take() {
            Some(Val::Native(native)) => (native, vec![]),
            Some(Val::Bound(bound)) => (bound.native, bound.args),
            Some(other) => {
                return Err(Fault::Protocol(format!(
                    "pending call slot holds a {}",
                    other.type_name()
                )))
            }
            None => return Err(Fault::Internal("no pending call".to_string())),
        };

        let mut rt = Runtime::new(&self.globals, host);
        rt.synchronized = true;
        rt.limit = self.memory_limit;

        let container = match natives::call(native, args, &mut rt) {
            Ok(container @ Val::List(_)) => container,
            Ok(other) => {
                return Err(Fault::Protocol(format!(
                    "synchronized call returned a {}",
                    other.type_name()
                )))
            }
            Err(error) => {
                return Err(Fault::Runtime(
                    error_message(&error).unwrap_or_else(|| "call failed".to_string()),
                ))
            }
        };

        self.pending = Some(container);
        self.collect_garbage();
        match self.memory_limit {
            Some(limit) if self.used > limit => Err(Fault::AllocationLimit),
            _ => Ok(()),
        }
    }

    /// Call a boot entry point with `args`
    ///
    /// `Ok(None)` if the boot table has no callable under `name`.
    pub fn call_entry_point(&self, name: &str, args: Vec<Val>) -> Result<Option<Val>, Fault> {
        let (native, mut full) = match self.boot.get(name) {
            Some(Val::Native(native)) => (*native, vec![]),
            Some(Val::Bound(bound)) => (bound.native, bound.args.clone()),
            _ => return Ok(None),
        };
        full.extend(args);

        natives::call_pure(native, full).map(Some).map_err(|error| {
            Fault::Runtime(error_message(&error).unwrap_or_else(|| format!("{} failed", name)))
        })
    }

    /* ===================== Slots ===================== */

    pub fn kernel(&self) -> Option<&Val> {
        self.kernel.as_ref()
    }

    pub fn set_kernel(&mut self, value: Option<Val>) {
        self.kernel = value;
    }

    pub fn pending(&self) -> Option<&Val> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, value: Option<Val>) {
        self.pending = value;
    }

    /* ===================== Memory ===================== */

    pub fn memory_used(&self) -> usize {
        self.used
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Install or lift (`None`) the memory ceiling
    pub fn set_memory_limit(&mut self, limit: Option<usize>) {
        self.memory_limit = limit;
    }

    /// Re-measure everything reachable from the globals and both slots
    pub fn collect_garbage(&mut self) -> usize {
        let kernel = self.kernel.as_ref().map_or(0, Val::footprint);
        self.used = self.baseline() + kernel;
        self.used
    }

    /// Everything but the kernel coroutine
    fn baseline(&self) -> usize {
        table_footprint(&self.globals)
            + table_footprint(&self.boot)
            + self.pending.as_ref().map_or(0, Val::footprint)
    }
}

/// Text of a guest error value, if it carries any
fn error_message(error: &Val) -> Option<String> {
    match error {
        Val::Null => None,
        Val::Error(info) => Some(info.message.clone()),
        other => Some(other.to_display()),
    }
}
