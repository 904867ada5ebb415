//! Resume scheduling on the worker pool

use std::sync::Arc;

use crate::accounting::now_ms;
use crate::errors::{MachineError, KERNEL_PANIC, NOT_ENOUGH_MEMORY, PROTOCOL_ERROR, UNKNOWN_ERROR};
use crate::interpreter::{Fault, Interpreter, ResumeArgs, Resumed, Termination, Yield};
use crate::types::MachineState;

use super::bindings::MachineHost;
use super::{Scheduling, Shared};

impl Shared {
    /// Move to `next` and queue one resume on the worker pool
    ///
    /// Must be called with the state lock held. At most one task is
    /// outstanding per instance; a second request is a scheduling bug and is
    /// dropped.
    pub(crate) fn execute(self: &Arc<Self>, sched: &mut Scheduling, next: MachineState) {
        if sched.task.is_some() {
            tracing::error!(
                address = %self.address,
                state = ?sched.state,
                "{}",
                MachineError::SchedulingBug("resume requested while one is outstanding".into())
            );
            return;
        }

        sched.sleep_until = None;
        sched.state = next;

        let shared = Arc::clone(self);
        let epoch = sched.epoch;
        match self.engine.spawn(move || shared.run_task(epoch)) {
            Some(handle) => sched.task = Some(handle),
            None => {
                tracing::error!(address = %self.address, "Worker pool is shut down");
            }
        }
    }

    /// Body of one worker-pool task queued during run `epoch`
    pub(super) fn run_task(self: Arc<Self>, epoch: u64) {
        let mut kernel = self.kernel.lock();
        let mut sched = self.sched.lock();

        // Torn down (and maybe restarted or reloaded) since this was queued
        if sched.epoch != epoch {
            tracing::debug!(address = %self.address, "Dropping resume from a previous run");
            return;
        }

        let previous = sched.state;
        if previous == MachineState::Stopping {
            self.close_locked(&mut kernel, &mut sched);
            return;
        }

        // The host has not ticked for a while; park until it does
        if now_ms() - sched.last_update > self.config.pause_threshold_ms {
            sched.state = if previous == MachineState::SynchronizedReturn {
                MachineState::SynchronizedReturnPaused
            } else {
                MachineState::Paused
            };
            sched.task = None;
            tracing::debug!(address = %self.address, state = ?sched.state, "Host stalled, resume deferred");
            return;
        }

        let args = match previous {
            MachineState::Yielded => match self.signals.pop() {
                Some(signal) => ResumeArgs::Signal(signal),
                None => ResumeArgs::Empty,
            },
            MachineState::SynchronizedReturn => ResumeArgs::CallReturn,
            other => {
                tracing::error!(
                    address = %self.address,
                    "{}",
                    MachineError::SchedulingBug(format!("resume from {:?}", other))
                );
                self.close_locked(&mut kernel, &mut sched);
                return;
            }
        };

        if kernel.is_none() {
            tracing::error!(
                address = %self.address,
                "{}",
                MachineError::SchedulingBug("no interpreter to resume".into())
            );
            self.close_locked(&mut kernel, &mut sched);
            return;
        }

        sched.state = MachineState::Running;
        drop(sched);

        self.accounting.begin_cpu();
        let outcome = match kernel.as_mut() {
            Some(interp) => interp.resume(args, &MachineHost::new(&self)),
            None => Err(Fault::Internal("interpreter released mid-resume".into())),
        };
        self.accounting.end_cpu();

        let mut sched = self.sched.lock();
        sched.task = None;

        match outcome {
            Ok(Resumed::Yielded(yielded)) => self.on_yield(&mut kernel, &mut sched, yielded),
            Ok(Resumed::Terminated(how)) => self.on_termination(&mut kernel, &mut sched, how),
            Err(fault) => self.on_fault(&mut kernel, &mut sched, fault),
        }
    }

    fn on_yield(
        self: &Arc<Self>,
        kernel: &mut Option<Interpreter>,
        sched: &mut Scheduling,
        yielded: Yield,
    ) {
        if sched.state == MachineState::Stopping {
            self.close_locked(kernel, sched);
            return;
        }

        match yielded {
            Yield::Sleep(secs) => {
                if !self.signals.is_empty() {
                    self.execute(sched, MachineState::Yielded);
                } else {
                    sched.state = MachineState::Sleeping;
                    sched.sleep_until = sleep_deadline(secs);
                }
            }
            Yield::Call => sched.state = MachineState::SynchronizedCall,
            Yield::Shutdown { reboot } => {
                self.close_locked(kernel, sched);
                if reboot {
                    sched.state = MachineState::Rebooting;
                }
            }
            Yield::Other => {
                if !self.signals.is_empty() {
                    self.execute(sched, MachineState::Yielded);
                } else {
                    sched.state = MachineState::Suspended;
                }
            }
        }
        self.owner.mark_dirty();
    }

    fn on_termination(
        &self,
        kernel: &mut Option<Interpreter>,
        sched: &mut Scheduling,
        how: Termination,
    ) {
        match how {
            Termination::Protected { ok: true, .. } => {
                tracing::info!(address = %self.address, "Kernel returned");
                self.close_locked(kernel, sched);
                self.owner.mark_dirty();
            }
            Termination::Protected { ok: false, error } => {
                let message = error.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                tracing::info!(address = %self.address, error = %message, "Kernel crashed");
                self.crash(kernel, sched, &message);
            }
            Termination::Unprotected => {
                tracing::warn!(address = %self.address, "Kernel left its protected region");
                self.close_locked(kernel, sched);
                self.owner.mark_dirty();
            }
        }
    }

    pub(crate) fn on_fault(
        &self,
        kernel: &mut Option<Interpreter>,
        sched: &mut Scheduling,
        fault: Fault,
    ) {
        let message = match &fault {
            Fault::AllocationLimit => NOT_ENOUGH_MEMORY,
            Fault::Runtime(_) => KERNEL_PANIC,
            Fault::Internal(_) | Fault::Protocol(_) => {
                tracing::error!(address = %self.address, error = %fault, "Resume failed");
                PROTOCOL_ERROR
            }
        };
        tracing::warn!(address = %self.address, error = %fault, "Machine crashed");
        self.crash(kernel, sched, message);
    }
}

/// Wall-clock deadline `secs` from now; `None` for an unbounded sleep
fn sleep_deadline(secs: f64) -> Option<i64> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs.max(0.0) * 1000.0).round();
    Some(now_ms().saturating_add(millis as i64))
}
