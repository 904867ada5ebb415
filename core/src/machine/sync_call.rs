//! Synchronized calls
//!
//! When the kernel yields a callable, the controlling thread invokes it
//! during `update()` so it may touch state that is only safe to access from
//! there. The result container is delivered back on the next resume.

use std::sync::Arc;

use crate::errors::{NOT_ENOUGH_MEMORY, PROTOCOL_ERROR};
use crate::interpreter::Fault;
use crate::types::MachineState;

use super::bindings::MachineHost;
use super::Shared;

impl Shared {
    pub(crate) fn run_synchronized(self: &Arc<Self>) {
        // A worker still holds the interpreter; retry on the next tick
        let Some(mut kernel) = self.kernel.try_lock() else {
            tracing::trace!(address = %self.address, "Interpreter busy, synchronized call deferred");
            return;
        };

        {
            let mut sched = self.sched.lock();
            if sched.state != MachineState::SynchronizedCall {
                return;
            }
            sched.state = MachineState::Running;
        }

        let outcome = match kernel.as_mut() {
            Some(interp) => interp.invoke_pending(&MachineHost::new(self)),
            None => Err(Fault::Internal("no interpreter for synchronized call".into())),
        };

        let mut sched = self.sched.lock();
        if sched.state == MachineState::Stopping {
            // Stopped from inside the call
            self.close_locked(&mut kernel, &mut sched);
            self.owner.mark_dirty();
            return;
        }

        match outcome {
            Ok(()) => {
                drop(kernel);
                self.execute(&mut sched, MachineState::SynchronizedReturn);
            }
            Err(Fault::AllocationLimit) => {
                tracing::warn!(address = %self.address, "Synchronized call ran out of memory");
                self.crash(&mut kernel, &mut sched, NOT_ENOUGH_MEMORY);
            }
            Err(Fault::Runtime(message)) => {
                tracing::warn!(address = %self.address, error = %message, "Synchronized call failed");
                self.crash(&mut kernel, &mut sched, &message);
            }
            Err(fault @ (Fault::Protocol(_) | Fault::Internal(_))) => {
                tracing::error!(address = %self.address, error = %fault, "Synchronized call broke protocol");
                self.crash(&mut kernel, &mut sched, PROTOCOL_ERROR);
            }
        }
    }
}
