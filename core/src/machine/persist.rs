//! Saving and restoring instances

use crate::accounting::now_ms;
use crate::errors::{MachineError, Result};
use crate::interpreter::{Interpreter, Val};
use crate::persistence::{MachineRecord, SignalRecord};
use crate::snapshot::SnapshotCodec;
use crate::types::{MachineState, Signal};

use super::{Instance, Shared};

impl Instance {
    /// Write the instance to a record
    ///
    /// Fails only if a resume is in flight, which the instance lock rules out
    /// while this runs.
    pub fn save(&self) -> Result<MachineRecord> {
        self.shared.save()
    }

    /// Replace this instance's run with the one in `record`
    ///
    /// A record that cannot be restored leaves the instance stopped.
    pub fn load(&self, record: &MachineRecord) {
        if let Err(error) = self.shared.load(record) {
            tracing::warn!(address = %self.shared.address, error = %error, "Discarding saved machine");
            self.shared.close();
        }
    }
}

impl Shared {
    fn save(&self) -> Result<MachineRecord> {
        let mut kernel = self.kernel.lock();
        let sched = self.sched.lock();

        let state = match sched.state {
            MachineState::Running => {
                return Err(MachineError::SchedulingBug(
                    "save while a resume is in flight".into(),
                ))
            }
            MachineState::Stopping => MachineState::Stopped,
            other => other.collapsed(),
        };

        if matches!(state, MachineState::Stopped | MachineState::Rebooting) {
            return Ok(MachineRecord {
                state: state.code(),
                ..Default::default()
            });
        }

        let Some(interp) = kernel.as_mut() else {
            return Err(MachineError::SchedulingBug(format!(
                "{:?} without an interpreter",
                sched.state
            )));
        };

        let thread = interp.kernel().cloned().unwrap_or(Val::Null);
        let blob = SnapshotCodec::persist(interp, &thread);

        let stack = match state {
            MachineState::SynchronizedCall | MachineState::SynchronizedReturn => {
                let pending = interp.pending().cloned().unwrap_or(Val::Null);
                Some(SnapshotCodec::persist(interp, &pending))
            }
            _ => None,
        };

        tracing::debug!(address = %self.address, state = ?state, bytes = blob.len(), "Machine saved");

        Ok(MachineRecord {
            state: state.code(),
            kernel: Some(blob),
            stack,
            signals: Some(self.signals.snapshot().iter().map(SignalRecord::from).collect()),
            rom: Some(self.catalog.save()),
            kernel_memory: Some(self.accounting.kernel_memory() as u64),
            time_started: Some(self.accounting.time_started()),
            cpu_time: Some(self.accounting.cpu_time_ns()),
            message: sched.message.clone(),
        })
    }

    fn load(&self, record: &MachineRecord) -> Result<()> {
        self.close();

        if let Some(rom) = &record.rom {
            self.catalog.load(rom);
        }

        let state = MachineState::from_code(record.state).ok_or_else(|| {
            MachineError::PersistedStateCorrupt(format!("unknown state code {}", record.state))
        })?;

        match state {
            MachineState::Stopped => {
                self.sched.lock().message = record.message.clone();
                return Ok(());
            }
            MachineState::Rebooting => {
                let mut sched = self.sched.lock();
                sched.state = MachineState::Rebooting;
                sched.was_running = true;
                sched.message = record.message.clone();
                return Ok(());
            }
            MachineState::Running | MachineState::Stopping => {
                return Err(MachineError::PersistedStateCorrupt(format!(
                    "saved mid-transition in {:?}",
                    state
                )))
            }
            _ => {}
        }

        let mut kernel = self.kernel.lock();
        let mut interp = self.boot_interpreter()?;

        let thread = restore(&mut interp, record.kernel.as_deref(), "kernel")?;
        if !matches!(thread, Val::Thread(_)) {
            return Err(MachineError::PersistedStateCorrupt(format!(
                "kernel restored as a {}",
                thread.type_name()
            )));
        }
        interp.set_kernel(Some(thread));

        match state {
            MachineState::SynchronizedCall => {
                let call = restore(&mut interp, record.stack.as_deref(), "stack")?;
                if !call.is_callable() {
                    return Err(MachineError::PersistedStateCorrupt(format!(
                        "pending call restored as a {}",
                        call.type_name()
                    )));
                }
                interp.set_pending(Some(call));
            }
            MachineState::SynchronizedReturn => {
                let result = restore(&mut interp, record.stack.as_deref(), "stack")?;
                if !matches!(result, Val::List(_)) {
                    return Err(MachineError::PersistedStateCorrupt(format!(
                        "call result restored as a {}",
                        result.type_name()
                    )));
                }
                interp.set_pending(Some(result));
            }
            _ => {}
        }

        let signals: Vec<Signal> = record
            .signals
            .iter()
            .flatten()
            .cloned()
            .map(Signal::from)
            .collect();
        self.signals.replace(signals);

        self.accounting
            .set_kernel_memory(record.kernel_memory.unwrap_or(0) as usize);
        self.accounting
            .set_time_started(record.time_started.unwrap_or(0));
        self.accounting.set_cpu_time_ns(record.cpu_time.unwrap_or(0));

        interp.collect_garbage();
        interp.set_memory_limit(Some(
            self.accounting.memory_ceiling(self.config.memory_budget),
        ));
        *kernel = Some(interp);

        let mut sched = self.sched.lock();
        sched.state = match state {
            MachineState::Yielded | MachineState::Sleeping | MachineState::Paused => {
                MachineState::Paused
            }
            MachineState::SynchronizedReturn => MachineState::SynchronizedReturnPaused,
            other => other,
        };
        sched.sleep_until = None;
        sched.updated_since_start = false;
        sched.was_running = true;
        sched.last_update = now_ms();
        sched.message = record.message.clone();

        tracing::info!(address = %self.address, state = ?sched.state, "Machine restored");
        Ok(())
    }
}

fn restore(interp: &mut Interpreter, blob: Option<&[u8]>, what: &str) -> Result<Val> {
    let blob = blob
        .filter(|blob| !blob.is_empty())
        .ok_or_else(|| MachineError::PersistedStateCorrupt(format!("{} snapshot missing", what)))?;

    match SnapshotCodec::restore(interp, blob) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(MachineError::PersistedStateCorrupt(format!(
            "no way to restore the {}",
            what
        ))),
        Err(fault) => Err(MachineError::PersistedStateCorrupt(format!(
            "{}: {}",
            what, fault
        ))),
    }
}
