//! Machine instances
//!
//! An [`Instance`] binds one guest interpreter to its lifecycle state, signal
//! queue and accounting. The controlling thread drives it through
//! [`Instance::update`] once per tick; guest resumes run on the shared
//! worker pool.
//!
//! Two locks guard an instance. The instance lock (`kernel`) owns the
//! interpreter and is held for the whole of a resume or synchronized call.
//! The state lock (`sched`) guards the lifecycle state and the outstanding
//! task handle. When both are needed the instance lock is taken first.

mod bindings;
mod boot;
mod messages;
mod persist;
mod scheduler;
mod sync_call;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::accounting::{now_ms, Accountant};
use crate::config::MachineConfig;
use crate::display;
use crate::engine::Engine;
use crate::host::{Network, Owner, ResourceCatalog};
use crate::interpreter::Interpreter;
use crate::signals::SignalQueue;
use crate::types::{MachineState, Signal, Value};

/// The collaborators an instance talks to
#[derive(Clone)]
pub struct Collaborators {
    pub network: Arc<dyn Network>,
    pub owner: Arc<dyn Owner>,
    pub catalog: Arc<dyn ResourceCatalog>,
}

/// Lifecycle state and the tables that change with it
#[derive(Debug)]
pub(crate) struct Scheduling {
    pub state: MachineState,
    /// Outstanding worker-pool task, at most one
    pub task: Option<JoinHandle<()>>,
    /// Wall time of the latest `update()`, in milliseconds
    pub last_update: i64,
    /// Wall-clock deadline while sleeping; `None` means never
    pub sleep_until: Option<i64>,
    pub updated_since_start: bool,
    /// A run began and its stop has not been announced yet
    pub was_running: bool,
    /// Failure text waiting to be shown on the displays
    pub message: Option<String>,
    /// Bumped on every teardown; a task queued under an older run is void
    pub epoch: u64,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            state: MachineState::Stopped,
            task: None,
            last_update: now_ms(),
            sleep_until: None,
            updated_since_start: false,
            was_running: false,
            message: None,
            epoch: 0,
        }
    }
}

pub(crate) struct Shared {
    pub address: String,
    pub config: MachineConfig,
    pub engine: Arc<Engine>,
    pub network: Arc<dyn Network>,
    pub owner: Arc<dyn Owner>,
    pub catalog: Arc<dyn ResourceCatalog>,

    /// Instance lock
    pub kernel: Mutex<Option<Interpreter>>,
    /// State lock
    pub sched: Mutex<Scheduling>,

    pub signals: SignalQueue,
    pub accounting: Accountant,
}

/// One virtual computer
pub struct Instance {
    shared: Arc<Shared>,
}

/// What `update()` does once the state lock is released
enum Action {
    Nothing,
    Reboot,
    Call,
}

impl Instance {
    pub fn new(
        address: impl Into<String>,
        config: MachineConfig,
        engine: Arc<Engine>,
        collaborators: Collaborators,
    ) -> Self {
        let signals = SignalQueue::new(config.signal_queue_capacity);
        Self {
            shared: Arc::new(Shared {
                address: address.into(),
                config,
                engine,
                network: collaborators.network,
                owner: collaborators.owner,
                catalog: collaborators.catalog,
                kernel: Mutex::new(None),
                sched: Mutex::new(Scheduling::default()),
                signals,
                accounting: Accountant::new(),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn state(&self) -> MachineState {
        self.shared.sched.lock().state
    }

    /// Begin a new run. False unless the instance is stopped.
    pub fn start(&self) -> bool {
        self.shared.start()
    }

    /// Request a stop. False if already stopped.
    ///
    /// With a task in flight the instance moves to `Stopping` and the task
    /// finishes the teardown.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    /// Queue a signal for the guest. False if stopped, stopping or full.
    pub fn signal(&self, name: &str, args: Vec<Value>) -> bool {
        self.shared.signal(name, args)
    }

    /// Not stopped, and updated at least once since the run began
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Advance the instance by one host tick
    pub fn update(&self) {
        self.shared.update();
    }

    pub fn kernel_memory(&self) -> usize {
        self.shared.accounting.kernel_memory()
    }

    pub fn cpu_time_ns(&self) -> i64 {
        self.shared.accounting.cpu_time_ns()
    }

    pub fn queued_signals(&self) -> usize {
        self.shared.signals.len()
    }

    /// Deadline of the current sleep, in wall-clock milliseconds
    pub fn sleep_until(&self) -> Option<i64> {
        self.shared.sched.lock().sleep_until
    }

    /// Failure text not yet shown on the displays
    pub fn message(&self) -> Option<String> {
        self.shared.sched.lock().message.clone()
    }

    /// True while a worker-pool task is outstanding
    pub fn is_busy(&self) -> bool {
        self.shared.sched.lock().task.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl Shared {
    fn start(&self) -> bool {
        // Checked before taking the instance lock, which a synchronized call
        // that reaches back into this instance already holds
        if self.sched.lock().state != MachineState::Stopped {
            return false;
        }
        let mut kernel = self.kernel.lock();
        if self.sched.lock().state != MachineState::Stopped {
            return false;
        }

        self.accounting.set_world_time(self.owner.world_time());
        self.accounting.set_time_started(self.accounting.world_time());

        let interp = match self.init() {
            Ok(interp) => interp,
            Err(error) => {
                tracing::warn!(address = %self.address, error = %error, "Machine failed to start");
                self.accounting.reset();
                self.sched.lock().message = error.user_message();
                return false;
            }
        };
        *kernel = Some(interp);

        {
            let mut sched = self.sched.lock();
            sched.state = MachineState::Suspended;
            sched.sleep_until = None;
            sched.updated_since_start = false;
            sched.was_running = true;
            sched.last_update = now_ms();
            sched.message = None;
        }
        drop(kernel);

        for peer in self.network.connected_peers(&self.address) {
            self.signals
                .push(Signal::new("component_added", vec![Value::Str(peer)]));
        }
        self.network
            .send_to_neighbors(&self.address, "computer.started", &[]);
        self.owner.mark_dirty();

        tracing::info!(
            address = %self.address,
            kernel_memory = self.accounting.kernel_memory(),
            "Machine started"
        );
        true
    }

    fn stop(&self) -> bool {
        {
            let mut sched = self.sched.lock();
            match sched.state {
                MachineState::Stopped => return false,
                MachineState::Stopping => return true,
                MachineState::Running => {
                    sched.state = MachineState::Stopping;
                    return true;
                }
                _ if sched.task.is_some() => {
                    sched.state = MachineState::Stopping;
                    return true;
                }
                _ => {}
            }
        }

        self.close();
        tracing::info!(address = %self.address, "Machine stopped");
        true
    }

    fn signal(&self, name: &str, args: Vec<Value>) -> bool {
        let sched = self.sched.lock();
        if matches!(sched.state, MachineState::Stopped | MachineState::Stopping) {
            return false;
        }
        self.signals.push(Signal::new(name, args))
    }

    fn is_running(&self) -> bool {
        let sched = self.sched.lock();
        sched.state != MachineState::Stopped && sched.updated_since_start
    }

    fn update(self: &Arc<Self>) {
        let now = now_ms();
        self.accounting.set_world_time(self.owner.world_time());

        let (action, stopped_edge, message) = {
            let mut sched = self.sched.lock();
            sched.last_update = now;
            if sched.state != MachineState::Stopped {
                sched.updated_since_start = true;
            }

            let stopped_edge = sched.was_running
                && matches!(sched.state, MachineState::Stopped | MachineState::Rebooting);
            if stopped_edge {
                sched.was_running = false;
            }

            let action = match sched.state {
                MachineState::Rebooting => {
                    sched.state = MachineState::Stopped;
                    Action::Reboot
                }
                MachineState::Suspended if !self.signals.is_empty() => {
                    self.execute(&mut sched, MachineState::Yielded);
                    Action::Nothing
                }
                MachineState::Sleeping
                    if sched.sleep_until.map_or(false, |t| now >= t)
                        || !self.signals.is_empty() =>
                {
                    self.execute(&mut sched, MachineState::Yielded);
                    Action::Nothing
                }
                MachineState::Paused => {
                    self.execute(&mut sched, MachineState::Yielded);
                    Action::Nothing
                }
                MachineState::SynchronizedReturnPaused => {
                    self.execute(&mut sched, MachineState::SynchronizedReturn);
                    Action::Nothing
                }
                MachineState::SynchronizedCall => Action::Call,
                _ => Action::Nothing,
            };

            let message = if sched.state == MachineState::Stopped {
                sched.message.take()
            } else {
                None
            };
            (action, stopped_edge, message)
        };

        if stopped_edge {
            self.network
                .send_to_neighbors(&self.address, "computer.stopped", &[]);
            for surface in self.owner.displays() {
                surface.clear();
            }
        }
        if let Some(message) = message {
            for surface in self.owner.displays() {
                display::render(surface.as_ref(), &message);
            }
        }

        match action {
            Action::Nothing => {}
            Action::Reboot => {
                self.close();
                self.start();
            }
            Action::Call => self.run_synchronized(),
        }
    }

    /// Release the interpreter. Idempotent.
    fn close(&self) {
        let mut kernel = self.kernel.lock();
        let mut sched = self.sched.lock();
        self.close_locked(&mut kernel, &mut sched);
    }

    fn close_locked(&self, kernel: &mut Option<Interpreter>, sched: &mut Scheduling) {
        sched.epoch = sched.epoch.wrapping_add(1);
        if sched.state == MachineState::Stopped && kernel.is_none() {
            return;
        }
        if let Some(interp) = kernel.as_mut() {
            interp.set_memory_limit(None);
        }
        *kernel = None;
        self.accounting.reset();
        self.signals.clear();
        sched.task = None;
        sched.state = MachineState::Stopped;
        sched.sleep_until = None;
        tracing::debug!(address = %self.address, "Interpreter released");
    }

    /// Record a failure message and tear down
    fn crash(&self, kernel: &mut Option<Interpreter>, sched: &mut Scheduling, message: &str) {
        if let Some(interp) = kernel.as_mut() {
            // Formatting the message must not trip the ceiling
            interp.set_memory_limit(None);
        }
        sched.message = Some(message.to_string());
        self.close_locked(kernel, sched);
        self.owner.mark_dirty();
    }
}
