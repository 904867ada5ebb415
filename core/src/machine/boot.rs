//! Interpreter construction for a new run

use crate::errors::{MachineError, Result};
use crate::interpreter::{Fault, Interpreter, ResumeArgs, Resumed, Stmt};
use crate::parser::{parse_program, semantic_validator};

use super::bindings::MachineHost;
use super::Shared;

impl Shared {
    /// Build an interpreter with the library installed and the boot payload run
    ///
    /// Used both for a cold start and to host restored snapshots.
    pub(crate) fn boot_interpreter(&self) -> Result<Interpreter> {
        let mut interp = Interpreter::new();
        interp.install_library(self.config.timeout_secs, &self.catalog.drivers());

        let boot = compile("boot payload", &self.catalog.boot_payload())?;
        interp
            .run_boot(boot, &MachineHost::new(self))
            .map_err(|fault| boot_error("boot payload", fault))?;
        Ok(interp)
    }

    /// Cold start: boot, spawn the kernel and run it to its first yield
    ///
    /// On success the kernel memory and the interpreter ceiling are set.
    pub(crate) fn init(&self) -> Result<Interpreter> {
        let mut interp = self.boot_interpreter()?;
        let floor = interp.collect_garbage();

        let kernel = compile("kernel", &self.catalog.kernel_payload())?;
        interp.load_kernel(kernel);

        match interp.resume(ResumeArgs::Empty, &MachineHost::new(self)) {
            Ok(Resumed::Yielded(_)) => {}
            Ok(Resumed::Terminated(_)) => {
                return Err(MachineError::Boot("kernel exited during boot".into()))
            }
            Err(fault) => return Err(boot_error("kernel", fault)),
        }

        // Only what the kernel holds after its first yield counts against it
        let kernel_memory =
            interp.collect_garbage().saturating_sub(floor) + self.config.kernel_overhead;
        self.accounting.set_kernel_memory(kernel_memory);
        interp.set_memory_limit(Some(
            self.accounting.memory_ceiling(self.config.memory_budget),
        ));

        tracing::debug!(address = %self.address, kernel_memory, "Kernel initialized");
        Ok(interp)
    }
}

/// Parse and validate; the first validation error rejects the program
fn compile(what: &str, source: &str) -> Result<Stmt> {
    let program = parse_program(source)
        .map_err(|e| MachineError::Boot(format!("{}: {}", what, e.message())))?;
    match semantic_validator::validate_program(&program)
        .into_iter()
        .find(|problem| problem.is_error())
    {
        Some(problem) => Err(MachineError::Boot(format!("{}: {}", what, problem.message))),
        None => Ok(program),
    }
}

fn boot_error(what: &str, fault: Fault) -> MachineError {
    match fault {
        Fault::AllocationLimit => MachineError::AllocationLimit,
        Fault::Runtime(msg) => MachineError::Boot(format!("{}: {}", what, msg)),
        Fault::Protocol(msg) | Fault::Internal(msg) => MachineError::ProtocolViolation(msg),
    }
}
