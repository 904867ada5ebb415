//! Host services exposed to the guest interpreter

use crate::interpreter::Host;
use crate::types::Value;

use super::Shared;

/// Borrowed view of an instance that the interpreter calls back into
pub(crate) struct MachineHost<'a> {
    shared: &'a Shared,
}

impl<'a> MachineHost<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }
}

impl Host for MachineHost<'_> {
    fn cpu_clock(&self) -> f64 {
        self.shared.accounting.cpu_clock()
    }

    fn world_time(&self) -> f64 {
        self.shared.accounting.world_time() as f64
    }

    fn uptime(&self) -> f64 {
        self.shared
            .accounting
            .uptime(self.shared.config.ticks_per_second)
    }

    fn total_memory(&self) -> f64 {
        self.shared.config.memory_budget as f64
    }

    fn address(&self) -> String {
        self.shared.address.clone()
    }

    fn boot_address(&self) -> Option<String> {
        self.shared.catalog.address()
    }

    fn print(&self, text: &str) {
        tracing::info!(target: "machine::guest", address = %self.shared.address, "{}", text);
    }

    fn send(&self, target: &str, method: &str, args: &[Value]) -> Option<Vec<Value>> {
        self.shared
            .network
            .send_to_address(&self.shared.address, target, method, args)
    }

    fn peer_name(&self, address: &str) -> Option<String> {
        self.shared.network.lookup_node(address)
    }
}
