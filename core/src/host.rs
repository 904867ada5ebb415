//! Collaborators the engine talks to
//!
//! The network, the owning environment, its displays and the resource
//! catalog live outside this crate; these traits are their boundary.

use parking_lot::RwLock;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::Value;

/// Routes named messages between addressable nodes
pub trait Network: Send + Sync {
    /// Deliver `method(args)` to `target`; `None` if nothing answers there
    fn send_to_address(
        &self,
        sender: &str,
        target: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Vec<Value>>;

    /// Name of the node at `address`, if it is reachable
    fn lookup_node(&self, address: &str) -> Option<String>;

    /// Addresses of every peer currently connected to `address`
    fn connected_peers(&self, address: &str) -> Vec<String>;

    fn connect(&self, address: &str);

    fn remove(&self, address: &str);

    fn send_to_visible(&self, sender: &str, event: &str, args: &[Value]);

    fn send_to_neighbors(&self, sender: &str, event: &str, args: &[Value]);
}

/// A text surface that shows failure messages
pub trait Display: Send + Sync {
    /// Columns available per line
    fn width(&self) -> usize;

    fn clear(&self);

    fn set_line(&self, row: usize, text: &str);
}

/// The environment that owns an instance
pub trait Owner: Send + Sync {
    /// Simulated world time in ticks
    fn world_time(&self) -> i64;

    /// The instance changed in a way that needs saving
    fn mark_dirty(&self);

    fn displays(&self) -> Vec<Arc<dyn Display>>;
}

/// Supplies the boot and kernel payloads and driver sources
pub trait ResourceCatalog: Send + Sync {
    /// Address of the boot resource, if it is addressable
    fn address(&self) -> Option<String>;

    fn boot_payload(&self) -> String;

    fn kernel_payload(&self) -> String;

    /// Driver name to source
    fn drivers(&self) -> BTreeMap<String, String>;

    fn load(&self, record: &JsonValue);

    fn save(&self) -> JsonValue;
}

/// Publishes the serialization entry points the snapshot codec calls
pub const DEFAULT_BOOT: &str = r#"
return {
    persist: persistence.persist,
    unpersist: persistence.unpersist
}
"#;

/// Event loop: sleeps for the timeout budget, prints on request and honours
/// reboot and shutdown signals
pub const DEFAULT_KERNEL: &str = r#"
let timeout = system.timeout
while (true) {
    let signal = yield timeout
    let name = signal[0]
    if (name == "print") {
        print(signal[1])
    } else if (name == "reboot") {
        yield true
    } else if (name == "shutdown") {
        yield false
    }
}
"#;

/// In-memory catalog carrying fixed payloads
#[derive(Debug)]
pub struct StaticCatalog {
    address: RwLock<Option<String>>,
    boot: String,
    kernel: String,
    drivers: BTreeMap<String, String>,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self {
            address: RwLock::new(None),
            boot: DEFAULT_BOOT.to_string(),
            kernel: DEFAULT_KERNEL.to_string(),
            drivers: BTreeMap::new(),
        }
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, source: impl Into<String>) -> Self {
        self.kernel = source.into();
        self
    }

    pub fn with_boot(mut self, source: impl Into<String>) -> Self {
        self.boot = source.into();
        self
    }

    pub fn with_driver(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.drivers.insert(name.into(), source.into());
        self
    }

    pub fn with_address(self, address: impl Into<String>) -> Self {
        *self.address.write() = Some(address.into());
        self
    }
}

impl ResourceCatalog for StaticCatalog {
    fn address(&self) -> Option<String> {
        self.address.read().clone()
    }

    fn boot_payload(&self) -> String {
        self.boot.clone()
    }

    fn kernel_payload(&self) -> String {
        self.kernel.clone()
    }

    fn drivers(&self) -> BTreeMap<String, String> {
        self.drivers.clone()
    }

    fn load(&self, record: &JsonValue) {
        *self.address.write() = record
            .get("address")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
    }

    fn save(&self) -> JsonValue {
        json!({ "address": self.address() })
    }
}
