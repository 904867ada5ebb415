//! Network messages addressed to an instance

use crate::types::{Message, Value};

use super::Instance;

pub const NETWORK_CONNECT: &str = "network.connect";
pub const NETWORK_DISCONNECT: &str = "network.disconnect";
pub const NETWORK_RECONNECT: &str = "network.reconnect";
pub const COMPUTER_SIGNAL: &str = "computer.signal";
pub const COMPUTER_START: &str = "computer.start";
pub const COMPUTER_STOP: &str = "computer.stop";
pub const COMPUTER_RUNNING: &str = "computer.running";

impl Instance {
    /// Handle a message from the network
    ///
    /// Topology changes become guest signals while the instance runs. The
    /// `computer.*` commands are answered with a boolean; anything else is
    /// ignored.
    pub fn receive(&self, message: &Message) -> Option<Value> {
        match message.name.as_str() {
            NETWORK_CONNECT if self.is_running() => {
                self.signal("component_added", vec![Value::Str(peer(message))]);
                None
            }
            NETWORK_DISCONNECT if self.is_running() => {
                self.signal("component_removed", vec![Value::Str(peer(message))]);
                None
            }
            NETWORK_RECONNECT if self.is_running() => {
                let previous = message.data.get(1).cloned().unwrap_or(Value::Nothing);
                self.signal(
                    "component_changed",
                    vec![Value::Str(peer(message)), previous],
                );
                None
            }
            COMPUTER_SIGNAL => {
                if let Some(Value::Str(name)) = message.data.first() {
                    let mut args = Vec::with_capacity(message.data.len());
                    args.push(Value::Str(message.source.clone()));
                    args.extend(message.data[1..].iter().cloned());
                    self.signal(name, args);
                }
                None
            }
            COMPUTER_START => Some(Value::Bool(self.start())),
            COMPUTER_STOP => Some(Value::Bool(self.stop())),
            COMPUTER_RUNNING => Some(Value::Bool(self.is_running())),
            _ => None,
        }
    }
}

/// Address the message concerns: its first string argument, else the sender
fn peer(message: &Message) -> String {
    match message.data.first() {
        Some(Value::Str(address)) => address.clone(),
        _ => message.source.clone(),
    }
}
