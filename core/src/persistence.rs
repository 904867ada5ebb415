//! Persisted record layout
//!
//! One record per instance. A stopped instance writes only its state code.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::types::{Signal, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    /// Collapsed lifecycle state code
    pub state: i32,

    /// Snapshot of the kernel coroutine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<Vec<u8>>,

    /// Snapshot of the pending-call slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<SignalRecord>>,

    /// Owned entirely by the resource catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rom: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_memory: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<i64>,

    /// Accumulated CPU time in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub name: String,
    pub args: ArgsRecord,
}

/// Arguments stored as `{ length, arg0, arg1, ... }`
///
/// A missing `argN` below `length` reads back as nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgsRecord {
    pub length: usize,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl From<&Signal> for SignalRecord {
    fn from(signal: &Signal) -> Self {
        let values = signal
            .args
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != Value::Nothing)
            .map(|(i, value)| (format!("arg{}", i), value.clone()))
            .collect();

        Self {
            name: signal.name.clone(),
            args: ArgsRecord {
                length: signal.args.len(),
                values,
            },
        }
    }
}

impl From<SignalRecord> for Signal {
    fn from(mut record: SignalRecord) -> Self {
        let args = (0..record.args.length)
            .map(|i| {
                record
                    .args
                    .values
                    .remove(&format!("arg{}", i))
                    .unwrap_or(Value::Nothing)
            })
            .collect();
        Signal::new(record.name, args)
    }
}
