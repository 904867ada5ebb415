use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that can cross the host/guest boundary as a signal or network argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Nothing,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

// Every numeric kind collapses to one canonical f64 representation.
macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nothing
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nothing)
    }
}

/// Build a `Vec<Value>` from heterogeneous arguments
#[macro_export]
macro_rules! args {
    () => { Vec::<$crate::types::Value>::new() };
    ($($arg:expr),+ $(,)?) => {
        vec![$($crate::types::Value::from($arg)),+]
    };
}

/// An event queued for delivery into the guest coroutine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub args: Vec<Value>,
}

impl Signal {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Lifecycle state of a machine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    Stopped,
    Suspended,
    Yielded,
    Sleeping,
    Paused,
    Running,
    Stopping,
    SynchronizedCall,
    SynchronizedReturn,
    SynchronizedReturnPaused,
    Rebooting,
}

impl MachineState {
    /// Integer code written to the persisted record
    pub fn code(self) -> i32 {
        match self {
            MachineState::Stopped => 0,
            MachineState::Suspended => 1,
            MachineState::Yielded => 2,
            MachineState::Sleeping => 3,
            MachineState::Paused => 4,
            MachineState::Running => 5,
            MachineState::Stopping => 6,
            MachineState::SynchronizedCall => 7,
            MachineState::SynchronizedReturn => 8,
            MachineState::SynchronizedReturnPaused => 9,
            MachineState::Rebooting => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let state = match code {
            0 => MachineState::Stopped,
            1 => MachineState::Suspended,
            2 => MachineState::Yielded,
            3 => MachineState::Sleeping,
            4 => MachineState::Paused,
            5 => MachineState::Running,
            6 => MachineState::Stopping,
            7 => MachineState::SynchronizedCall,
            8 => MachineState::SynchronizedReturn,
            9 => MachineState::SynchronizedReturnPaused,
            10 => MachineState::Rebooting,
            _ => return None,
        };
        Some(state)
    }

    /// Collapse transient sub-states that are not distinguishable across a save
    pub fn collapsed(self) -> Self {
        match self {
            MachineState::Paused | MachineState::Sleeping => MachineState::Yielded,
            MachineState::SynchronizedReturnPaused => MachineState::SynchronizedReturn,
            other => other,
        }
    }
}

/// A named message delivered by the network to this instance
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub name: String,
    /// Address of the sending node
    pub source: String,
    pub data: Vec<Value>,
}

impl Message {
    pub fn new(name: impl Into<String>, source: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_kinds_normalize_to_number() {
        assert_eq!(Value::from(3u8), Value::Number(3.0));
        assert_eq!(Value::from(-7i64), Value::Number(-7.0));
        assert_eq!(Value::from(1.5f32), Value::Number(1.5));
        assert_eq!(Value::from(None::<i32>), Value::Nothing);
        assert_eq!(args!["a", 2, true, ()], vec![
            Value::Str("a".to_string()),
            Value::Number(2.0),
            Value::Bool(true),
            Value::Nothing,
        ]);
    }

    #[test]
    fn test_state_codes_collapse_on_save() {
        assert_eq!(MachineState::Sleeping.collapsed(), MachineState::Yielded);
        assert_eq!(MachineState::Paused.collapsed(), MachineState::Yielded);
        assert_eq!(
            MachineState::SynchronizedReturnPaused.collapsed(),
            MachineState::SynchronizedReturn
        );
        assert_eq!(MachineState::SynchronizedCall.collapsed(), MachineState::SynchronizedCall);

        for code in 0..=10 {
            let state = MachineState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(MachineState::from_code(11), None);
    }
}
