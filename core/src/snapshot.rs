//! Snapshot codec
//!
//! Shuttles interpreter values to and from opaque blobs through the
//! `persist`/`unpersist` entry points the boot payload publishes. The codec
//! does not look inside the values; live host handles must be drained from
//! the stack before a snapshot is taken.

use crate::interpreter::{Fault, Interpreter, Val};

const PERSIST: &str = "persist";
const UNPERSIST: &str = "unpersist";

pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Serialize `value`, or return an empty blob if the guest cannot
    pub fn persist(interp: &mut Interpreter, value: &Val) -> Vec<u8> {
        let result = with_limit_lifted(interp, |interp| {
            interp.call_entry_point(PERSIST, vec![value.clone()])
        });

        match result {
            Ok(Some(Val::Str(blob))) => blob.into_bytes(),
            Ok(Some(other)) => {
                tracing::warn!(kind = other.type_name(), "persist returned a non-string value");
                Vec::new()
            }
            Ok(None) => {
                tracing::warn!("No persist entry point, writing an empty snapshot");
                Vec::new()
            }
            Err(fault) => {
                tracing::warn!(error = %fault, "persist failed, writing an empty snapshot");
                Vec::new()
            }
        }
    }

    /// Reconstruct a value from `blob`
    ///
    /// `Ok(None)` if no deserialization entry point exists. The caller checks
    /// the type of the returned value.
    pub fn restore(interp: &mut Interpreter, blob: &[u8]) -> Result<Option<Val>, Fault> {
        let text = std::str::from_utf8(blob)
            .map_err(|e| Fault::Protocol(format!("snapshot is not text: {}", e)))?
            .to_string();

        with_limit_lifted(interp, |interp| {
            interp.call_entry_point(UNPERSIST, vec![Val::Str(text)])
        })
    }
}

/// Serialization may transiently need more memory than the steady-state budget
fn with_limit_lifted<T>(interp: &mut Interpreter, f: impl FnOnce(&mut Interpreter) -> T) -> T {
    let limit = interp.memory_limit();
    interp.set_memory_limit(None);
    let result = f(interp);
    interp.set_memory_limit(limit);
    result
}
