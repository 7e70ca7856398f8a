//! Tool implementations
//!
//! One module per tool family. Every tool exposes `schema()` for
//! `tools/list` and an `execute*` entry point taking the shared service and
//! raw JSON arguments.

pub mod analyze;
pub mod browse;
pub mod duplicates;
pub mod manage;
pub mod search;
pub mod session;
pub mod stats;
pub mod store;
pub mod suggest;

use engram_core::MemoryError;
use serde_json::Value;

/// Parse required tool arguments
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    args: Option<Value>,
) -> Result<T, MemoryError> {
    let value = args.ok_or_else(|| {
        MemoryError::InvalidArgument("missing tool arguments".to_string())
    })?;
    serde_json::from_value(value)
        .map_err(|e| MemoryError::InvalidArgument(format!("invalid arguments: {}", e)))
}

/// Parse arguments where every field is optional
pub(crate) fn parse_args_or_default<T>(args: Option<Value>) -> Result<T, MemoryError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match args {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| MemoryError::InvalidArgument(format!("invalid arguments: {}", e))),
        None => Ok(T::default()),
    }
}
