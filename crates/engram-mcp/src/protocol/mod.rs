//! Tool protocol: JSON-RPC types and the stdio transport

pub mod stdio;
pub mod types;
