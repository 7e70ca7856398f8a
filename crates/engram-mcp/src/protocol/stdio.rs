//! stdio Transport
//!
//! Line-delimited JSON-RPC over stdin/stdout. Logging goes to stderr;
//! stdout carries only protocol frames.

use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, error, warn};

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::ToolServer;

/// stdio transport for the tool protocol
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    /// Run the server loop until stdin closes
    pub async fn run(self, mut server: ToolServer) -> Result<(), io::Error> {
        let stdin = io::stdin();
        let stdout = io::stdout();

        let reader = BufReader::new(stdin.lock());
        let mut stdout = stdout.lock();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("failed to read line: {}", e);
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }
            debug!("received {} bytes", line.len());

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("failed to parse request: {}", e);
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    write_response(&mut stdout, &response)?;
                    continue;
                }
            };

            if let Some(response) = server.handle_request(request).await {
                write_response(&mut stdout, &response)?;
            }
        }

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn write_response(stdout: &mut impl Write, response: &JsonRpcResponse) -> Result<(), io::Error> {
    match serde_json::to_string(response) {
        Ok(json) => {
            debug!("sending {} bytes", json.len());
            writeln!(stdout, "{}", json)?;
            stdout.flush()?;
        }
        Err(e) => {
            error!("failed to serialize response: {}", e);
            // Minimal fallback so the client never hangs on a lost reply
            let fallback = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;
            let _ = writeln!(stdout, "{}", fallback);
            let _ = stdout.flush();
        }
    }
    Ok(())
}
