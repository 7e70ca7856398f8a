//! Engram server - cross-tool conversation memory
//!
//! Serves the tool protocol (JSON-RPC over stdio) and a parallel HTTP API
//! over one shared memory service:
//!
//! - Storage analyzer routes each exchange to auto-store / suggest / drop
//! - Duplicate detector resolves writes into store / skip / merge
//! - Hybrid search (keyword + optional semantic + recency) with graceful
//!   degradation to keyword-only mode
//! - Learning engine calibrates storage thresholds from approve/reject
//!   feedback
//!
//! Background tasks keep the store healthy: suggestion TTL eviction and
//! retention cleanup.

mod http;
mod protocol;
mod server;
mod tools;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use engram_core::MemoryService;

use crate::protocol::stdio::StdioTransport;
use crate::server::ToolServer;

/// Parse command-line arguments; returns the optional data directory.
/// Exits for `--help` / `--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Engram Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Cross-tool conversation memory over the tool protocol and HTTP.");
                println!();
                println!("USAGE:");
                println!("    engram-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --db-path <PATH>        Custom database file");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                     Log level filter");
                println!("    ENGRAM_HTTP_PORT             HTTP API port (default: 3900, 0 disables)");
                println!("    ENGRAM_RETENTION_INTERVAL_HOURS  Retention cadence (default: 24)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("engram-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db-path" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--db-path=") => {
                let path = arg.strip_prefix("--db-path=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'engram-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    db_path
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() {
    let db_path = parse_args();

    // Logging goes to stderr; stdout belongs to JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Engram server v{} starting...", env!("CARGO_PKG_VERSION"));

    let service = match MemoryService::open(db_path) {
        Ok(service) => {
            info!("memory service initialized");
            Arc::new(service)
        }
        Err(e) => {
            error!("failed to initialize memory service: {}", e);
            std::process::exit(1);
        }
    };

    match service.health().overall_status.as_str() {
        "healthy" => info!("all components healthy"),
        status => warn!("starting in {} mode (semantic search may be unavailable)", status),
    }

    // Periodic suggestion TTL eviction
    {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                let evicted = service.cleanup_suggestions();
                if evicted > 0 {
                    info!(evicted, "expired pending suggestions evicted");
                }
            }
        });
    }

    // Periodic retention cleanup
    {
        let service = Arc::clone(&service);
        let interval_hours = env_u64("ENGRAM_RETENTION_INTERVAL_HOURS", 24);
        tokio::spawn(async move {
            // Small delay so startup and the stdio handshake come first
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            loop {
                match service.run_retention() {
                    Ok(report) if !report.deleted_ids.is_empty() => {
                        info!(
                            deleted = report.deleted_ids.len(),
                            remaining = report.remaining,
                            "retention cleanup complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("retention cleanup failed: {}", e),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval_hours * 3600)).await;
            }
        });
    }

    // HTTP API alongside the stdio transport
    let http_port = env_u64("ENGRAM_HTTP_PORT", 3900) as u16;
    if http_port != 0 {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let addr = SocketAddr::from(([127, 0, 0, 1], http_port));
            if let Err(e) = http::serve(service, addr).await {
                warn!("HTTP API failed to start: {}", e);
            }
        });
    }

    let tool_server = ToolServer::new(service);
    let transport = StdioTransport::new();

    info!("serving tool protocol on stdio...");
    if let Err(e) = transport.run(tool_server).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    info!("Engram server shutting down");
}
