mod auth;
mod backup;
mod calendar;
mod config;
mod db;
mod ipc;
mod weekdays;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Admin-console sidecar: line-delimited JSON requests on stdin, one
/// response per line on stdout. Logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "academyd", version, about)]
struct Cli {
    /// Open this workspace before reading requests.
    #[arg(long, env = "ACADEMYD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Serve the built-in fixture catalogue regardless of workspace config.
    #[arg(long)]
    mock: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut state = ipc::AppState::new(cli.mock);
    if let Some(path) = &cli.workspace {
        ipc::open_workspace(&mut state, path)?;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "academyd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No id to echo back.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };
        let text = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        writeln!(stdout, "{}", text)?;
        stdout.flush()?;
    }
    Ok(())
}
