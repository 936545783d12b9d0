//! Thin JSON-over-stdio external collaborator (spec.md §6): reads one JSON
//! request per line from stdin, dispatches on its `op` field, writes one
//! JSON response per line to stdout. `clap` only ever selects the chain
//! profile and log level at process start, mirroring the teacher's
//! `src/main.rs` `StartNodeArgs` (`--log-level`, profile-ish flags) — no
//! P2P, wallet, or RPC surface lives here.

mod ops;
mod verifier;
mod view;

use std::io::{self, BufRead, Write};

use clap::Parser;
use consensus_core::ChainProfile;
use serde_json::{json, Value};
use tracing::Level;

#[derive(Parser)]
#[command(name = "consensus-cli")]
#[command(about = "JSON-over-stdio op dispatcher for the consensus core")]
struct Cli {
    /// Path to a JSON-encoded ChainProfile. Defaults to the built-in devnet profile.
    #[arg(long)]
    profile: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_level(raw: &str) -> Level {
    match raw {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn load_profile(path: Option<&std::path::Path>) -> io::Result<ChainProfile> {
    let Some(path) = path else {
        return Ok(ChainProfile::default());
    };
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(parse_level(&cli.log_level)).init();

    let profile = load_profile(cli.profile.as_deref())?;
    tracing::info!(profile = ?profile, "consensus-cli starting");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&line, &profile);
        writeln!(out, "{response}")?;
        out.flush()?;
    }
    Ok(())
}

fn handle_line(line: &str, profile: &ChainProfile) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return json!({ "ok": false, "err": format!("invalid json: {e}") }),
    };
    let Some(op) = request.get("op").and_then(Value::as_str) else {
        return json!({ "ok": false, "err": "missing field: op" });
    };

    let mut body = request.clone();
    if let Value::Object(ref mut map) = body {
        map.entry("profile").or_insert_with(|| serde_json::to_value(profile).expect("ChainProfile serializes"));
    }

    match ops::dispatch(op, body) {
        Ok(mut value) => {
            if let Value::Object(ref mut map) = value {
                map.insert("ok".to_string(), json!(true));
            }
            value
        }
        Err(e) => {
            tracing::debug!(op, error = %e, "request rejected");
            json!({ "ok": false, "err": e.to_string() })
        }
    }
}
