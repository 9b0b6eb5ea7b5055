//! Line-oriented action bridge
//!
//! Reads `<action> [json]` lines from stdin, dispatches them through the
//! action bridge and writes one JSON object per line to stdout. Session
//! events and command completions are written as they happen. When stdin
//! closes, pending commands are awaited and a live tunnel is taken down
//! before the printer drains.

use crate::cli::{load, start_session};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vpnmgr_core::bridge::{self, BridgeError};
use vpnmgr_core::error::VpnMgrError;
use vpnmgr_core::types::CommandOptions;
use vpnmgr_core::vpn::CommandHandle;

/// Split a request line into its action and JSON arguments
fn parse_line(line: &str) -> Result<(&str, Value), VpnMgrError> {
    let line = line.trim();
    let (action, args) = match line.split_once(char::is_whitespace) {
        Some((action, args)) => (action, args.trim()),
        None => (line, ""),
    };
    let args = if args.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(args)?
    };
    Ok((action, args))
}

/// Print the outcome of `handle` once the adapter answers
fn print_completion(handle: CommandHandle) -> JoinHandle<()> {
    let command = handle.command();
    tokio::spawn(async move {
        let done = match handle.await {
            Ok(()) => json!({ "completed": command, "ok": true }),
            Err(e) => json!({
                "completed": command,
                "ok": false,
                "error": BridgeError::from(e).to_json(),
            }),
        };
        println!("{}", done);
    })
}

/// Run the shell command until stdin closes
pub async fn run_shell(config_path: Option<&Path>) -> Result<(), VpnMgrError> {
    let config = load(config_path)?;
    let coordinator = start_session(&config)?;

    let (subscription, mut events) = coordinator.listen();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", json!({ "event": bridge::event_to_json(&event) }));
        }
    });
    info!(%subscription, "Shell ready");

    let mut pending = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let (action, args) = match parse_line(&line) {
            Ok(request) => request,
            Err(e) => {
                println!(
                    "{}",
                    json!({ "error": { "code": "INVALID_JSON", "message": e.to_string() } })
                );
                continue;
            }
        };

        match bridge::dispatch(&coordinator, action, args).await {
            Ok(reply) => {
                println!("{}", json!({ "action": action, "result": reply.value }));
                if let Some(handle) = reply.completion {
                    pending.push(print_completion(handle));
                }
            }
            Err(e) => {
                debug!(action, error = %e, "Action rejected");
                println!("{}", json!({ "action": action, "error": e.to_json() }));
            }
        }
    }

    info!(pending = pending.len(), "Input closed, shutting down");
    for completion in pending {
        if let Err(e) = completion.await {
            warn!("Completion printer failed: {}", e);
        }
    }

    if coordinator.is_up(&CommandOptions::new()) {
        match coordinator.disable(CommandOptions::new()).await {
            Ok(handle) => {
                if let Err(e) = print_completion(handle).await {
                    warn!("Completion printer failed: {}", e);
                }
            }
            Err(e) => warn!("Failed to take the VPN down: {}", e),
        }
    }

    // Dropping the subscribers closes the event channel and ends the printer
    coordinator.shutdown();
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }
    Ok(())
}
