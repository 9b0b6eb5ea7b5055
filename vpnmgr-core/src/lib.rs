//! Core library for the vpnmgr VPN session manager
//!
//! This crate provides the VPN session state machine, the command
//! coordinator that drives a platform adapter, subscriber notification
//! and the JSON action bridge used by hosts.

pub mod error;
pub mod types;

pub mod bridge;
pub mod config;
pub mod vpn;

/// Environment variable holding the log filter directive
pub const LOG_ENV_VAR: &str = "VPNMGR_LOG";

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging when running under systemd.
/// Otherwise logs to stderr with pretty formatting. The level comes from
/// `VPNMGR_LOG` and defaults to INFO.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to use systemd journal logging if available
    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter)
                .try_init()?;
            return Ok(());
        }
    }

    // Fallback to stderr logging with pretty formatting
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()?;

    Ok(())
}
