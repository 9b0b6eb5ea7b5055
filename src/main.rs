//! vpnmgr - VPN session manager
//!
//! Drives a single VPN session through configured platform hooks and
//! exposes the JSON action bridge on stdin/stdout for hybrid-app shells.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vpnmgr_core::{error::VpnMgrError, init_logging};

mod cli;

#[derive(Parser)]
#[command(name = "vpnmgr")]
#[command(about = "VPN session manager with a scriptable platform adapter")]
struct Cli {
    /// Configuration file (defaults to ~/.config/vpnmgr/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report what the platform VPN facility supports
    Capable,
    /// Install or update the VPN profile
    Provision {
        /// Provisioning options as a JSON object (overrides [profile])
        #[arg(long)]
        options: Option<String>,
    },
    /// Bring the VPN up and keep it up until Ctrl+C
    Up {
        /// Connection options as a JSON object (overrides [profile])
        #[arg(long)]
        options: Option<String>,
    },
    /// Read `<action> [json]` lines from stdin and answer in JSON
    Shell,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Capable => cli::vpn::run_capable(config).await,
        Commands::Provision { options } => {
            cli::vpn::run_provision(config, options.as_deref()).await
        }
        Commands::Up { options } => cli::vpn::run_up(config, options.as_deref()).await,
        Commands::Shell => cli::shell::run_shell(config).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let exit_code = match e {
                // Configuration errors (exit code 2)
                VpnMgrError::Config(_) | VpnMgrError::Toml(_) | VpnMgrError::TomlSerialize(_) => 2,
                // Bad options on the command line (exit code 2)
                VpnMgrError::Profile(_) | VpnMgrError::Json(_) => 2,
                // Session and adapter failures (exit code 1 - runtime)
                VpnMgrError::Command(_) | VpnMgrError::Adapter(_) => 1,
                // IO errors (exit code 1 - runtime)
                VpnMgrError::Io(_) => 1,
            };

            eprintln!("{}", e);
            std::process::exit(exit_code);
        }
    }
}
