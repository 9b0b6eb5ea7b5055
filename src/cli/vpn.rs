//! VPN session commands
//!
//! One-shot commands that start a session, drive it through the
//! configured hooks and report the outcome on the terminal.

use crate::cli::{command_options, load, start_session};
use colored::Colorize;
use std::path::Path;
use tracing::{info, warn};
use vpnmgr_core::error::{CommandError, VpnMgrError};
use vpnmgr_core::types::CommandOptions;
use vpnmgr_core::vpn::{ConnectionState, Coordinator, ErrorState, SessionEvent, VpnProfile};

/// Run the capable command
pub async fn run_capable(config_path: Option<&Path>) -> Result<(), VpnMgrError> {
    let config = load(config_path)?;
    let coordinator = start_session(&config)?;

    let result = coordinator.is_vpn_capable(&config.profile_options()).await;
    coordinator.shutdown();

    match result {
        Ok(flags) if !flags.is_empty() => {
            let names: Vec<String> = flags.iter().map(|c| c.to_string()).collect();
            println!("{} {}", "✓ VPN capable:".green(), names.join(", "));
            Ok(())
        }
        Ok(_) => {
            println!("{}", "✗ Platform reports no VPN capabilities".yellow());
            Ok(())
        }
        Err(e) => {
            println!("{}", "✗ Platform VPN facility unavailable".red());
            Err(e.into())
        }
    }
}

/// Run the provision command
pub async fn run_provision(
    config_path: Option<&Path>,
    options: Option<&str>,
) -> Result<(), VpnMgrError> {
    let config = load(config_path)?;
    let options = command_options(&config, options)?;
    let profile = VpnProfile::from_options(&options)?;
    let coordinator = start_session(&config)?;

    println!("Provisioning {}", profile.alias().bold());
    let result = coordinator.provision(options).await?.await;
    coordinator.shutdown();

    result?;
    println!("{}", "✓ Profile installed".green());
    Ok(())
}

/// Run the up command
///
/// Connects, prints every session event and disconnects on Ctrl+C. Exits
/// early if the connection fails or drops.
pub async fn run_up(config_path: Option<&Path>, options: Option<&str>) -> Result<(), VpnMgrError> {
    let config = load(config_path)?;
    let options = command_options(&config, options)?;
    let coordinator = start_session(&config)?;
    let (_, mut events) = coordinator.listen();

    let mut enable = coordinator.enable(options.clone()).await?;
    let mut interrupted = false;

    // The adapter call cannot be cancelled, so an early Ctrl+C only
    // shortens the wait once it has answered
    let connected = loop {
        tokio::select! {
            result = &mut enable => break result,
            Some(event) = events.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                println!("Waiting for the connection attempt to finish...");
                interrupted = true;
            }
        }
    };

    if let Err(e) = connected {
        drain_events(&mut events);
        coordinator.shutdown();
        return Err(e.into());
    }

    if !interrupted {
        println!("{}", "Connected. Press Ctrl+C to disconnect.".green());
        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    print_event(&event);
                    if event == SessionEvent::StateChanged(ConnectionState::Disabled) {
                        warn!("VPN session ended without a disconnect request");
                        let error = coordinator.current_error();
                        coordinator.shutdown();
                        return Err(CommandError::Adapter(error.as_failure()).into());
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                    }
                    info!("Interrupt received, disconnecting");
                    break;
                }
            }
        }
    }

    let result = disconnect(&coordinator, options).await;
    drain_events(&mut events);
    coordinator.shutdown();
    result
}

/// Disable the session if it is up
async fn disconnect(coordinator: &Coordinator, options: CommandOptions) -> Result<(), VpnMgrError> {
    if !coordinator.is_up(&options) {
        println!("VPN was not connected");
        return Ok(());
    }
    coordinator.disable(options).await?.await?;
    println!("{}", "✓ VPN disconnected".green());
    Ok(())
}

fn drain_events(events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => {
            let label = match state {
                ConnectionState::Connected => state.as_str().green(),
                ConnectionState::Disabled => state.as_str().normal(),
                _ => state.as_str().yellow(),
            };
            println!("state: {}", label);
        }
        SessionEvent::ErrorChanged(ErrorState::NoError) => {
            println!("error: {}", ErrorState::NoError.as_str().dimmed());
        }
        SessionEvent::ErrorChanged(error) => {
            println!("error: {}", error.as_str().red());
        }
    }
}
