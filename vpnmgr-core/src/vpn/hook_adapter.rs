//! Hook-driven platform adapter
//!
//! Runs configured shell commands for each adapter operation and reads
//! their output to decide the result. A long-running `monitor` hook may
//! report drops and network changes while the tunnel is up.

use crate::error::AdapterError;
use crate::types::CommandOptions;
use crate::vpn::adapter::{AdapterEvent, Capability, CapabilityFlags, PlatformAdapter};
use crate::vpn::network_policy::NetworkInfo;
use crate::vpn::output_parser::OutputParser;
use crate::vpn::profile::VpnProfile;
use crate::vpn::state::ErrorState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

/// Shell commands backing each adapter operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Brings the tunnel up; exit status 0 means connected
    pub connect: String,

    /// Tears the tunnel down
    pub disconnect: String,

    /// Installs or updates the profile
    #[serde(default)]
    pub install_profile: Option<String>,

    /// Prints supported capabilities
    #[serde(default)]
    pub probe: Option<String>,

    /// Prints the active network type
    #[serde(default)]
    pub network: Option<String>,

    /// Long-running watcher started after connect
    #[serde(default)]
    pub monitor: Option<String>,

    /// Upper bound for a single hook run, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

/// Validation errors for HookConfig
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HookValidationError {
    #[error("hook `{0}` must not be empty")]
    EmptyCommand(&'static str),

    #[error("timeout_secs must be between 1 and 3600, got: {0}")]
    InvalidTimeout(u64),
}

impl HookConfig {
    pub fn new(connect: impl Into<String>, disconnect: impl Into<String>) -> Self {
        Self {
            connect: connect.into(),
            disconnect: disconnect.into(),
            install_profile: None,
            probe: None,
            network: None,
            monitor: None,
            timeout_secs: default_timeout(),
        }
    }

    /// Validate every configured hook
    pub fn validate(&self) -> Result<(), HookValidationError> {
        let hooks = [
            ("connect", Some(&self.connect)),
            ("disconnect", Some(&self.disconnect)),
            ("install_profile", self.install_profile.as_ref()),
            ("probe", self.probe.as_ref()),
            ("network", self.network.as_ref()),
            ("monitor", self.monitor.as_ref()),
        ];
        for (name, command) in hooks {
            if command.is_some_and(|c| c.trim().is_empty()) {
                return Err(HookValidationError::EmptyCommand(name));
            }
        }
        if self.timeout_secs < 1 || self.timeout_secs > 3600 {
            return Err(HookValidationError::InvalidTimeout(self.timeout_secs));
        }
        Ok(())
    }
}

/// Captured result of one hook run
#[derive(Debug, Clone)]
struct HookOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl HookOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stderr, self.stdout)
    }
}

/// Platform adapter that shells out to configured hooks
pub struct HookAdapter {
    config: HookConfig,
    parser: Arc<OutputParser>,
    monitor_process: Arc<Mutex<Option<Child>>>,
    event_sender: mpsc::UnboundedSender<AdapterEvent>,
    event_receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
}

impl HookAdapter {
    pub fn new(config: HookConfig) -> Self {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        Self {
            config,
            parser: Arc::new(OutputParser::new()),
            monitor_process: Arc::new(Mutex::new(None)),
            event_sender,
            event_receiver: std::sync::Mutex::new(Some(event_receiver)),
        }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    fn shell(command: &str, env: &[(String, String)]) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a hook to completion
    async fn run_hook(
        &self,
        hook: &str,
        command: &str,
        env: &[(String, String)],
    ) -> Result<HookOutput, AdapterError> {
        let child = Self::shell(command, env)
            .spawn()
            .map_err(|e| AdapterError::SpawnFailed {
                hook: hook.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(hook, pid = ?child.id(), "Hook spawned");

        let seconds = self.config.timeout_secs;
        let output = tokio::time::timeout(Duration::from_secs(seconds), child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout {
                hook: hook.to_string(),
                seconds,
            })?
            .map_err(|e| AdapterError::SpawnFailed {
                hook: hook.to_string(),
                reason: e.to_string(),
            })?;

        let result = HookOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(hook, status = ?output.status, "Hook finished");
        Ok(result)
    }

    /// Environment for lifecycle hooks
    ///
    /// Commands without a full profile still run; their hooks just see
    /// fewer variables.
    fn profile_env(options: &CommandOptions) -> Vec<(String, String)> {
        match VpnProfile::from_options(options) {
            Ok(profile) => profile.to_env(),
            Err(e) => {
                tracing::debug!("No complete profile in options ({}), hook gets server only", e);
                options
                    .get_str("server")
                    .ok()
                    .flatten()
                    .map(|server| vec![("VPN_GATEWAY".to_string(), server.to_string())])
                    .unwrap_or_default()
            }
        }
    }

    /// Run a lifecycle hook and map its outcome to a session error code
    async fn run_lifecycle(
        &self,
        hook: &str,
        command: &str,
        options: &CommandOptions,
    ) -> Result<(), ErrorState> {
        let env = Self::profile_env(options);
        match self.run_hook(hook, command, &env).await {
            Ok(output) if output.success => Ok(()),
            Ok(output) => {
                let code = self.parser.classify_failure(&output.combined());
                tracing::warn!(hook, %code, "Hook reported failure");
                Err(code)
            }
            Err(AdapterError::Timeout { seconds, .. }) => {
                tracing::warn!(hook, seconds, "Hook timed out");
                Err(ErrorState::Unreachable)
            }
            Err(e) => {
                tracing::error!(hook, "{}", e);
                Err(ErrorState::GenericError)
            }
        }
    }

    /// Start the monitor hook, forwarding its events
    async fn start_monitor(&self) {
        let Some(command) = self.config.monitor.as_deref() else {
            return;
        };

        let mut child = match Self::shell(command, &[]).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to start monitor hook: {}", e);
                return;
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let parser = Arc::clone(&self.parser);
            let sender = self.event_sender.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("Monitor: {}", line);
                    if let Some(event) = parser.parse_monitor_line(&line) {
                        if sender.send(event).is_err() {
                            tracing::warn!("Failed to send adapter event, receiver dropped");
                            break;
                        }
                    }
                }
                tracing::debug!("Monitor hook output closed");
            });
        }

        tracing::info!(pid = ?child.id(), "Monitor hook started");
        *self.monitor_process.lock().await = Some(child);
    }

    async fn stop_monitor(&self) {
        if let Some(mut child) = self.monitor_process.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!("Monitor hook already gone: {}", e);
            }
            tracing::info!("Monitor hook stopped");
        }
    }
}

#[async_trait]
impl PlatformAdapter for HookAdapter {
    fn name(&self) -> &str {
        "hooks"
    }

    async fn query_capability(
        &self,
        options: &CommandOptions,
    ) -> Result<CapabilityFlags, AdapterError> {
        let Some(probe) = self.config.probe.as_deref() else {
            // Hooks always work off a profile
            return Ok(CapabilityFlags::new().with(Capability::ProfileBased));
        };

        let output = self.run_hook("probe", probe, &Self::profile_env(options)).await?;
        if !output.success {
            return Err(AdapterError::Unavailable {
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(self.parser.parse_capabilities(&output.stdout))
    }

    async fn connect(&self, options: &CommandOptions) -> Result<(), ErrorState> {
        self.run_lifecycle("connect", &self.config.connect, options)
            .await?;
        self.start_monitor().await;
        Ok(())
    }

    async fn disconnect(&self, options: &CommandOptions) -> Result<(), ErrorState> {
        self.stop_monitor().await;
        self.run_lifecycle("disconnect", &self.config.disconnect, options)
            .await
    }

    async fn install_profile(&self, options: &CommandOptions) -> Result<(), ErrorState> {
        let Some(command) = self.config.install_profile.as_deref() else {
            let e = AdapterError::HookNotConfigured {
                hook: "install_profile".to_string(),
            };
            tracing::error!("{}", e);
            return Err(ErrorState::GenericError);
        };
        self.run_lifecycle("install_profile", command, options).await
    }

    async fn active_network(&self) -> NetworkInfo {
        let Some(command) = self.config.network.as_deref() else {
            return NetworkInfo::unknown();
        };
        match self.run_hook("network", command, &[]).await {
            Ok(output) if output.success => self.parser.parse_network(&output.stdout),
            Ok(_) => NetworkInfo::unknown(),
            Err(e) => {
                tracing::warn!("{}", e);
                NetworkInfo::unknown()
            }
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        self.event_receiver
            .lock()
            .ok()
            .and_then(|mut receiver| receiver.take())
    }
}
