//! Pattern-based parser for adapter hook output
//!
//! Maps hook stdout/stderr onto session error codes, capability sets and
//! unsolicited adapter events using regex patterns.

use crate::vpn::adapter::{AdapterEvent, Capability, CapabilityFlags};
use crate::vpn::network_policy::{NetworkInfo, NetworkType};
use crate::vpn::state::ErrorState;
use regex::Regex;

/// Parser for hook output
pub struct OutputParser {
    /// Pattern for the gateway rejecting our credentials of its own identity
    peer_auth_failed_pattern: Regex,
    /// Pattern for credential failures
    auth_failed_pattern: Regex,
    /// Pattern for DNS resolution errors
    lookup_failed_pattern: Regex,
    /// Pattern for routing/connectivity errors
    unreachable_pattern: Regex,
    /// Pattern for network-type refusals
    disallowed_network_pattern: Regex,
    /// Pattern for "dropped" / "dropped: reason" monitor lines
    dropped_pattern: Regex,
    /// Pattern for "network: wifi" monitor lines
    network_pattern: Regex,
}

impl OutputParser {
    /// Create a new OutputParser with compiled regex patterns
    pub fn new() -> Self {
        Self {
            peer_auth_failed_pattern: Regex::new(
                r"(?i)peer auth|server certificate|certificate verify failed|verification failed|peer authentication",
            )
            .expect("Failed to compile peer_auth_failed pattern"),
            auth_failed_pattern: Regex::new(
                r"(?i)failed to authenticate|authentication failed|auth(?:entication)? error|bad password|invalid credentials|login failed",
            )
            .expect("Failed to compile auth_failed pattern"),
            lookup_failed_pattern: Regex::new(
                r"(?i)cannot resolve|unknown host|name resolution|getaddrinfo failed|Name or service not known|lookup failed",
            )
            .expect("Failed to compile lookup_failed pattern"),
            unreachable_pattern: Regex::new(
                r"(?i)unreachable|no route to host|connection refused|connection timed out|timed out",
            )
            .expect("Failed to compile unreachable pattern"),
            disallowed_network_pattern: Regex::new(
                r"(?i)disallowed network|network type not allowed|not permitted on this network",
            )
            .expect("Failed to compile disallowed_network pattern"),
            dropped_pattern: Regex::new(r"^(?i)dropped\s*(?::\s*(.*))?$")
                .expect("Failed to compile dropped pattern"),
            network_pattern: Regex::new(r"^(?i)network\s*:\s*(\S+)\s*$")
                .expect("Failed to compile network pattern"),
        }
    }

    /// Classify a single line, `None` if it carries no known failure
    pub fn classify_line(&self, line: &str) -> Option<ErrorState> {
        // Peer authentication must be checked before generic authentication
        if self.peer_auth_failed_pattern.is_match(line) {
            return Some(ErrorState::PeerAuthFailed);
        }
        if self.auth_failed_pattern.is_match(line) {
            return Some(ErrorState::AuthFailed);
        }
        if self.lookup_failed_pattern.is_match(line) {
            return Some(ErrorState::LookupFailed);
        }
        if self.disallowed_network_pattern.is_match(line) {
            return Some(ErrorState::DisallowedNetworkType);
        }
        if self.unreachable_pattern.is_match(line) {
            return Some(ErrorState::Unreachable);
        }
        None
    }

    /// Most specific failure code found in a failed hook's output
    ///
    /// Falls back to `GENERIC_ERROR` when no line matches.
    pub fn classify_failure(&self, output: &str) -> ErrorState {
        output
            .lines()
            .find_map(|line| self.classify_line(line))
            .unwrap_or(ErrorState::GenericError)
    }

    /// Parse capability names separated by commas or whitespace
    ///
    /// Unknown names are skipped.
    pub fn parse_capabilities(&self, output: &str) -> CapabilityFlags {
        output
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|token| match token.parse::<Capability>() {
                Ok(capability) => Some(capability),
                Err(e) => {
                    tracing::debug!("Ignoring capability token: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Parse a network description line such as `wifi` or `airplane`
    pub fn parse_network(&self, value: &str) -> NetworkInfo {
        match value.trim().to_ascii_lowercase().as_str() {
            "airplane" => NetworkInfo::airplane(),
            "none" | "" => NetworkInfo::unknown(),
            other => other
                .parse::<NetworkType>()
                .map(NetworkInfo::on)
                .unwrap_or_else(|_| NetworkInfo::on(NetworkType::Other)),
        }
    }

    /// Parse a line from the monitor hook
    ///
    /// Returns `None` for lines that are not part of the monitor protocol.
    pub fn parse_monitor_line(&self, line: &str) -> Option<AdapterEvent> {
        let line = line.trim();

        if let Some(captures) = self.dropped_pattern.captures(line) {
            let reason = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            let code = self
                .classify_line(reason)
                .unwrap_or(ErrorState::GenericError);
            return Some(AdapterEvent::Dropped(code));
        }

        if let Some(captures) = self.network_pattern.captures(line) {
            let value = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            return Some(AdapterEvent::NetworkChanged(self.parse_network(value)));
        }

        None
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}
