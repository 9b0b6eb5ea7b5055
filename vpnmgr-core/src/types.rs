//! Type definitions and wrappers for secure data handling
//!
//! This module provides the options bag passed through lifecycle commands
//! and type-safe wrappers for sensitive provisioning data using the
//! secrecy crate to prevent accidental exposure in logs or debug output.

use crate::error::ProfileError;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Substrings that mark an option key as sensitive in debug output
const SENSITIVE_KEY_MARKERS: [&str; 3] = ["password", "secret", "certificate"];

/// Opaque configuration bag handed to the platform adapter
///
/// Recognized keys are left to the adapter (server address, credentials,
/// network allowlist, ...). The session core never interprets them.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandOptions(Map<String, Value>);

impl CommandOptions {
    /// Create an empty options bag
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build options from an arbitrary JSON value
    ///
    /// `null` yields an empty bag; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, ProfileError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ProfileError::InvalidType {
                field: "options".to_string(),
            }),
        }
    }

    /// Insert a value, returning the bag for chaining
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Look up a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a string value
    ///
    /// Missing keys and explicit `null` both yield `Ok(None)`.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ProfileError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ProfileError::InvalidType {
                field: key.to_string(),
            }),
        }
    }

    /// Look up a string value that must be present and non-empty
    pub fn require_str(&self, key: &str) -> Result<&str, ProfileError> {
        match self.get_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ProfileError::MissingField {
                field: key.to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Convert back into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<BTreeMap<String, String>> for CommandOptions {
    fn from(table: BTreeMap<String, String>) -> Self {
        Self(
            table
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }
}

impl std::fmt::Debug for CommandOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            let lower = key.to_ascii_lowercase();
            if SENSITIVE_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
                map.entry(key, &"[REDACTED]");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Wrapper for the VPN account password
///
/// Never logged; only exposed when handed to the platform adapter.
#[derive(Clone, Debug)]
pub struct VpnPassword(Secret<String>);

impl VpnPassword {
    pub fn new(password: String) -> Self {
        Self(Secret::new(password))
    }

    /// Expose the password value (use with caution!)
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Wrapper for the password protecting a client certificate bundle
#[derive(Clone, Debug)]
pub struct CertificatePassword(Secret<String>);

impl CertificatePassword {
    pub fn new(password: String) -> Self {
        Self(Secret::new(password))
    }

    /// Expose the password value (use with caution!)
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}
