//! VPN profile carried in provisioning options
//!
//! A profile names the gateway and the account used to authenticate
//! against it, optionally with a base64 PKCS#12 client certificate.

use crate::error::ProfileError;
use crate::types::{CertificatePassword, CommandOptions, VpnPassword};
use data_encoding::BASE64;

/// Option keys understood by [`VpnProfile::from_options`]
pub mod keys {
    pub const NAME: &str = "name";
    pub const HOST: &str = "vpnHost";
    pub const USERNAME: &str = "vpnUsername";
    pub const PASSWORD: &str = "vpnPassword";
    pub const CERTIFICATE: &str = "certificate";
    pub const CERTIFICATE_PASSWORD: &str = "certificatePassword";
}

/// Client certificate bundle
#[derive(Clone, Debug)]
pub struct CertificateBundle {
    /// Base64 text as supplied by the caller
    encoded: String,
    len: usize,
    password: CertificatePassword,
}

impl CertificateBundle {
    /// Validate a base64 bundle
    pub fn new(encoded: &str, password: CertificatePassword) -> Result<Self, ProfileError> {
        let compact: String = encoded.split_whitespace().collect();
        let decoded = BASE64
            .decode(compact.as_bytes())
            .map_err(|_| ProfileError::InvalidCertificate)?;
        if decoded.is_empty() {
            return Err(ProfileError::InvalidCertificate);
        }
        Ok(Self {
            encoded: compact,
            len: decoded.len(),
            password,
        })
    }

    /// Bundle as base64 without whitespace
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Size of the decoded bundle in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn password(&self) -> &CertificatePassword {
        &self.password
    }
}

/// A gateway plus the credentials for it
#[derive(Clone, Debug)]
pub struct VpnProfile {
    pub name: String,
    pub gateway: String,
    pub username: String,
    pub password: VpnPassword,
    pub certificate: Option<CertificateBundle>,
}

impl VpnProfile {
    /// Read a profile from a provisioning options bag
    ///
    /// `vpnHost`, `vpnUsername` and `vpnPassword` are required. `name`
    /// defaults to the host. A `certificate` requires `certificatePassword`.
    pub fn from_options(options: &CommandOptions) -> Result<Self, ProfileError> {
        let gateway = options.require_str(keys::HOST)?.to_string();
        let username = options.require_str(keys::USERNAME)?.to_string();
        let password = VpnPassword::new(options.require_str(keys::PASSWORD)?.to_string());
        let name = options
            .get_str(keys::NAME)?
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| gateway.clone());

        let certificate = match options.get_str(keys::CERTIFICATE)? {
            Some(encoded) if !encoded.is_empty() => {
                let cert_password = options
                    .get_str(keys::CERTIFICATE_PASSWORD)?
                    .ok_or(ProfileError::MissingCertificatePassword)?;
                Some(CertificateBundle::new(
                    encoded,
                    CertificatePassword::new(cert_password.to_string()),
                )?)
            }
            _ => None,
        };

        Ok(Self {
            name,
            gateway,
            username,
            password,
            certificate,
        })
    }

    /// Identity the client certificate is stored under
    pub fn alias(&self) -> String {
        format!("{}@{}", self.username, self.gateway)
    }

    /// Environment handed to adapter hooks
    ///
    /// Includes secrets; only pass this to a child process environment.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("VPN_NAME".to_string(), self.name.clone()),
            ("VPN_GATEWAY".to_string(), self.gateway.clone()),
            ("VPN_USERNAME".to_string(), self.username.clone()),
            ("VPN_PASSWORD".to_string(), self.password.expose().to_string()),
            ("VPN_ALIAS".to_string(), self.alias()),
        ];
        if let Some(cert) = &self.certificate {
            env.push(("VPN_CERTIFICATE".to_string(), cert.encoded().to_string()));
            env.push((
                "VPN_CERTIFICATE_PASSWORD".to_string(),
                cert.password().expose().to_string(),
            ));
        }
        env
    }
}

impl std::fmt::Display for VpnProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.alias())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options() -> CommandOptions {
        CommandOptions::new()
            .with(keys::HOST, "vpn.example.com")
            .with(keys::USERNAME, "alice")
            .with(keys::PASSWORD, "hunter2")
    }

    #[test]
    fn test_minimal_profile() {
        let profile = VpnProfile::from_options(&base_options()).unwrap();
        assert_eq!(profile.name, "vpn.example.com");
        assert_eq!(profile.alias(), "alice@vpn.example.com");
        assert!(profile.certificate.is_none());
        assert_eq!(profile.to_string(), "vpn.example.com (alice@vpn.example.com)");
    }

    #[test]
    fn test_missing_fields() {
        for key in [keys::HOST, keys::USERNAME, keys::PASSWORD] {
            let mut value = base_options().into_value();
            value.as_object_mut().unwrap().remove(key);
            let options = CommandOptions::from_value(value).unwrap();
            assert_eq!(
                VpnProfile::from_options(&options).unwrap_err(),
                ProfileError::MissingField {
                    field: key.to_string()
                }
            );
        }
    }

    #[test]
    fn test_certificate_bundle() {
        let options = base_options()
            .with(keys::NAME, "work")
            .with(keys::CERTIFICATE, "AAEC\nAwQF")
            .with(keys::CERTIFICATE_PASSWORD, "pkcs12-pass");

        let profile = VpnProfile::from_options(&options).unwrap();
        assert_eq!(profile.name, "work");
        let cert = profile.certificate.as_ref().unwrap();
        assert_eq!(cert.encoded(), "AAECAwQF");
        assert_eq!(cert.len(), 6);

        let env = profile.to_env();
        assert!(env.contains(&("VPN_CERTIFICATE".to_string(), "AAECAwQF".to_string())));
        assert!(env.contains(&("VPN_ALIAS".to_string(), "alice@vpn.example.com".to_string())));
    }

    #[test]
    fn test_certificate_errors() {
        let no_password = base_options().with(keys::CERTIFICATE, "AAECAwQF");
        assert_eq!(
            VpnProfile::from_options(&no_password).unwrap_err(),
            ProfileError::MissingCertificatePassword
        );

        let garbage = base_options()
            .with(keys::CERTIFICATE, "not base64!")
            .with(keys::CERTIFICATE_PASSWORD, "x");
        assert_eq!(
            VpnProfile::from_options(&garbage).unwrap_err(),
            ProfileError::InvalidCertificate
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let profile = VpnProfile::from_options(&base_options()).unwrap();
        assert!(!format!("{:?}", profile).contains("hunter2"));
    }
}
