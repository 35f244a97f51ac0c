//! Connection settings supplied by the host controller.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Login name used when neither the host nor the image provides one.
pub const DEFAULT_USERNAME: &str = "root";

/// Protocol the host uses to reach instances.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Secure shell.
    Ssh,
    /// Windows remote management.
    WinRm,
}

impl fmt::Display for Protocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Ssh => "ssh",
            Self::WinRm => "winrm",
        })
    }
}

/// Raised when a protocol name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown connector protocol: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Self::Ssh),
            "winrm" => Ok(Self::WinRm),
            _ => Err(UnknownProtocol(value.to_owned())),
        }
    }
}

/// Connector settings handed over by the host at initialisation.
///
/// An empty `username` and an unset `protocol` mean "use the default"; see
/// [`ConnectorSettings::apply_defaults`].
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ConnectorSettings {
    /// Requested connection protocol.
    pub protocol: Option<Protocol>,
    /// Fallback login name.
    pub username: String,
    /// Whether the host insists on its own key material.
    pub use_static_credentials: bool,
    /// Private key in OpenSSH PEM form. Generated during init when absent.
    pub key: Option<Vec<u8>>,
}

impl ConnectorSettings {
    /// Fills unset fields with their defaults.
    pub fn apply_defaults(&mut self) {
        self.protocol.get_or_insert(Protocol::Ssh);
        if self.username.is_empty() {
            DEFAULT_USERNAME.clone_into(&mut self.username);
        }
    }

    /// Returns the protocol, treating an unset value as SSH.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or(Protocol::Ssh)
    }
}

impl fmt::Debug for ConnectorSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectorSettings")
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("use_static_credentials", &self.use_static_credentials)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
