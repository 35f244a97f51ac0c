//! Group configuration, defaults and validation.
//!
//! The host hands the group configuration over as a JSON object. Connector
//! settings for the operator CLI are layered via `ortho-config` from files and
//! `FLEETING_CONNECTOR_*` environment variables.

use std::ffi::OsString;
use std::fmt;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::identity::{GROUP_NAME_PATTERN, is_valid_group_name};
use crate::settings::{ConnectorSettings, Protocol};

/// Network used when none is configured.
pub const DEFAULT_NETWORK: &str = "public";

/// Smallest root volume cloudscale.ch accepts, in GB.
pub const MIN_VOLUME_SIZE_GB: u32 = 10;

/// Zones servers may be placed in.
pub const SUPPORTED_ZONES: [&str; 2] = ["rma1", "lpg1"];

/// Static configuration of one instance group.
///
/// Missing JSON fields decode to empty values so that [`Self::validate`]
/// reports them alongside every other problem.
#[derive(Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct GroupConfig {
    /// Group name; also the ownership tag value and server name prefix.
    pub group: String,
    /// cloudscale.ch API token.
    pub api_token: String,
    /// Zone slug; empty lets the provider choose.
    pub zone: String,
    /// Flavor slug (for example `flex-4-2`).
    pub flavor: String,
    /// Image slug (for example `ubuntu-24.04`).
    pub image: String,
    /// Network UUID, or `public`.
    pub network: String,
    /// Cloud-init payload passed through untouched.
    pub user_data: String,
    /// Root volume size in GB.
    pub volume_size_gb: u32,
}

impl fmt::Debug for GroupConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GroupConfig")
            .field("group", &self.group)
            .field("api_token", &"<redacted>")
            .field("zone", &self.zone)
            .field("flavor", &self.flavor)
            .field("image", &self.image)
            .field("network", &self.network)
            .field("volume_size_gb", &self.volume_size_gb)
            .finish_non_exhaustive()
    }
}

impl GroupConfig {
    /// Parses the JSON object supplied by the host.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Json`] when the payload is not a valid
    /// configuration object.
    pub fn from_json(payload: &str) -> Result<Self, ConfigLoadError> {
        serde_json::from_str(payload).map_err(|err| ConfigLoadError::Json(err.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::FileRead`] when the file cannot be read and
    /// [`ConfigLoadError::Json`] when it does not parse.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigLoadError> {
        let contents = read_file_ambient(path).map_err(|message| ConfigLoadError::FileRead {
            path: path.to_string(),
            message,
        })?;
        let payload = String::from_utf8(contents).map_err(|err| ConfigLoadError::FileRead {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::from_json(&payload)
    }

    /// Fills unset fields with their defaults.
    pub fn apply_defaults(&mut self) {
        if self.network.is_empty() {
            DEFAULT_NETWORK.clone_into(&mut self.network);
        }
    }

    /// Checks the configuration together with the connector settings.
    ///
    /// Every rule is evaluated; the error lists each violation found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrors`] when at least one rule is violated.
    pub fn validate(&self, settings: &ConnectorSettings) -> Result<(), ConfigErrors> {
        let mut violations = Vec::new();

        let required = [
            ("api_token", &self.api_token),
            ("group", &self.group),
            ("flavor", &self.flavor),
            ("image", &self.image),
        ];
        for (field, value) in required {
            if value.is_empty() {
                violations.push(ConfigViolation::MissingField { field });
            }
        }

        if !is_valid_group_name(&self.group) {
            violations.push(ConfigViolation::InvalidGroupName {
                name: self.group.clone(),
            });
        }

        if !self.zone.is_empty() && !SUPPORTED_ZONES.contains(&self.zone.as_str()) {
            violations.push(ConfigViolation::UnsupportedZone {
                zone: self.zone.clone(),
            });
        }

        if self.volume_size_gb < MIN_VOLUME_SIZE_GB {
            violations.push(ConfigViolation::VolumeTooSmall {
                size: self.volume_size_gb,
            });
        }

        let protocol = settings.protocol();
        if protocol != Protocol::Ssh {
            violations.push(ConfigViolation::UnsupportedProtocol { protocol });
        }

        if settings.use_static_credentials && settings.key.is_none() {
            violations.push(ConfigViolation::MissingStaticKey);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors(violations))
        }
    }
}

/// A single configuration rule violation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigViolation {
    /// A required field is empty.
    #[error("plugin_config: {field}: required field missing")]
    MissingField {
        /// Field name as it appears in the JSON object.
        field: &'static str,
    },
    /// The group name does not match [`GROUP_NAME_PATTERN`].
    #[error(
        "plugin_config: group name {name:?} must match {pattern}",
        pattern = GROUP_NAME_PATTERN
    )]
    InvalidGroupName {
        /// Offending group name.
        name: String,
    },
    /// The zone is not one of [`SUPPORTED_ZONES`].
    #[error("plugin_config: zone {zone} should be rma1 or lpg1")]
    UnsupportedZone {
        /// Offending zone slug.
        zone: String,
    },
    /// The root volume is smaller than [`MIN_VOLUME_SIZE_GB`].
    #[error(
        "plugin_config: volume_size_gb must be >= {min} (got {size})",
        min = MIN_VOLUME_SIZE_GB
    )]
    VolumeTooSmall {
        /// Configured size in GB.
        size: u32,
    },
    /// The host asked for a protocol other than SSH.
    #[error("connector_config: {protocol} is not supported")]
    UnsupportedProtocol {
        /// Rejected protocol.
        protocol: Protocol,
    },
    /// Static credentials were requested without a key.
    #[error("connector_config: use_static_credentials enabled but no key set")]
    MissingStaticKey,
}

/// Every violation found by one validation pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigErrors(Vec<ConfigViolation>);

impl ConfigErrors {
    /// Returns the violations in rule order.
    #[must_use]
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.0
    }

    /// Returns the number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for violation in &self.0 {
            if !first {
                formatter.write_str("; ")?;
            }
            first = false;
            write!(formatter, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

impl IntoIterator for ConfigErrors {
    type Item = ConfigViolation;
    type IntoIter = std::vec::IntoIter<ConfigViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Connector settings layered from configuration files and environment
/// variables for the operator CLI.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "FLEETING_CONNECTOR")]
pub struct ConnectorConfig {
    /// Connection protocol (`ssh` or `winrm`). Defaults to SSH.
    pub protocol: Option<String>,
    /// Fallback login name. Defaults to `root`.
    pub username: Option<String>,
    /// Require the key at `key_path` instead of generating one.
    #[ortho_config(default = false)]
    pub use_static_credentials: bool,
    /// Path to an OpenSSH private key.
    pub key_path: Option<String>,
}

impl ConnectorConfig {
    /// Loads connector configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigLoadError> {
        Self::load_from_iter([OsString::from(crate::version::PLUGIN_NAME)])
            .map_err(|err| ConfigLoadError::Parse(err.to_string()))
    }

    /// Resolves the layered values into host-style connector settings,
    /// reading the key file when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Protocol`] for unknown protocol names and
    /// [`ConfigLoadError::FileRead`] when the key file cannot be read.
    pub fn into_settings(self) -> Result<ConnectorSettings, ConfigLoadError> {
        let protocol = self
            .protocol
            .as_deref()
            .map(str::parse::<Protocol>)
            .transpose()
            .map_err(|err| ConfigLoadError::Protocol(err.0))?;

        let key = self
            .key_path
            .as_deref()
            .map(|path| {
                read_file_ambient(Utf8Path::new(path)).map_err(|message| {
                    ConfigLoadError::FileRead {
                        path: path.to_owned(),
                        message,
                    }
                })
            })
            .transpose()?;

        Ok(ConnectorSettings {
            protocol,
            username: self.username.unwrap_or_default(),
            use_static_credentials: self.use_static_credentials,
            key,
        })
    }
}

/// Errors raised while loading configuration sources.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigLoadError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the group configuration JSON is malformed.
    #[error("invalid group configuration JSON: {0}")]
    Json(String),
    /// Raised when the configured protocol name is unknown.
    #[error("unknown connector protocol: {0}")]
    Protocol(String),
    /// Raised when a referenced file cannot be read.
    #[error("failed to read `{path}`: {message}")]
    FileRead {
        /// Path as configured.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigLoadError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

pub(crate) fn open_parent_dir(path: &Utf8Path) -> Result<(Dir, &Utf8Path), String> {
    let (dir_path, file_path) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(file_name)) if !parent.as_str().is_empty() => {
            (parent, Utf8Path::new(file_name))
        }
        _ => (Utf8Path::new("."), path),
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    Ok((dir, file_path))
}

fn read_file_ambient(path: &Utf8Path) -> Result<Vec<u8>, String> {
    let (dir, file_path) = open_parent_dir(path)?;
    dir.read(file_path).map_err(|err| err.to_string())
}
