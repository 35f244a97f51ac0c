//! Instance-group provider for cloudscale.ch servers.
//!
//! The crate exposes the host contract ([`Provider`]) implemented by
//! [`InstanceGroup`], which turns "I want N instances tagged as mine" into
//! create, list and delete calls against a [`Compute`] client while never
//! deleting a server it cannot prove it owns. [`CloudscaleClient`] is the
//! HTTP implementation of [`Compute`].

pub mod cloudscale;
pub mod compute;
pub mod config;
pub mod credentials;
pub mod group;
pub mod guard;
pub mod identity;
pub mod provider;
pub mod settings;
pub mod test_support;
pub mod version;

pub use cloudscale::{CloudscaleClient, CloudscaleError};
pub use compute::{Compute, Server, ServerRequest, TagMap};
pub use config::{ConfigErrors, ConfigLoadError, ConfigViolation, ConnectorConfig, GroupConfig};
pub use credentials::CredentialError;
pub use group::{GroupError, InstanceGroup, ItemError, ItemFailure, RemoteError, Stage};
pub use guard::{SafetyViolation, ensure_safe_to_delete};
pub use identity::{Identity, OWNERSHIP_TAG_KEY};
pub use provider::{
    BatchErrors, BatchOutcome, ConnectInfo, Provider, ProviderInfo, State, StateReporter,
};
pub use settings::{ConnectorSettings, Protocol};
pub use version::{PLUGIN_NAME, VersionInfo};
