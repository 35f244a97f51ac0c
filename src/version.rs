//! Build metadata reported to the host controller.
//!
//! Release pipelines stamp `FLEETING_VERSION`, `FLEETING_REVISION`,
//! `FLEETING_REFERENCE` and `FLEETING_BUILT_AT` into the environment at
//! compile time. Local builds fall back to the crate version and `HEAD`.

use std::fmt;

/// Name the plugin reports to the host and appends to injected SSH keys.
pub const PLUGIN_NAME: &str = "fleeting-plugin-cloudscale";

/// Immutable build metadata handed to an instance group at construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionInfo {
    /// Plugin name.
    pub name: String,
    /// Release version.
    pub version: String,
    /// Source revision the binary was built from.
    pub revision: String,
    /// Branch or tag the binary was built from.
    pub reference: String,
    /// Build timestamp.
    pub built_at: String,
}

impl VersionInfo {
    /// Captures the metadata baked in at compile time.
    #[must_use]
    pub fn from_build_env() -> Self {
        Self {
            name: PLUGIN_NAME.to_owned(),
            version: option_env!("FLEETING_VERSION")
                .unwrap_or(env!("CARGO_PKG_VERSION"))
                .to_owned(),
            revision: option_env!("FLEETING_REVISION").unwrap_or("HEAD").to_owned(),
            reference: option_env!("FLEETING_REFERENCE")
                .unwrap_or("HEAD")
                .to_owned(),
            built_at: option_env!("FLEETING_BUILT_AT").unwrap_or("now").to_owned(),
        }
    }

    /// Renders revision, reference and build time as one line.
    #[must_use]
    pub fn build_info(&self) -> String {
        format!(
            "sha={}; ref={}; built={}",
            self.revision, self.reference, self.built_at
        )
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} ({})",
            self.name,
            self.version,
            self.build_info()
        )
    }
}
