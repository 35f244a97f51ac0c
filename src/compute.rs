//! Remote compute contract consumed by the instance group.
//!
//! The types mirror the cloudscale.ch server resource closely enough to be
//! decoded straight from the API, while the [`Compute`] trait lets the engine
//! run against an in-memory double in tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Tags attached to a server.
pub type TagMap = BTreeMap<String, String>;

/// Status reported while a server is powered on.
pub const STATUS_RUNNING: &str = "running";
/// Status reported once a server is powered off.
pub const STATUS_STOPPED: &str = "stopped";
/// Status reported while a server transitions between states.
pub const STATUS_CHANGING: &str = "changing";

/// Read-only view of a remote server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct Server {
    /// Provider-assigned identifier.
    pub uuid: String,
    /// Name chosen at creation time.
    pub name: String,
    /// Provider lifecycle status (for example `running`).
    #[serde(default)]
    pub status: String,
    /// Tags chosen at creation time.
    #[serde(default)]
    pub tags: TagMap,
    /// Image the server booted from.
    #[serde(default)]
    pub image: ServerImage,
    /// Network interfaces in provider order.
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// Image details embedded in a server record.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct ServerImage {
    /// Image slug (for example `ubuntu-24.04`).
    #[serde(default)]
    pub slug: String,
    /// Human readable image name.
    #[serde(default)]
    pub name: String,
    /// Operating system family.
    #[serde(default)]
    pub operating_system: String,
    /// Login name baked into the image, when it has one.
    #[serde(default)]
    pub default_username: Option<String>,
}

/// Network interface attached to a server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct Interface {
    /// Interface kind (`public` or `private`).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Addresses in provider order.
    #[serde(default)]
    pub addresses: Vec<Address>,
}

/// Address bound to an interface.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct Address {
    /// IP version (4 or 6).
    #[serde(default)]
    pub version: u8,
    /// Address in textual form.
    pub address: String,
}

/// Parameters for creating a server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct ServerRequest {
    /// Server name.
    pub name: String,
    /// Zone slug; omitted to let the provider choose.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    /// Flavor slug describing CPU and memory.
    pub flavor: String,
    /// Image slug.
    pub image: String,
    /// Authorized-key lines injected at boot.
    pub ssh_keys: Vec<String>,
    /// Root volume size in GB.
    pub volume_size_gb: u32,
    /// Opaque cloud-init payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    /// Interfaces to attach.
    pub interfaces: Vec<InterfaceRequest>,
    /// Tags stamped on the new server.
    pub tags: TagMap,
}

/// Interface requested for a new server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct InterfaceRequest {
    /// Network UUID, or `public` for the default public network.
    pub network: String,
}

/// Future returned by compute operations.
pub type ComputeFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Server operations the instance group needs from a provider.
pub trait Compute: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists servers, restricted to those carrying every tag in `tags` when
    /// a filter is given.
    fn list_servers<'a>(
        &'a self,
        tags: Option<&'a TagMap>,
    ) -> ComputeFuture<'a, Vec<Server>, Self::Error>;

    /// Fetches a single server by identifier.
    fn get_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error>;

    /// Requests a new server and returns it as first reported.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ComputeFuture<'a, Server, Self::Error>;

    /// Blocks until the server reports `running`.
    fn wait_until_running<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error>;

    /// Deletes a server.
    fn delete_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, (), Self::Error>;
}
