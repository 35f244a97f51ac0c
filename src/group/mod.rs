//! Instance-group reconciliation engine.
//!
//! [`InstanceGroup`] implements the host contract on top of a [`Compute`]
//! client. Every server it creates carries the group's ownership tags and a
//! generated name; nothing is deleted unless a freshly fetched copy of the
//! server passes the deletion guard. Server state is never cached between
//! calls.

mod error;

use std::error::Error as StdError;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::cloudscale::CloudscaleClient;
use crate::compute::{Compute, InterfaceRequest, ServerRequest, TagMap};
use crate::config::GroupConfig;
use crate::credentials;
use crate::guard::ensure_safe_to_delete;
use crate::identity::Identity;
use crate::provider::{
    BatchErrors, BatchOutcome, ConnectInfo, Provider, ProviderFuture, ProviderInfo, State,
    StateReporter, state_for_status,
};
use crate::settings::ConnectorSettings;
use crate::version::{PLUGIN_NAME, VersionInfo};

pub use error::{GroupError, ItemError, ItemFailure, RemoteError, Stage};

/// API token that skips the connectivity check during `init`.
pub const TEST_TOKEN: &str = "test-token";

/// Architecture reported for every instance.
pub const ARCH: &str = "amd64";

const PROVIDER_NAME: &str = "cloudscale";

type Connector<C> = Box<dyn Fn(&str) -> C + Send + Sync>;

struct Session<C> {
    client: C,
    settings: ConnectorSettings,
    identity: Identity,
    span: Span,
}

/// Instance group backed by a [`Compute`] client.
///
/// The group is inert until [`Provider::init`] succeeds. A failed `init`
/// leaves no partial session behind.
pub struct InstanceGroup<C: Compute + 'static> {
    config: GroupConfig,
    version: VersionInfo,
    connect: Connector<C>,
    session: Option<Session<C>>,
}

impl InstanceGroup<CloudscaleClient> {
    /// Creates a group that talks to the public cloudscale.ch API.
    #[must_use]
    pub fn new(config: GroupConfig, version: VersionInfo) -> Self {
        Self::with_connector(config, version, CloudscaleClient::new)
    }
}

impl<C: Compute + 'static> InstanceGroup<C> {
    /// Creates a group whose client is built by `connect` from the API token
    /// during `init`.
    #[must_use]
    pub fn with_connector<F>(config: GroupConfig, version: VersionInfo, connect: F) -> Self
    where
        F: Fn(&str) -> C + Send + Sync + 'static,
    {
        Self {
            config,
            version,
            connect: Box::new(connect),
            session: None,
        }
    }

    /// Returns the configuration; defaults are applied once `init` succeeds.
    #[must_use]
    pub const fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Returns whether `init` has completed.
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the connector settings in effect, including generated keys.
    #[must_use]
    pub fn settings(&self) -> Option<&ConnectorSettings> {
        self.session.as_ref().map(|session| &session.settings)
    }

    fn session(&self) -> Result<&Session<C>, GroupError<C::Error>> {
        self.session.as_ref().ok_or(GroupError::NotInitialised)
    }

    async fn initialise(
        &mut self,
        cancel: &CancellationToken,
        config: GroupConfig,
        mut settings: ConnectorSettings,
        span: Span,
    ) -> Result<ProviderInfo, GroupError<C::Error>> {
        let client = (self.connect)(&config.api_token);

        if settings.key.is_none() {
            info!("generating SSH private key");
        }
        credentials::ensure_key(&mut settings)?;

        let identity = Identity::new(config.group.clone());
        if config.api_token == TEST_TOKEN {
            debug!("skipping connectivity check for test token");
        } else {
            let tags = identity.tag_map();
            remote(cancel, client.list_servers(Some(&tags)))
                .await
                .map_err(GroupError::Connectivity)?;
        }

        let info = ProviderInfo {
            id: provider_id(&config),
            max_size: usize::MAX,
            version: self.version.version.clone(),
            build_info: self.version.build_info(),
        };
        info!(id = %info.id, version = %info.version, "instance group initialised");

        self.config = config;
        self.session = Some(Session {
            client,
            settings,
            identity,
            span,
        });
        Ok(info)
    }

    fn server_request(&self, session: &Session<C>, ssh_key: &str, tags: TagMap) -> ServerRequest {
        ServerRequest {
            name: session.identity.server_name(),
            zone: self.config.zone.clone(),
            flavor: self.config.flavor.clone(),
            image: self.config.image.clone(),
            ssh_keys: vec![ssh_key.to_owned()],
            volume_size_gb: self.config.volume_size_gb,
            user_data: self.config.user_data.clone(),
            interfaces: vec![InterfaceRequest {
                network: self.config.network.clone(),
            }],
            tags,
        }
    }

    async fn report_states(
        session: &Session<C>,
        cancel: &CancellationToken,
        report: &mut StateReporter<'_>,
    ) -> Result<(), GroupError<C::Error>> {
        let tags = session.identity.tag_map();
        let servers = remote(cancel, session.client.list_servers(Some(&tags)))
            .await
            .map_err(GroupError::List)?;

        for server in &servers {
            let state = state_for_status(&server.status).unwrap_or_else(|| {
                error!(
                    uuid = %server.uuid,
                    name = %server.name,
                    status = %server.status,
                    "unexpected server status"
                );
                State::Unknown
            });
            report(&server.uuid, state);
        }
        Ok(())
    }

    async fn scale_up(
        &self,
        session: &Session<C>,
        cancel: &CancellationToken,
        delta: usize,
    ) -> Result<BatchOutcome<usize, ItemFailure<C::Error>>, GroupError<C::Error>> {
        let key = session.settings.key.as_deref().unwrap_or_default();
        let ssh_key = credentials::public_key(key)?;
        let tags = session.identity.tag_map();

        let mut succeeded = 0;
        let mut errors = BatchErrors::default();
        for _ in 0..delta {
            let request = self.server_request(session, &ssh_key, tags.clone());

            let created = match remote(cancel, session.client.create_server(&request)).await {
                Ok(server) => server,
                Err(err) => {
                    warn!(name = %request.name, error = %err, "failed to create server");
                    let stop = err.is_cancelled();
                    errors.push(ItemFailure::new(request.name, Stage::Create, err));
                    if stop {
                        break;
                    }
                    continue;
                }
            };
            info!(uuid = %created.uuid, name = %created.name, "server created");

            match remote(cancel, session.client.wait_until_running(&created.uuid)).await {
                Ok(_) => {
                    info!(uuid = %created.uuid, name = %created.name, "server running");
                    succeeded += 1;
                }
                Err(err) => {
                    warn!(uuid = %created.uuid, error = %err, "server did not reach running");
                    let stop = err.is_cancelled();
                    errors.push(ItemFailure::new(created.name, Stage::Wait, err));
                    if stop {
                        break;
                    }
                }
            }
        }

        Ok(BatchOutcome { succeeded, errors })
    }

    async fn scale_down(
        session: &Session<C>,
        cancel: &CancellationToken,
        ids: &[String],
    ) -> BatchOutcome<Vec<String>, ItemFailure<C::Error>> {
        let mut succeeded = Vec::new();
        let mut errors = BatchErrors::default();

        for id in ids {
            let server = match remote(cancel, session.client.get_server(id)).await {
                Ok(server) => server,
                Err(err) => {
                    warn!(uuid = %id, error = %err, "failed to fetch server before deleting");
                    let stop = err.is_cancelled();
                    errors.push(ItemFailure::new(id.as_str(), Stage::Fetch, err));
                    if stop {
                        break;
                    }
                    continue;
                }
            };

            if let Err(violation) = ensure_safe_to_delete(&session.identity, &server) {
                warn!(
                    uuid = %id,
                    name = %server.name,
                    reason = %violation,
                    "refusing to delete server not owned by this group"
                );
                errors.push(ItemFailure::new(id.as_str(), Stage::Guard, violation));
                continue;
            }

            match remote(cancel, session.client.delete_server(id)).await {
                Ok(()) => {
                    info!(uuid = %id, name = %server.name, "server deleted");
                    succeeded.push(id.clone());
                }
                Err(err) => {
                    warn!(uuid = %id, error = %err, "failed to delete server");
                    let stop = err.is_cancelled();
                    errors.push(ItemFailure::new(id.as_str(), Stage::Delete, err));
                    if stop {
                        break;
                    }
                }
            }
        }

        BatchOutcome { succeeded, errors }
    }

    async fn describe(
        session: &Session<C>,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<ConnectInfo, GroupError<C::Error>> {
        let server = remote(cancel, session.client.get_server(id))
            .await
            .map_err(|source| GroupError::Fetch {
                id: id.to_owned(),
                source,
            })?;

        let external_addr = server
            .interfaces
            .first()
            .and_then(|interface| interface.addresses.first())
            .map(|address| address.address.clone())
            .ok_or_else(|| GroupError::NoAddress { id: id.to_owned() })?;

        let username = server
            .image
            .default_username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| session.settings.username.clone());

        Ok(ConnectInfo {
            id: server.uuid,
            os: server.image.operating_system,
            arch: ARCH.to_owned(),
            protocol: session.settings.protocol(),
            username,
            key: session.settings.key.clone().unwrap_or_default(),
            external_addr,
        })
    }
}

impl<C: Compute + 'static> Provider for InstanceGroup<C> {
    type Error = GroupError<C::Error>;
    type Failure = ItemFailure<C::Error>;

    fn init<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
        settings: ConnectorSettings,
    ) -> ProviderFuture<'a, ProviderInfo, Self::Error> {
        Box::pin(async move {
            let mut config = self.config.clone();
            config.apply_defaults();
            let mut effective = settings;
            effective.apply_defaults();
            config.validate(&effective)?;

            let span = info_span!(
                "fleeting-plugin-cloudscale",
                group = %config.group,
                zone = %config.zone
            );
            self.initialise(cancel, config, effective, span.clone())
                .instrument(span)
                .await
        })
    }

    fn update<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        report: &'a mut StateReporter<'_>,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let session = self.session()?;
            Self::report_states(session, cancel, report)
                .instrument(session.span.clone())
                .await
        })
    }

    fn increase<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        delta: usize,
    ) -> ProviderFuture<'a, BatchOutcome<usize, Self::Failure>, Self::Error> {
        Box::pin(async move {
            let session = self.session()?;
            self.scale_up(session, cancel, delta)
                .instrument(session.span.clone())
                .await
        })
    }

    fn decrease<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        ids: &'a [String],
    ) -> ProviderFuture<'a, BatchOutcome<Vec<String>, Self::Failure>, Self::Error> {
        Box::pin(async move {
            let session = self.session()?;
            Ok(Self::scale_down(session, cancel, ids)
                .instrument(session.span.clone())
                .await)
        })
    }

    fn connect_info<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        id: &'a str,
    ) -> ProviderFuture<'a, ConnectInfo, Self::Error> {
        Box::pin(async move {
            let session = self.session()?;
            Self::describe(session, cancel, id)
                .instrument(session.span.clone())
                .await
        })
    }

    fn shutdown<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            debug!(plugin = PLUGIN_NAME, "shutdown requested");
            Ok(())
        })
    }
}

/// Composes the provider identifier from provider name, group, zone (when
/// set) and flavor.
#[must_use]
pub fn provider_id(config: &GroupConfig) -> String {
    [
        PROVIDER_NAME,
        config.group.as_str(),
        config.zone.as_str(),
        config.flavor.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("/")
}

/// Races `call` against `cancel`; cancellation wins when both are ready.
async fn remote<T, E, F>(cancel: &CancellationToken, call: F) -> Result<T, RemoteError<E>>
where
    E: StdError + 'static,
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = call => result.map_err(RemoteError::Provider),
    }
}
