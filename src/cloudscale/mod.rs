//! cloudscale.ch implementation of the [`Compute`] contract.

mod error;
mod wait;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{ClientBuilder, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use uuid::Uuid;

use crate::compute::{Compute, ComputeFuture, Server, ServerRequest, TagMap};

pub use error::CloudscaleError;

/// Public API endpoint.
pub const API_BASE: &str = "https://api.cloudscale.ch/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

static HTTP_CLIENT: LazyLock<reqwest::Client> =
    LazyLock::new(|| http_client(reqwest::Client::builder().timeout(HTTP_TIMEOUT)));

fn http_client(builder: ClientBuilder) -> reqwest::Client {
    builder.build().unwrap_or_else(|err| {
        error!(
            error = %err,
            timeout_secs = HTTP_TIMEOUT.as_secs(),
            "failed to build HTTP client, requests run without a timeout"
        );
        reqwest::Client::new()
    })
}

#[derive(Deserialize)]
struct ApiErrorBody {
    detail: String,
}

/// HTTP client for the cloudscale.ch servers API, bound to one token.
#[derive(Clone)]
pub struct CloudscaleClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl fmt::Debug for CloudscaleClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CloudscaleClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl CloudscaleClient {
    /// Creates a client for the public API.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    /// Creates a client for an alternative endpoint.
    #[must_use]
    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        Self {
            http: HTTP_CLIENT.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        }
    }

    /// Overrides how often and how long [`Compute::wait_until_running`]
    /// polls.
    #[must_use]
    pub const fn with_polling(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    /// Returns the endpoint the client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, CloudscaleError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let message = serde_json::from_slice::<ApiErrorBody>(&body).map_or_else(
            |_| String::from_utf8_lossy(&body).trim().to_owned(),
            |parsed| parsed.detail,
        );
        Err(CloudscaleError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, CloudscaleError> {
        let body = self.send(builder).await?;
        serde_json::from_slice(&body).map_err(|err| CloudscaleError::Decode {
            message: err.to_string(),
        })
    }

    pub(crate) async fn fetch_server(&self, id: &str) -> Result<Server, CloudscaleError> {
        let path = server_path(id)?;
        self.send_json(self.request(Method::GET, &path)).await
    }
}

/// Builds the resource path for one server. Only UUIDs are accepted so that
/// an identifier can never address anything but a server.
fn server_path(id: &str) -> Result<String, CloudscaleError> {
    Uuid::try_parse(id)
        .map(|uuid| format!("/servers/{}", uuid.hyphenated()))
        .map_err(|_| CloudscaleError::InvalidServerId { id: id.to_owned() })
}

fn tag_query(tags: &TagMap) -> Vec<(String, String)> {
    tags.iter()
        .map(|(key, value)| (format!("tag:{key}"), value.clone()))
        .collect()
}

impl Compute for CloudscaleClient {
    type Error = CloudscaleError;

    fn list_servers<'a>(
        &'a self,
        tags: Option<&'a TagMap>,
    ) -> ComputeFuture<'a, Vec<Server>, Self::Error> {
        Box::pin(async move {
            let mut builder = self.request(Method::GET, "/servers");
            if let Some(filter) = tags {
                builder = builder.query(&tag_query(filter));
            }
            let servers: Vec<Server> = self.send_json(builder).await?;
            debug!(count = servers.len(), "listed servers");
            Ok(servers)
        })
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(self.fetch_server(id))
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(async move {
            let server: Server = self
                .send_json(self.request(Method::POST, "/servers").json(request))
                .await?;
            debug!(uuid = %server.uuid, name = %server.name, "server requested");
            Ok(server)
        })
    }

    fn wait_until_running<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(self.poll_until_running(id))
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let path = server_path(id)?;
            self.send(self.request(Method::DELETE, &path)).await?;
            debug!(uuid = %id, "server deleted");
            Ok(())
        })
    }
}
