//! Test support utilities shared across unit and integration tests.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compute::{
    Address, Compute, ComputeFuture, Interface, STATUS_CHANGING, STATUS_RUNNING, Server,
    ServerImage, ServerRequest, TagMap,
};

/// Operating system reported for servers minted by [`FakeCompute`].
pub const FAKE_OPERATING_SYSTEM: &str = "Ubuntu";

/// Errors returned by [`FakeCompute`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FakeComputeError {
    /// Raised when the requested server is not known.
    #[error("server {id} not found")]
    NotFound {
        /// Requested identifier.
        id: String,
    },
    /// Raised when an operation was scripted to fail.
    #[error("{operation} rejected: {detail}")]
    Rejected {
        /// Operation that failed.
        operation: &'static str,
        /// Scripted failure detail.
        detail: String,
    },
    /// Raised when listing was scripted to fail.
    #[error("server list unavailable")]
    ListUnavailable,
}

#[derive(Debug, Default)]
struct FakeState {
    servers: Vec<Server>,
    create_requests: Vec<ServerRequest>,
    get_calls: Vec<String>,
    delete_calls: Vec<String>,
    deleted_ids: Vec<String>,
    list_filters: Vec<Option<TagMap>>,
    failing_creates: BTreeSet<usize>,
    failing_waits: BTreeSet<usize>,
    failing_deletes: BTreeSet<String>,
    wait_attempts: usize,
    fail_list: bool,
    cancel_on_create: Option<(usize, CancellationToken)>,
    cancel_on_get: Option<(usize, CancellationToken)>,
}

fn cancel_at(hook: Option<&(usize, CancellationToken)>, attempt: usize) {
    if let Some((_, token)) = hook.filter(|(target, _)| *target == attempt) {
        token.cancel();
    }
}

/// In-memory [`Compute`] double with scriptable failures.
///
/// Calls take effect when their future is first polled, as with a real
/// client.
///
/// Clones share state, so a test can hand one clone to the group and keep
/// another to seed servers and inspect calls. Attempt numbers are 1-based
/// and count every call of that kind made through any clone.
#[derive(Clone, Debug, Default)]
pub struct FakeCompute {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCompute {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state)
    }

    /// Adds an existing server.
    pub fn insert_server(&self, server: Server) {
        self.with_state(|state| state.servers.push(server));
    }

    /// Makes the `attempt`-th create call fail.
    pub fn fail_create_attempt(&self, attempt: usize) {
        self.with_state(|state| state.failing_creates.insert(attempt));
    }

    /// Makes the `attempt`-th wait call fail.
    pub fn fail_wait_attempt(&self, attempt: usize) {
        self.with_state(|state| state.failing_waits.insert(attempt));
    }

    /// Makes deleting `id` fail.
    pub fn fail_delete(&self, id: &str) {
        self.with_state(|state| state.failing_deletes.insert(id.to_owned()));
    }

    /// Makes every list call fail.
    pub fn fail_list(&self) {
        self.with_state(|state| state.fail_list = true);
    }

    /// Cancels `token` while serving the `attempt`-th create call.
    pub fn cancel_on_create(&self, attempt: usize, token: CancellationToken) {
        self.with_state(|state| state.cancel_on_create = Some((attempt, token)));
    }

    /// Cancels `token` while serving the `attempt`-th get call.
    pub fn cancel_on_get(&self, attempt: usize, token: CancellationToken) {
        self.with_state(|state| state.cancel_on_get = Some((attempt, token)));
    }

    /// Returns every create request received.
    #[must_use]
    pub fn create_requests(&self) -> Vec<ServerRequest> {
        self.with_state(|state| state.create_requests.clone())
    }

    /// Returns identifiers passed to get calls.
    #[must_use]
    pub fn get_calls(&self) -> Vec<String> {
        self.with_state(|state| state.get_calls.clone())
    }

    /// Returns identifiers passed to delete calls, including failed ones.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.with_state(|state| state.delete_calls.clone())
    }

    /// Returns identifiers that were actually deleted.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.with_state(|state| state.deleted_ids.clone())
    }

    /// Returns the tag filter of every list call.
    #[must_use]
    pub fn list_filters(&self) -> Vec<Option<TagMap>> {
        self.with_state(|state| state.list_filters.clone())
    }

    /// Returns the servers currently known.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        self.with_state(|state| state.servers.clone())
    }

    fn lookup(state: &FakeState, id: &str) -> Result<Server, FakeComputeError> {
        state
            .servers
            .iter()
            .find(|server| server.uuid == id)
            .cloned()
            .ok_or_else(|| FakeComputeError::NotFound { id: id.to_owned() })
    }

    fn create(&self, request: &ServerRequest) -> Result<Server, FakeComputeError> {
        self.with_state(|state| {
            state.create_requests.push(request.clone());
            let attempt = state.create_requests.len();

            cancel_at(state.cancel_on_create.as_ref(), attempt);

            if state.failing_creates.contains(&attempt) {
                return Err(FakeComputeError::Rejected {
                    operation: "create",
                    detail: format!("attempt {attempt} scripted to fail"),
                });
            }

            let server = Server {
                uuid: Uuid::new_v4().to_string(),
                name: request.name.clone(),
                status: STATUS_CHANGING.to_owned(),
                tags: request.tags.clone(),
                image: ServerImage {
                    slug: request.image.clone(),
                    name: request.image.clone(),
                    operating_system: FAKE_OPERATING_SYSTEM.to_owned(),
                    default_username: None,
                },
                interfaces: vec![Interface {
                    kind: request
                        .interfaces
                        .first()
                        .map(|interface| interface.network.clone())
                        .unwrap_or_default(),
                    addresses: vec![Address {
                        version: 4,
                        address: format!("192.0.2.{attempt}"),
                    }],
                }],
            };
            state.servers.push(server.clone());
            Ok(server)
        })
    }

    fn wait(&self, id: &str) -> Result<Server, FakeComputeError> {
        self.with_state(|state| {
            state.wait_attempts += 1;
            if state.failing_waits.contains(&state.wait_attempts) {
                return Err(FakeComputeError::Rejected {
                    operation: "wait",
                    detail: format!("attempt {} scripted to fail", state.wait_attempts),
                });
            }
            let server = state
                .servers
                .iter_mut()
                .find(|server| server.uuid == id)
                .ok_or_else(|| FakeComputeError::NotFound { id: id.to_owned() })?;
            STATUS_RUNNING.clone_into(&mut server.status);
            Ok(server.clone())
        })
    }

    fn delete(&self, id: &str) -> Result<(), FakeComputeError> {
        self.with_state(|state| {
            state.delete_calls.push(id.to_owned());
            if state.failing_deletes.contains(id) {
                return Err(FakeComputeError::Rejected {
                    operation: "delete",
                    detail: format!("server {id} is locked"),
                });
            }
            let before = state.servers.len();
            state.servers.retain(|server| server.uuid != id);
            if state.servers.len() == before {
                return Err(FakeComputeError::NotFound { id: id.to_owned() });
            }
            state.deleted_ids.push(id.to_owned());
            Ok(())
        })
    }
}

impl Compute for FakeCompute {
    type Error = FakeComputeError;

    fn list_servers<'a>(
        &'a self,
        tags: Option<&'a TagMap>,
    ) -> ComputeFuture<'a, Vec<Server>, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.list_filters.push(tags.cloned());
                if state.fail_list {
                    return Err(FakeComputeError::ListUnavailable);
                }
                Ok(state
                    .servers
                    .iter()
                    .filter(|server| {
                        tags.is_none_or(|filter| {
                            filter
                                .iter()
                                .all(|(key, value)| server.tags.get(key) == Some(value))
                        })
                    })
                    .cloned()
                    .collect())
            })
        })
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.get_calls.push(id.to_owned());
                cancel_at(state.cancel_on_get.as_ref(), state.get_calls.len());
                Self::lookup(state, id)
            })
        })
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(async move { self.create(request) })
    }

    fn wait_until_running<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, Server, Self::Error> {
        Box::pin(async move { self.wait(id) })
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move { self.delete(id) })
    }
}

/// Builds a server record with one public IPv4 address.
#[must_use]
pub fn server_record(uuid: &str, name: &str, status: &str, tags: TagMap) -> Server {
    Server {
        uuid: uuid.to_owned(),
        name: name.to_owned(),
        status: status.to_owned(),
        tags,
        image: ServerImage {
            slug: String::from("ubuntu-24.04"),
            name: String::from("Ubuntu 24.04"),
            operating_system: FAKE_OPERATING_SYSTEM.to_owned(),
            default_username: None,
        },
        interfaces: vec![Interface {
            kind: String::from("public"),
            addresses: vec![Address {
                version: 4,
                address: String::from("192.0.2.10"),
            }],
        }],
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
