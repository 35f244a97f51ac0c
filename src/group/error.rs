//! Error types for the instance group.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::config::ConfigErrors;
use crate::credentials::CredentialError;
use crate::guard::SafetyViolation;

/// Failure of one remote call.
#[derive(Debug, Error)]
pub enum RemoteError<E>
where
    E: StdError + 'static,
{
    /// The compute client reported an error.
    #[error(transparent)]
    Provider(E),
    /// The caller cancelled the operation before the call finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RemoteError<E>
where
    E: StdError + 'static,
{
    /// Returns whether the call was cut short by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Step of a batch item that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Requesting a new server.
    Create,
    /// Waiting for a new server to run.
    Wait,
    /// Fetching a server before deletion.
    Fetch,
    /// Checking ownership before deletion.
    Guard,
    /// Deleting a server.
    Delete,
}

/// Cause of a batch item failure.
#[derive(Debug, Error)]
pub enum ItemError<E>
where
    E: StdError + 'static,
{
    /// A remote call failed or was cancelled.
    #[error(transparent)]
    Remote(#[from] RemoteError<E>),
    /// The server is not provably owned by the group.
    #[error(transparent)]
    Safety(#[from] SafetyViolation),
}

impl<E> ItemError<E>
where
    E: StdError + 'static,
{
    /// Returns whether the failure was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Cancelled))
    }
}

/// One failed item of a batch call.
#[derive(Debug)]
pub struct ItemFailure<E>
where
    E: StdError + 'static,
{
    /// Server name for creations, server identifier for deletions.
    pub subject: String,
    /// Step that failed.
    pub stage: Stage,
    /// Underlying cause.
    pub error: ItemError<E>,
}

impl<E> ItemFailure<E>
where
    E: StdError + 'static,
{
    pub(crate) fn new(
        subject: impl Into<String>,
        stage: Stage,
        error: impl Into<ItemError<E>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            stage,
            error: error.into(),
        }
    }
}

impl<E> fmt::Display for ItemFailure<E>
where
    E: StdError + 'static,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = &self.subject;
        match self.stage {
            Stage::Create => write!(formatter, "failed to create {subject}")?,
            Stage::Wait => write!(formatter, "failed to wait for {subject}")?,
            Stage::Fetch => write!(formatter, "failed to fetch server before deleting {subject}")?,
            Stage::Guard => write!(formatter, "prevented from deleting server {subject}")?,
            Stage::Delete => write!(formatter, "failed to delete server {subject}")?,
        }
        write!(formatter, ": {}", self.error)
    }
}

impl<E> StdError for ItemFailure<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// Errors that fail a whole instance-group call.
#[derive(Debug, Error)]
pub enum GroupError<E>
where
    E: StdError + 'static,
{
    /// Configuration or connector settings are invalid.
    #[error("config validation: {0}")]
    Config(#[from] ConfigErrors),
    /// Key material could not be prepared.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// An operation ran before a successful `init`.
    #[error("instance group is not initialised")]
    NotInitialised,
    /// The connectivity check failed.
    #[error("failed to initialize client: {0}")]
    Connectivity(#[source] RemoteError<E>),
    /// Listing the group's servers failed.
    #[error("failed to list servers: {0}")]
    List(#[source] RemoteError<E>),
    /// Fetching a single server failed.
    #[error("failed to fetch server {id}: {source}")]
    Fetch {
        /// Server identifier.
        id: String,
        /// Underlying failure.
        #[source]
        source: RemoteError<E>,
    },
    /// The server exposes no address to connect to.
    #[error("server {id} has no network address")]
    NoAddress {
        /// Server identifier.
        id: String,
    },
}
