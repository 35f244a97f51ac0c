//! Deletion guard.
//!
//! A server may only be deleted when it carries the group's ownership tags
//! with the exact expected values and its name looks like one the group
//! would have generated. The check is pure; callers fetch the server first.

use thiserror::Error;

use crate::compute::Server;
use crate::identity::{Identity, SERVER_NAME_PATTERN};

/// Reason a server was refused for deletion.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SafetyViolation {
    /// No ownership tags were expected, so nothing can be proven.
    #[error("no expected tags configured")]
    EmptyExpectation,
    /// An ownership tag is absent.
    #[error("tag {key} missing")]
    TagMissing {
        /// Missing tag key.
        key: String,
    },
    /// An ownership tag carries another value.
    #[error("tag {key} is {found:?}, expected {expected:?}")]
    TagMismatch {
        /// Tag key.
        key: String,
        /// Value on the server.
        found: String,
        /// Value the group stamps.
        expected: String,
    },
    /// The name does not start with the group prefix.
    #[error("name does not start with {prefix:?}")]
    NamePrefix {
        /// Expected prefix.
        prefix: String,
    },
    /// The name does not match the generated-name pattern.
    #[error("name {name:?} does not match {pattern}", pattern = SERVER_NAME_PATTERN)]
    NamePattern {
        /// Offending name.
        name: String,
    },
}

/// Checks that `server` is owned by `identity` and may be deleted.
///
/// # Errors
///
/// Returns the first [`SafetyViolation`] found. Tags are checked before the
/// name.
pub fn ensure_safe_to_delete(identity: &Identity, server: &Server) -> Result<(), SafetyViolation> {
    let expected = identity.tag_map();
    if expected.is_empty() {
        return Err(SafetyViolation::EmptyExpectation);
    }

    for (key, value) in &expected {
        match server.tags.get(key) {
            None => return Err(SafetyViolation::TagMissing { key: key.clone() }),
            Some(found) if found != value => {
                return Err(SafetyViolation::TagMismatch {
                    key: key.clone(),
                    found: found.clone(),
                    expected: value.clone(),
                });
            }
            Some(_) => {}
        }
    }

    if !identity.has_name_prefix(&server.name) {
        return Err(SafetyViolation::NamePrefix {
            prefix: identity.name_prefix(),
        });
    }

    if !identity.matches_name(&server.name) {
        return Err(SafetyViolation::NamePattern {
            name: server.name.clone(),
        });
    }

    Ok(())
}
