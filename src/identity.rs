//! Naming and tagging convention that marks servers as owned by a group.
//!
//! Every server the group creates carries the ownership tag and a name of
//! the form `<group>-<suffix>`, where the suffix is ten random lowercase
//! alphanumerics. Suffixes come from entropy rather than a counter, so no
//! coordination between processes is needed; collisions are possible in
//! theory but not prevented.

use std::sync::LazyLock;

use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;

use crate::compute::TagMap;

/// Tag key stamped on every server the group owns.
pub const OWNERSHIP_TAG_KEY: &str = "fleeting-instance-group";

/// Pattern a group name must satisfy.
pub const GROUP_NAME_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_.-]*$";

/// Pattern every server name produced by the group satisfies.
pub const SERVER_NAME_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_.-]*-[a-z0-9]{10}$";

const SUFFIX_LEN: usize = 10;

#[expect(
    clippy::expect_used,
    reason = "the pattern is a compile-time constant covered by tests"
)]
static GROUP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GROUP_NAME_PATTERN).expect("group name pattern compiles"));

#[expect(
    clippy::expect_used,
    reason = "the pattern is a compile-time constant covered by tests"
)]
static SERVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SERVER_NAME_PATTERN).expect("server name pattern compiles"));

/// Returns whether `name` is usable as a group name.
#[must_use]
pub fn is_valid_group_name(name: &str) -> bool {
    GROUP_NAME.is_match(name)
}

/// Ownership identity derived from a group name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    group: String,
}

impl Identity {
    /// Derives the identity for `group`.
    #[must_use]
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
        }
    }

    /// Returns the group name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the tags that mark a server as owned by this group.
    #[must_use]
    pub fn tag_map(&self) -> TagMap {
        TagMap::from([(OWNERSHIP_TAG_KEY.to_owned(), self.group.clone())])
    }

    /// Returns the prefix every owned server name starts with.
    #[must_use]
    pub fn name_prefix(&self) -> String {
        format!("{}-", self.group)
    }

    /// Generates a fresh server name. Every call draws new entropy.
    #[must_use]
    pub fn server_name(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        format!("{}{suffix}", self.name_prefix())
    }

    /// Returns whether `name` starts with this group's prefix.
    #[must_use]
    pub fn has_name_prefix(&self, name: &str) -> bool {
        name.starts_with(&self.name_prefix())
    }

    /// Returns whether `name` could have been produced by [`Self::server_name`].
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.has_name_prefix(name) && SERVER_NAME.is_match(name)
    }

    /// Returns whether `tags` carries every ownership tag with the exact
    /// expected value. Extra tags are ignored.
    #[must_use]
    pub fn matches_tags(&self, tags: &TagMap) -> bool {
        self.tag_map()
            .iter()
            .all(|(key, expected)| tags.get(key) == Some(expected))
    }
}
