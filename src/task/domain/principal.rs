//! Principals and capability sets supplied by the authentication layer.

use super::{BoardId, ParseTaskFieldError, PrincipalId, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Distinguishes human operators from autonomous agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A human user.
    Human,
    /// An autonomous agent.
    Agent,
}

impl PrincipalKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
        }
    }
}

impl TryFrom<&str> for PrincipalKind {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "agent" => Ok(Self::Agent),
            _ => Err(ParseTaskFieldError::new("principal kind", value)),
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of capability tags, normalised to trimmed lowercase strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    /// Creates an empty capability set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Builds a capability set from tags.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyCapability`] when any tag is blank.
    pub fn new<I, S>(tags: I) -> Result<Self, TaskDomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let normalized = tag.as_ref().trim().to_ascii_lowercase();
            if normalized.is_empty() {
                return Err(TaskDomainError::EmptyCapability);
            }
            set.insert(normalized);
        }
        Ok(Self(set))
    }

    /// Returns whether the set contains the tag.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Returns whether the set has no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the tags of `self` that are absent from `available`.
    #[must_use]
    pub fn missing_from(&self, available: &Self) -> Vec<String> {
        self.0.difference(&available.0).cloned().collect()
    }
}

/// Authenticated caller as seen by the engine.
///
/// `board_scope` of `None` grants access to every board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    identity: PrincipalId,
    kind: PrincipalKind,
    capabilities: CapabilitySet,
    board_scope: Option<BoardId>,
}

impl Principal {
    /// Creates an agent principal.
    #[must_use]
    pub const fn agent(identity: PrincipalId, capabilities: CapabilitySet) -> Self {
        Self {
            identity,
            kind: PrincipalKind::Agent,
            capabilities,
            board_scope: None,
        }
    }

    /// Creates a human principal.
    #[must_use]
    pub const fn human(identity: PrincipalId, capabilities: CapabilitySet) -> Self {
        Self {
            identity,
            kind: PrincipalKind::Human,
            capabilities,
            board_scope: None,
        }
    }

    /// Restricts the principal to a single board.
    #[must_use]
    pub fn with_board_scope(mut self, board: BoardId) -> Self {
        self.board_scope = Some(board);
        self
    }

    /// Returns the principal identity.
    #[must_use]
    pub const fn identity(&self) -> &PrincipalId {
        &self.identity
    }

    /// Returns the principal kind.
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Returns the capability set.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Returns the board scope, if restricted.
    #[must_use]
    pub const fn board_scope(&self) -> Option<&BoardId> {
        self.board_scope.as_ref()
    }

    /// Returns whether the principal may act on tasks of `board`.
    #[must_use]
    pub fn can_access(&self, board: &BoardId) -> bool {
        self.board_scope.as_ref().is_none_or(|scope| scope == board)
    }
}
