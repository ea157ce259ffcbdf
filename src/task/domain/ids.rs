//! Identifier and validated scalar types for the task domain.

use super::{TaskDomainError, TaskKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Unique, stable identifier for a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for TaskId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable task identifier such as `W-12`.
///
/// The prefix encodes the task kind and the number is allocated from a
/// store-wide monotonically increasing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentifier {
    kind: TaskKind,
    number: u64,
}

impl TaskIdentifier {
    /// Creates an identifier for the given kind and sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidIdentifier`] when `number` is zero.
    pub fn new(kind: TaskKind, number: u64) -> Result<Self, TaskDomainError> {
        if number == 0 {
            return Err(TaskDomainError::InvalidIdentifier(format!(
                "{}-0",
                kind.prefix()
            )));
        }
        Ok(Self { kind, number })
    }

    /// Parses the `<prefix>-<number>` display form.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidIdentifier`] when the prefix is
    /// unknown or the number is missing, zero, or not numeric.
    pub fn parse(value: &str) -> Result<Self, TaskDomainError> {
        let invalid = || TaskDomainError::InvalidIdentifier(value.to_owned());
        let (prefix, number) = value.trim().split_once('-').ok_or_else(invalid)?;
        let kind = TaskKind::from_prefix(prefix).ok_or_else(invalid)?;
        let parsed = number.parse::<u64>().map_err(|_| invalid())?;
        Self::new(kind, parsed).map_err(|_| invalid())
    }

    /// Returns the task kind encoded in the prefix.
    #[must_use]
    pub const fn kind(self) -> TaskKind {
        self.kind
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn number(self) -> u64 {
        self.number
    }
}

impl Ord for TaskIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.kind.prefix().cmp(other.kind.prefix()))
    }
}

impl PartialOrd for TaskIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.prefix(), self.number)
    }
}

macro_rules! non_empty_string_id {
    ($(#[$meta:meta])* $name:ident, $error:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub(super) String);

        impl $name {
            /// Creates a validated identifier from a non-blank string.
            ///
            /// # Errors
            ///
            #[doc = concat!("Returns [`TaskDomainError::", stringify!($error), "`] when the value is blank.")]
            pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
                let raw = value.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(TaskDomainError::$error);
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Returns the identifier as `str`.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

non_empty_string_id!(
    /// Identity of a human or agent principal as issued by the
    /// authentication layer.
    PrincipalId,
    EmptyPrincipalId
);

non_empty_string_id!(
    /// Board identifier supplied by board management.
    BoardId,
    EmptyBoardId
);

non_empty_string_id!(
    /// Column identifier supplied by board management.
    ColumnId,
    EmptyColumnId
);
