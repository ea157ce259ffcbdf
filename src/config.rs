//! Engine configuration.
//!
//! Configuration can be set via environment variables:
//! - `FOREMAN_CLAIM_TTL_SECONDS` - claim lifetime. Defaults to `3600`.
//! - `FOREMAN_MAX_CONFLICT_RETRIES` - compare-and-set retries before a write
//!   reports contention. Defaults to `8`.
//! - `FOREMAN_COLUMN_TODO`, `FOREMAN_COLUMN_DOING`, `FOREMAN_COLUMN_REVIEW`,
//!   `FOREMAN_COLUMN_DONE`, `FOREMAN_COLUMN_BLOCKED` - board columns each
//!   status maps onto. Default to `todo`, `doing`, `review`, `done` and
//!   `blocked`.

use crate::task::domain::ColumnLayout;
use chrono::TimeDelta;
use thiserror::Error;

/// Environment variable holding the claim lifetime in seconds.
pub const ENV_CLAIM_TTL_SECONDS: &str = "FOREMAN_CLAIM_TTL_SECONDS";
/// Environment variable holding the conflict retry limit.
pub const ENV_MAX_CONFLICT_RETRIES: &str = "FOREMAN_MAX_CONFLICT_RETRIES";
/// Environment variable holding the Todo column identifier.
pub const ENV_COLUMN_TODO: &str = "FOREMAN_COLUMN_TODO";
/// Environment variable holding the Doing column identifier.
pub const ENV_COLUMN_DOING: &str = "FOREMAN_COLUMN_DOING";
/// Environment variable holding the Review column identifier.
pub const ENV_COLUMN_REVIEW: &str = "FOREMAN_COLUMN_REVIEW";
/// Environment variable holding the Done column identifier.
pub const ENV_COLUMN_DONE: &str = "FOREMAN_COLUMN_DONE";
/// Environment variable holding the Blocked column identifier.
pub const ENV_COLUMN_BLOCKED: &str = "FOREMAN_COLUMN_BLOCKED";

const DEFAULT_CLAIM_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 8;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Parse failure description.
        reason: String,
    },

    /// The claim lifetime is zero or negative.
    #[error("claim ttl must be positive, got {0} seconds")]
    NonPositiveClaimTtl(i64),
}

/// Tunables for claim coordination and column placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    claim_ttl: TimeDelta,
    max_conflict_retries: u32,
    columns: ColumnLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_ttl: TimeDelta::seconds(DEFAULT_CLAIM_TTL_SECONDS),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            columns: ColumnLayout::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// absent variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is malformed or the result
    /// fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let claim_ttl = lookup(ENV_CLAIM_TTL_SECONDS)
            .map(|raw| {
                parse_number::<i64>(ENV_CLAIM_TTL_SECONDS, &raw).and_then(ttl_from_seconds)
            })
            .transpose()?
            .unwrap_or(defaults.claim_ttl);
        let max_conflict_retries = lookup(ENV_MAX_CONFLICT_RETRIES)
            .map(|raw| parse_number(ENV_MAX_CONFLICT_RETRIES, &raw))
            .transpose()?
            .unwrap_or(defaults.max_conflict_retries);
        let column = |name: &'static str, fallback: &str| -> String {
            lookup(name).unwrap_or_else(|| fallback.to_owned())
        };
        let columns = ColumnLayout::from_names(
            &column(ENV_COLUMN_TODO, "todo"),
            &column(ENV_COLUMN_DOING, "doing"),
            &column(ENV_COLUMN_REVIEW, "review"),
            &column(ENV_COLUMN_DONE, "done"),
            &column(ENV_COLUMN_BLOCKED, "blocked"),
        )
        .map_err(|err| ConfigError::InvalidValue {
            name: "FOREMAN_COLUMN_*",
            reason: err.to_string(),
        })?;

        let config = Self {
            claim_ttl,
            max_conflict_retries,
            columns,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the claim lifetime.
    #[must_use]
    pub const fn with_claim_ttl(mut self, claim_ttl: TimeDelta) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    /// Sets the compare-and-set retry limit.
    #[must_use]
    pub const fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Sets the column layout.
    #[must_use]
    pub fn with_columns(mut self, columns: ColumnLayout) -> Self {
        self.columns = columns;
        self
    }

    /// Checks invariants the setters cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveClaimTtl`] when the claim lifetime
    /// is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.claim_ttl <= TimeDelta::zero() {
            return Err(ConfigError::NonPositiveClaimTtl(self.claim_ttl.num_seconds()));
        }
        Ok(())
    }

    /// Returns the claim lifetime.
    #[must_use]
    pub const fn claim_ttl(&self) -> TimeDelta {
        self.claim_ttl
    }

    /// Returns the compare-and-set retry limit.
    #[must_use]
    pub const fn max_conflict_retries(&self) -> u32 {
        self.max_conflict_retries
    }

    /// Returns the column layout.
    #[must_use]
    pub const fn columns(&self) -> &ColumnLayout {
        &self.columns
    }
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            name,
            reason: err.to_string(),
        })
}

fn ttl_from_seconds(seconds: i64) -> Result<TimeDelta, ConfigError> {
    TimeDelta::try_seconds(seconds).ok_or_else(|| ConfigError::InvalidValue {
        name: ENV_CLAIM_TTL_SECONDS,
        reason: format!("{seconds} seconds is out of range"),
    })
}
