//! Hook contract: the four lifecycle hook points, their gating rules, and the
//! wire shape of caller-reported results.
//!
//! Hooks run on the caller's machine. The engine only publishes metadata
//! describing each hook and accepts a reported [`HookResult`], which gates the
//! corresponding transition when the hook is blocking.

use super::{ParseTaskFieldError, PrincipalId, Task, TaskDomainError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Environment variable carrying the task UUID.
pub const ENV_TASK_ID: &str = "TASK_ID";
/// Environment variable carrying the human-readable identifier.
pub const ENV_TASK_IDENTIFIER: &str = "TASK_IDENTIFIER";
/// Environment variable carrying the task title.
pub const ENV_TASK_TITLE: &str = "TASK_TITLE";
/// Environment variable carrying the task kind.
pub const ENV_TASK_KIND: &str = "TASK_KIND";
/// Environment variable carrying the task priority.
pub const ENV_TASK_PRIORITY: &str = "TASK_PRIORITY";
/// Environment variable carrying the board identifier.
pub const ENV_TASK_BOARD_ID: &str = "TASK_BOARD_ID";
/// Environment variable carrying the claiming agent identity.
pub const ENV_AGENT_ID: &str = "AGENT_ID";
/// Environment variable carrying the hook name.
pub const ENV_HOOK_NAME: &str = "HOOK_NAME";

const FIELD_EXIT_CODE: &str = "exit_code";
const FIELD_OUTPUT: &str = "output";
const FIELD_DURATION_MS: &str = "duration_ms";

/// Fixed lifecycle hook points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Runs before work starts; gates claim.
    BeforeDoing,
    /// Runs after work finishes; gates completion.
    AfterDoing,
    /// Informational hook fired after completion.
    BeforeReview,
    /// Informational hook fired after approval.
    AfterReview,
}

/// Static definition of a hook point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HookSpec {
    /// Whether a failing result rejects the gated transition.
    pub blocking: bool,
    /// Time budget the caller should allow the hook.
    pub timeout_seconds: u32,
    /// Transition the hook gates or follows.
    pub gates: &'static str,
}

impl HookPoint {
    /// All hook points in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::BeforeDoing,
        Self::AfterDoing,
        Self::BeforeReview,
        Self::AfterReview,
    ];

    /// Returns the canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeDoing => "before_doing",
            Self::AfterDoing => "after_doing",
            Self::BeforeReview => "before_review",
            Self::AfterReview => "after_review",
        }
    }

    /// Returns the static definition for this hook.
    #[must_use]
    pub const fn spec(self) -> HookSpec {
        match self {
            Self::BeforeDoing => HookSpec {
                blocking: true,
                timeout_seconds: 60,
                gates: "claim",
            },
            Self::AfterDoing => HookSpec {
                blocking: true,
                timeout_seconds: 120,
                gates: "complete",
            },
            Self::BeforeReview => HookSpec {
                blocking: false,
                timeout_seconds: 60,
                gates: "complete",
            },
            Self::AfterReview => HookSpec {
                blocking: false,
                timeout_seconds: 60,
                gates: "approve",
            },
        }
    }

    /// Returns whether a failing result rejects the gated transition.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        self.spec().blocking
    }

    /// Builds the metadata published to the caller for this hook.
    #[must_use]
    pub fn metadata(self, task: &Task, agent: &PrincipalId) -> HookMetadata {
        let spec = self.spec();
        let environment = BTreeMap::from([
            (ENV_TASK_ID.to_owned(), task.id().to_string()),
            (ENV_TASK_IDENTIFIER.to_owned(), task.identifier().to_string()),
            (ENV_TASK_TITLE.to_owned(), task.title().to_owned()),
            (ENV_TASK_KIND.to_owned(), task.kind().as_str().to_owned()),
            (
                ENV_TASK_PRIORITY.to_owned(),
                task.priority().as_str().to_owned(),
            ),
            (ENV_TASK_BOARD_ID.to_owned(), task.board_id().to_string()),
            (ENV_AGENT_ID.to_owned(), agent.to_string()),
            (ENV_HOOK_NAME.to_owned(), self.as_str().to_owned()),
        ]);
        HookMetadata {
            hook: self,
            blocking: spec.blocking,
            timeout_seconds: spec.timeout_seconds,
            environment,
        }
    }

    /// Validates a raw hook report and applies this hook's gating rule.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::MalformedHookResult`] when the report is
    /// absent or does not match the wire shape, and
    /// [`TaskDomainError::HookFailed`] when a blocking hook reports a
    /// non-zero exit code.
    pub fn gate(self, report: Option<&Value>) -> Result<HookResult, TaskDomainError> {
        let raw = report.ok_or_else(|| TaskDomainError::MalformedHookResult {
            hook: self,
            reason: "result is required".to_owned(),
        })?;
        let result = HookResult::from_wire(self, raw)?;
        if self.is_blocking() && !result.succeeded() {
            return Err(TaskDomainError::HookFailed {
                hook: self,
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        Ok(result)
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HookPoint {
    type Error = ParseTaskFieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|hook| hook.as_str() == value.trim())
            .ok_or_else(|| ParseTaskFieldError::new("hook", value))
    }
}

/// Metadata describing a hook the caller must run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookMetadata {
    /// Hook point.
    pub hook: HookPoint,
    /// Whether the hook gates its transition.
    pub blocking: bool,
    /// Time budget in seconds.
    pub timeout_seconds: u32,
    /// Environment variables the caller must provide to the hook.
    pub environment: BTreeMap<String, String>,
}

/// Result of a hook run as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResult {
    /// Process exit code; zero means success.
    pub exit_code: i64,
    /// Captured output.
    pub output: String,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: u64,
}

impl HookResult {
    /// Creates a hook result.
    #[must_use]
    pub fn new(exit_code: i64, output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration_ms,
        }
    }

    /// Returns whether the hook exited successfully.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Parses the wire form `{exit_code, output, duration_ms}`.
    ///
    /// All three fields are required and no other fields are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::MalformedHookResult`] describing the first
    /// shape violation found.
    pub fn from_wire(hook: HookPoint, value: &Value) -> Result<Self, TaskDomainError> {
        let malformed = |reason: String| TaskDomainError::MalformedHookResult { hook, reason };
        let Value::Object(fields) = value else {
            return Err(malformed("result must be a JSON object".to_owned()));
        };

        if let Some(unknown) = fields
            .keys()
            .find(|key| ![FIELD_EXIT_CODE, FIELD_OUTPUT, FIELD_DURATION_MS].contains(&key.as_str()))
        {
            return Err(malformed(format!("unexpected field '{unknown}'")));
        }

        let exit_code = fields
            .get(FIELD_EXIT_CODE)
            .ok_or_else(|| malformed(format!("missing field '{FIELD_EXIT_CODE}'")))?
            .as_i64()
            .ok_or_else(|| malformed(format!("field '{FIELD_EXIT_CODE}' must be an integer")))?;
        let output = fields
            .get(FIELD_OUTPUT)
            .ok_or_else(|| malformed(format!("missing field '{FIELD_OUTPUT}'")))?
            .as_str()
            .ok_or_else(|| malformed(format!("field '{FIELD_OUTPUT}' must be a string")))?
            .to_owned();
        let duration_ms = fields
            .get(FIELD_DURATION_MS)
            .ok_or_else(|| malformed(format!("missing field '{FIELD_DURATION_MS}'")))?
            .as_u64()
            .ok_or_else(|| {
                malformed(format!(
                    "field '{FIELD_DURATION_MS}' must be a non-negative integer"
                ))
            })?;

        Ok(Self {
            exit_code,
            output,
            duration_ms,
        })
    }

    /// Returns the wire form of this result.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "exit_code": self.exit_code,
            "output": self.output,
            "duration_ms": self.duration_ms,
        })
    }
}
