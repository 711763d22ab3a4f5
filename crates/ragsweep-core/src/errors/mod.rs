//! Error taxonomy for collaborator calls, evaluation units and configuration.
//!
//! `ProviderError` is what an external call (retrieval, generation, grading,
//! reranking, summarization) fails with. Only transient variants are retried
//! by [`crate::engine::retry::retry_call`]; everything else fails on first
//! occurrence. Orchestration layers wrap these in `anyhow` with context.

use std::time::Duration;

use crate::engine::retry::Retryable;
use crate::search::trial::TrialState;

/// Failure of a single external call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// 5xx from the service.
    #[error("{provider}: server error (status {status}): {message}")]
    Server {
        provider: String,
        status: u16,
        message: String,
    },

    /// 429 or an explicit rate-limit signal.
    #[error("{provider}: rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// The call did not finish in time.
    #[error("{provider}: request timed out: {message}")]
    Timeout { provider: String, message: String },

    /// Connection refused or reset.
    #[error("{provider}: connection error: {message}")]
    Connection { provider: String, message: String },

    /// 4xx other than 429.
    #[error("{provider}: client error (status {status}): {message}")]
    Client {
        provider: String,
        status: u16,
        message: String,
    },

    /// The service answered, but not with something we can use.
    #[error("{provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Request rejected before it was sent.
    #[error("{provider}: validation error: {message}")]
    Validation { provider: String, message: String },

    #[error("{provider}: {message}")]
    Other { provider: String, message: String },
}

impl ProviderError {
    /// Maps an HTTP status onto the taxonomy.
    pub fn from_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = message.into();
        match status {
            429 => Self::RateLimited {
                provider,
                retry_after: None,
            },
            500..=599 => Self::Server {
                provider,
                status,
                message,
            },
            _ => Self::Client {
                provider,
                status,
                message,
            },
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Server { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Connection { provider, .. }
            | Self::Client { provider, .. }
            | Self::InvalidResponse { provider, .. }
            | Self::Validation { provider, .. }
            | Self::Other { provider, .. } => provider,
        }
    }

    /// Stable machine-readable kind, written into failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Server { .. } => "provider_server",
            Self::RateLimited { .. } => "provider_rate_limit",
            Self::Timeout { .. } => "provider_timeout",
            Self::Connection { .. } => "network",
            Self::Client { .. } => "provider_client",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Validation { .. } => "validation",
            Self::Other { .. } => "other",
        }
    }
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Server { .. }
                | Self::RateLimited { .. }
                | Self::Timeout { .. }
                | Self::Connection { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Pipeline stage of an evaluation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStage {
    Pending,
    Retrieving,
    Reranking,
    Composing,
    Summarizing,
    Generating,
    GradingCompleteness,
    GradingCorrectness,
    Done,
    Failed,
}

impl std::fmt::Display for UnitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Retrieving => "retrieving",
            Self::Reranking => "reranking",
            Self::Composing => "composing",
            Self::Summarizing => "summarizing",
            Self::Generating => "generating",
            Self::GradingCompleteness => "grading_completeness",
            Self::GradingCorrectness => "grading_correctness",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A test case could not be evaluated. Units are not partially salvageable,
/// so this carries the stage that failed and nothing else.
#[derive(Debug, Clone, thiserror::Error)]
#[error("test case '{test_case_id}' failed while {stage}: {source}")]
pub struct UnitError {
    pub test_case_id: String,
    pub stage: UnitStage,
    #[source]
    pub source: ProviderError,
}

impl UnitError {
    pub fn new(test_case_id: impl Into<String>, stage: UnitStage, source: ProviderError) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            stage,
            source,
        }
    }

    /// Whether the final error was transient (i.e. retries were exhausted).
    pub fn retries_exhausted(&self) -> bool {
        self.source.is_transient()
    }
}

/// Configuration rejected at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("`{field}` must not be empty")]
    Empty { field: String },

    #[error("duplicate scope `{scope}` in retrieval.scopes")]
    DuplicateScope { scope: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn empty(field: impl Into<String>) -> Self {
        Self::Empty {
            field: field.into(),
        }
    }
}

/// Illegal trial-lifecycle transition. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal trial transition {from} -> {to}")]
pub struct TrialStateError {
    pub from: TrialState,
    pub to: TrialState,
}
