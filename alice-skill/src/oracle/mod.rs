//! Answer backend abstraction.
//!
//! An [`Oracle`] turns an utterance plus an opaque continuation token into an
//! answer and a new token. The turn protocol only ever talks to this trait;
//! the concrete backend lives in [`openai`].

pub mod openai;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

pub use openai::OpenAiOracle;

/// Result type for backend calls.
pub type OracleResult<T> = Result<T, OracleError>;

/// Backend failure.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// One completed backend answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// Answer text, or a failure message
    pub text: String,
    /// Token to hand back on the next query; empty after a failure
    pub continuation_token: String,
}

impl Reply {
    pub fn new(text: impl Into<String>, continuation_token: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            continuation_token: continuation_token.into(),
        }
    }

    /// Reply delivered in place of an answer when the backend failed.
    pub fn failure(prefix: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            text: format!("{prefix}: {reason}"),
            continuation_token: String::new(),
        }
    }
}

/// Slow answer-producing backend.
///
/// Implementations must give up by `deadline` and must never return a
/// partially populated [`Reply`].
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Ask a question, continuing the conversation identified by
    /// `continuation_token` (empty for a new conversation).
    async fn query(
        &self,
        deadline: Instant,
        utterance: &str,
        continuation_token: &str,
    ) -> OracleResult<Reply>;
}
