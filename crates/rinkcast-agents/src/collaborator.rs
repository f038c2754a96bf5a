//! The external-collaborator boundary.
//!
//! The language model and the speech synthesizer are external collaborators:
//! the pipeline specifies their call shapes here and nothing else. Every
//! implementation must be `Send + Sync` for use across stage workers.
//!
//! A malformed response is an error, not a degraded success. Degradation
//! decisions belong to the stages, not to the collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rinkcast_core::{FailureKind, VoiceStyle};

/// Result alias for collaborator operations.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The call exceeded its deadline.
    #[error("call timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The collaborator returned an API-level failure.
    #[error("API error ({status}): {message}")]
    Api {
        /// Status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this failure can be retried.
        retryable: bool,
    },

    /// The collaborator asked us to slow down.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// The response did not conform to the declared structure.
    #[error("malformed response: {message}")]
    Malformed {
        /// What failed to parse.
        message: String,
    },

    /// The call was cancelled by shutdown.
    #[error("call cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl CollaboratorError {
    /// Whether the retry kernel may try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Malformed { .. } | Self::Cancelled | Self::Other { .. } => false,
        }
    }

    /// Suggested retry delay, if the collaborator provided one.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Category string for metrics and logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Api { .. } => "api",
            Self::RateLimited { .. } => "rate_limit",
            Self::Malformed { .. } => "malformed",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }

    /// Classification into the pipeline failure taxonomy.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Malformed { .. } => FailureKind::MalformedOutput,
            _ => FailureKind::TransientCollaborator,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session messages
// ─────────────────────────────────────────────────────────────────────────────

/// Who authored a session message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The canonical stage preamble.
    System,
    /// Pipeline-assembled prompt content.
    User,
    /// Collaborator output.
    Assistant,
}

/// One entry in a session's message log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Author.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl SessionMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// The language-model collaborator (Analyze, Narrate).
///
/// Call shape: `(system_prompt, session_log, user_message) -> text`.
/// The stage layer extracts the declared structured payload from the text.
#[async_trait]
pub trait LanguageCollaborator: Send + Sync {
    /// Collaborator name for logging and metrics.
    fn name(&self) -> &str;

    /// Produce a single response for the given prompt context.
    async fn complete(
        &self,
        system_prompt: &str,
        session_log: &[SessionMessage],
        user_message: &str,
    ) -> CollaboratorResult<String>;
}

/// The text-to-speech collaborator (Synthesize).
///
/// Call shape: `(text, voice_style, language) -> pcm_wav_bytes`.
/// Output must be 24 kHz, 16-bit PCM mono WAV with a correct header.
#[async_trait]
pub trait SpeechCollaborator: Send + Sync {
    /// Collaborator name for logging and metrics.
    fn name(&self) -> &str;

    /// Render one segment of speech.
    async fn synthesize(
        &self,
        text: &str,
        style: VoiceStyle,
        language: &str,
    ) -> CollaboratorResult<Vec<u8>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
