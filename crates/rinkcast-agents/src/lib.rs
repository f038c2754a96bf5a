//! # rinkcast-agents
//!
//! The agent workflow layer: everything between a reduced snapshot and a
//! rendered audio batch.
//!
//! - [`collaborator`]: the external-collaborator boundary — [`LanguageCollaborator`]
//!   and [`SpeechCollaborator`] traits plus [`CollaboratorError`]
//! - [`kernel`]: the retry kernel wrapping every collaborator call with a
//!   timeout, a retry policy by error class, and a degradation hook
//! - [`context`]: prompt assembly and coarse token accounting
//! - [`session`]: immutable session logs with adaptive refresh
//! - [`stages`]: Analyze → Narrate → Synthesize
//! - [`wav`]: PCM WAV encoding and header inspection (24 kHz, 16-bit, mono)
//! - [`deterministic`]: degraded-mode generators that keep output well-formed
//!   when a collaborator fails
//! - [`stubs`]: in-process collaborator implementations for tests and
//!   offline runs
//!
//! [`LanguageCollaborator`]: collaborator::LanguageCollaborator
//! [`SpeechCollaborator`]: collaborator::SpeechCollaborator
//! [`CollaboratorError`]: collaborator::CollaboratorError

#![deny(unsafe_code)]

pub mod collaborator;
pub mod context;
pub mod deterministic;
pub mod kernel;
pub mod session;
pub mod stages;
pub mod stubs;
pub mod wav;

pub use collaborator::{
    CollaboratorError, CollaboratorResult, LanguageCollaborator, Role, SessionMessage,
    SpeechCollaborator,
};
pub use context::{
    BroadcasterNames, ContextManager, ContextPolicy, GrowthTrend, PromptPayload, Stage,
};
pub use kernel::RetryKernel;
pub use session::{AgentSession, RefreshRecord, RefreshTrigger, SessionManager, SessionSeed};
pub use stages::analyze::{Analysis, AnalyzeStage};
pub use stages::narrate::{CommentaryKind, NarrateInputs, NarrateStage, NarrateThresholds};
pub use stages::synthesize::SynthesizeStage;
