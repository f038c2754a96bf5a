//! # rinkcast-core
//!
//! Foundation types, errors, and utilities for the Rinkcast live commentary
//! pipeline.
//!
//! This crate provides the shared vocabulary that all other Rinkcast crates
//! depend on:
//!
//! - **Branded IDs**: `GameId`, `SessionId`, `SubscriberId`, `EventId` as
//!   newtypes for type safety
//! - **Game time**: [`GameTime`] (period, minute, second) with total ordering,
//!   and [`Clock`] for the countdown clock within a period
//! - **Snapshots**: [`Snapshot`] with a tagged-variant [`ActivityKind`] schema
//!   validated on ingress
//! - **Narration**: [`CommentarySegment`], [`NarrationBatch`], [`AudioSegment`],
//!   speaker/emotion/voice-style vocabulary
//! - **Board projection**: the immutable read-only view stage workers consume
//! - **Failure taxonomy**: error kinds mapped to retry/degrade policies
//! - **Retry math**: backoff calculation shared by the retry kernel
//!
//! [`GameTime`]: time::GameTime
//! [`Clock`]: time::Clock
//! [`Snapshot`]: snapshot::Snapshot
//! [`ActivityKind`]: snapshot::ActivityKind
//! [`CommentarySegment`]: narration::CommentarySegment
//! [`NarrationBatch`]: narration::NarrationBatch
//! [`AudioSegment`]: narration::AudioSegment

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod narration;
pub mod output;
pub mod projection;
pub mod retry;
pub mod snapshot;
pub mod statics;
pub mod time;

pub use errors::{FailureKind, FailurePolicy, Severity};
pub use ids::{EventId, GameId, SessionId, SubscriberId};
pub use narration::{
    AudioSegment, CommentarySegment, Emotion, NarrationBatch, Speaker, VoiceStyle,
};
pub use output::PipelineOutput;
pub use projection::{
    Anomaly, BoardProjection, GameSituation, GoalRecord, GoalieLine, PenaltyRecord, ScorePair,
    TeamSide, UpdateReport,
};
pub use snapshot::{Activity, ActivityKind, Snapshot};
pub use statics::{Player, RosterLock, StaticContext};
pub use time::{Clock, GameTime};
