//! Failure taxonomy.
//!
//! Every error surfaced in the pipeline is classified into a
//! [`FailureKind`], and each kind maps to exactly one [`FailurePolicy`].
//! The retry kernel and the orchestrator consult the policy instead of
//! re-deciding treatment at each call site.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Severity
// ─────────────────────────────────────────────────────────────────────────────

/// How serious a failure is for pipeline continuity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Logged and absorbed; no output impact.
    Warning,
    /// Expected to clear on retry.
    Transient,
    /// Output for the snapshot is degraded or skipped.
    Error,
    /// The pipeline must drain and stop.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Transient => write!(f, "transient"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Kinds and policies
// ─────────────────────────────────────────────────────────────────────────────

/// Classification of every failure the pipeline can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Collaborator timeout or 5xx-class failure.
    TransientCollaborator,
    /// Collaborator returned a payload that does not conform to the declared
    /// structure.
    MalformedOutput,
    /// Producer data contradicts authoritative state (e.g. score decrement).
    Anomaly,
    /// A snapshot whose reduce raises even after repair.
    PoisonSnapshot,
    /// Narration referenced a player outside the roster lock.
    RosterViolation,
    /// Disk full, wedged channel, or similar.
    ResourceExhaustion,
    /// A subscriber's outbound queue overflowed.
    ConnectionOverflow,
    /// An internal invariant check failed.
    FatalInternal,
}

/// What the pipeline does about a [`FailureKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Retry up to `max_retries` times with backoff, then run the degrade
    /// hook.
    RetryThenDegrade {
        /// Bounded retry count.
        max_retries: u32,
    },
    /// One repair attempt with a corrective instruction, then degrade.
    RepairThenDegrade,
    /// Log, clamp the offending value, continue.
    LogAndContinue,
    /// Quarantine the input file, emit a skip marker, continue.
    Quarantine,
    /// Rewrite the offending token; drop the segment if rewriting fails.
    RewriteOrDrop,
    /// Disconnect the offending subscriber only.
    Disconnect,
    /// Drain in-flight work and stop the pipeline.
    DrainAndStop,
    /// Crash with a state dump; recovery happens from persistence.
    CrashWithDump,
}

impl FailureKind {
    /// The policy table from the error-handling design.
    #[must_use]
    pub fn policy(self) -> FailurePolicy {
        match self {
            Self::TransientCollaborator => FailurePolicy::RetryThenDegrade { max_retries: 2 },
            Self::MalformedOutput => FailurePolicy::RepairThenDegrade,
            Self::Anomaly => FailurePolicy::LogAndContinue,
            Self::PoisonSnapshot => FailurePolicy::Quarantine,
            Self::RosterViolation => FailurePolicy::RewriteOrDrop,
            Self::ResourceExhaustion => FailurePolicy::DrainAndStop,
            Self::ConnectionOverflow => FailurePolicy::Disconnect,
            Self::FatalInternal => FailurePolicy::CrashWithDump,
        }
    }

    /// Severity implied by the policy.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Anomaly => Severity::Warning,
            Self::TransientCollaborator => Severity::Transient,
            Self::MalformedOutput
            | Self::PoisonSnapshot
            | Self::RosterViolation
            | Self::ConnectionOverflow => Severity::Error,
            Self::ResourceExhaustion | Self::FatalInternal => Severity::Fatal,
        }
    }

    /// Whether this failure halts the whole pipeline.
    #[must_use]
    pub fn is_pipeline_fatal(self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransientCollaborator => "transient_collaborator",
            Self::MalformedOutput => "malformed_output",
            Self::Anomaly => "anomaly",
            Self::PoisonSnapshot => "poison_snapshot",
            Self::RosterViolation => "roster_violation",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::ConnectionOverflow => "connection_overflow",
            Self::FatalInternal => "fatal_internal",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
