//! Agent sessions with adaptive refresh.
//!
//! A session is an immutable message log behind an `Arc`; appending an
//! exchange builds a new log and swaps the handle. A refresh constructs a
//! brand-new session seeded with the canonical preamble, the current Board
//! projection, and the narrative summary, then atomically swaps the active
//! pointer. In-flight calls keep their own `Arc` and are never cancelled,
//! so refreshes are invisible to callers and ordering is untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use rinkcast_core::SessionId;
use rinkcast_core::UpdateReport;

use crate::collaborator::SessionMessage;
use crate::context::{ContextManager, Stage, estimate_messages_tokens};

/// Keep at most this many size estimates for trend detection.
const ESTIMATE_WINDOW: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Seed content for a fresh session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSeed {
    /// Canonical stage system preamble.
    pub preamble: String,
    /// Rendered Board projection block.
    pub state_block: String,
    /// Narrative summary at refresh time.
    pub narrative_summary: String,
}

/// One stage agent session: an immutable message log plus bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentSession {
    /// Session identity.
    pub id: SessionId,
    /// Which stage this session serves.
    pub stage: Stage,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// The message log. Never mutated in place.
    pub messages: Vec<SessionMessage>,
    /// Current estimated token size of the log.
    pub estimated_tokens: u32,
    /// Recent size estimates, oldest first, for trend detection.
    pub recent_estimates: Vec<u32>,
    /// Snapshots processed since this session was created.
    pub snapshots_seen: u32,
}

impl AgentSession {
    /// Create a fresh session seeded with preamble + state + summary.
    #[must_use]
    pub fn seeded(stage: Stage, seed: &SessionSeed) -> Self {
        let messages = vec![
            SessionMessage::system(seed.preamble.clone()),
            SessionMessage::user(format!(
                "{}\nGAME NARRATIVE SO FAR:\n{}",
                seed.state_block, seed.narrative_summary
            )),
        ];
        let estimated_tokens = estimate_messages_tokens(&messages);
        Self {
            id: SessionId::new(),
            stage,
            created_at: Utc::now(),
            messages,
            estimated_tokens,
            recent_estimates: vec![estimated_tokens],
            snapshots_seen: 0,
        }
    }

    /// A new session value with one user/assistant exchange appended.
    #[must_use]
    pub fn with_exchange(&self, user: &str, assistant: &str) -> Self {
        let mut next = self.clone();
        next.messages.push(SessionMessage::user(user.to_owned()));
        next.messages
            .push(SessionMessage::assistant(assistant.to_owned()));
        next.estimated_tokens = estimate_messages_tokens(&next.messages);
        next.recent_estimates.push(next.estimated_tokens);
        if next.recent_estimates.len() > ESTIMATE_WINDOW {
            let _ = next.recent_estimates.remove(0);
        }
        next
    }

    /// A new session value with the snapshot counter advanced.
    #[must_use]
    pub fn with_snapshot_seen(&self) -> Self {
        let mut next = self.clone();
        next.snapshots_seen += 1;
        next
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh analytics
// ─────────────────────────────────────────────────────────────────────────────

/// Why a session was refreshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// Estimated tokens reached the soft ceiling.
    SoftTokenCeiling,
    /// The board update carried a goal, penalty, or period boundary.
    MajorEvent,
    /// The time-based snapshot interval elapsed.
    SnapshotInterval,
    /// Two consecutive estimates above the soft ceiling and rising.
    CriticalGrowth,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SoftTokenCeiling => "soft_token_ceiling",
            Self::MajorEvent => "major_event",
            Self::SnapshotInterval => "snapshot_interval",
            Self::CriticalGrowth => "critical_growth",
        };
        f.write_str(s)
    }
}

/// One recorded refresh, for analytics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshRecord {
    /// Stage whose session was replaced.
    pub stage: Stage,
    /// Why.
    pub trigger: RefreshTrigger,
    /// When.
    pub at: DateTime<Utc>,
    /// The replacement session's ID.
    pub new_session: SessionId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Holds the active session per stage and applies the refresh policy.
pub struct SessionManager {
    sessions: RwLock<HashMap<Stage, Arc<AgentSession>>>,
    analytics: Mutex<Vec<RefreshRecord>>,
}

impl SessionManager {
    /// Create an empty manager; sessions are seeded on first access.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            analytics: Mutex::new(Vec::new()),
        }
    }

    /// The active session for a stage, seeding one if absent.
    pub fn session(&self, stage: Stage, seed: impl FnOnce() -> SessionSeed) -> Arc<AgentSession> {
        if let Some(existing) = self.sessions.read().get(&stage) {
            return existing.clone();
        }
        let fresh = Arc::new(AgentSession::seeded(stage, &seed()));
        let mut sessions = self.sessions.write();
        sessions
            .entry(stage)
            .or_insert_with(|| fresh.clone())
            .clone()
    }

    /// Append an exchange to a stage's active session (atomic swap).
    pub fn record_exchange(&self, stage: Stage, user: &str, assistant: &str) {
        let mut sessions = self.sessions.write();
        if let Some(current) = sessions.get(&stage) {
            let next = Arc::new(current.with_exchange(user, assistant));
            let _ = sessions.insert(stage, next);
        }
    }

    /// Count a processed snapshot against a stage's session.
    pub fn note_snapshot(&self, stage: Stage) {
        let mut sessions = self.sessions.write();
        if let Some(current) = sessions.get(&stage) {
            let next = Arc::new(current.with_snapshot_seen());
            let _ = sessions.insert(stage, next);
        }
    }

    /// Evaluate the refresh policy for a stage; swap in a fresh session when
    /// it fires. Returns the trigger when a refresh happened.
    ///
    /// The old session is simply dropped from the map; any in-flight call
    /// holds its own `Arc` and finishes undisturbed.
    pub fn maybe_refresh(
        &self,
        stage: Stage,
        manager: &ContextManager,
        update: &UpdateReport,
        seed: impl Fn() -> SessionSeed,
    ) -> Option<RefreshTrigger> {
        // First access seeds a session; no refresh is recorded for it.
        let current = self.session(stage, &seed);

        let trigger = manager.recommend_refresh(&current, update)?;
        let fresh = Arc::new(AgentSession::seeded(stage, &seed()));
        let record = RefreshRecord {
            stage,
            trigger,
            at: Utc::now(),
            new_session: fresh.id.clone(),
        };

        {
            let mut sessions = self.sessions.write();
            let _ = sessions.insert(stage, fresh);
        }
        info!(%stage, trigger = %trigger, "session refreshed");
        metrics::counter!("session_refreshes_total", "stage" => stage.to_string(), "trigger" => trigger.to_string())
            .increment(1);
        self.analytics.lock().push(record);
        Some(trigger)
    }

    /// Recorded refreshes, oldest first.
    #[must_use]
    pub fn analytics(&self) -> Vec<RefreshRecord> {
        self.analytics.lock().clone()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
