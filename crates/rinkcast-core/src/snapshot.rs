//! Snapshot ingress schema.
//!
//! A [`Snapshot`] is one immutable sample of a game at a [`GameTime`].
//! Activities use a narrow tagged-variant schema ([`ActivityKind`]) validated
//! at deserialization: free-form payloads from the producer are rejected on
//! ingress rather than interpreted downstream.
//!
//! The producer's `observed_score` / `observed_shots` counters are hints
//! only; the Board derives authoritative counters from activity events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, GameId};
use crate::projection::{ScorePair, TeamSide};
use crate::time::{Clock, GameTime};

// ─────────────────────────────────────────────────────────────────────────────
// Activity
// ─────────────────────────────────────────────────────────────────────────────

/// One event inside a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Opaque producer event ID, used for dedup.
    pub event_id: EventId,
    /// Countdown clock at the event, when the producer supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<Clock>,
    /// The typed event payload.
    #[serde(flatten)]
    pub kind: ActivityKind,
}

/// Typed activity payloads.
///
/// The tag vocabulary mirrors the upstream feed's event keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A goal, credited to `scorer` with zero or more assists.
    Goal {
        /// Scoring player.
        scorer: String,
        /// Scoring team side.
        team: TeamSide,
        /// Assisting players, in credit order.
        #[serde(default)]
        assists: Vec<String>,
    },
    /// A shot on goal.
    Shot {
        /// Shooting player.
        shooter: String,
        /// Shooting team side.
        team: TeamSide,
    },
    /// A penalty call.
    Penalty {
        /// Penalized player.
        player: String,
        /// Penalized team side.
        team: TeamSide,
        /// Penalty length in minutes.
        minutes: u8,
        /// Infraction name (e.g. `"tripping"`).
        #[serde(default)]
        infraction: String,
    },
    /// A face-off between one player per side.
    FaceOff {
        /// Away-side participant.
        away_player: String,
        /// Home-side participant.
        home_player: String,
    },
    /// A play stoppage.
    Stoppage {
        /// Stoppage reason, when supplied.
        #[serde(default)]
        reason: String,
    },
    /// A period boundary; the first snapshot of a period carries one.
    PeriodBoundary {
        /// The period being entered.
        period: u32,
    },
    /// A bare clock advance with no game event.
    ClockTick,
}

impl Activity {
    /// Player identifiers this activity references, for roster validation.
    #[must_use]
    pub fn participants(&self) -> Vec<&str> {
        match &self.kind {
            ActivityKind::Goal {
                scorer, assists, ..
            } => std::iter::once(scorer.as_str())
                .chain(assists.iter().map(String::as_str))
                .collect(),
            ActivityKind::Shot { shooter, .. } => vec![shooter.as_str()],
            ActivityKind::Penalty { player, .. } => vec![player.as_str()],
            ActivityKind::FaceOff {
                away_player,
                home_player,
            } => vec![away_player.as_str(), home_player.as_str()],
            ActivityKind::Stoppage { .. }
            | ActivityKind::PeriodBoundary { .. }
            | ActivityKind::ClockTick => Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable sample of a game at a [`GameTime`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Game this sample belongs to.
    pub game_id: GameId,
    /// Sample coordinate.
    pub game_time: GameTime,
    /// Wall-clock time the sample was received; stamped on ingest when the
    /// producer omits it.
    #[serde(default = "Utc::now")]
    pub wall_time_received: DateTime<Utc>,
    /// Ordered event list.
    #[serde(default)]
    pub activities: Vec<Activity>,
    /// Producer's cumulative score counter (hint only).
    #[serde(default)]
    pub observed_score: ScorePair,
    /// Producer's cumulative shots counter (hint only).
    #[serde(default)]
    pub observed_shots: ScorePair,
}

impl Snapshot {
    /// Event IDs carried by this snapshot, in activity order.
    #[must_use]
    pub fn event_ids(&self) -> Vec<&EventId> {
        self.activities.iter().map(|a| &a.event_id).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
