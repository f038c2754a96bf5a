//! Board projection — the immutable read-only view of game state.
//!
//! The Board itself lives in `rinkcast-board` and is mutated only by the
//! reducer actor. Everyone else works from a [`BoardProjection`] taken by
//! value, so the shared vocabulary lives here where every crate can see it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::GameId;
use crate::time::{Clock, GameTime};

// ─────────────────────────────────────────────────────────────────────────────
// Sides and counters
// ─────────────────────────────────────────────────────────────────────────────

/// Team side within a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    /// The visiting team.
    Away,
    /// The home team.
    Home,
}

impl TeamSide {
    /// The opposing side.
    #[must_use]
    pub fn opponent(self) -> Self {
        match self {
            Self::Away => Self::Home,
            Self::Home => Self::Away,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Away => write!(f, "away"),
            Self::Home => write!(f, "home"),
        }
    }
}

/// A per-side counter pair (score, shots).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePair {
    /// Away-side count.
    pub away: u32,
    /// Home-side count.
    pub home: u32,
}

impl ScorePair {
    /// Read one side.
    #[must_use]
    pub fn side(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::Away => self.away,
            TeamSide::Home => self.home,
        }
    }

    /// Mutable access to one side.
    pub fn side_mut(&mut self, side: TeamSide) -> &mut u32 {
        match side {
            TeamSide::Away => &mut self.away,
            TeamSide::Home => &mut self.home,
        }
    }

    /// Sum across both sides.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.away + self.home
    }
}

impl fmt::Display for ScorePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.away, self.home)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A recorded goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    /// Scoring player.
    pub scorer: String,
    /// Scoring side.
    pub team: TeamSide,
    /// Assisting players, in credit order.
    pub assists: Vec<String>,
    /// When the goal was reduced.
    pub game_time: GameTime,
}

/// A recorded penalty interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRecord {
    /// Penalized player.
    pub player: String,
    /// Penalized side.
    pub team: TeamSide,
    /// Penalty length in minutes.
    pub minutes: u8,
    /// Infraction name.
    pub infraction: String,
    /// When the penalty started.
    pub start: GameTime,
}

impl PenaltyRecord {
    /// Whether the interval is still running at `now`.
    #[must_use]
    pub fn active_at(&self, now: GameTime) -> bool {
        let expires = self.start.elapsed_seconds() + u64::from(self.minutes) * 60;
        now.elapsed_seconds() < expires
    }
}

/// One goalie's line: identity plus goals allowed while on ice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalieLine {
    /// Goalie identifier (display name from the static context).
    pub id: String,
    /// Goals credited against this goalie's team while on ice.
    pub goals_allowed: u32,
}

/// Strength situation derived from active penalty intervals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameSituation {
    /// No active penalties, or offsetting penalties.
    #[default]
    EvenStrength,
    /// The named side is on the power play.
    PowerPlay {
        /// The advantaged side.
        side: TeamSide,
    },
}

impl fmt::Display for GameSituation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EvenStrength => write!(f, "even strength"),
            Self::PowerPlay { side } => write!(f, "{side} power play"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projection
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot of Board state, taken by value at the start of each
/// stage. Cheap to clone (a few KB).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardProjection {
    /// Game identity.
    pub game_id: GameId,
    /// Authoritative score.
    pub score: ScorePair,
    /// Authoritative shots on goal.
    pub shots: ScorePair,
    /// Current period.
    pub period: u32,
    /// Countdown clock.
    pub time_remaining: Clock,
    /// Strength situation.
    pub situation: GameSituation,
    /// All recorded goals, in order.
    pub goals: Vec<GoalRecord>,
    /// Active penalty intervals.
    pub active_penalties: Vec<PenaltyRecord>,
    /// Away goalie line.
    pub goalie_away: GoalieLine,
    /// Home goalie line.
    pub goalie_home: GoalieLine,
    /// Coordinate of the most recent reduced snapshot.
    pub last_game_time: Option<GameTime>,
}

impl BoardProjection {
    /// Goalie line for one side.
    #[must_use]
    pub fn goalie(&self, side: TeamSide) -> &GoalieLine {
        match side {
            TeamSide::Away => &self.goalie_away,
            TeamSide::Home => &self.goalie_home,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Update report
// ─────────────────────────────────────────────────────────────────────────────

/// Anomalies observed while reducing a snapshot. Logged, never fatal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// The producer's cumulative counter ran backwards; the decrement was
    /// ignored per the monotonicity invariant.
    CounterDecrement {
        /// Which counter (`"score"` or `"shots"`).
        counter: String,
        /// Side that regressed.
        side: TeamSide,
        /// Authoritative value kept.
        kept: u32,
        /// Regressed value observed.
        observed: u32,
    },
    /// An activity referenced a player outside the roster lock; the event
    /// was dropped.
    UnknownPlayer {
        /// Offending player token.
        player: String,
        /// Event that carried it.
        event_id: String,
    },
}

/// Result of one successful reduce.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Number of not-before-seen events applied.
    pub events_processed: usize,
    /// Goals applied by this reduce.
    pub new_goals: Vec<GoalRecord>,
    /// Penalties applied by this reduce.
    pub new_penalties: Vec<PenaltyRecord>,
    /// Score movement from this reduce.
    pub score_delta: ScorePair,
    /// Whether this snapshot crossed into a new period.
    pub period_crossed: bool,
    /// Anomalies observed.
    pub anomalies: Vec<Anomaly>,
}

impl UpdateReport {
    /// Whether this update contains a major event (goal, penalty, or period
    /// boundary), the session-refresh trigger.
    #[must_use]
    pub fn is_major(&self) -> bool {
        !self.new_goals.is_empty() || !self.new_penalties.is_empty() || self.period_crossed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opponent_flips() {
        assert_eq!(TeamSide::Away.opponent(), TeamSide::Home);
        assert_eq!(TeamSide::Home.opponent(), TeamSide::Away);
    }

    #[test]
    fn score_pair_side_access() {
        let mut s = ScorePair { away: 1, home: 2 };
        assert_eq!(s.side(TeamSide::Away), 1);
        *s.side_mut(TeamSide::Home) += 1;
        assert_eq!(s.home, 3);
        assert_eq!(s.total(), 4);
    }

    #[test]
    fn score_pair_display() {
        assert_eq!(ScorePair { away: 2, home: 1 }.to_string(), "2-1");
    }

    #[test]
    fn penalty_active_window() {
        let p = PenaltyRecord {
            player: "Ekholm".into(),
            team: TeamSide::Away,
            minutes: 2,
            infraction: "tripping".into(),
            start: GameTime::new(1, 5, 0),
        };
        assert!(p.active_at(GameTime::new(1, 5, 30)));
        assert!(p.active_at(GameTime::new(1, 6, 59)));
        assert!(!p.active_at(GameTime::new(1, 7, 0)));
        assert!(!p.active_at(GameTime::new(2, 0, 0)));
    }

    #[test]
    fn game_situation_display() {
        assert_eq!(GameSituation::EvenStrength.to_string(), "even strength");
        assert_eq!(
            GameSituation::PowerPlay {
                side: TeamSide::Home
            }
            .to_string(),
            "home power play"
        );
    }

    #[test]
    fn update_report_major_event_detection() {
        let mut report = UpdateReport::default();
        assert!(!report.is_major());

        report.period_crossed = true;
        assert!(report.is_major());

        let mut report = UpdateReport::default();
        report.new_goals.push(GoalRecord {
            scorer: "Draisaitl".into(),
            team: TeamSide::Away,
            assists: vec![],
            game_time: GameTime::new(1, 5, 30),
        });
        assert!(report.is_major());
    }

    #[test]
    fn projection_serde_roundtrip() {
        let p = BoardProjection {
            game_id: "G".into(),
            score: ScorePair { away: 1, home: 0 },
            shots: ScorePair { away: 5, home: 3 },
            period: 1,
            time_remaining: "14:30".parse().unwrap(),
            situation: GameSituation::EvenStrength,
            goals: vec![],
            active_penalties: vec![],
            goalie_away: GoalieLine {
                id: "Skinner".into(),
                goals_allowed: 0,
            },
            goalie_home: GoalieLine {
                id: "Bobrovsky".into(),
                goals_allowed: 1,
            },
            last_game_time: Some(GameTime::new(1, 5, 30)),
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: BoardProjection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.goalie(TeamSide::Home).goals_allowed, 1);
    }

    #[test]
    fn anomaly_serde_tagged() {
        let a = Anomaly::CounterDecrement {
            counter: "score".into(),
            side: TeamSide::Away,
            kept: 1,
            observed: 0,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "counter_decrement");
    }
}
