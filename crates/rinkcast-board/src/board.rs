//! The Board aggregate: state, projection, persistence snapshot.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rinkcast_core::{
    BoardProjection, EventId, GameId, GameSituation, GameTime, GoalRecord, GoalieLine,
    PenaltyRecord, ScorePair, Snapshot, StaticContext, TeamSide,
};
use rinkcast_core::time::Clock;

use crate::narrative;
use crate::reducer;

/// Errors from reducing a snapshot into the Board.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// The snapshot belongs to a different game.
    #[error("snapshot for game {got} applied to board for game {expected}")]
    GameMismatch {
        /// Board's game.
        expected: GameId,
        /// Snapshot's game.
        got: GameId,
    },

    /// The snapshot is at or before the last reduced game time.
    #[error("out-of-order snapshot at {incoming} (board is at {last})")]
    OutOfOrder {
        /// Incoming coordinate.
        incoming: GameTime,
        /// Board's last reduced coordinate.
        last: GameTime,
    },

    /// State snapshot bytes could not be decoded.
    #[error("board state corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Authoritative state for one game.
///
/// Constructed by [`Board::load`] once the static context is available,
/// mutated only by [`Board::reduce`], persisted after every successful
/// reduce via [`Board::snapshot_state`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    /// Game identity.
    pub game_id: GameId,
    /// Away team abbreviation, carried for summary rendering.
    pub away_team: String,
    /// Home team abbreviation.
    pub home_team: String,
    /// Authoritative score. Monotonically nondecreasing.
    pub score: ScorePair,
    /// Authoritative shots on goal. Monotonically nondecreasing.
    pub shots: ScorePair,
    /// Current period.
    pub period: u32,
    /// Countdown clock.
    pub time_remaining: Clock,
    /// All recorded goals, in reduce order.
    pub goals: Vec<GoalRecord>,
    /// All recorded penalty intervals (active and expired).
    pub penalties: Vec<PenaltyRecord>,
    /// Away goalie line.
    pub goalie_away: GoalieLine,
    /// Home goalie line.
    pub goalie_home: GoalieLine,
    /// Every event ID ever applied, for dedup.
    pub processed_event_ids: HashSet<EventId>,
    /// Deterministic compressed game summary, bounded length.
    pub narrative_summary: String,
    /// Coordinate of the most recent reduced snapshot.
    pub last_game_time: Option<GameTime>,
}

impl Board {
    /// Create a fresh board from the per-game static context.
    #[must_use]
    pub fn load(ctx: &StaticContext) -> Self {
        let mut board = Self {
            game_id: ctx.game_id.clone(),
            away_team: ctx.away_team.clone(),
            home_team: ctx.home_team.clone(),
            score: ScorePair::default(),
            shots: ScorePair::default(),
            period: 1,
            time_remaining: Clock::period_start(),
            goals: Vec::new(),
            penalties: Vec::new(),
            goalie_away: GoalieLine {
                id: ctx.goalie_away.clone(),
                goals_allowed: 0,
            },
            goalie_home: GoalieLine {
                id: ctx.goalie_home.clone(),
                goals_allowed: 0,
            },
            processed_event_ids: HashSet::new(),
            narrative_summary: String::new(),
            last_game_time: None,
        };
        board.narrative_summary = narrative::build_summary(&board);
        board
    }

    /// Apply one snapshot. Single-writer; see the reducer module for the
    /// algorithm. On error the board is left exactly as it was.
    pub fn reduce(
        &mut self,
        snapshot: &Snapshot,
        ctx: &StaticContext,
    ) -> Result<rinkcast_core::UpdateReport, ReduceError> {
        reducer::reduce(self, snapshot, ctx)
    }

    /// Goalie line for one side.
    #[must_use]
    pub fn goalie(&self, side: TeamSide) -> &GoalieLine {
        match side {
            TeamSide::Away => &self.goalie_away,
            TeamSide::Home => &self.goalie_home,
        }
    }

    /// Mutable goalie line for one side.
    pub(crate) fn goalie_mut(&mut self, side: TeamSide) -> &mut GoalieLine {
        match side {
            TeamSide::Away => &mut self.goalie_away,
            TeamSide::Home => &mut self.goalie_home,
        }
    }

    /// Strength situation at the board's current game time.
    #[must_use]
    pub fn situation(&self) -> GameSituation {
        let Some(now) = self.last_game_time else {
            return GameSituation::EvenStrength;
        };
        let active = |side: TeamSide| {
            self.penalties
                .iter()
                .filter(|p| p.team == side && p.active_at(now))
                .count()
        };
        let away = active(TeamSide::Away);
        let home = active(TeamSide::Home);
        match away.cmp(&home) {
            std::cmp::Ordering::Greater => GameSituation::PowerPlay {
                side: TeamSide::Home,
            },
            std::cmp::Ordering::Less => GameSituation::PowerPlay {
                side: TeamSide::Away,
            },
            std::cmp::Ordering::Equal => GameSituation::EvenStrength,
        }
    }

    /// Pure read-only projection for stage workers.
    #[must_use]
    pub fn project(&self) -> BoardProjection {
        let now = self.last_game_time;
        BoardProjection {
            game_id: self.game_id.clone(),
            score: self.score,
            shots: self.shots,
            period: self.period,
            time_remaining: self.time_remaining,
            situation: self.situation(),
            goals: self.goals.clone(),
            active_penalties: self
                .penalties
                .iter()
                .filter(|p| now.is_some_and(|t| p.active_at(t)))
                .cloned()
                .collect(),
            goalie_away: self.goalie_away.clone(),
            goalie_home: self.goalie_home.clone(),
            last_game_time: self.last_game_time,
        }
    }

    /// The deterministic compressed summary (bounded length).
    #[must_use]
    pub fn narrative_summary(&self) -> &str {
        &self.narrative_summary
    }

    /// Serialize the full board state for persistence.
    pub fn snapshot_state(&self) -> Result<Vec<u8>, ReduceError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Restore a board from persisted state bytes.
    pub fn restore(bytes: &[u8]) -> Result<Self, ReduceError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
