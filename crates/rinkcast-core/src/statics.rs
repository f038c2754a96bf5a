//! Per-game static context and the roster lock.
//!
//! [`StaticContext`] is produced once before live ingest and never changes
//! during a game. The [`RosterLock`] built from it is the closed set of
//! player tokens narration is allowed to name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::GameId;
use crate::projection::TeamSide;

/// Non-player tokens narration may always use.
pub const GENERIC_ROLES: [&str; 3] = ["referee", "crowd", "announcer"];

/// One rostered player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable identifier from the upstream feed.
    pub id: String,
    /// Broadcast display name.
    pub name: String,
}

/// Per-game static context, loaded before live ingest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaticContext {
    /// Game identity.
    pub game_id: GameId,
    /// Away team abbreviation (e.g. `"EDM"`).
    pub away_team: String,
    /// Home team abbreviation (e.g. `"FLA"`).
    pub home_team: String,
    /// Venue name.
    #[serde(default)]
    pub venue: String,
    /// Away roster.
    pub roster_away: Vec<Player>,
    /// Home roster.
    pub roster_home: Vec<Player>,
    /// Starting away goalie (display name).
    pub goalie_away: String,
    /// Starting home goalie (display name).
    pub goalie_home: String,
}

impl StaticContext {
    /// Team abbreviation for one side.
    #[must_use]
    pub fn team(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::Away => &self.away_team,
            TeamSide::Home => &self.home_team,
        }
    }

    /// Build the roster lock from both rosters.
    #[must_use]
    pub fn roster_lock(&self) -> RosterLock {
        RosterLock::from_context(self)
    }
}

/// The closed set of player tokens narration may name.
///
/// Contains every rostered player's id and display name on both sides, the
/// starting goalies, and the generic role tokens.
#[derive(Clone, Debug, Default)]
pub struct RosterLock {
    tokens: HashSet<String>,
}

impl RosterLock {
    /// Build from a static context.
    #[must_use]
    pub fn from_context(ctx: &StaticContext) -> Self {
        let mut tokens = HashSet::new();
        for player in ctx.roster_away.iter().chain(&ctx.roster_home) {
            let _ = tokens.insert(player.id.clone());
            let _ = tokens.insert(player.name.clone());
        }
        let _ = tokens.insert(ctx.goalie_away.clone());
        let _ = tokens.insert(ctx.goalie_home.clone());
        for role in GENERIC_ROLES {
            let _ = tokens.insert(role.to_owned());
        }
        Self { tokens }
    }

    /// Whether a token is inside the lock.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Number of distinct tokens in the lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the lock is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate the locked tokens (unordered).
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}
