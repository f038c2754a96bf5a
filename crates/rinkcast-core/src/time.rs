//! Game time and the countdown clock.
//!
//! [`GameTime`] is the totally ordered sample coordinate `(period, minute,
//! second)` measuring elapsed game time; ordering is lexicographic on the
//! tuple. Snapshot filenames encode it as `<game_id>_<period>_<mm>_<ss>.<ext>`.
//!
//! [`Clock`] is the countdown clock *within* a period (`"20:00"` down to
//! `"00:00"`), carried on activities and the Board.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Regulation period length in game seconds.
pub const PERIOD_SECONDS: u64 = 20 * 60;

// ─────────────────────────────────────────────────────────────────────────────
// GameTime
// ─────────────────────────────────────────────────────────────────────────────

/// A totally ordered game-time coordinate: `(period, minute, second)`.
///
/// Derived `Ord` is lexicographic on field order. Periods above 3 model
/// overtime and shootout.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GameTime {
    /// Period number (1–3 regulation, 4+ overtime/shootout).
    pub period: u32,
    /// Elapsed minutes within the period.
    pub minute: u8,
    /// Elapsed seconds within the minute.
    pub second: u8,
}

/// Error parsing a [`GameTime`] from a snapshot filename.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameTimeParseError {
    /// The filename does not have enough `_`-separated components.
    #[error("filename {0:?} does not match <game_id>_<period>_<mm>_<ss>")]
    Shape(String),
    /// A component was not a number.
    #[error("non-numeric component {component:?} in {name:?}")]
    Numeric {
        /// The offending component.
        component: String,
        /// The full file stem.
        name: String,
    },
}

impl GameTime {
    /// Construct a game time, normalizing second overflow into minutes.
    #[must_use]
    pub fn new(period: u32, minute: u8, second: u8) -> Self {
        Self {
            period,
            minute: minute + second / 60,
            second: second % 60,
        }
    }

    /// Total elapsed game seconds, treating every period as regulation length.
    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        u64::from(self.period.saturating_sub(1)) * PERIOD_SECONDS
            + u64::from(self.minute) * 60
            + u64::from(self.second)
    }

    /// Parse a game time (and the game id prefix) from a snapshot file path.
    ///
    /// Filenames encode the coordinate as `<game_id>_<period>_<mm>_<ss>.<ext>`.
    /// The game id may itself contain underscores, so the three numeric
    /// components are taken from the right.
    pub fn parse_file_stem(path: &Path) -> Result<(String, Self), GameTimeParseError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| GameTimeParseError::Shape(path.display().to_string()))?;

        let mut parts = stem.rsplitn(4, '_');
        let second = parts.next();
        let minute = parts.next();
        let period = parts.next();
        let game_id = parts.next();

        let (Some(second), Some(minute), Some(period), Some(game_id)) =
            (second, minute, period, game_id)
        else {
            return Err(GameTimeParseError::Shape(stem.to_owned()));
        };
        if game_id.is_empty() {
            return Err(GameTimeParseError::Shape(stem.to_owned()));
        }

        let numeric = |component: &str| -> Result<u32, GameTimeParseError> {
            component
                .parse()
                .map_err(|_| GameTimeParseError::Numeric {
                    component: component.to_owned(),
                    name: stem.to_owned(),
                })
        };

        let period = numeric(period)?;
        let minute = numeric(minute)?;
        let second = numeric(second)?;
        if minute > 59 || second > 59 {
            return Err(GameTimeParseError::Numeric {
                component: format!("{minute}_{second}"),
                name: stem.to_owned(),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok((
            game_id.to_owned(),
            Self {
                period,
                minute: minute as u8,
                second: second as u8,
            },
        ))
    }
}

impl fmt::Display for GameTime {
    /// Canonical string form, also used in persistence paths: `1_05_30`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}_{:02}", self.period, self.minute, self.second)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// The countdown clock within a period (`"MM:SS"` on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Clock {
    /// Minutes remaining.
    pub minute: u8,
    /// Seconds remaining.
    pub second: u8,
}

impl Clock {
    /// The start-of-period clock (`20:00`).
    #[must_use]
    pub fn period_start() -> Self {
        Self {
            minute: 20,
            second: 0,
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minute, self.second)
    }
}

/// Error parsing a [`Clock`] from its `"MM:SS"` form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid clock value {0:?}")]
pub struct ClockParseError(String);

impl FromStr for Clock {
    type Err = ClockParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (m, sec) = s.split_once(':').ok_or_else(|| ClockParseError(s.into()))?;
        let minute: u8 = m.parse().map_err(|_| ClockParseError(s.into()))?;
        let second: u8 = sec.parse().map_err(|_| ClockParseError(s.into()))?;
        if second > 59 {
            return Err(ClockParseError(s.into()));
        }
        Ok(Self { minute, second })
    }
}

impl Serialize for Clock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Clock {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
