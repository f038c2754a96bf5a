//! Typed identifier strings.
//!
//! IDs travel as plain strings on the wire, in filenames, and in persisted
//! JSON, but inside the process each entity gets its own newtype so that,
//! for example, a game id can never slot into a subscriber-id parameter.
//!
//! Minted ids are time-ordered (UUID v7), so their lexicographic order is
//! also their creation order. Producer-supplied ids (`GameId`, `EventId`)
//! are opaque and simply wrapped via `From`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_string {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh id. UUID v7, so later ids sort after earlier ones.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// The raw string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_string! {
    /// Opaque identifier for one game; the partition key for all state.
    GameId
}

id_string! {
    /// Identifier for a stage agent session.
    SessionId
}

id_string! {
    /// Identifier for a connected broadcast subscriber.
    SubscriberId
}

id_string! {
    /// Opaque producer identifier for a snapshot activity, used for dedup.
    EventId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_differ() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn minted_ids_sort_by_creation() {
        let earlier = SubscriberId::new();
        let later = SubscriberId::new();
        assert!(earlier <= later);
    }

    #[test]
    fn wrapping_and_unwrapping() {
        let id = GameId::from("2024030412");
        assert_eq!(id.as_str(), "2024030412");
        assert_eq!(String::from(id), "2024030412");
    }

    #[test]
    fn display_is_the_raw_string() {
        let id = EventId::from("ev-42".to_owned());
        assert_eq!(id.to_string(), "ev-42");
        assert_eq!(format!("{id}"), "ev-42");
    }

    #[test]
    fn serde_is_a_bare_string() {
        let id = GameId::from("GAME");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"GAME\"");
        let back: GameId = serde_json::from_str("\"GAME\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn distinct_types_same_content() {
        // The whole point: these never compare across types, only within.
        let game = GameId::from("x");
        let event = EventId::from("x");
        assert_eq!(game.as_str(), event.as_str());
    }
}
