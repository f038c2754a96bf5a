//! # rinkcast-board
//!
//! The Board: authoritative, in-process state of one game and the single
//! source of truth for all downstream narration.
//!
//! The Board is mutated only by [`Board::reduce`] under the orchestrator's
//! single-writer discipline. Everyone else reads an immutable
//! [`BoardProjection`] taken by value.
//!
//! Invariants maintained here:
//!
//! - **Uniqueness**: no two reduced snapshots share a game time
//! - **Idempotent reduce**: already-seen event IDs are no-ops
//! - **Monotonic counters**: score and shots only increase; producer
//!   regressions are logged as anomalies and ignored
//! - **Goalie consistency**: `goals_allowed` equals goals credited against
//!   the goalie's team
//!
//! [`BoardProjection`]: rinkcast_core::BoardProjection

#![deny(unsafe_code)]

pub mod board;
pub mod narrative;
pub mod reducer;

pub use board::{Board, ReduceError};
pub use narrative::NARRATIVE_SUMMARY_MAX_CHARS;
