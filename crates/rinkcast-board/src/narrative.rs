//! Deterministic narrative summary.
//!
//! A short compressed string summarizing the game so far, used to re-seed
//! refreshed agent sessions. Built from a fixed template over Board state,
//! never from the language model, and truncated to a bounded length.

use rinkcast_core::GameSituation;

use crate::board::Board;

/// Maximum summary length in characters.
pub const NARRATIVE_SUMMARY_MAX_CHARS: usize = 600;

/// Build the bounded summary for a board.
#[must_use]
pub fn build_summary(board: &Board) -> String {
    let mut out = format!(
        "P{} {} — {} {} {} {}. Shots {}.",
        board.period,
        board.time_remaining,
        board.away_team,
        board.score.away,
        board.score.home,
        board.home_team,
        board.shots,
    );

    match board.situation() {
        GameSituation::EvenStrength => {}
        situation => {
            out.push(' ');
            out.push_str(&situation.to_string());
            out.push('.');
        }
    }

    if board.goals.is_empty() {
        out.push_str(" No goals yet.");
    } else {
        out.push_str(" Goals:");
        for goal in &board.goals {
            let assists = if goal.assists.is_empty() {
                String::new()
            } else {
                format!(" ({})", goal.assists.join(", "))
            };
            out.push_str(&format!(
                " {} [{}]{} at {};",
                goal.scorer, goal.team, assists, goal.game_time
            ));
        }
    }

    if !board.penalties.is_empty() {
        let recent = board.penalties.iter().rev().take(3);
        out.push_str(" Penalties:");
        for p in recent {
            out.push_str(&format!(" {} [{}] {}m;", p.player, p.team, p.minutes));
        }
    }

    out.push_str(&format!(
        " {} has allowed {}, {} has allowed {}.",
        board.goalie_away.id,
        board.goalie_away.goals_allowed,
        board.goalie_home.id,
        board.goalie_home.goals_allowed,
    ));

    truncate_chars(out, NARRATIVE_SUMMARY_MAX_CHARS)
}

/// Truncate on a character boundary.
fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    s.chars().take(max.saturating_sub(1)).chain(['…']).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
