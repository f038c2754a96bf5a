//! Context manager: prompt assembly and coarse token accounting.
//!
//! Every stage prompt has the same five-part structure, stable across calls:
//!
//! 1. Fixed stage system preamble (role and output schema)
//! 2. Authoritative state block (the Board projection), which downstream
//!    must not contradict
//! 3. Narrative summary (bounded length)
//! 4. The current snapshot's activities (structured list)
//! 5. Stage-specific instructions
//!
//! Token estimation is coarse: bytes/4 is sufficient at this scale.

use serde::{Deserialize, Serialize};
use std::fmt;

use rinkcast_core::{BoardProjection, Snapshot, StaticContext, TeamSide, UpdateReport};

use crate::collaborator::SessionMessage;
use crate::session::{AgentSession, RefreshTrigger};

/// Bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Stage vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// The three pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Structured game analysis.
    Analyze,
    /// Two-voice commentary generation.
    Narrate,
    /// Audio rendering.
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyze => write!(f, "analyze"),
            Self::Narrate => write!(f, "narrate"),
            Self::Synthesize => write!(f, "synthesize"),
        }
    }
}

/// Broadcaster persona names surfaced in prompts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterNames {
    /// Display name of speaker A (play-by-play).
    pub speaker_a: String,
    /// Display name of speaker B (color analyst).
    pub speaker_b: String,
}

impl Default for BroadcasterNames {
    fn default() -> Self {
        Self {
            speaker_a: "Alex Chen".into(),
            speaker_b: "Mike Rodriguez".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy and trend
// ─────────────────────────────────────────────────────────────────────────────

/// Context thresholds driving the refresh policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Soft token ceiling: refresh once estimated size reaches this.
    pub soft_tokens: u32,
    /// Hard token ceiling: prompts must never exceed this.
    pub hard_tokens: u32,
    /// Time-based fallback: refresh after this many snapshots.
    pub refresh_every_n_snapshots: u32,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            soft_tokens: 30_000,
            hard_tokens: 48_000,
            refresh_every_n_snapshots: 15,
        }
    }
}

/// Session context growth classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthTrend {
    /// Size is flat or shrinking.
    Stable,
    /// Size is growing but under the soft ceiling.
    Rising,
    /// Two consecutive estimates above the soft ceiling, and rising.
    Critical,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt payload
// ─────────────────────────────────────────────────────────────────────────────

/// Assembled prompt for one stage call.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptPayload {
    /// Stage this payload feeds.
    pub stage: Stage,
    /// Fixed stage preamble.
    pub system_prompt: String,
    /// State block + summary + activities + instructions.
    pub user_message: String,
    /// Coarse token estimate for this payload alone.
    pub estimated_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles stage prompts and estimates context size.
#[derive(Clone, Debug)]
pub struct ContextManager {
    policy: ContextPolicy,
    broadcasters: BroadcasterNames,
}

impl ContextManager {
    /// Create a manager with the given thresholds and personas.
    #[must_use]
    pub fn new(policy: ContextPolicy, broadcasters: BroadcasterNames) -> Self {
        Self {
            policy,
            broadcasters,
        }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// The broadcaster personas.
    #[must_use]
    pub fn broadcasters(&self) -> &BroadcasterNames {
        &self.broadcasters
    }

    /// Assemble the prompt payload for one stage call.
    ///
    /// `extra` carries stage-chained content (e.g. the Analyze output fed
    /// into Narrate), appended between the activities and the instructions.
    #[must_use]
    pub fn assemble(
        &self,
        stage: Stage,
        projection: &BoardProjection,
        statics: &StaticContext,
        snapshot: &Snapshot,
        narrative_summary: &str,
        extra: Option<&str>,
    ) -> PromptPayload {
        let system_prompt = self.stage_preamble(stage);

        let mut user_message = String::with_capacity(2048);
        user_message.push_str(&render_state_block(projection, statics));
        user_message.push_str("\nGAME NARRATIVE SO FAR:\n");
        user_message.push_str(narrative_summary);
        user_message.push_str("\n\nCURRENT SNAPSHOT ACTIVITIES (");
        user_message.push_str(&snapshot.game_time.to_string());
        user_message.push_str("):\n");
        user_message.push_str(
            &serde_json::to_string_pretty(&snapshot.activities).unwrap_or_else(|_| "[]".into()),
        );
        if let Some(extra) = extra {
            user_message.push_str("\n\n");
            user_message.push_str(extra);
        }
        user_message.push_str("\n\n");
        user_message.push_str(stage_instructions(stage));

        let estimated_tokens =
            estimate_text_tokens(&system_prompt) + estimate_text_tokens(&user_message);

        PromptPayload {
            stage,
            system_prompt,
            user_message,
            estimated_tokens,
        }
    }

    /// Estimated token size of a session's message log.
    #[must_use]
    pub fn estimate_tokens(&self, session: &AgentSession) -> u32 {
        estimate_messages_tokens(&session.messages)
    }

    /// Growth trend from the session's recent size estimates.
    #[must_use]
    pub fn growth_trend(&self, session: &AgentSession) -> GrowthTrend {
        let estimates = &session.recent_estimates;
        let Some((&last, rest)) = estimates.split_last() else {
            return GrowthTrend::Stable;
        };
        let Some(&prev) = rest.last() else {
            return GrowthTrend::Stable;
        };
        if last > prev {
            if last >= self.policy.soft_tokens && prev >= self.policy.soft_tokens {
                GrowthTrend::Critical
            } else {
                GrowthTrend::Rising
            }
        } else {
            GrowthTrend::Stable
        }
    }

    /// Decide whether a session should be refreshed before the next call.
    ///
    /// Refresh when ANY of: soft token ceiling reached; the board update
    /// carries a major event; the snapshot interval elapsed; growth is
    /// critical. Returns the trigger so analytics record why.
    #[must_use]
    pub fn recommend_refresh(
        &self,
        session: &AgentSession,
        update: &UpdateReport,
    ) -> Option<RefreshTrigger> {
        if session.estimated_tokens >= self.policy.soft_tokens {
            return Some(RefreshTrigger::SoftTokenCeiling);
        }
        if update.is_major() {
            return Some(RefreshTrigger::MajorEvent);
        }
        if session.snapshots_seen >= self.policy.refresh_every_n_snapshots {
            return Some(RefreshTrigger::SnapshotInterval);
        }
        if self.growth_trend(session) == GrowthTrend::Critical {
            return Some(RefreshTrigger::CriticalGrowth);
        }
        None
    }

    /// The fixed system preamble for a stage.
    #[must_use]
    pub fn stage_preamble(&self, stage: Stage) -> String {
        let a = &self.broadcasters.speaker_a;
        let b = &self.broadcasters.speaker_b;
        match stage {
            Stage::Analyze => "You are the analysis desk for a live hockey broadcast. \
                 For each snapshot you produce strictly structured JSON: \
                 {\"talking_points\": [string], \"momentum\": number 0..1, \
                 \"flagged_events\": [string]}. \
                 No prose outside the JSON object. The authoritative state \
                 block in each message is ground truth; never contradict it."
                .to_owned(),
            Stage::Narrate => format!(
                "You are writing live two-voice hockey commentary. Speaker A is \
                 {a} (play-by-play), speaker B is {b} (color analyst). \
                 Produce strictly structured JSON: {{\"segments\": [{{\"speaker\": \
                 \"A\"|\"B\", \"text\": string, \"emotion\": string, \
                 \"duration_estimate_seconds\": number, \"pause_after_seconds\": \
                 number}}]}}. 2 to 6 segments, speakers alternating. Name only \
                 players from the roster list in the state block. Never state a \
                 score, shot count, or goalie fact that contradicts the \
                 authoritative state block."
            ),
            Stage::Synthesize => "You render commentary segments as speech audio. Input is one \
                 segment of text plus a voice style; output is 24 kHz 16-bit \
                 mono PCM WAV."
                .to_owned(),
        }
    }
}

/// Stage-specific instruction footer.
fn stage_instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Analyze => {
            "Produce the analysis JSON for this snapshot. Momentum reflects how \
             much is happening right now: quiet stretches near 0, goals and \
             scrums near 1."
        }
        Stage::Narrate => {
            "Write the commentary JSON for this snapshot now. React to the \
             analysis above; keep continuity with the narrative and avoid \
             repeating recent talking points."
        }
        Stage::Synthesize => "Render each segment in order.",
    }
}

/// Render the authoritative state block.
///
/// Textual, but callers treat it as authoritative; the narrate post-filter
/// spot-checks output against the same projection.
#[must_use]
pub fn render_state_block(projection: &BoardProjection, statics: &StaticContext) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("AUTHORITATIVE GAME STATE (single source of truth):\n");
    out.push_str(&format!(
        "Score: {} {} - {} {}\n",
        statics.away_team, projection.score.away, projection.score.home, statics.home_team
    ));
    out.push_str(&format!(
        "Shots: {} - {}\n",
        projection.shots.away, projection.shots.home
    ));
    out.push_str(&format!(
        "Period {}, {} remaining, {}\n",
        projection.period, projection.time_remaining, projection.situation
    ));
    out.push_str(&format!(
        "Goalies: {} ({}) {} allowed; {} ({}) {} allowed\n",
        projection.goalie_away.id,
        statics.away_team,
        projection.goalie_away.goals_allowed,
        projection.goalie_home.id,
        statics.home_team,
        projection.goalie_home.goals_allowed,
    ));

    if projection.active_penalties.is_empty() {
        out.push_str("Active penalties: none\n");
    } else {
        out.push_str("Active penalties:");
        for p in &projection.active_penalties {
            out.push_str(&format!(" {} [{}] {}m {};", p.player, p.team, p.minutes, p.infraction));
        }
        out.push('\n');
    }

    let mut roster: Vec<&str> = statics
        .roster_away
        .iter()
        .chain(&statics.roster_home)
        .map(|p| p.name.as_str())
        .collect();
    roster.sort_unstable();
    out.push_str("Roster (the only names that may be spoken): ");
    out.push_str(&roster.join(", "));
    out.push('\n');
    out.push_str(&format!(
        "Sides: {} is away, {} is home\n",
        statics.team(TeamSide::Away),
        statics.team(TeamSide::Home)
    ));
    out
}

/// Coarse token estimate: bytes / 4, rounded up.
#[must_use]
pub fn estimate_text_tokens(text: &str) -> u32 {
    u32::try_from(text.len().div_ceil(BYTES_PER_TOKEN)).unwrap_or(u32::MAX)
}

/// Coarse token estimate for a message log, with per-message overhead.
#[must_use]
pub fn estimate_messages_tokens(messages: &[SessionMessage]) -> u32 {
    messages
        .iter()
        .map(|m| estimate_text_tokens(&m.content) + 3)
        .sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
