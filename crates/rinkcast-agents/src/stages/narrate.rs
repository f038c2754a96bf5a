//! Stage 2 — Narrate.
//!
//! Turns an analysis into a batch of 2–6 commentary segments. The commentary
//! kind follows the momentum score: low → filler, medium → mixed, high →
//! play-by-play.
//!
//! Two deterministic post-filters run before anything is emitted:
//!
//! - **Roster lock**: a segment naming a player outside the roster has the
//!   offending token rewritten to a generic role; a segment that is mostly
//!   unknown names is dropped.
//! - **State contradiction**: segments are spot-checked against the Board
//!   projection for score, shot, and goals-allowed claims. A contradiction
//!   earns one repair retry; a persistent offender is dropped.
//!
//! Speakers are forced to alternate, and a batch always carries at least one
//! segment when the update brought a new goal.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use rinkcast_core::{
    BoardProjection, CommentarySegment, Emotion, NarrationBatch, RosterLock, Speaker,
    StaticContext, UpdateReport,
};

use crate::collaborator::{CollaboratorError, LanguageCollaborator, SessionMessage};
use crate::context::{BroadcasterNames, PromptPayload, Stage};
use crate::deterministic;
use crate::kernel::RetryKernel;
use crate::session::{SessionManager, SessionSeed};
use crate::stages::analyze::Analysis;
use crate::stages::extract_json_object;

/// Generic role tokens substituted for out-of-roster names.
const ROLE_TOKENS: [&str; 3] = ["the defender", "the winger", "the center"];

/// Violations per segment before the whole segment is dropped.
const MAX_REWRITES_PER_SEGMENT: usize = 2;

/// Cap on segments per batch.
const MAX_SEGMENTS: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// Commentary kind
// ─────────────────────────────────────────────────────────────────────────────

/// Momentum thresholds selecting the commentary kind. Tunable configuration,
/// not contract.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NarrateThresholds {
    /// Momentum at or below this renders filler.
    pub low_max: f64,
    /// Momentum at or above this renders play-by-play.
    pub high_min: f64,
}

impl Default for NarrateThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.35,
            high_min: 0.7,
        }
    }
}

/// What register the commentary takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentaryKind {
    /// Conversational filler between plays.
    Filler,
    /// A mix of observation and play calls.
    Mixed,
    /// Urgent play-by-play.
    PlayByPlay,
}

impl CommentaryKind {
    /// Select the kind for a momentum score.
    #[must_use]
    pub fn from_momentum(momentum: f64, thresholds: NarrateThresholds) -> Self {
        if momentum >= thresholds.high_min {
            Self::PlayByPlay
        } else if momentum <= thresholds.low_max {
            Self::Filler
        } else {
            Self::Mixed
        }
    }
}

impl fmt::Display for CommentaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filler => write!(f, "filler"),
            Self::Mixed => write!(f, "mixed"),
            Self::PlayByPlay => write!(f, "play-by-play"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage
// ─────────────────────────────────────────────────────────────────────────────

/// Inputs to one narrate run.
pub struct NarrateInputs<'a> {
    /// Assembled prompt (already carries the analysis as its extra block).
    pub payload: &'a PromptPayload,
    /// The Analyze output.
    pub analysis: &'a Analysis,
    /// Board projection the narration must not contradict.
    pub projection: &'a BoardProjection,
    /// Static context for team names and the roster lock.
    pub statics: &'a StaticContext,
    /// The board update for this snapshot.
    pub update: &'a UpdateReport,
    /// Roster-valid participant names from the current snapshot.
    pub participants: &'a [String],
}

/// The Narrate stage runner.
pub struct NarrateStage {
    llm: Arc<dyn LanguageCollaborator>,
    kernel: RetryKernel,
    timeout: Duration,
    names: BroadcasterNames,
    thresholds: NarrateThresholds,
}

impl NarrateStage {
    /// Create the stage.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LanguageCollaborator>,
        kernel: RetryKernel,
        timeout: Duration,
        names: BroadcasterNames,
        thresholds: NarrateThresholds,
    ) -> Self {
        Self {
            llm,
            kernel,
            timeout,
            names,
            thresholds,
        }
    }

    /// Run the stage for one snapshot. Always returns a non-empty,
    /// filter-clean batch.
    pub async fn run(
        &self,
        sessions: &SessionManager,
        inputs: NarrateInputs<'_>,
        seed: impl Fn() -> SessionSeed,
    ) -> NarrationBatch {
        let kind = CommentaryKind::from_momentum(inputs.analysis.momentum, self.thresholds);
        let user_message = format!(
            "{}\n\nCommentary kind for this snapshot: {kind}.",
            inputs.payload.user_message
        );

        let session = sessions.session(Stage::Narrate, &seed);
        let roster = inputs.statics.roster_lock();
        let allowed = self.allowed_tokens(inputs.statics);

        let response = self
            .kernel
            .call("narrate", self.timeout, || {
                self.llm
                    .complete(&inputs.payload.system_prompt, &session.messages, &user_message)
            })
            .await;

        let text = match response {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "narrate collaborator failed, degrading");
                metrics::counter!("stage_degraded_total", "stage" => "narrate").increment(1);
                return self.fallback(&inputs);
            }
        };

        let batch = match parse_batch(&text, &self.names) {
            Ok(batch) => {
                sessions.record_exchange(Stage::Narrate, &user_message, &text);
                batch
            }
            Err(parse_err) => {
                let repair_log = {
                    let mut log = session.messages.clone();
                    log.push(SessionMessage::user(user_message.clone()));
                    log.push(SessionMessage::assistant(text));
                    log
                };
                let repair_message = format!(
                    "Your previous response could not be used: {parse_err}. Respond \
                     again with ONLY the segments JSON object."
                );
                let repaired = self
                    .kernel
                    .call("narrate_repair", self.timeout, || {
                        self.llm
                            .complete(&inputs.payload.system_prompt, &repair_log, &repair_message)
                    })
                    .await
                    .and_then(|t| parse_batch(&t, &self.names).map(|b| (t, b)));
                match repaired {
                    Ok((t, batch)) => {
                        sessions.record_exchange(Stage::Narrate, &user_message, &t);
                        batch
                    }
                    Err(err) => {
                        warn!(error = %err, "narrate repair failed, degrading");
                        metrics::counter!("stage_degraded_total", "stage" => "narrate")
                            .increment(1);
                        return self.fallback(&inputs);
                    }
                }
            }
        };

        let batch = enforce_roster(batch, &roster, &allowed);
        let batch = self
            .resolve_contradictions(batch, &inputs, &session.messages, &user_message, &roster, &allowed)
            .await;

        self.normalize(batch, &inputs)
    }

    /// Spot-check canonical facts; one repair retry, then drop offenders.
    async fn resolve_contradictions(
        &self,
        batch: NarrationBatch,
        inputs: &NarrateInputs<'_>,
        log: &[SessionMessage],
        user_message: &str,
        roster: &RosterLock,
        allowed: &HashSet<String>,
    ) -> NarrationBatch {
        let offenders: Vec<usize> = contradicting_segments(&batch, inputs.projection);
        if offenders.is_empty() {
            return batch;
        }

        debug!(count = offenders.len(), "narration contradicts board, repairing");
        let repair_message = format!(
            "Some segments contradicted the authoritative state. The score is \
             {} {} - {} {} and shots are {} - {}. Rewrite the full segments \
             JSON so every stated fact matches.",
            inputs.statics.away_team,
            inputs.projection.score.away,
            inputs.projection.score.home,
            inputs.statics.home_team,
            inputs.projection.shots.away,
            inputs.projection.shots.home,
        );
        let mut repair_log = log.to_vec();
        repair_log.push(SessionMessage::user(user_message.to_owned()));

        let preamble = self.stage_preamble_for_repair();
        let repaired = self
            .kernel
            .call("narrate_contradiction_repair", self.timeout, || {
                self.llm.complete(&preamble, &repair_log, &repair_message)
            })
            .await
            .and_then(|t| parse_batch(&t, &self.names));

        match repaired {
            Ok(repaired_batch) => {
                let repaired_batch = enforce_roster(repaired_batch, roster, allowed);
                let still: Vec<usize> = contradicting_segments(&repaired_batch, inputs.projection);
                if still.is_empty() {
                    return repaired_batch;
                }
                drop_segments(repaired_batch, &still)
            }
            Err(_) => drop_segments(batch, &offenders),
        }
    }

    fn stage_preamble_for_repair(&self) -> String {
        format!(
            "You are correcting live hockey commentary for factual accuracy. \
             Speaker A is {}, speaker B is {}. Respond with ONLY the segments \
             JSON object.",
            self.names.speaker_a, self.names.speaker_b
        )
    }

    /// Batch normalization: cap, non-empty, goal guarantee, alternation.
    fn normalize(&self, mut batch: NarrationBatch, inputs: &NarrateInputs<'_>) -> NarrationBatch {
        batch.segments.truncate(MAX_SEGMENTS);

        if batch.segments.is_empty() {
            metrics::counter!("stage_degraded_total", "stage" => "narrate").increment(1);
            return self.fallback(inputs);
        }

        // A new goal must be called even if the collaborator ignored it.
        if !inputs.update.new_goals.is_empty() {
            let mentions_scorer = batch.segments.iter().any(|seg| {
                inputs
                    .update
                    .new_goals
                    .iter()
                    .any(|g| seg.text.contains(&g.scorer))
            });
            if !mentions_scorer {
                let call = self.fallback(inputs);
                if let Some(goal_call) = call.segments.into_iter().next() {
                    batch.segments.insert(0, goal_call);
                    batch.segments.truncate(MAX_SEGMENTS);
                }
            }
        }

        if batch.segments.len() < 2 {
            batch
                .segments
                .push(deterministic::color_line(inputs.projection, inputs.statics));
        }

        // Force alternation, keeping the first speaker.
        for i in 1..batch.segments.len() {
            let prev = batch.segments[i - 1].speaker;
            if batch.segments[i].speaker == prev {
                batch.segments[i].speaker = prev.other();
            }
        }

        // Fill in missing durations.
        for seg in &mut batch.segments {
            if seg.duration_estimate_seconds <= 0.0 {
                seg.duration_estimate_seconds = deterministic::estimate_speech_seconds(&seg.text);
            }
        }

        batch
    }

    fn fallback(&self, inputs: &NarrateInputs<'_>) -> NarrationBatch {
        deterministic::fallback_narration(
            inputs.update,
            inputs.projection,
            inputs.statics,
            inputs.participants,
        )
    }

    /// Non-roster tokens narration may still use: team abbreviations and the
    /// broadcasters' own names.
    fn allowed_tokens(&self, statics: &StaticContext) -> HashSet<String> {
        let mut allowed = HashSet::new();
        let _ = allowed.insert(statics.away_team.clone());
        let _ = allowed.insert(statics.home_team.clone());
        for name in [&self.names.speaker_a, &self.names.speaker_b] {
            for part in name.split_whitespace() {
                let _ = allowed.insert(part.to_owned());
            }
        }
        allowed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse the segments JSON into a batch.
pub(crate) fn parse_batch(
    text: &str,
    names: &BroadcasterNames,
) -> Result<NarrationBatch, CollaboratorError> {
    let value = extract_json_object(text)?;
    let segments = value
        .get("segments")
        .and_then(|s| s.as_array())
        .ok_or_else(|| CollaboratorError::Malformed {
            message: "missing segments array".into(),
        })?;
    if segments.is_empty() {
        return Err(CollaboratorError::Malformed {
            message: "empty segments array".into(),
        });
    }

    let mut batch = NarrationBatch::default();
    for seg in segments {
        let speaker_raw = seg
            .get("speaker")
            .and_then(|s| s.as_str())
            .ok_or_else(|| CollaboratorError::Malformed {
                message: "segment missing speaker".into(),
            })?;
        let speaker = resolve_speaker(speaker_raw, names)?;
        let text = seg
            .get("text")
            .and_then(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CollaboratorError::Malformed {
                message: "segment missing text".into(),
            })?;
        let emotion: Emotion = seg
            .get("emotion")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .unwrap_or_default()
            .unwrap_or_default();
        #[allow(clippy::cast_possible_truncation)]
        let duration = seg
            .get("duration_estimate_seconds")
            .or_else(|| seg.get("duration_estimate"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0) as f32;
        #[allow(clippy::cast_possible_truncation)]
        let pause = seg
            .get("pause_after_seconds")
            .or_else(|| seg.get("pause_after"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.8) as f32;

        batch.segments.push(CommentarySegment {
            speaker,
            text: text.to_owned(),
            emotion,
            duration_estimate_seconds: duration,
            pause_after_seconds: pause,
        });
    }
    Ok(batch)
}

/// Resolve a speaker string: role letters, persona names, or chair labels.
fn resolve_speaker(raw: &str, names: &BroadcasterNames) -> Result<Speaker, CollaboratorError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("a") || trimmed == names.speaker_a
        || trimmed.eq_ignore_ascii_case("play-by-play")
    {
        return Ok(Speaker::A);
    }
    if trimmed.eq_ignore_ascii_case("b") || trimmed == names.speaker_b
        || trimmed.eq_ignore_ascii_case("analyst")
        || trimmed.eq_ignore_ascii_case("color")
    {
        return Ok(Speaker::B);
    }
    Err(CollaboratorError::Malformed {
        message: format!("unknown speaker {trimmed:?}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Roster post-filter
// ─────────────────────────────────────────────────────────────────────────────

/// Apply the roster lock to every segment.
///
/// Capitalized mid-sentence tokens outside the roster (and the allowed
/// extras) are rewritten to generic roles; runs of adjacent unknown
/// capitalized words collapse into a single role. Segments with more than
/// [`MAX_REWRITES_PER_SEGMENT`] rewrites are dropped.
pub(crate) fn enforce_roster(
    batch: NarrationBatch,
    roster: &RosterLock,
    allowed: &HashSet<String>,
) -> NarrationBatch {
    let mut role_cursor = 0usize;
    let mut kept = Vec::with_capacity(batch.segments.len());

    for mut seg in batch.segments {
        let (text, rewrites) = rewrite_unknown_names(&seg.text, roster, allowed, &mut role_cursor);
        if rewrites > MAX_REWRITES_PER_SEGMENT {
            metrics::counter!("narrate_segments_dropped_total", "reason" => "roster")
                .increment(1);
            warn!(rewrites, "segment dropped: too many out-of-roster names");
            continue;
        }
        if rewrites > 0 {
            metrics::counter!("narrate_roster_rewrites_total").increment(rewrites as u64);
            seg.text = text;
        }
        kept.push(seg);
    }

    NarrationBatch { segments: kept }
}

/// Rewrite out-of-roster capitalized tokens; returns (new text, rewrites).
fn rewrite_unknown_names(
    text: &str,
    roster: &RosterLock,
    allowed: &HashSet<String>,
    role_cursor: &mut usize,
) -> (String, usize) {
    let words = tokenize(text);
    let mut out = String::with_capacity(text.len());
    let mut rewrites = 0usize;
    let mut sentence_start = true;
    let mut i = 0usize;

    while i < words.len() {
        match &words[i] {
            Token::Other(s) => {
                out.push_str(s);
                if s.chars().any(|c| matches!(c, '.' | '!' | '?')) {
                    sentence_start = true;
                }
                i += 1;
            }
            Token::Word(w) => {
                let known = |token: &str| {
                    let canon = token.strip_suffix("'s").unwrap_or(token);
                    canon == "I"
                        || canon.starts_with("I'")
                        || roster.contains(canon)
                        || allowed.contains(canon)
                };

                let is_cap = w.chars().next().is_some_and(char::is_uppercase);
                if !is_cap || sentence_start || known(w) {
                    out.push_str(w);
                    sentence_start = false;
                    i += 1;
                    continue;
                }

                // Two-word roster names ("Sam Reinhart") pass as a unit.
                if let Some(Token::Word(next)) = next_word(&words, i) {
                    let pair = format!("{w} {next}");
                    if known(&pair) {
                        out.push_str(w);
                        out.push(' ');
                        out.push_str(next);
                        sentence_start = false;
                        i = skip_pair(&words, i);
                        continue;
                    }
                }

                // Collapse the whole run of unknown capitalized words.
                let mut run_end = i;
                loop {
                    match next_word(&words, run_end) {
                        Some(Token::Word(next))
                            if next.chars().next().is_some_and(char::is_uppercase)
                                && !known(next) =>
                        {
                            run_end = skip_pair(&words, run_end);
                        }
                        _ => break,
                    }
                }

                out.push_str(ROLE_TOKENS[*role_cursor % ROLE_TOKENS.len()]);
                *role_cursor += 1;
                rewrites += 1;
                sentence_start = false;
                i = run_end + 1;
            }
        }
    }

    (out, rewrites)
}

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Other(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    for c in text.chars() {
        let is_word_char = c.is_alphabetic() || c == '\'' || c == '-';
        if is_word_char != in_word && !current.is_empty() {
            tokens.push(if in_word {
                Token::Word(std::mem::take(&mut current))
            } else {
                Token::Other(std::mem::take(&mut current))
            });
        }
        in_word = is_word_char;
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(if in_word {
            Token::Word(current)
        } else {
            Token::Other(current)
        });
    }
    tokens
}

/// The next word after index `i`, if separated by a single space.
fn next_word(words: &[Token], i: usize) -> Option<&Token> {
    match words.get(i + 1) {
        Some(Token::Other(s)) if s == " " => words.get(i + 2),
        _ => None,
    }
}

/// Index of the word after the single-space-separated pair starting at `i`.
fn skip_pair(_words: &[Token], i: usize) -> usize {
    i + 2
}

// ─────────────────────────────────────────────────────────────────────────────
// Contradiction spot-check
// ─────────────────────────────────────────────────────────────────────────────

/// Indices of segments stating facts that contradict the projection.
pub(crate) fn contradicting_segments(
    batch: &NarrationBatch,
    projection: &BoardProjection,
) -> Vec<usize> {
    batch
        .segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| segment_contradicts(&seg.text, projection))
        .map(|(i, _)| i)
        .collect()
}

fn segment_contradicts(text: &str, projection: &BoardProjection) -> bool {
    let score = projection.score;
    let shots = projection.shots;
    let pair_ok = |(a, b): (u32, u32)| {
        (a, b) == (score.away, score.home)
            || (a, b) == (score.home, score.away)
            || (a, b) == (shots.away, shots.home)
            || (a, b) == (shots.home, shots.away)
    };
    if claimed_pairs(text).into_iter().any(|p| !pair_ok(p)) {
        return true;
    }

    let allowed_ok = |n: u32| {
        n == projection.goalie_away.goals_allowed || n == projection.goalie_home.goals_allowed
    };
    claimed_allowed_counts(text).into_iter().any(|n| !allowed_ok(n))
}

/// Score-like claims in text: `"3-2"` tokens and `"3 to 2"` phrases.
fn claimed_pairs(text: &str) -> Vec<(u32, u32)> {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .collect();
    let mut pairs = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        // "3-2" form: digits, one dash, digits, nothing else.
        if let Some((a, b)) = token.split_once('-') {
            if !a.is_empty()
                && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit())
            {
                if let (Ok(a), Ok(b)) = (a.parse(), b.parse()) {
                    pairs.push((a, b));
                }
            }
        }
        // "3 to 2" form.
        if *token == "to" && i > 0 && i + 1 < tokens.len() {
            if let (Ok(a), Ok(b)) = (tokens[i - 1].parse(), tokens[i + 1].parse()) {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// Numbers adjacent to the word "allowed" (goals-allowed claims).
fn claimed_allowed_counts(text: &str) -> Vec<u32> {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    let mut counts = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.eq_ignore_ascii_case("allowed") {
            if i > 0 {
                if let Ok(n) = tokens[i - 1].parse() {
                    counts.push(n);
                }
            }
            if let Some(next) = tokens.get(i + 1) {
                if let Ok(n) = next.parse() {
                    counts.push(n);
                }
            }
        }
    }
    counts
}

fn drop_segments(batch: NarrationBatch, drop: &[usize]) -> NarrationBatch {
    metrics::counter!("narrate_segments_dropped_total", "reason" => "contradiction")
        .increment(drop.len() as u64);
    NarrationBatch {
        segments: batch
            .segments
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, s)| s)
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
