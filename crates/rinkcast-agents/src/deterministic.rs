//! Degraded-mode generators.
//!
//! When a collaborator fails past its retry budget, the stages substitute
//! deterministic output derived from the Board update so ordering always
//! progresses with a well-formed PipelineOutput. Nothing here consults a
//! model; every string is a template over authoritative state.

use rinkcast_core::{
    BoardProjection, CommentarySegment, Emotion, NarrationBatch, Speaker, StaticContext,
    UpdateReport,
};

use crate::stages::analyze::Analysis;

/// Speaking-rate estimate used when a duration is missing: ~160 wpm.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_speech_seconds(text: &str) -> f32 {
    let words = text.split_whitespace().count().max(1);
    (words as f32 * 0.375).max(0.6)
}

/// Minimal analysis derived from the Board update.
///
/// Momentum: goals dominate, then penalties, then raw event count.
#[must_use]
pub fn fallback_analysis(update: &UpdateReport, projection: &BoardProjection) -> Analysis {
    let mut talking_points = Vec::new();
    let mut flagged_events = Vec::new();

    for goal in &update.new_goals {
        let point = if goal.assists.is_empty() {
            format!("{} scores unassisted", goal.scorer)
        } else {
            format!("{} scores from {}", goal.scorer, goal.assists.join(" and "))
        };
        flagged_events.push(point.clone());
        talking_points.push(point);
    }
    for penalty in &update.new_penalties {
        talking_points.push(format!(
            "{} off for {} ({}m)",
            penalty.player, penalty.infraction, penalty.minutes
        ));
    }
    if update.period_crossed {
        talking_points.push(format!("Period {} underway", projection.period));
    }
    if talking_points.is_empty() {
        talking_points.push(format!(
            "Score {} with shots {}",
            projection.score, projection.shots
        ));
    }

    let momentum = if !update.new_goals.is_empty() {
        0.9
    } else if !update.new_penalties.is_empty() {
        0.6
    } else if update.events_processed > 2 {
        0.4
    } else {
        0.15
    };

    Analysis {
        talking_points,
        momentum,
        flagged_events,
    }
}

/// A neutral analyst line from authoritative counters only.
#[must_use]
pub fn color_line(projection: &BoardProjection, statics: &StaticContext) -> CommentarySegment {
    let text = format!(
        "Shots are {} to {} — {} and {} both looking steady so far.",
        projection.shots.away,
        projection.shots.home,
        statics.away_team,
        statics.home_team,
    );
    CommentarySegment {
        duration_estimate_seconds: estimate_speech_seconds(&text),
        pause_after_seconds: 0.8,
        speaker: Speaker::B,
        emotion: Emotion::Analytical,
        text,
    }
}

/// Deterministic narration for one snapshot.
///
/// Goal and penalty calls when the update carries them, filler otherwise.
/// `participants` are roster-validated names from the current snapshot, used
/// so filler still names somebody on the ice.
#[must_use]
pub fn fallback_narration(
    update: &UpdateReport,
    projection: &BoardProjection,
    statics: &StaticContext,
    participants: &[String],
) -> NarrationBatch {
    let mut segments = Vec::new();

    if let Some(goal) = update.new_goals.last() {
        let team = statics.team(goal.team);
        let call = if goal.assists.is_empty() {
            format!(
                "He scores! {} buries it for {}! That makes it {} {}, {} {}.",
                goal.scorer,
                team,
                statics.away_team,
                projection.score.away,
                statics.home_team,
                projection.score.home,
            )
        } else {
            format!(
                "He scores! {} finishes it off for {}, set up by {}! {} {}, {} {}.",
                goal.scorer,
                team,
                goal.assists.join(" and "),
                statics.away_team,
                projection.score.away,
                statics.home_team,
                projection.score.home,
            )
        };
        segments.push(CommentarySegment {
            duration_estimate_seconds: estimate_speech_seconds(&call),
            pause_after_seconds: 0.6,
            speaker: Speaker::A,
            emotion: Emotion::Goal,
            text: call,
        });

        let goalie = projection.goalie(goal.team.opponent());
        let color = format!(
            "That one goes on the board against {} — {} allowed tonight.",
            goalie.id, goalie.goals_allowed
        );
        segments.push(CommentarySegment {
            duration_estimate_seconds: estimate_speech_seconds(&color),
            pause_after_seconds: 1.0,
            speaker: Speaker::B,
            emotion: Emotion::Analytical,
            text: color,
        });
    } else if let Some(penalty) = update.new_penalties.last() {
        let call = format!(
            "{} is headed to the box — {} minutes for {}.",
            penalty.player, penalty.minutes, penalty.infraction
        );
        segments.push(CommentarySegment {
            duration_estimate_seconds: estimate_speech_seconds(&call),
            pause_after_seconds: 0.5,
            speaker: Speaker::A,
            emotion: Emotion::Penalty,
            text: call,
        });
        let color = format!(
            "Big chance here on the {} — special teams could decide this stretch.",
            projection.situation
        );
        segments.push(CommentarySegment {
            duration_estimate_seconds: estimate_speech_seconds(&color),
            pause_after_seconds: 1.0,
            speaker: Speaker::B,
            emotion: Emotion::Dramatic,
            text: color,
        });
    } else {
        let opener = participants.first().map_or_else(
            || {
                format!(
                    "Play continues here in period {} — {} {}, {} {}.",
                    projection.period,
                    statics.away_team,
                    projection.score.away,
                    statics.home_team,
                    projection.score.home,
                )
            },
            |name| {
                format!(
                    "{} in the middle of things here in period {} as the teams feel each other out.",
                    name, projection.period
                )
            },
        );
        segments.push(CommentarySegment {
            duration_estimate_seconds: estimate_speech_seconds(&opener),
            pause_after_seconds: 0.8,
            speaker: Speaker::A,
            emotion: Emotion::Neutral,
            text: opener,
        });
        segments.push(color_line(projection, statics));
    }

    NarrationBatch { segments }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rinkcast_core::{
        GameSituation, GameTime, GoalRecord, GoalieLine, PenaltyRecord, Player, ScorePair,
        TeamSide,
    };

    fn statics() -> StaticContext {
        StaticContext {
            game_id: "G".into(),
            away_team: "EDM".into(),
            home_team: "FLA".into(),
            venue: String::new(),
            roster_away: vec![Player {
                id: "p1".into(),
                name: "Draisaitl".into(),
            }],
            roster_home: vec![Player {
                id: "p4".into(),
                name: "Barkov".into(),
            }],
            goalie_away: "Skinner".into(),
            goalie_home: "Bobrovsky".into(),
        }
    }

    fn projection(score: ScorePair) -> BoardProjection {
        BoardProjection {
            game_id: "G".into(),
            score,
            shots: ScorePair { away: 4, home: 2 },
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
        }
    }

    fn goal_update() -> UpdateReport {
        let mut update = UpdateReport::default();
        update.new_goals.push(GoalRecord {
            scorer: "Draisaitl".into(),
            team: TeamSide::Away,
            assists: vec!["McDavid".into()],
            game_time: GameTime::new(1, 5, 30),
        });
        update
    }

    #[test]
    fn speech_estimate_scales_with_words() {
        let short = estimate_speech_seconds("Hello there");
        let long = estimate_speech_seconds(
            "This is a much longer line of commentary with many more words in it",
        );
        assert!(long > short);
        assert!(short >= 0.6);
    }

    #[test]
    fn goal_analysis_has_high_momentum() {
        let analysis = fallback_analysis(&goal_update(), &projection(ScorePair { away: 1, home: 0 }));
        assert!(analysis.momentum >= 0.7);
        assert!(analysis.talking_points[0].contains("Draisaitl"));
        assert!(analysis.flagged_events[0].contains("McDavid"));
    }

    #[test]
    fn quiet_analysis_has_low_momentum() {
        let analysis = fallback_analysis(
            &UpdateReport::default(),
            &projection(ScorePair::default()),
        );
        assert!(analysis.momentum <= 0.35);
        assert!(!analysis.talking_points.is_empty());
    }

    #[test]
    fn penalty_analysis_is_mid_momentum() {
        let mut update = UpdateReport::default();
        update.new_penalties.push(PenaltyRecord {
            player: "Barkov".into(),
            team: TeamSide::Home,
            minutes: 2,
            infraction: "hooking".into(),
            start: GameTime::new(1, 3, 0),
        });
        let analysis = fallback_analysis(&update, &projection(ScorePair::default()));
        assert!((0.35..0.7).contains(&analysis.momentum));
        assert!(analysis.talking_points[0].contains("hooking"));
    }

    #[test]
    fn goal_narration_names_scorer_and_true_score() {
        let batch = fallback_narration(
            &goal_update(),
            &projection(ScorePair { away: 1, home: 0 }),
            &statics(),
            &[],
        );
        assert_eq!(batch.segments.len(), 2);
        assert_eq!(batch.segments[0].speaker, Speaker::A);
        assert_eq!(batch.segments[0].emotion, Emotion::Goal);
        assert!(batch.segments[0].text.contains("Draisaitl"));
        assert!(batch.segments[0].text.contains("EDM 1"));
        assert!(batch.segments[0].text.contains("FLA 0"));
        assert!(batch.segments[1].text.contains("Bobrovsky"));
    }

    #[test]
    fn filler_names_a_participant() {
        let batch = fallback_narration(
            &UpdateReport::default(),
            &projection(ScorePair::default()),
            &statics(),
            &["Barkov".to_owned(), "Draisaitl".to_owned()],
        );
        assert_eq!(batch.segments.len(), 2);
        assert!(batch.segments[0].text.contains("Barkov"));
        // Speakers alternate.
        assert_ne!(batch.segments[0].speaker, batch.segments[1].speaker);
    }

    #[test]
    fn filler_without_participants_uses_score_line() {
        let batch = fallback_narration(
            &UpdateReport::default(),
            &projection(ScorePair::default()),
            &statics(),
            &[],
        );
        assert!(batch.segments[0].text.contains("period 1"));
    }

    #[test]
    fn narration_durations_are_positive() {
        let batch = fallback_narration(
            &goal_update(),
            &projection(ScorePair { away: 1, home: 0 }),
            &statics(),
            &[],
        );
        assert!(batch
            .segments
            .iter()
            .all(|s| s.duration_estimate_seconds > 0.0));
    }
}
