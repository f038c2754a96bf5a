//! The deterministic reducer: `reduce(board, snapshot, static) -> report`.
//!
//! Algorithm:
//!
//! 1. Reject snapshots at or before `board.last_game_time` (no state change).
//! 2. Partition activities into new (unseen `event_id`) and seen.
//! 3. Apply new events in the snapshot's given order, except penalties are
//!    applied after everything else so a delayed-call penalty never masks a
//!    simultaneous goal.
//! 4. Validate participants against the roster lock; events naming an
//!    unknown player are dropped with an anomaly, never silently accepted.
//! 5. Counters only move up. Producer counters are hints; regressions are
//!    logged as anomalies and ignored.
//! 6. Recompute the narrative summary from a bounded template.
//!
//! All mutation happens on a scratch copy that is committed only on success,
//! so a failed reduce leaves the board untouched.

use tracing::{debug, warn};

use rinkcast_core::{
    Activity, ActivityKind, Anomaly, GoalRecord, PenaltyRecord, Snapshot, StaticContext,
    UpdateReport,
};
use rinkcast_core::time::Clock;

use crate::board::{Board, ReduceError};
use crate::narrative;

/// Apply one snapshot to the board. See the module docs for the algorithm.
pub fn reduce(
    board: &mut Board,
    snapshot: &Snapshot,
    ctx: &StaticContext,
) -> Result<UpdateReport, ReduceError> {
    if snapshot.game_id != board.game_id {
        return Err(ReduceError::GameMismatch {
            expected: board.game_id.clone(),
            got: snapshot.game_id.clone(),
        });
    }

    if let Some(last) = board.last_game_time {
        if snapshot.game_time <= last {
            return Err(ReduceError::OutOfOrder {
                incoming: snapshot.game_time,
                last,
            });
        }
    }

    // Scratch copy: committed only if the whole reduce succeeds.
    let mut next = board.clone();
    let mut report = UpdateReport::default();
    let roster = ctx.roster_lock();

    // Penalties apply after everything else (goal-before-penalty tie-break);
    // the sort is stable so the given order is otherwise preserved.
    let mut ordered: Vec<&Activity> = snapshot.activities.iter().collect();
    ordered.sort_by_key(|a| usize::from(matches!(a.kind, ActivityKind::Penalty { .. })));

    for activity in ordered {
        if next.processed_event_ids.contains(&activity.event_id) {
            continue;
        }
        let _ = next.processed_event_ids.insert(activity.event_id.clone());

        // Roster lock on ingress: drop events naming unknown players.
        let unknown: Vec<&str> = activity
            .participants()
            .into_iter()
            .filter(|p| !roster.contains(p))
            .collect();
        if let Some(player) = unknown.first() {
            warn!(
                game_id = %next.game_id,
                event_id = %activity.event_id,
                player,
                "activity references player outside roster lock, dropping"
            );
            report.anomalies.push(Anomaly::UnknownPlayer {
                player: (*player).to_owned(),
                event_id: activity.event_id.to_string(),
            });
            continue;
        }

        if let Some(clock) = activity.time_remaining {
            next.time_remaining = clock;
        }

        match &activity.kind {
            ActivityKind::Goal {
                scorer,
                team,
                assists,
            } => {
                *next.score.side_mut(*team) += 1;
                *report.score_delta.side_mut(*team) += 1;
                next.goalie_mut(team.opponent()).goals_allowed += 1;
                let goal = GoalRecord {
                    scorer: scorer.clone(),
                    team: *team,
                    assists: assists.clone(),
                    game_time: snapshot.game_time,
                };
                next.goals.push(goal.clone());
                report.new_goals.push(goal);
            }
            ActivityKind::Shot { team, .. } => {
                *next.shots.side_mut(*team) += 1;
            }
            ActivityKind::Penalty {
                player,
                team,
                minutes,
                infraction,
            } => {
                let penalty = PenaltyRecord {
                    player: player.clone(),
                    team: *team,
                    minutes: *minutes,
                    infraction: infraction.clone(),
                    start: snapshot.game_time,
                };
                next.penalties.push(penalty.clone());
                report.new_penalties.push(penalty);
            }
            ActivityKind::PeriodBoundary { period } => {
                if *period > next.period {
                    next.period = *period;
                    next.time_remaining = Clock::period_start();
                    report.period_crossed = true;
                }
            }
            // Stoppages, face-offs and bare ticks advance the clock only,
            // which already happened above.
            ActivityKind::FaceOff { .. }
            | ActivityKind::Stoppage { .. }
            | ActivityKind::ClockTick => {}
        }
        report.events_processed += 1;
    }

    // The first snapshot of a new period resets the clock even when the
    // boundary event itself was deduplicated.
    if snapshot.game_time.period > next.period {
        next.period = snapshot.game_time.period;
        next.time_remaining = Clock::period_start();
        report.period_crossed = true;
    }

    check_observed_counters(&next, snapshot, &mut report);

    next.last_game_time = Some(snapshot.game_time);
    next.narrative_summary = narrative::build_summary(&next);

    debug!(
        game_id = %next.game_id,
        game_time = %snapshot.game_time,
        events = report.events_processed,
        goals = report.new_goals.len(),
        anomalies = report.anomalies.len(),
        "snapshot reduced"
    );

    *board = next;
    Ok(report)
}

/// Compare the producer's cumulative counters against authoritative state.
///
/// The counters are hints only; a value below the board's is a regression
/// and is recorded as an anomaly. Values above the board's are ignored:
/// the board counts events, not producer totals.
fn check_observed_counters(board: &Board, snapshot: &Snapshot, report: &mut UpdateReport) {
    use rinkcast_core::TeamSide::{Away, Home};

    for (counter, authoritative, observed) in [
        ("score", board.score, snapshot.observed_score),
        ("shots", board.shots, snapshot.observed_shots),
    ] {
        for side in [Away, Home] {
            if observed.side(side) < authoritative.side(side) {
                warn!(
                    game_id = %board.game_id,
                    counter,
                    %side,
                    kept = authoritative.side(side),
                    observed = observed.side(side),
                    "producer counter regressed, ignoring"
                );
                report.anomalies.push(Anomaly::CounterDecrement {
                    counter: counter.to_owned(),
                    side,
                    kept: authoritative.side(side),
                    observed: observed.side(side),
                });
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rinkcast_core::{GameTime, Player, ScorePair, TeamSide};

    fn ctx() -> StaticContext {
        StaticContext {
            game_id: "GAME".into(),
            away_team: "EDM".into(),
            home_team: "FLA".into(),
            venue: String::new(),
            roster_away: vec![
                Player {
                    id: "p1".into(),
                    name: "Draisaitl".into(),
                },
                Player {
                    id: "p2".into(),
                    name: "McDavid".into(),
                },
                Player {
                    id: "p3".into(),
                    name: "Ekholm".into(),
                },
            ],
            roster_home: vec![Player {
                id: "p4".into(),
                name: "Barkov".into(),
            }],
            goalie_away: "Skinner".into(),
            goalie_home: "Bobrovsky".into(),
        }
    }

    fn activity(event_id: &str, kind: ActivityKind) -> Activity {
        Activity {
            event_id: event_id.into(),
            time_remaining: None,
            kind,
        }
    }

    fn snapshot(time: GameTime, activities: Vec<Activity>) -> Snapshot {
        let observed_score = ScorePair::default();
        Snapshot {
            game_id: "GAME".into(),
            game_time: time,
            wall_time_received: chrono::Utc::now(),
            activities,
            observed_score,
            observed_shots: ScorePair::default(),
        }
    }

    fn goal(event_id: &str) -> Activity {
        activity(
            event_id,
            ActivityKind::Goal {
                scorer: "Draisaitl".into(),
                team: TeamSide::Away,
                assists: vec!["McDavid".into()],
            },
        )
    }

    #[test]
    fn first_goal_updates_everything() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap = snapshot(
            GameTime::new(1, 5, 30),
            vec![
                activity(
                    "shot-1",
                    ActivityKind::Shot {
                        shooter: "Draisaitl".into(),
                        team: TeamSide::Away,
                    },
                ),
                goal("goal-1"),
            ],
        );

        let report = board.reduce(&snap, &ctx).unwrap();

        assert_eq!(board.score, ScorePair { away: 1, home: 0 });
        assert_eq!(board.shots, ScorePair { away: 1, home: 0 });
        assert_eq!(board.goalie_home.goals_allowed, 1);
        assert_eq!(board.goalie_away.goals_allowed, 0);
        assert_eq!(board.goals.len(), 1);
        assert_eq!(board.goals[0].scorer, "Draisaitl");
        assert_eq!(board.goals[0].assists, vec!["McDavid".to_owned()]);
        assert_eq!(report.new_goals.len(), 1);
        assert_eq!(report.score_delta, ScorePair { away: 1, home: 0 });
        assert!(report.is_major());
        assert_eq!(board.last_game_time, Some(GameTime::new(1, 5, 30)));
    }

    #[test]
    fn duplicate_event_id_counts_once() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);

        let snap1 = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-1")]);
        let _ = board.reduce(&snap1, &ctx).unwrap();

        // Same event id re-delivered in a later snapshot
        let snap2 = snapshot(GameTime::new(1, 5, 35), vec![goal("goal-1")]);
        let report = board.reduce(&snap2, &ctx).unwrap();

        assert_eq!(board.score.away, 1);
        assert_eq!(board.goalie_home.goals_allowed, 1);
        assert_eq!(report.events_processed, 0);
        assert!(report.new_goals.is_empty());
        // Clock position still advances
        assert_eq!(board.last_game_time, Some(GameTime::new(1, 5, 35)));
    }

    #[test]
    fn out_of_order_is_rejected_without_change() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap1 = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-1")]);
        let _ = board.reduce(&snap1, &ctx).unwrap();
        let before = board.clone();

        let stale = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-2")]);
        let err = board.reduce(&stale, &ctx).unwrap_err();
        assert!(matches!(err, ReduceError::OutOfOrder { .. }));
        assert_eq!(board, before);

        let earlier = snapshot(GameTime::new(1, 0, 0), vec![]);
        assert!(board.reduce(&earlier, &ctx).is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn reduce_is_idempotent() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-1")]);

        let _ = board.reduce(&snap, &ctx).unwrap();
        let once = board.clone();

        // Second application is rejected as out-of-order; state unchanged.
        let _ = board.reduce(&snap, &ctx);
        assert_eq!(board, once);
    }

    #[test]
    fn wrong_game_is_rejected() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let mut snap = snapshot(GameTime::new(1, 0, 5), vec![]);
        snap.game_id = "OTHER".into();
        assert!(matches!(
            board.reduce(&snap, &ctx),
            Err(ReduceError::GameMismatch { .. })
        ));
    }

    #[test]
    fn unknown_player_event_is_dropped_with_anomaly() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap = snapshot(
            GameTime::new(1, 2, 0),
            vec![activity(
                "goal-x",
                ActivityKind::Goal {
                    scorer: "Gretzky".into(),
                    team: TeamSide::Away,
                    assists: vec![],
                },
            )],
        );

        let report = board.reduce(&snap, &ctx).unwrap();
        assert_eq!(board.score.away, 0);
        assert!(board.goals.is_empty());
        assert_eq!(report.anomalies.len(), 1);
        assert!(matches!(
            &report.anomalies[0],
            Anomaly::UnknownPlayer { player, .. } if player == "Gretzky"
        ));
    }

    #[test]
    fn goal_applies_before_simultaneous_penalty() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        // Penalty listed before the goal in the producer's order.
        let snap = snapshot(
            GameTime::new(1, 8, 0),
            vec![
                activity(
                    "pen-1",
                    ActivityKind::Penalty {
                        player: "Barkov".into(),
                        team: TeamSide::Home,
                        minutes: 2,
                        infraction: "slashing".into(),
                    },
                ),
                goal("goal-1"),
            ],
        );

        let report = board.reduce(&snap, &ctx).unwrap();
        assert_eq!(board.score.away, 1, "delayed-call penalty must not mask the goal");
        assert_eq!(report.new_goals.len(), 1);
        assert_eq!(report.new_penalties.len(), 1);
    }

    #[test]
    fn period_boundary_resets_clock_and_keeps_counters() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap1 = snapshot(
            GameTime::new(1, 10, 0),
            vec![
                goal("goal-1"),
                activity(
                    "shot-1",
                    ActivityKind::Shot {
                        shooter: "Barkov".into(),
                        team: TeamSide::Home,
                    },
                ),
            ],
        );
        let _ = board.reduce(&snap1, &ctx).unwrap();

        let snap2 = snapshot(
            GameTime::new(2, 0, 0),
            vec![activity("pb-2", ActivityKind::PeriodBoundary { period: 2 })],
        );
        let report = board.reduce(&snap2, &ctx).unwrap();

        assert!(report.period_crossed);
        assert_eq!(board.period, 2);
        assert_eq!(board.time_remaining, Clock::period_start());
        assert_eq!(board.score.away, 1);
        assert_eq!(board.shots.home, 1);
    }

    #[test]
    fn period_crossing_inferred_from_game_time() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        // No explicit boundary event, the coordinate alone crosses.
        let snap = snapshot(GameTime::new(2, 0, 5), vec![]);
        let report = board.reduce(&snap, &ctx).unwrap();
        assert!(report.period_crossed);
        assert_eq!(board.period, 2);
        assert_eq!(board.time_remaining, Clock::period_start());
    }

    #[test]
    fn overtime_is_period_four() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap = snapshot(
            GameTime::new(4, 1, 0),
            vec![activity("pb-4", ActivityKind::PeriodBoundary { period: 4 })],
        );
        let _ = board.reduce(&snap, &ctx).unwrap();
        assert_eq!(board.period, 4);
    }

    #[test]
    fn observed_score_regression_logged_and_ignored() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let snap1 = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-1")]);
        let _ = board.reduce(&snap1, &ctx).unwrap();

        // Producer claims 0-0 after the goal was recorded.
        let mut snap2 = snapshot(GameTime::new(1, 5, 35), vec![]);
        snap2.observed_score = ScorePair { away: 0, home: 0 };
        let report = board.reduce(&snap2, &ctx).unwrap();

        assert_eq!(board.score.away, 1, "board score is authoritative");
        assert!(report
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::CounterDecrement { counter, .. } if counter == "score")));
    }

    #[test]
    fn observed_counters_never_inflate_board() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let mut snap = snapshot(GameTime::new(1, 0, 5), vec![]);
        snap.observed_score = ScorePair { away: 3, home: 2 };
        snap.observed_shots = ScorePair { away: 9, home: 8 };
        let report = board.reduce(&snap, &ctx).unwrap();
        assert_eq!(board.score, ScorePair::default());
        assert_eq!(board.shots, ScorePair::default());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn clock_follows_activity_time_remaining() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let mut faceoff = activity(
            "fo-1",
            ActivityKind::FaceOff {
                away_player: "Draisaitl".into(),
                home_player: "Barkov".into(),
            },
        );
        faceoff.time_remaining = Some("14:27".parse().unwrap());
        let snap = snapshot(GameTime::new(1, 5, 33), vec![faceoff]);
        let _ = board.reduce(&snap, &ctx).unwrap();
        assert_eq!(board.time_remaining.to_string(), "14:27");
    }

    #[test]
    fn goalie_consistency_over_many_goals() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        for (i, side) in [TeamSide::Away, TeamSide::Home, TeamSide::Away]
            .into_iter()
            .enumerate()
        {
            let scorer = if side == TeamSide::Away {
                "Draisaitl"
            } else {
                "Barkov"
            };
            let snap = snapshot(
                GameTime::new(1, 2 + i as u8, 0),
                vec![activity(
                    &format!("goal-{i}"),
                    ActivityKind::Goal {
                        scorer: scorer.into(),
                        team: side,
                        assists: vec![],
                    },
                )],
            );
            let _ = board.reduce(&snap, &ctx).unwrap();
        }
        // Goals against a side equal that side's goalie goals_allowed.
        assert_eq!(board.goalie_home.goals_allowed, board.score.away);
        assert_eq!(board.goalie_away.goals_allowed, board.score.home);
    }

    #[test]
    fn summary_is_recomputed_and_bounded() {
        let ctx = ctx();
        let mut board = Board::load(&ctx);
        let initial = board.narrative_summary.clone();
        let snap = snapshot(GameTime::new(1, 5, 30), vec![goal("goal-1")]);
        let _ = board.reduce(&snap, &ctx).unwrap();
        assert_ne!(board.narrative_summary, initial);
        assert!(board.narrative_summary.chars().count() <= crate::NARRATIVE_SUMMARY_MAX_CHARS);
        assert!(board.narrative_summary.contains("Draisaitl"));
    }
}
