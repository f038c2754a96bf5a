//! The ordering queue.
//!
//! Stage workers finish out of game-time order; this queue releases their
//! outputs in strict ascending order. Slots are registered when a
//! snapshot's orchestration begins, so the queue always knows the next
//! expected coordinate. A failed or stuck slot cannot stall the stream past
//! the bounded wait: once a later slot is registered or the skip deadline
//! elapses, an explicit skip marker is emitted in its place.
//!
//! Exactly-once across restarts: anything at or below the construction-time
//! watermark is refused, and the watermark advances with every emission.

use std::collections::BTreeMap;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use rinkcast_core::{GameId, GameTime, PipelineOutput};

/// Events released by the queue, already in game-time order.
#[derive(Debug)]
pub enum OutputEvent {
    /// A completed snapshot's output.
    Output(Box<PipelineOutput>),
    /// A deliberately omitted coordinate.
    Skip {
        /// Game.
        game_id: GameId,
        /// The omitted coordinate.
        game_time: GameTime,
        /// Why it was skipped.
        reason: String,
    },
    /// End of the game stream.
    End {
        /// Game.
        game_id: GameId,
    },
}

enum Slot {
    Pending { deadline: Instant },
    Done(Box<PipelineOutput>),
    Failed { reason: String },
}

struct QueueState {
    slots: BTreeMap<GameTime, Slot>,
    watermark: Option<GameTime>,
    next_sequence: u64,
    closed: bool,
}

/// In-order release buffer for one game.
pub struct OrderingQueue {
    game_id: GameId,
    skip_after: Duration,
    tx: mpsc::Sender<OutputEvent>,
    state: Mutex<QueueState>,
}

impl OrderingQueue {
    /// Create a queue emitting on `tx`, resuming above `watermark`.
    #[must_use]
    pub fn new(
        game_id: GameId,
        skip_after: Duration,
        watermark: Option<GameTime>,
        tx: mpsc::Sender<OutputEvent>,
    ) -> Self {
        Self {
            game_id,
            skip_after,
            tx,
            state: Mutex::new(QueueState {
                slots: BTreeMap::new(),
                watermark,
                next_sequence: 0,
                closed: false,
            }),
        }
    }

    /// Register a coordinate whose orchestration has begun.
    ///
    /// Registration both reserves the slot and lets the expected pointer
    /// advance past earlier failed slots.
    pub async fn register(&self, game_time: GameTime) {
        let mut state = self.state.lock().await;
        if state.closed || at_or_below_watermark(&state, game_time) {
            return;
        }
        let deadline = Instant::now() + self.skip_after;
        let _ = state
            .slots
            .entry(game_time)
            .or_insert(Slot::Pending { deadline });
        self.drain(&mut state).await;
    }

    /// Submit a completed output.
    pub async fn submit(&self, output: PipelineOutput) {
        let mut state = self.state.lock().await;
        if state.closed || at_or_below_watermark(&state, output.game_time) {
            warn!(game_time = %output.game_time, "dropping output at or below watermark");
            return;
        }
        let game_time = output.game_time;
        if state.slots.keys().next() != Some(&game_time) {
            // Completed ahead of an earlier snapshot: it waits its turn.
            metrics::counter!("ordering_pending_waits_total").increment(1);
            debug!(game_time = %game_time, "output pending behind earlier slot");
        }
        let _ = state.slots.insert(game_time, Slot::Done(Box::new(output)));
        self.drain(&mut state).await;
    }

    /// Mark a coordinate as failed; a skip marker takes its place.
    pub async fn fail(&self, game_time: GameTime, reason: impl Into<String>) {
        let mut state = self.state.lock().await;
        if state.closed || at_or_below_watermark(&state, game_time) {
            return;
        }
        let _ = state.slots.insert(
            game_time,
            Slot::Failed {
                reason: reason.into(),
            },
        );
        self.drain(&mut state).await;
    }

    /// Advance past any expired head slots. Call periodically.
    pub async fn tick(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            self.drain(&mut state).await;
        }
    }

    /// Drain remaining completed outputs in order, skip the failed, then
    /// signal end. Unfinished pending slots are dropped.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        let slots = std::mem::take(&mut state.slots);
        for (game_time, slot) in slots {
            match slot {
                Slot::Done(output) => {
                    self.emit_output(&mut state, game_time, output).await;
                }
                Slot::Failed { reason } => {
                    self.emit_skip(&mut state, game_time, reason).await;
                }
                Slot::Pending { .. } => {
                    debug!(game_time = %game_time, "dropping unfinished slot at close");
                }
            }
        }

        let _ = self
            .tx
            .send(OutputEvent::End {
                game_id: self.game_id.clone(),
            })
            .await;
    }

    /// The last emitted coordinate.
    pub async fn watermark(&self) -> Option<GameTime> {
        self.state.lock().await.watermark
    }

    /// Release everything at the head that is ready, failed-and-passable,
    /// or expired.
    async fn drain(&self, state: &mut QueueState) {
        loop {
            let Some(&head) = state.slots.keys().next() else {
                return;
            };
            let releasable = match state.slots.get(&head) {
                Some(Slot::Done(_)) => true,
                // A failed head advances once a later slot is registered.
                Some(Slot::Failed { .. }) => state.slots.len() > 1,
                Some(Slot::Pending { deadline }) => Instant::now() >= *deadline,
                None => return,
            };
            if !releasable {
                return;
            }
            match state.slots.remove(&head) {
                Some(Slot::Done(output)) => {
                    self.emit_output(state, head, output).await;
                }
                Some(Slot::Failed { reason }) => {
                    self.emit_skip(state, head, reason).await;
                }
                Some(Slot::Pending { .. }) => {
                    self.emit_skip(state, head, "stage deadline exceeded".into())
                        .await;
                }
                None => return,
            }
        }
    }

    async fn emit_output(
        &self,
        state: &mut QueueState,
        game_time: GameTime,
        mut output: Box<PipelineOutput>,
    ) {
        output.sequence_number = state.next_sequence;
        state.next_sequence += 1;
        state.watermark = Some(game_time);
        let _ = self.tx.send(OutputEvent::Output(output)).await;
    }

    async fn emit_skip(&self, state: &mut QueueState, game_time: GameTime, reason: String) {
        state.watermark = Some(game_time);
        metrics::counter!("ordering_skips_total").increment(1);
        warn!(game_time = %game_time, reason, "emitting skip marker");
        let _ = self
            .tx
            .send(OutputEvent::Skip {
                game_id: self.game_id.clone(),
                game_time,
                reason,
            })
            .await;
    }
}

fn at_or_below_watermark(state: &QueueState, game_time: GameTime) -> bool {
    state.watermark.is_some_and(|w| game_time <= w)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rinkcast_core::{
        BoardProjection, GameSituation, GoalieLine, NarrationBatch, ScorePair,
    };

    fn output(t: GameTime) -> PipelineOutput {
        PipelineOutput {
            game_id: "G".into(),
            game_time: t,
            narration: NarrationBatch::default(),
            audio: vec![],
            board_projection: BoardProjection {
                game_id: "G".into(),
                score: ScorePair::default(),
                shots: ScorePair::default(),
                period: 1,
                time_remaining: "20:00".parse().unwrap(),
                situation: GameSituation::EvenStrength,
                goals: vec![],
                active_penalties: vec![],
                goalie_away: GoalieLine {
                    id: "Skinner".into(),
                    goals_allowed: 0,
                },
                goalie_home: GoalieLine {
                    id: "Bobrovsky".into(),
                    goals_allowed: 0,
                },
                last_game_time: Some(t),
            },
            sequence_number: 0,
        }
    }

    fn queue(skip_after_ms: u64) -> (OrderingQueue, mpsc::Receiver<OutputEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            OrderingQueue::new("G".into(), Duration::from_millis(skip_after_ms), None, tx),
            rx,
        )
    }

    fn t(period: u32, minute: u8, second: u8) -> GameTime {
        GameTime::new(period, minute, second)
    }

    async fn recv(rx: &mut mpsc::Receiver<OutputEvent>) -> OutputEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    fn expect_output(event: OutputEvent) -> PipelineOutput {
        match event {
            OutputEvent::Output(o) => *o,
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_order_submissions_flow_through() {
        let (q, mut rx) = queue(10_000);
        q.register(t(1, 0, 0)).await;
        q.submit(output(t(1, 0, 0))).await;
        q.register(t(1, 0, 5)).await;
        q.submit(output(t(1, 0, 5))).await;

        let a = expect_output(recv(&mut rx).await);
        let b = expect_output(recv(&mut rx).await);
        assert_eq!(a.game_time, t(1, 0, 0));
        assert_eq!(b.game_time, t(1, 0, 5));
        assert_eq!(a.sequence_number, 0);
        assert_eq!(b.sequence_number, 1);
    }

    #[tokio::test]
    async fn later_completion_waits_for_earlier() {
        // Scenario: T2 finishes first while T1's synthesis is slow.
        let (q, mut rx) = queue(10_000);
        q.register(t(1, 0, 15)).await;
        q.register(t(1, 0, 30)).await;

        q.submit(output(t(1, 0, 30))).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(80), rx.recv())
                .await
                .is_err(),
            "T2 must be withheld until T1 completes"
        );

        q.submit(output(t(1, 0, 15))).await;
        assert_eq!(expect_output(recv(&mut rx).await).game_time, t(1, 0, 15));
        assert_eq!(expect_output(recv(&mut rx).await).game_time, t(1, 0, 30));
    }

    #[tokio::test]
    async fn failed_slot_skipped_when_successor_registers() {
        let (q, mut rx) = queue(60_000);
        q.register(t(1, 0, 0)).await;
        q.fail(t(1, 0, 0), "poison snapshot").await;

        // Not released yet: no successor and no timeout.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );

        q.register(t(1, 0, 5)).await;
        match recv(&mut rx).await {
            OutputEvent::Skip {
                game_time, reason, ..
            } => {
                assert_eq!(game_time, t(1, 0, 0));
                assert!(reason.contains("poison"));
            }
            other => panic!("expected skip, got {other:?}"),
        }

        q.submit(output(t(1, 0, 5))).await;
        assert_eq!(expect_output(recv(&mut rx).await).game_time, t(1, 0, 5));
    }

    #[tokio::test]
    async fn stuck_slot_skipped_after_deadline() {
        let (q, mut rx) = queue(50);
        q.register(t(1, 0, 0)).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        q.tick().await;

        match recv(&mut rx).await {
            OutputEvent::Skip { game_time, .. } => assert_eq!(game_time, t(1, 0, 0)),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_output_after_skip_is_dropped() {
        let (q, mut rx) = queue(50);
        q.register(t(1, 0, 0)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        q.tick().await;
        let _ = recv(&mut rx).await; // the skip

        // The straggler finally completes; exactly-once forbids emitting it.
        q.submit(output(t(1, 0, 0))).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(80), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn close_drains_in_order_then_ends() {
        let (q, mut rx) = queue(60_000);
        q.register(t(1, 0, 0)).await;
        q.register(t(1, 0, 5)).await;
        q.register(t(1, 0, 10)).await;
        q.submit(output(t(1, 0, 5))).await;
        q.submit(output(t(1, 0, 0))).await;
        // t=0 and t=5 flow out immediately.
        let _ = recv(&mut rx).await;
        let _ = recv(&mut rx).await;

        q.fail(t(1, 0, 10), "stage failed").await;
        q.close().await;

        match recv(&mut rx).await {
            OutputEvent::Skip { game_time, .. } => assert_eq!(game_time, t(1, 0, 10)),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(matches!(recv(&mut rx).await, OutputEvent::End { .. }));
    }

    #[tokio::test]
    async fn resumed_queue_refuses_old_coordinates() {
        let (tx, mut rx) = mpsc::channel(8);
        let q = OrderingQueue::new(
            "G".into(),
            Duration::from_secs(10),
            Some(t(1, 0, 30)),
            tx,
        );

        q.register(t(1, 0, 15)).await;
        q.submit(output(t(1, 0, 15))).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(80), rx.recv())
                .await
                .is_err(),
            "outputs at or below the watermark must never re-emit"
        );

        q.register(t(1, 0, 35)).await;
        q.submit(output(t(1, 0, 35))).await;
        assert_eq!(expect_output(recv(&mut rx).await).game_time, t(1, 0, 35));
    }

    #[tokio::test]
    async fn watermark_tracks_emissions() {
        let (q, mut rx) = queue(10_000);
        assert_eq!(q.watermark().await, None);
        q.register(t(1, 0, 0)).await;
        q.submit(output(t(1, 0, 0))).await;
        let _ = recv(&mut rx).await;
        assert_eq!(q.watermark().await, Some(t(1, 0, 0)));
    }

    #[tokio::test]
    async fn sequence_numbers_are_contiguous_across_skips() {
        let (q, mut rx) = queue(60_000);
        q.register(t(1, 0, 0)).await;
        q.register(t(1, 0, 5)).await;
        q.fail(t(1, 0, 0), "boom").await;
        q.submit(output(t(1, 0, 5))).await;

        let _ = recv(&mut rx).await; // skip for t0
        let out = expect_output(recv(&mut rx).await);
        assert_eq!(out.sequence_number, 0, "skips do not consume sequence numbers");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (q, mut rx) = queue(10);
        q.close().await;
        q.close().await;
        assert!(matches!(recv(&mut rx).await, OutputEvent::End { .. }));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }
}
