//! The stage orchestrator for one game.
//!
//! Actor layout (one set per game):
//!
//! - the **watcher** task produces snapshot arrivals
//! - the **reducer** loop (this module's main task) is the single writer
//!   over the Board; it reduces serially, registers the coordinate with the
//!   ordering queue, then hands a worker the immutable projection
//! - **stage workers** (bounded pool) run Analyze → Narrate → Synthesize
//!   concurrently across snapshots, sequentially within one
//! - the **ordering queue** releases completions in game-time order; a
//!   forwarding task persists the watermark on every emission
//!
//! No stage ever holds the Board: workers only see a projection taken by
//! value before they start. Cancellation is cooperative with a bounded
//! drain grace so committed work still emits in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rinkcast_agents::{
    AnalyzeStage, BroadcasterNames, ContextManager, ContextPolicy, LanguageCollaborator,
    NarrateInputs, NarrateStage, NarrateThresholds, RetryKernel, SessionManager, SessionSeed,
    SpeechCollaborator, Stage, SynthesizeStage,
};
use rinkcast_agents::context::render_state_block;
use rinkcast_board::{Board, ReduceError};
use rinkcast_core::retry::RetryConfig;
use rinkcast_core::{GameId, PipelineOutput, Snapshot, StaticContext};
use rinkcast_settings::RinkcastSettings;

use crate::ordering::{OrderingQueue, OutputEvent};
use crate::persistence::{GameStore, StoreError};
use crate::stats::PipelineStats;
use crate::watcher::{self, WatcherConfig};

/// Configuration for one game run.
#[derive(Clone, Debug)]
pub struct GameRunConfig {
    /// Global settings tree.
    pub settings: RinkcastSettings,
    /// Watcher tuning (tests shorten the poll interval).
    pub watcher: WatcherConfig,
}

impl GameRunConfig {
    /// Production configuration from settings alone.
    #[must_use]
    pub fn new(settings: RinkcastSettings) -> Self {
        Self {
            settings,
            watcher: WatcherConfig::default(),
        }
    }
}

/// A running game pipeline.
pub struct GameRun {
    /// In-order output events, watermark already persisted.
    pub outputs: mpsc::Receiver<OutputEvent>,
    /// Live counters.
    pub stats: Arc<PipelineStats>,
    /// The reducer task; completes after `End` is emitted.
    pub task: JoinHandle<()>,
}

/// Start the pipeline for one game.
///
/// Recovers persisted state first: a restored Board resumes reducing, and
/// the persisted watermark guarantees nothing at or below it is ever
/// emitted again.
pub async fn run_game(
    game_id: GameId,
    statics: StaticContext,
    ingest_dir: PathBuf,
    store: GameStore,
    llm: Arc<dyn LanguageCollaborator>,
    tts: Arc<dyn SpeechCollaborator>,
    config: GameRunConfig,
    cancel: CancellationToken,
) -> Result<GameRun, StoreError> {
    let pipeline = &config.settings.pipeline;

    // ── Recovery ────────────────────────────────────────────────────
    let recovered = store.load_recovery().await?;
    let (board, watermark) = match recovered {
        Some(state) => {
            let board = state
                .board_bytes
                .as_deref()
                .and_then(|bytes| match Board::restore(bytes) {
                    Ok(board) => Some(board),
                    Err(err) => {
                        warn!(error = %err, "persisted board unreadable, starting fresh");
                        None
                    }
                })
                .unwrap_or_else(|| Board::load(&statics));
            (board, state.watermark)
        }
        None => (Board::load(&statics), None),
    };
    store.write_static(&statics).await?;

    // ── Plumbing ────────────────────────────────────────────────────
    let skip_after = Duration::from_millis(pipeline.skip_after_ms());
    let (queue_tx, queue_rx) = mpsc::channel(64);
    let (out_tx, out_rx) = mpsc::channel(64);
    let ordering = Arc::new(OrderingQueue::new(
        game_id.clone(),
        skip_after,
        watermark,
        queue_tx,
    ));
    let stats = Arc::new(PipelineStats::new());

    // Watermark persistence sits between the queue and subscribers so a
    // crash never re-emits something a subscriber already saw.
    let _forward = tokio::spawn(forward_outputs(
        queue_rx,
        out_tx,
        store.clone(),
        stats.clone(),
    ));

    // Periodic tick so stuck slots hit their skip deadline.
    let tick_stop = CancellationToken::new();
    let _tick = tokio::spawn(tick_queue(
        ordering.clone(),
        skip_after / 2,
        tick_stop.clone(),
    ));

    let watcher_cancel = cancel.child_token();
    let arrivals = watcher::watch(
        ingest_dir,
        game_id.clone(),
        config.watcher.clone(),
        watcher_cancel.clone(),
    );

    let task = tokio::spawn(reducer_loop(ReducerContext {
        game_id,
        board,
        statics: Arc::new(statics),
        store,
        ordering,
        stats: stats.clone(),
        llm,
        tts,
        config,
        cancel,
        watcher_cancel,
        tick_stop,
        arrivals,
    }));

    Ok(GameRun {
        outputs: out_rx,
        stats,
        task,
    })
}

/// Everything the reducer loop owns.
struct ReducerContext {
    game_id: GameId,
    board: Board,
    statics: Arc<StaticContext>,
    store: GameStore,
    ordering: Arc<OrderingQueue>,
    stats: Arc<PipelineStats>,
    llm: Arc<dyn LanguageCollaborator>,
    tts: Arc<dyn SpeechCollaborator>,
    config: GameRunConfig,
    cancel: CancellationToken,
    watcher_cancel: CancellationToken,
    tick_stop: CancellationToken,
    arrivals: mpsc::Receiver<watcher::SnapshotArrival>,
}

#[allow(clippy::too_many_lines)]
async fn reducer_loop(mut ctx: ReducerContext) {
    let pipeline = ctx.config.settings.pipeline.clone();
    let broadcasters = BroadcasterNames {
        speaker_a: ctx.config.settings.broadcasters.speaker_a_name.clone(),
        speaker_b: ctx.config.settings.broadcasters.speaker_b_name.clone(),
    };

    let context_manager = Arc::new(ContextManager::new(
        ContextPolicy {
            soft_tokens: pipeline.context_soft_tokens,
            hard_tokens: pipeline.context_hard_tokens,
            refresh_every_n_snapshots: pipeline.refresh_every_n_snapshots,
        },
        broadcasters.clone(),
    ));
    let sessions = Arc::new(SessionManager::new());

    let kernel = RetryKernel::new(RetryConfig::default()).with_cancel_token(ctx.cancel.clone());
    let llm_timeout = Duration::from_millis(pipeline.llm_timeout_ms);
    let tts_timeout = Duration::from_millis(pipeline.tts_timeout_ms);

    let analyze = Arc::new(AnalyzeStage::new(
        ctx.llm.clone(),
        kernel.clone(),
        llm_timeout,
    ));
    let narrate = Arc::new(NarrateStage::new(
        ctx.llm.clone(),
        kernel.clone(),
        llm_timeout,
        broadcasters,
        NarrateThresholds {
            low_max: pipeline.momentum_low_max,
            high_min: pipeline.momentum_high_min,
        },
    ));
    let synthesize = Arc::new(SynthesizeStage::new(
        ctx.tts.clone(),
        kernel,
        tts_timeout,
        ctx.config.settings.broadcasters.language.clone(),
    ));

    let pool = Arc::new(Semaphore::new(pipeline.stage_pool_size));
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let quiet = Duration::from_secs(pipeline.end_of_game_quiet_secs);
    let roster = ctx.statics.roster_lock();

    info!(game_id = %ctx.game_id, "pipeline started");

    loop {
        let arrival = tokio::select! {
            () = ctx.cancel.cancelled() => {
                info!(game_id = %ctx.game_id, "pipeline cancelled, draining");
                break;
            }
            recv = tokio::time::timeout(quiet, ctx.arrivals.recv()) => match recv {
                Ok(Some(arrival)) => arrival,
                Ok(None) => {
                    info!(game_id = %ctx.game_id, "snapshot stream closed");
                    break;
                }
                Err(_) => {
                    if ctx.stats.snapshot().snapshots_reduced > 0 {
                        info!(game_id = %ctx.game_id, "quiet period elapsed, ending game");
                        break;
                    }
                    continue; // still waiting for the first snapshot
                }
            },
        };

        // Resume tail: skip anything a previous run already emitted.
        if let Some(w) = ctx.ordering.watermark().await {
            if arrival.game_time <= w {
                debug!(game_time = %arrival.game_time, "below watermark, skipping");
                continue;
            }
        }

        // Read and validate the snapshot on ingress.
        let bytes = match tokio::fs::read(&arrival.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = ?arrival.path, error = %err, "snapshot unreadable, skipping");
                continue;
            }
        };
        let mut snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = ?arrival.path, error = %err, "snapshot payload invalid, quarantining");
                ctx.stats.record_poison();
                ctx.ordering.register(arrival.game_time).await;
                ctx.ordering
                    .fail(arrival.game_time, format!("unparseable snapshot: {err}"))
                    .await;
                if let Err(err) = ctx.store.quarantine(&arrival.path).await {
                    warn!(error = %err, "quarantine failed");
                }
                continue;
            }
        };
        // The filename is canonical for ordering.
        snapshot.game_time = arrival.game_time;
        snapshot.wall_time_received = arrival.wall_time;

        // Single-writer reduce.
        let update = match ctx.board.reduce(&snapshot, &ctx.statics) {
            Ok(update) => update,
            Err(err @ ReduceError::OutOfOrder { .. }) => {
                debug!(error = %err, "duplicate or stale snapshot, ignoring");
                continue;
            }
            Err(err) => {
                warn!(error = %err, "reduce failed, quarantining snapshot");
                ctx.stats.record_poison();
                ctx.ordering.register(arrival.game_time).await;
                ctx.ordering
                    .fail(arrival.game_time, format!("reduce failed: {err}"))
                    .await;
                if let Err(err) = ctx.store.quarantine(&arrival.path).await {
                    warn!(error = %err, "quarantine failed");
                }
                continue;
            }
        };
        ctx.stats.record_reduce(update.anomalies.len());

        // Persist the board after every successful reduce.
        let board_bytes = match ctx.board.snapshot_state() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, "board serialization failed");
                ctx.cancel.cancel();
                break;
            }
        };
        if let Err(err) = ctx.store.write_board(&board_bytes, snapshot.game_time).await {
            error!(error = %err, "board persistence failed, stopping pipeline");
            ctx.cancel.cancel();
            break;
        }

        let projection = ctx.board.project();
        let summary = ctx.board.narrative_summary().to_owned();

        ctx.ordering.register(snapshot.game_time).await;

        // Adaptive refresh before the stage calls; invisible to in-flight
        // work because sessions are immutable handles.
        for stage in [Stage::Analyze, Stage::Narrate] {
            let seed_projection = projection.clone();
            let seed_summary = summary.clone();
            let statics = ctx.statics.clone();
            let manager = context_manager.clone();
            let _ = sessions.maybe_refresh(stage, &context_manager, &update, move || SessionSeed {
                preamble: manager.stage_preamble(stage),
                state_block: render_state_block(&seed_projection, &statics),
                narrative_summary: seed_summary.clone(),
            });
            sessions.note_snapshot(stage);
        }

        // Roster-valid participants give degraded filler something to name.
        let mut participants: Vec<String> = snapshot
            .activities
            .iter()
            .flat_map(|a| a.participants())
            .filter(|p| roster.contains(p))
            .map(str::to_owned)
            .collect();
        participants.dedup();

        // Hand off to a stage worker.
        let permit = match pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // pool closed during shutdown
        };
        let worker = StageWorker {
            snapshot,
            update,
            projection,
            summary,
            participants,
            statics: ctx.statics.clone(),
            context_manager: context_manager.clone(),
            sessions: sessions.clone(),
            analyze: analyze.clone(),
            narrate: narrate.clone(),
            synthesize: synthesize.clone(),
            store: ctx.store.clone(),
            ordering: ctx.ordering.clone(),
            cancel: ctx.cancel.clone(),
        };
        workers.push(tokio::spawn(async move {
            worker.run().await;
            drop(permit);
        }));
        workers.retain(|w| !w.is_finished());
    }

    // ── Drain ───────────────────────────────────────────────────────
    ctx.watcher_cancel.cancel();
    let grace = Duration::from_secs(ctx.config.settings.pipeline.shutdown_grace_secs);
    if tokio::time::timeout(grace, futures::future::join_all(&mut workers))
        .await
        .is_err()
    {
        warn!(game_id = %ctx.game_id, "drain grace elapsed, aborting stage workers");
        for worker in &workers {
            worker.abort();
        }
    }
    ctx.ordering.close().await;
    ctx.tick_stop.cancel();
    info!(game_id = %ctx.game_id, "pipeline finished");
}

/// One snapshot's journey through the three stages.
struct StageWorker {
    snapshot: Snapshot,
    update: rinkcast_core::UpdateReport,
    projection: rinkcast_core::BoardProjection,
    summary: String,
    participants: Vec<String>,
    statics: Arc<StaticContext>,
    context_manager: Arc<ContextManager>,
    sessions: Arc<SessionManager>,
    analyze: Arc<AnalyzeStage>,
    narrate: Arc<NarrateStage>,
    synthesize: Arc<SynthesizeStage>,
    store: GameStore,
    ordering: Arc<OrderingQueue>,
    cancel: CancellationToken,
}

impl StageWorker {
    async fn run(self) {
        let game_time = self.snapshot.game_time;

        // Stage 1 — Analyze.
        let payload = self.context_manager.assemble(
            Stage::Analyze,
            &self.projection,
            &self.statics,
            &self.snapshot,
            &self.summary,
            None,
        );
        let analysis = self
            .analyze
            .run(
                &self.sessions,
                &payload,
                &self.update,
                &self.projection,
                self.seed(Stage::Analyze),
            )
            .await;
        if let Err(err) = self.store.write_analysis(game_time, &analysis).await {
            return self.persistence_failure(game_time, &err).await;
        }

        // Stage 2 — Narrate.
        let extra = format!(
            "ANALYSIS (momentum {:.2}):\n{}",
            analysis.momentum,
            serde_json::to_string_pretty(&analysis).unwrap_or_else(|_| "{}".into())
        );
        let payload = self.context_manager.assemble(
            Stage::Narrate,
            &self.projection,
            &self.statics,
            &self.snapshot,
            &self.summary,
            Some(&extra),
        );
        let batch = self
            .narrate
            .run(
                &self.sessions,
                NarrateInputs {
                    payload: &payload,
                    analysis: &analysis,
                    projection: &self.projection,
                    statics: &self.statics,
                    update: &self.update,
                    participants: &self.participants,
                },
                self.seed(Stage::Narrate),
            )
            .await;
        if let Err(err) = self.store.write_narration(game_time, &batch).await {
            return self.persistence_failure(game_time, &err).await;
        }

        // Stage 3 — Synthesize.
        let audio = self.synthesize.run(&batch).await;
        if let Err(err) = self.store.write_audio(game_time, &audio).await {
            return self.persistence_failure(game_time, &err).await;
        }

        self.ordering
            .submit(PipelineOutput {
                game_id: self.snapshot.game_id.clone(),
                game_time,
                narration: batch,
                audio,
                board_projection: self.projection.clone(),
                sequence_number: 0,
            })
            .await;
    }

    fn seed(&self, stage: Stage) -> impl Fn() -> SessionSeed + '_ {
        move || SessionSeed {
            preamble: self.context_manager.stage_preamble(stage),
            state_block: render_state_block(&self.projection, &self.statics),
            narrative_summary: self.summary.clone(),
        }
    }

    /// Persistence failures are resource exhaustion: fail the slot so the
    /// stream progresses, then stop the pipeline.
    async fn persistence_failure(&self, game_time: rinkcast_core::GameTime, err: &StoreError) {
        error!(error = %err, "artifact persistence failed, stopping pipeline");
        self.ordering
            .fail(game_time, format!("persistence failure: {err}"))
            .await;
        self.cancel.cancel();
    }
}

/// Persist the watermark for every emission, then forward it.
async fn forward_outputs(
    mut queue_rx: mpsc::Receiver<OutputEvent>,
    out_tx: mpsc::Sender<OutputEvent>,
    store: GameStore,
    stats: Arc<PipelineStats>,
) {
    while let Some(event) = queue_rx.recv().await {
        match &event {
            OutputEvent::Output(output) => {
                stats.record_output(output.audio.len());
                if let Err(err) = store.write_watermark(output.game_time).await {
                    error!(error = %err, "watermark persistence failed");
                }
            }
            OutputEvent::Skip { game_time, .. } => {
                stats.record_skip();
                if let Err(err) = store.write_watermark(*game_time).await {
                    error!(error = %err, "watermark persistence failed");
                }
            }
            OutputEvent::End { .. } => {
                let _ = out_tx.send(event).await;
                return;
            }
        }
        if out_tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn tick_queue(ordering: Arc<OrderingQueue>, every: Duration, stop: CancellationToken) {
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(every) => ordering.tick().await,
        }
    }
}
