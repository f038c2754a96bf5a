//! # rinkcast-broadcaster
//!
//! Broadcaster binary — wires the pipeline, the broadcast hub, and the
//! HTTP/WebSocket server together for one live game.
//!
//! The language and speech collaborators run in-process by default
//! ([`OfflineLanguage`] / [`ToneSpeech`]), which exercises the full
//! deterministic pipeline without any network dependency. A vendor-backed
//! collaborator plugs in at the same trait seam.
//!
//! [`OfflineLanguage`]: rinkcast_agents::stubs::OfflineLanguage
//! [`ToneSpeech`]: rinkcast_agents::stubs::ToneSpeech

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rinkcast_agents::stubs::{OfflineLanguage, ToneSpeech};
use rinkcast_core::{GameId, StaticContext};
use rinkcast_pipeline::{GameRunConfig, GameStore, run_game};
use rinkcast_server::hub::pump_outputs;
use rinkcast_server::metrics::install_recorder;
use rinkcast_server::{RinkcastServer, ServerConfig};
use rinkcast_settings::{RinkcastSettings, load_settings_from_path};

/// Rinkcast live commentary broadcaster.
#[derive(Parser, Debug)]
#[command(name = "rinkcast-broadcaster", about = "Live two-voice game commentary broadcaster")]
struct Cli {
    /// Game to broadcast.
    game_id: String,

    /// Static context JSON (rosters, goalies, venue). Optional when the
    /// game's store already has one persisted.
    #[arg(long)]
    static_context: Option<PathBuf>,

    /// Directory the producer writes snapshots into. Defaults to
    /// `<ingest_root>/<game_id>` from settings.
    #[arg(long)]
    ingest_dir: Option<PathBuf>,

    /// Artifact storage root (overrides settings).
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 auto-assigns).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file path.
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// Resolve the settings file path (`~/.rinkcast/settings.json`).
fn default_settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rinkcast").join("settings.json")
}

/// Load the static context: CLI file first, then the persisted copy.
async fn resolve_static_context(
    cli_path: Option<&PathBuf>,
    store: &GameStore,
    game_id: &GameId,
) -> Result<StaticContext> {
    if let Some(path) = cli_path {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read static context {}", path.display()))?;
        let ctx: StaticContext = serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid static context {}", path.display()))?;
        if ctx.game_id != *game_id {
            bail!(
                "static context is for game {} but {} was requested",
                ctx.game_id,
                game_id
            );
        }
        return Ok(ctx);
    }

    match store.load_recovery().await? {
        Some(recovered) => Ok(recovered.static_context),
        None => bail!(
            "no static context: pass --static-context for a fresh game (none persisted under {})",
            store.dir().display()
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings: RinkcastSettings = load_settings_from_path(&settings_path)?;
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(root) = &cli.data_root {
        settings.storage.root = root.display().to_string();
    }

    rinkcast_core::logging::init_subscriber(&settings.log_level.0);
    let metrics_handle = install_recorder();

    let game_id = GameId::from(cli.game_id.clone());
    let store = GameStore::new(PathBuf::from(&settings.storage.root).as_path(), &game_id)
        .with_fs_timeout(std::time::Duration::from_millis(settings.pipeline.fs_timeout_ms));
    let statics = resolve_static_context(cli.static_context.as_ref(), &store, &game_id).await?;

    let ingest_dir = cli.ingest_dir.clone().unwrap_or_else(|| {
        PathBuf::from(&settings.storage.ingest_root).join(game_id.as_str())
    });

    info!(
        game_id = %game_id,
        away = %statics.away_team,
        home = %statics.home_team,
        ingest = %ingest_dir.display(),
        "starting broadcaster"
    );

    // Pipeline.
    let cancel = CancellationToken::new();
    let run = run_game(
        game_id.clone(),
        statics,
        ingest_dir,
        store,
        Arc::new(OfflineLanguage),
        Arc::new(ToneSpeech),
        GameRunConfig::new(settings.clone()),
        cancel.clone(),
    )
    .await?;

    // Server + broadcast pump.
    let server = RinkcastServer::new(
        ServerConfig::from(&settings.server),
        run.stats.clone(),
        metrics_handle,
    );
    let pump = tokio::spawn(pump_outputs(server.hub().clone(), run.outputs));
    let (addr, server_task) = server.listen().await?;
    info!(ws = %format!("ws://{addr}/ws"), "subscribers may connect");

    let shutdown = server.shutdown().clone();
    shutdown.register_task(pump);
    shutdown.register_task(server_task);

    // Run until the game ends or the operator interrupts.
    tokio::select! {
        _ = run.task => {
            info!("game stream finished");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("interrupt received, draining pipeline");
            cancel.cancel();
        }
    }

    let grace = std::time::Duration::from_secs(settings.pipeline.shutdown_grace_secs + 5);
    shutdown.graceful_shutdown(vec![], Some(grace)).await;
    Ok(())
}
