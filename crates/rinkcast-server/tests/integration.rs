//! End-to-end integration tests using a real WebSocket client.
//!
//! Boots the full stack (pipeline with offline collaborators, broadcast
//! pump, Axum server) and drives it through tokio-tungstenite.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use rinkcast_agents::stubs::{OfflineLanguage, ToneSpeech};
use rinkcast_core::{GameTime, Player, StaticContext};
use rinkcast_pipeline::{GameRunConfig, GameStore, WatcherConfig, run_game};
use rinkcast_server::hub::pump_outputs;
use rinkcast_server::metrics::install_recorder;
use rinkcast_server::{RinkcastServer, ServerConfig};
use rinkcast_settings::RinkcastSettings;

const TIMEOUT: Duration = Duration::from_secs(10);

fn statics() -> StaticContext {
    StaticContext {
        game_id: "GAME".into(),
        away_team: "EDM".into(),
        home_team: "FLA".into(),
        venue: "Amerant Bank Arena".into(),
        roster_away: vec![
            Player {
                id: "p1".into(),
                name: "Draisaitl".into(),
            },
            Player {
                id: "p2".into(),
                name: "McDavid".into(),
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

fn write_snapshot(dir: &Path, time: GameTime, body: Value) {
    let name = format!("GAME_{time}.json");
    let tmp = dir.join(format!(".{name}.tmp"));
    std::fs::write(&tmp, serde_json::to_vec(&body).unwrap()).unwrap();
    std::fs::rename(tmp, dir.join(name)).unwrap();
}

fn goal_snapshot(time: GameTime) -> Value {
    json!({
        "game_id": "GAME",
        "game_time": time,
        "activities": [
            {"event_id": format!("shot-{time}"), "type": "shot", "shooter": "Draisaitl", "team": "away"},
            {"event_id": format!("goal-{time}"), "type": "goal", "scorer": "Draisaitl", "team": "away", "assists": ["McDavid"]},
        ],
        "observed_score": {"away": 1, "home": 0},
        "observed_shots": {"away": 1, "home": 0},
    })
}

struct TestStack {
    ws_url: String,
    server: RinkcastServer,
    _ingest: tempfile::TempDir,
    _data: tempfile::TempDir,
    cancel: CancellationToken,
    ingest_dir: std::path::PathBuf,
}

/// Boot pipeline + pump + server against temp directories.
async fn boot() -> TestStack {
    let ingest = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let ingest_dir = ingest.path().to_path_buf();

    let mut settings = RinkcastSettings::default();
    settings.pipeline.snapshot_cadence_seconds = 1;
    settings.pipeline.end_of_game_quiet_secs = 2;
    settings.pipeline.shutdown_grace_secs = 2;
    let config = GameRunConfig {
        settings: settings.clone(),
        watcher: WatcherConfig {
            poll_interval: Duration::from_millis(25),
            stability_polls: 1,
            max_stability_wait: Duration::from_millis(500),
            max_fs_failures: 3,
        },
    };

    let cancel = CancellationToken::new();
    let run = run_game(
        "GAME".into(),
        statics(),
        ingest_dir.clone(),
        GameStore::new(data.path(), &"GAME".into()),
        Arc::new(OfflineLanguage),
        Arc::new(ToneSpeech),
        config,
        cancel.clone(),
    )
    .await
    .unwrap();

    let server = RinkcastServer::new(
        ServerConfig::from(&settings.server),
        run.stats.clone(),
        install_recorder(),
    );
    let _pump = tokio::spawn(pump_outputs(server.hub().clone(), run.outputs));

    let (addr, _server_task) = server.listen().await.unwrap();
    TestStack {
        ws_url: format!("ws://{addr}/ws"),
        server,
        _ingest: ingest,
        _data: data,
        cancel,
        ingest_dir,
    }
}

async fn next_json(
    ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn subscriber_sees_ordered_narration_audio_and_batch_end() {
    let stack = boot().await;

    let (mut ws, _) = connect_async(&stack.ws_url).await.unwrap();
    ws.send(Message::Text(
        json!({"op": "subscribe", "game_id": "GAME"}).to_string().into(),
    ))
    .await
    .unwrap();

    // Two snapshots; second one carries the goal.
    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 0, 0),
        json!({
            "game_id": "GAME",
            "game_time": {"period": 1, "minute": 0, "second": 0},
            "activities": [{
                "event_id": "fo-1",
                "type": "face_off",
                "away_player": "Draisaitl",
                "home_player": "Barkov",
            }],
            "observed_score": {"away": 0, "home": 0},
            "observed_shots": {"away": 0, "home": 0},
        }),
    );
    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 5, 30),
        goal_snapshot(GameTime::new(1, 5, 30)),
    );

    // First batch: narration/audio pairs, then batch_end.
    let mut saw_audio = false;
    let mut batch_game_time = None;
    loop {
        let frame = next_json(&mut ws).await;
        match frame["type"].as_str().unwrap() {
            "narration" => {
                assert_eq!(frame["game_id"], "GAME");
                batch_game_time = Some(frame["game_time"].clone());
            }
            "audio" => {
                assert_eq!(frame["encoding"], "wav_pcm16_24k_mono");
                assert!(frame["data"].is_string());
                saw_audio = true;
            }
            "batch_end" => break,
            other => panic!("unexpected frame type {other}"),
        }
    }
    assert!(saw_audio);
    assert_eq!(batch_game_time.unwrap()["minute"], 0);

    // Second batch belongs to the later coordinate and names the scorer.
    let mut named_scorer = false;
    loop {
        let frame = next_json(&mut ws).await;
        match frame["type"].as_str().unwrap() {
            "narration" => {
                assert_eq!(frame["game_time"]["minute"], 5);
                if frame["text"].as_str().unwrap().contains("Draisaitl") {
                    named_scorer = true;
                }
            }
            "audio" => {}
            "batch_end" => break,
            other => panic!("unexpected frame type {other}"),
        }
    }
    assert!(named_scorer);

    // Quiet period ends the game; subscriber sees the end frame.
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "end");

    stack.cancel.cancel();
    stack.server.shutdown().shutdown();
}

#[tokio::test]
async fn unsubscribed_client_receives_nothing() {
    let stack = boot().await;

    let (mut ws, _) = connect_async(&stack.ws_url).await.unwrap();
    // No subscribe request sent.
    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 0, 0),
        goal_snapshot(GameTime::new(1, 0, 0)),
    );

    let got = timeout(Duration::from_secs(2), ws.next()).await;
    assert!(got.is_err(), "unsubscribed client must not receive frames");

    stack.cancel.cancel();
    stack.server.shutdown().shutdown();
}

#[tokio::test]
async fn resume_since_skips_already_seen_coordinates() {
    let stack = boot().await;

    let (mut ws, _) = connect_async(&stack.ws_url).await.unwrap();
    ws.send(Message::Text(
        json!({
            "op": "subscribe",
            "game_id": "GAME",
            "since": {"period": 1, "minute": 0, "second": 0},
        })
        .to_string()
        .into(),
    ))
    .await
    .unwrap();

    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 0, 0),
        json!({
            "game_id": "GAME",
            "game_time": {"period": 1, "minute": 0, "second": 0},
            "activities": [],
            "observed_score": {"away": 0, "home": 0},
            "observed_shots": {"away": 0, "home": 0},
        }),
    );
    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 0, 5),
        goal_snapshot(GameTime::new(1, 0, 5)),
    );

    // The first frame received must already be for 1_00_05.
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "narration");
    assert_eq!(frame["game_time"]["second"], 5);

    stack.cancel.cancel();
    stack.server.shutdown().shutdown();
}

#[tokio::test]
async fn health_reflects_pipeline_progress() {
    let stack = boot().await;

    write_snapshot(
        &stack.ingest_dir,
        GameTime::new(1, 0, 0),
        goal_snapshot(GameTime::new(1, 0, 0)),
    );

    // Wait until the output has been emitted.
    let health_url = stack.ws_url.replace("ws://", "http://").replace("/ws", "/health");
    let mut reduced = 0u64;
    for _ in 0..100 {
        let body: Value = http_get_json(&health_url).await;
        reduced = body["pipeline"]["snapshots_reduced"].as_u64().unwrap();
        if body["pipeline"]["outputs_emitted"].as_u64().unwrap() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(reduced, 1);

    stack.cancel.cancel();
    stack.server.shutdown().shutdown();
}

/// Minimal GET-json helper over a raw TCP stream (avoids an HTTP client
/// dependency just for one probe). HTTP/1.0 keeps the body un-chunked.
async fn http_get_json(url: &str) -> Value {
    let without_scheme = url.strip_prefix("http://").unwrap();
    let (host, path) = without_scheme.split_once('/').unwrap();
    let mut stream = tokio::net::TcpStream::connect(host).await.unwrap();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let request = format!("GET /{path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await.unwrap();
    let text = String::from_utf8_lossy(&response);
    let body = text.split("\r\n\r\n").nth(1).unwrap_or("{}");
    serde_json::from_str(body.trim()).unwrap()
}
