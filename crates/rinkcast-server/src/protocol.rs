//! The broadcast wire protocol (push, text frames).
//!
//! For each in-order pipeline output, a subscriber sees one `narration`
//! frame then one `audio` frame per segment, then a `batch_end` frame.
//! Deliberately omitted coordinates surface as explicit `skip` frames,
//! never a silent gap.

use serde::{Deserialize, Serialize};

use rinkcast_core::{Emotion, GameId, GameTime, PipelineOutput, Speaker};

/// Audio encoding label for v1. Fixed.
pub const AUDIO_ENCODING: &str = "wav_pcm16_24k_mono";

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber → hub
// ─────────────────────────────────────────────────────────────────────────────

/// Requests a subscriber may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Bind this connection to a game's stream.
    Subscribe {
        /// Game to follow.
        game_id: GameId,
        /// Only deliver outputs after this coordinate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<GameTime>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub → subscriber
// ─────────────────────────────────────────────────────────────────────────────

/// Frames the hub pushes to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One spoken line's text.
    Narration {
        /// Game.
        game_id: GameId,
        /// Coordinate being narrated.
        game_time: GameTime,
        /// Emission sequence number.
        sequence: u64,
        /// Segment position within the batch.
        segment_index: usize,
        /// Speaker role.
        speaker: Speaker,
        /// The line.
        text: String,
        /// Emotion tag.
        emotion: Emotion,
    },
    /// One spoken line's rendered audio.
    Audio {
        /// Game.
        game_id: GameId,
        /// Coordinate being narrated.
        game_time: GameTime,
        /// Emission sequence number.
        sequence: u64,
        /// Segment position within the batch.
        segment_index: usize,
        /// Always [`AUDIO_ENCODING`].
        encoding: String,
        /// Base64 WAV bytes.
        data: String,
        /// Rendered duration in seconds.
        duration: f32,
    },
    /// All segments for a coordinate have been delivered.
    BatchEnd {
        /// Game.
        game_id: GameId,
        /// Completed coordinate.
        game_time: GameTime,
        /// Emission sequence number.
        sequence: u64,
    },
    /// A coordinate was deliberately omitted.
    Skip {
        /// Game.
        game_id: GameId,
        /// Omitted coordinate.
        game_time: GameTime,
        /// Why.
        reason: String,
    },
    /// The game stream is over.
    End {
        /// Game.
        game_id: GameId,
    },
}

/// Render one pipeline output as its ordered frame sequence.
#[must_use]
pub fn frames_for_output(output: &PipelineOutput) -> Vec<ServerMessage> {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    let mut frames = Vec::with_capacity(output.narration.segments.len() * 2 + 1);
    for (index, segment) in output.narration.segments.iter().enumerate() {
        frames.push(ServerMessage::Narration {
            game_id: output.game_id.clone(),
            game_time: output.game_time,
            sequence: output.sequence_number,
            segment_index: index,
            speaker: segment.speaker,
            text: segment.text.clone(),
            emotion: segment.emotion,
        });
        if let Some(audio) = output.audio.get(index) {
            frames.push(ServerMessage::Audio {
                game_id: output.game_id.clone(),
                game_time: output.game_time,
                sequence: output.sequence_number,
                segment_index: index,
                encoding: AUDIO_ENCODING.to_owned(),
                data: STANDARD.encode(&audio.wav),
                duration: audio.duration_seconds,
            });
        }
    }
    frames.push(ServerMessage::BatchEnd {
        game_id: output.game_id.clone(),
        game_time: output.game_time,
        sequence: output.sequence_number,
    });
    frames
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
