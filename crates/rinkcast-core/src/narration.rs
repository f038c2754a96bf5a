//! Narration vocabulary: speakers, emotions, voice styles, segments.
//!
//! Two fixed broadcaster roles carry every line: speaker A is the
//! play-by-play voice, speaker B the color analyst. The emotion vocabulary
//! is closed; unknown tags from the collaborator normalize to `neutral`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Speakers and emotions
// ─────────────────────────────────────────────────────────────────────────────

/// One of the two fixed broadcaster roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    /// Play-by-play.
    A,
    /// Color analyst.
    B,
}

impl Speaker {
    /// The other chair.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Fixed emotion vocabulary for commentary segments.
///
/// Unknown strings deserialize to [`Emotion::Neutral`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    /// High-energy call.
    Excited,
    /// Goal call.
    Goal,
    /// Sustained intensity (odd-man rush, late push).
    HighIntensity,
    /// Measured analysis.
    Analytical,
    /// Observational color.
    Observant,
    /// Professional register.
    Professional,
    /// Concern (injury, defensive collapse).
    Concerned,
    /// Penalty call.
    Penalty,
    /// Dramatic emphasis.
    Dramatic,
    /// Calm register.
    Calm,
    /// Default register; also the sink for unknown tags.
    #[default]
    Neutral,
}

impl std::str::FromStr for Emotion {
    type Err = std::convert::Infallible;

    /// Total parse: anything outside the vocabulary lands on `Neutral`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "excited" => Self::Excited,
            "goal" => Self::Goal,
            "high_intensity" => Self::HighIntensity,
            "analytical" => Self::Analytical,
            "observant" => Self::Observant,
            "professional" => Self::Professional,
            "concerned" => Self::Concerned,
            "penalty" => Self::Penalty,
            "dramatic" => Self::Dramatic,
            "calm" => Self::Calm,
            _ => Self::Neutral,
        })
    }
}

impl<'de> Deserialize<'de> for Emotion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excited => "excited",
            Self::Goal => "goal",
            Self::HighIntensity => "high_intensity",
            Self::Analytical => "analytical",
            Self::Observant => "observant",
            Self::Professional => "professional",
            Self::Concerned => "concerned",
            Self::Penalty => "penalty",
            Self::Dramatic => "dramatic",
            Self::Calm => "calm",
            Self::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice styles
// ─────────────────────────────────────────────────────────────────────────────

/// TTS voice style, the collaborator-facing vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStyle {
    /// Energetic delivery.
    Enthusiastic,
    /// Heightened, tense delivery.
    Dramatic,
    /// Even, conversational delivery.
    Calm,
}

impl fmt::Display for VoiceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enthusiastic => write!(f, "enthusiastic"),
            Self::Dramatic => write!(f, "dramatic"),
            Self::Calm => write!(f, "calm"),
        }
    }
}

/// Map a `{speaker, emotion}` pair to a voice style.
///
/// Speaker A always renders enthusiastic. Speaker B renders calm for the
/// analytical registers, dramatic for the tense ones.
#[must_use]
pub fn voice_style(speaker: Speaker, emotion: Emotion) -> VoiceStyle {
    match speaker {
        Speaker::A => VoiceStyle::Enthusiastic,
        Speaker::B => match emotion {
            Emotion::Analytical
            | Emotion::Calm
            | Emotion::Neutral
            | Emotion::Observant
            | Emotion::Professional => VoiceStyle::Calm,
            Emotion::Concerned
            | Emotion::Penalty
            | Emotion::Dramatic
            | Emotion::Excited
            | Emotion::Goal
            | Emotion::HighIntensity => VoiceStyle::Dramatic,
        },
    }
}

/// Infer a voice style from segment text when no emotion tag is available.
///
/// Deterministic keyword scan: goal/score words win over penalty/hit words;
/// anything else renders calm.
#[must_use]
pub fn infer_voice_style(text: &str) -> VoiceStyle {
    let lower = text.to_lowercase();
    const GOAL_WORDS: [&str; 5] = ["goal", "scores", "score!", "buries", "lights the lamp"];
    const TENSE_WORDS: [&str; 5] = ["penalty", "hit", "fight", "injury", "power play"];

    if GOAL_WORDS.iter().any(|w| lower.contains(w)) {
        VoiceStyle::Enthusiastic
    } else if TENSE_WORDS.iter().any(|w| lower.contains(w)) {
        VoiceStyle::Dramatic
    } else {
        VoiceStyle::Calm
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Segments and batches
// ─────────────────────────────────────────────────────────────────────────────

/// A single spoken line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentarySegment {
    /// Which broadcaster speaks.
    pub speaker: Speaker,
    /// The line itself.
    pub text: String,
    /// Emotion tag.
    #[serde(default)]
    pub emotion: Emotion,
    /// Estimated spoken duration in seconds.
    pub duration_estimate_seconds: f32,
    /// Silence after the line in seconds.
    #[serde(default)]
    pub pause_after_seconds: f32,
}

/// Ordered commentary for one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationBatch {
    /// Segments in speaking order.
    pub segments: Vec<CommentarySegment>,
}

impl NarrationBatch {
    /// Sum of segment duration estimates plus pauses.
    #[must_use]
    pub fn total_duration_estimate(&self) -> f32 {
        self.segments
            .iter()
            .map(|s| s.duration_estimate_seconds + s.pause_after_seconds)
            .sum()
    }
}

/// Rendered audio for one commentary segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Position within the batch.
    pub index: usize,
    /// Speaker metadata carried from the segment.
    pub speaker: Speaker,
    /// Emotion metadata carried from the segment.
    pub emotion: Emotion,
    /// PCM WAV bytes: 24 kHz, 16-bit, mono.
    #[serde(with = "wav_bytes")]
    pub wav: Vec<u8>,
    /// Decoded duration in seconds.
    pub duration_seconds: f32,
}

/// Serialize WAV bytes as base64 so audio segments embed cleanly in JSON.
mod wav_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_other_alternates() {
        assert_eq!(Speaker::A.other(), Speaker::B);
        assert_eq!(Speaker::B.other(), Speaker::A);
    }

    #[test]
    fn unknown_emotion_normalizes_to_neutral() {
        let e: Emotion = serde_json::from_str("\"smug\"").unwrap();
        assert_eq!(e, Emotion::Neutral);
    }

    #[test]
    fn known_emotions_deserialize_exactly() {
        let e: Emotion = serde_json::from_str("\"high_intensity\"").unwrap();
        assert_eq!(e, Emotion::HighIntensity);
        let e: Emotion = serde_json::from_str("\"analytical\"").unwrap();
        assert_eq!(e, Emotion::Analytical);
    }

    #[test]
    fn emotion_display_matches_serde() {
        for e in [
            Emotion::Excited,
            Emotion::Goal,
            Emotion::HighIntensity,
            Emotion::Analytical,
            Emotion::Neutral,
        ] {
            let json = serde_json::to_string(&e).unwrap();
            assert_eq!(json, format!("\"{e}\""));
        }
    }

    // -- voice style table --

    #[test]
    fn speaker_a_is_always_enthusiastic() {
        for e in [
            Emotion::Excited,
            Emotion::Goal,
            Emotion::HighIntensity,
            Emotion::Calm,
            Emotion::Neutral,
            Emotion::Penalty,
        ] {
            assert_eq!(voice_style(Speaker::A, e), VoiceStyle::Enthusiastic);
        }
    }

    #[test]
    fn speaker_b_calm_registers() {
        for e in [
            Emotion::Analytical,
            Emotion::Calm,
            Emotion::Neutral,
            Emotion::Observant,
            Emotion::Professional,
        ] {
            assert_eq!(voice_style(Speaker::B, e), VoiceStyle::Calm);
        }
    }

    #[test]
    fn speaker_b_dramatic_registers() {
        for e in [
            Emotion::Concerned,
            Emotion::Penalty,
            Emotion::Dramatic,
            Emotion::Goal,
        ] {
            assert_eq!(voice_style(Speaker::B, e), VoiceStyle::Dramatic);
        }
    }

    #[test]
    fn infer_style_goal_words() {
        assert_eq!(
            infer_voice_style("He scores! What a finish!"),
            VoiceStyle::Enthusiastic
        );
        assert_eq!(
            infer_voice_style("Draisaitl buries it short side"),
            VoiceStyle::Enthusiastic
        );
    }

    #[test]
    fn infer_style_tense_words() {
        assert_eq!(
            infer_voice_style("That's a penalty on Ekholm"),
            VoiceStyle::Dramatic
        );
        assert_eq!(
            infer_voice_style("Big hit along the boards"),
            VoiceStyle::Dramatic
        );
    }

    #[test]
    fn infer_style_defaults_calm() {
        assert_eq!(
            infer_voice_style("Both teams settling into the period"),
            VoiceStyle::Calm
        );
    }

    #[test]
    fn goal_word_wins_over_tense_word() {
        assert_eq!(
            infer_voice_style("He scores on the power play!"),
            VoiceStyle::Enthusiastic
        );
    }

    // -- batches --

    #[test]
    fn batch_total_duration_includes_pauses() {
        let batch = NarrationBatch {
            segments: vec![
                CommentarySegment {
                    speaker: Speaker::A,
                    text: "Here we go.".into(),
                    emotion: Emotion::Neutral,
                    duration_estimate_seconds: 3.0,
                    pause_after_seconds: 0.5,
                },
                CommentarySegment {
                    speaker: Speaker::B,
                    text: "Should be a good one.".into(),
                    emotion: Emotion::Analytical,
                    duration_estimate_seconds: 4.0,
                    pause_after_seconds: 1.0,
                },
            ],
        };
        assert!((batch.total_duration_estimate() - 8.5).abs() < f32::EPSILON);
    }

    #[test]
    fn audio_segment_wav_roundtrips_base64() {
        let seg = AudioSegment {
            index: 0,
            speaker: Speaker::A,
            emotion: Emotion::Goal,
            wav: vec![0x52, 0x49, 0x46, 0x46, 0x00, 0xFF],
            duration_seconds: 0.1,
        };
        let json = serde_json::to_value(&seg).unwrap();
        assert!(json["wav"].is_string());
        let back: AudioSegment = serde_json::from_value(json).unwrap();
        assert_eq!(back.wav, seg.wav);
    }

    #[test]
    fn segment_defaults() {
        let v = serde_json::json!({
            "speaker": "A",
            "text": "Faceoff at center ice.",
            "duration_estimate_seconds": 2.5,
        });
        let seg: CommentarySegment = serde_json::from_value(v).unwrap();
        assert_eq!(seg.emotion, Emotion::Neutral);
        assert_eq!(seg.pause_after_seconds, 0.0);
    }
}
