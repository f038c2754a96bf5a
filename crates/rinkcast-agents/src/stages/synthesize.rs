//! Stage 3 — Synthesize.
//!
//! Renders each commentary segment as speech audio. Segments within a batch
//! render in parallel and are reassembled in batch order. Collaborator
//! output is validated against the fixed broadcast format (24 kHz, 16-bit
//! PCM mono WAV); a non-conforming or failed render degrades to silence of
//! the estimated duration so the batch stays well-formed and index-aligned.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use rinkcast_core::narration::{infer_voice_style, voice_style};
use rinkcast_core::{AudioSegment, CommentarySegment, Emotion, NarrationBatch};

use crate::collaborator::{CollaboratorError, SpeechCollaborator};
use crate::kernel::RetryKernel;
use crate::wav;

/// The Synthesize stage runner.
pub struct SynthesizeStage {
    tts: Arc<dyn SpeechCollaborator>,
    kernel: RetryKernel,
    timeout: Duration,
    language: String,
}

impl SynthesizeStage {
    /// Create the stage.
    #[must_use]
    pub fn new(
        tts: Arc<dyn SpeechCollaborator>,
        kernel: RetryKernel,
        timeout: Duration,
        language: impl Into<String>,
    ) -> Self {
        Self {
            tts,
            kernel,
            timeout,
            language: language.into(),
        }
    }

    /// Render a batch. Output is index-ordered and one-to-one with the
    /// batch's segments.
    pub async fn run(&self, batch: &NarrationBatch) -> Vec<AudioSegment> {
        let renders = batch
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| self.render(index, segment));
        futures::future::join_all(renders).await
    }

    /// Render one segment, degrading to silence on terminal failure.
    async fn render(&self, index: usize, segment: &CommentarySegment) -> AudioSegment {
        // An untagged segment falls back to the keyword analyzer.
        let style = if segment.emotion == Emotion::Neutral {
            infer_voice_style(&segment.text)
        } else {
            voice_style(segment.speaker, segment.emotion)
        };

        // Format violations get one re-render before degrading.
        for attempt in 0..2 {
            let result = self
                .kernel
                .call("synthesize", self.timeout, || {
                    self.tts.synthesize(&segment.text, style, &self.language)
                })
                .await
                .and_then(|bytes| validate_wav(bytes).map_err(CollaboratorError::from));

            match result {
                Ok((bytes, duration)) => {
                    return AudioSegment {
                        index,
                        speaker: segment.speaker,
                        emotion: segment.emotion,
                        wav: bytes,
                        duration_seconds: duration,
                    };
                }
                Err(err) => {
                    warn!(index, attempt, error = %err, "segment render failed");
                }
            }
        }

        metrics::counter!("stage_degraded_total", "stage" => "synthesize").increment(1);
        let duration = segment.duration_estimate_seconds.max(0.1);
        AudioSegment {
            index,
            speaker: segment.speaker,
            emotion: segment.emotion,
            wav: wav::silence(duration),
            duration_seconds: duration,
        }
    }
}

/// Validate collaborator audio against the broadcast format.
fn validate_wav(bytes: Vec<u8>) -> Result<(Vec<u8>, f32), wav::WavError> {
    let info = wav::inspect(&bytes)?;
    if !info.is_broadcast_format() {
        return Err(wav::WavError::BadFormat);
    }
    Ok((bytes, info.duration_seconds()))
}

impl From<wav::WavError> for CollaboratorError {
    fn from(err: wav::WavError) -> Self {
        Self::Malformed {
            message: format!("audio not in broadcast format: {err}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::ToneSpeech;
    use async_trait::async_trait;
    use rinkcast_core::retry::RetryConfig;
    use rinkcast_core::{Emotion, Speaker, VoiceStyle};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn kernel() -> RetryKernel {
        RetryKernel::new(RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
        })
    }

    fn batch() -> NarrationBatch {
        NarrationBatch {
            segments: vec![
                CommentarySegment {
                    speaker: Speaker::A,
                    text: "He scores!".into(),
                    emotion: Emotion::Goal,
                    duration_estimate_seconds: 1.0,
                    pause_after_seconds: 0.5,
                },
                CommentarySegment {
                    speaker: Speaker::B,
                    text: "Clinical finish.".into(),
                    emotion: Emotion::Analytical,
                    duration_estimate_seconds: 1.5,
                    pause_after_seconds: 0.8,
                },
            ],
        }
    }

    #[tokio::test]
    async fn renders_batch_in_order() {
        let stage = SynthesizeStage::new(
            Arc::new(ToneSpeech::default()),
            kernel(),
            Duration::from_secs(1),
            "en-US",
        );
        let audio = stage.run(&batch()).await;
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].index, 0);
        assert_eq!(audio[1].index, 1);
        assert_eq!(audio[0].speaker, Speaker::A);
        assert_eq!(audio[1].speaker, Speaker::B);
        for seg in &audio {
            let info = wav::inspect(&seg.wav).unwrap();
            assert!(info.is_broadcast_format());
            assert!(seg.duration_seconds > 0.0);
        }
    }

    #[tokio::test]
    async fn total_duration_tracks_estimates() {
        let stage = SynthesizeStage::new(
            Arc::new(ToneSpeech::default()),
            kernel(),
            Duration::from_secs(1),
            "en-US",
        );
        let b = batch();
        let audio = stage.run(&b).await;
        let total: f32 = audio.iter().map(|a| a.duration_seconds).sum();
        assert!(total > 0.0);
        // ToneSpeech estimates from the text, so totals stay in the same
        // ballpark as the narration estimates.
        assert!(total < 30.0);
    }

    struct FailingSpeech;

    #[async_trait]
    impl SpeechCollaborator for FailingSpeech {
        fn name(&self) -> &str {
            "failing"
        }
        async fn synthesize(
            &self,
            _text: &str,
            _style: VoiceStyle,
            _language: &str,
        ) -> crate::collaborator::CollaboratorResult<Vec<u8>> {
            Err(CollaboratorError::Api {
                status: 500,
                message: "tts down".into(),
                retryable: false,
            })
        }
    }

    #[tokio::test]
    async fn failure_degrades_to_silence_of_estimate() {
        let stage = SynthesizeStage::new(
            Arc::new(FailingSpeech),
            kernel(),
            Duration::from_secs(1),
            "en-US",
        );
        let audio = stage.run(&batch()).await;
        assert_eq!(audio.len(), 2);
        let info = wav::inspect(&audio[0].wav).unwrap();
        assert!(info.is_broadcast_format());
        assert!((audio[0].duration_seconds - 1.0).abs() < 0.05);
        assert!((audio[1].duration_seconds - 1.5).abs() < 0.05);
    }

    struct WrongRateSpeech {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SpeechCollaborator for WrongRateSpeech {
        fn name(&self) -> &str {
            "wrong_rate"
        }
        async fn synthesize(
            &self,
            _text: &str,
            _style: VoiceStyle,
            _language: &str,
        ) -> crate::collaborator::CollaboratorResult<Vec<u8>> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            // 16 kHz header instead of 24 kHz.
            let mut wav = wav::encode_pcm16(&[0i16; 1600]);
            wav[24..28].copy_from_slice(&16_000u32.to_le_bytes());
            Ok(wav)
        }
    }

    #[tokio::test]
    async fn wrong_format_retries_then_degrades() {
        let tts = Arc::new(WrongRateSpeech {
            calls: AtomicU32::new(0),
        });
        let stage = SynthesizeStage::new(tts.clone(), kernel(), Duration::from_secs(1), "en-US");
        let b = NarrationBatch {
            segments: batch().segments[..1].to_vec(),
        };
        let audio = stage.run(&b).await;
        assert_eq!(tts.calls.load(Ordering::SeqCst), 2);
        let info = wav::inspect(&audio[0].wav).unwrap();
        assert!(info.is_broadcast_format(), "degraded output must conform");
    }

    #[tokio::test]
    async fn empty_batch_renders_nothing() {
        let stage = SynthesizeStage::new(
            Arc::new(ToneSpeech::default()),
            kernel(),
            Duration::from_secs(1),
            "en-US",
        );
        let audio = stage.run(&NarrationBatch::default()).await;
        assert!(audio.is_empty());
    }
}
