//! In-process collaborator implementations.
//!
//! [`ScriptedLanguage`] replays canned responses for tests.
//! [`OfflineLanguage`] always fails, driving the stages down their
//! deterministic degrade paths; this is how the binary runs without a
//! model endpoint. [`ToneSpeech`] renders a quiet tone in the broadcast
//! format so the full audio path works end-to-end offline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use rinkcast_core::VoiceStyle;

use crate::collaborator::{
    CollaboratorError, CollaboratorResult, LanguageCollaborator, SessionMessage,
    SpeechCollaborator,
};
use crate::deterministic::estimate_speech_seconds;
use crate::wav;

// ─────────────────────────────────────────────────────────────────────────────
// ScriptedLanguage
// ─────────────────────────────────────────────────────────────────────────────

/// Replays a queue of canned responses; errors once the queue runs dry.
#[derive(Default)]
pub struct ScriptedLanguage {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicU32,
}

impl ScriptedLanguage {
    /// Build with a response queue, consumed front to back.
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of `complete` calls observed.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageCollaborator for ScriptedLanguage {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _session_log: &[SessionMessage],
        _user_message: &str,
    ) -> CollaboratorResult<String> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .ok_or(CollaboratorError::Api {
                status: 500,
                message: "script exhausted".into(),
                retryable: false,
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OfflineLanguage
// ─────────────────────────────────────────────────────────────────────────────

/// Always unavailable. Stages immediately take their degraded path, which
/// keeps a session fully functional with deterministic commentary.
pub struct OfflineLanguage;

#[async_trait]
impl LanguageCollaborator for OfflineLanguage {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _session_log: &[SessionMessage],
        _user_message: &str,
    ) -> CollaboratorResult<String> {
        Err(CollaboratorError::Api {
            status: 503,
            message: "no language collaborator configured".into(),
            retryable: false,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ToneSpeech
// ─────────────────────────────────────────────────────────────────────────────

/// Renders a quiet tone whose pitch tracks the voice style and whose length
/// tracks the text's estimated speaking time.
#[derive(Default)]
pub struct ToneSpeech;

impl ToneSpeech {
    fn frequency(style: VoiceStyle) -> f32 {
        match style {
            VoiceStyle::Enthusiastic => 520.0,
            VoiceStyle::Dramatic => 330.0,
            VoiceStyle::Calm => 240.0,
        }
    }
}

#[async_trait]
impl SpeechCollaborator for ToneSpeech {
    fn name(&self) -> &str {
        "tone"
    }

    async fn synthesize(
        &self,
        text: &str,
        style: VoiceStyle,
        _language: &str,
    ) -> CollaboratorResult<Vec<u8>> {
        let duration = estimate_speech_seconds(text);
        Ok(wav::tone(duration, Self::frequency(style)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order() {
        let stub = ScriptedLanguage::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(stub.complete("s", &[], "u").await.unwrap(), "one");
        assert_eq!(stub.complete("s", &[], "u").await.unwrap(), "two");
        assert!(stub.complete("s", &[], "u").await.is_err());
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn offline_always_fails_non_retryable() {
        let err = OfflineLanguage.complete("s", &[], "u").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn tone_speech_is_broadcast_format() {
        let bytes = ToneSpeech
            .synthesize("A few words here", VoiceStyle::Calm, "en-US")
            .await
            .unwrap();
        let info = wav::inspect(&bytes).unwrap();
        assert!(info.is_broadcast_format());
        assert!(info.duration_seconds() > 0.5);
    }

    #[tokio::test]
    async fn tone_length_tracks_text() {
        let short = ToneSpeech
            .synthesize("Quick call", VoiceStyle::Enthusiastic, "en-US")
            .await
            .unwrap();
        let long = ToneSpeech
            .synthesize(
                "A considerably longer stretch of color commentary about positioning",
                VoiceStyle::Calm,
                "en-US",
            )
            .await
            .unwrap();
        assert!(long.len() > short.len());
    }
}
