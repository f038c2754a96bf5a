//! Stage 1 — Analyze.
//!
//! Turns a reduced snapshot into structured analysis: talking points, a
//! momentum score, and flagged high-intensity events. Free-form text is
//! rejected; a malformed payload earns one repair retry with a corrective
//! instruction, after which the stage substitutes a minimal deterministic
//! analysis derived from the Board update (degraded mode).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use rinkcast_core::{BoardProjection, UpdateReport};

use crate::collaborator::{CollaboratorError, LanguageCollaborator, SessionMessage};
use crate::context::{PromptPayload, Stage};
use crate::deterministic;
use crate::kernel::RetryKernel;
use crate::session::{SessionManager, SessionSeed};
use crate::stages::extract_json_object;

/// Structured output of the Analyze stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Commentary-ready observations, most important first.
    pub talking_points: Vec<String>,
    /// How much is happening right now, 0 (dead ice) to 1 (bedlam).
    pub momentum: f64,
    /// Events worth an immediate call.
    #[serde(default)]
    pub flagged_events: Vec<String>,
}

impl Analysis {
    /// Clamp momentum into `[0, 1]`.
    fn normalized(mut self) -> Self {
        self.momentum = self.momentum.clamp(0.0, 1.0);
        self
    }
}

/// The Analyze stage runner.
pub struct AnalyzeStage {
    llm: Arc<dyn LanguageCollaborator>,
    kernel: RetryKernel,
    timeout: Duration,
}

impl AnalyzeStage {
    /// Create the stage with its collaborator and retry kernel.
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageCollaborator>, kernel: RetryKernel, timeout: Duration) -> Self {
        Self {
            llm,
            kernel,
            timeout,
        }
    }

    /// Run the stage for one snapshot. Always returns a usable analysis.
    pub async fn run(
        &self,
        sessions: &SessionManager,
        payload: &PromptPayload,
        update: &UpdateReport,
        projection: &BoardProjection,
        seed: impl Fn() -> SessionSeed,
    ) -> Analysis {
        let session = sessions.session(Stage::Analyze, &seed);

        let response = self
            .kernel
            .call("analyze", self.timeout, || {
                self.llm
                    .complete(&payload.system_prompt, &session.messages, &payload.user_message)
            })
            .await;

        let text = match response {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "analyze collaborator failed, degrading");
                metrics::counter!("stage_degraded_total", "stage" => "analyze").increment(1);
                return deterministic::fallback_analysis(update, projection);
            }
        };

        match parse_analysis(&text) {
            Ok(analysis) => {
                sessions.record_exchange(Stage::Analyze, &payload.user_message, &text);
                analysis
            }
            Err(parse_err) => {
                self.repair(sessions, payload, update, projection, &session.messages, &text, &parse_err)
                    .await
            }
        }
    }

    /// One repair retry with a corrective instruction, then degrade.
    #[allow(clippy::too_many_arguments)]
    async fn repair(
        &self,
        sessions: &SessionManager,
        payload: &PromptPayload,
        update: &UpdateReport,
        projection: &BoardProjection,
        log: &[SessionMessage],
        failed_text: &str,
        parse_err: &CollaboratorError,
    ) -> Analysis {
        let mut repair_log = log.to_vec();
        repair_log.push(SessionMessage::user(payload.user_message.clone()));
        repair_log.push(SessionMessage::assistant(failed_text.to_owned()));

        let repair_message = format!(
            "Your previous response could not be used: {parse_err}. Respond again \
             with ONLY the JSON object {{\"talking_points\": [...], \"momentum\": \
             0..1, \"flagged_events\": [...]}} and nothing else."
        );

        let repaired = self
            .kernel
            .call("analyze_repair", self.timeout, || {
                self.llm
                    .complete(&payload.system_prompt, &repair_log, &repair_message)
            })
            .await
            .and_then(|text| parse_analysis(&text).map(|a| (text, a)));

        match repaired {
            Ok((text, analysis)) => {
                sessions.record_exchange(Stage::Analyze, &payload.user_message, &text);
                analysis
            }
            Err(err) => {
                warn!(error = %err, "analyze repair failed, degrading");
                metrics::counter!("stage_degraded_total", "stage" => "analyze").increment(1);
                deterministic::fallback_analysis(update, projection)
            }
        }
    }
}

/// Parse and validate the analysis payload.
fn parse_analysis(text: &str) -> Result<Analysis, CollaboratorError> {
    let value = extract_json_object(text)?;
    let analysis: Analysis =
        serde_json::from_value(value).map_err(|e| CollaboratorError::Malformed {
            message: format!("analysis payload does not match schema: {e}"),
        })?;
    if analysis.talking_points.is_empty() {
        return Err(CollaboratorError::Malformed {
            message: "analysis has no talking points".into(),
        });
    }
    Ok(analysis.normalized())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
