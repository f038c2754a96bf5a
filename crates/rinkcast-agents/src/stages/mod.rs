//! The three pipeline stages: Analyze → Narrate → Synthesize.
//!
//! Stages are sequential within a snapshot; the orchestrator runs them
//! concurrently across snapshots. Each stage wraps its collaborator call in
//! the retry kernel and substitutes a deterministic fallback when the
//! collaborator fails terminally, so a well-formed output always comes back.

pub mod analyze;
pub mod narrate;
pub mod synthesize;

use crate::collaborator::CollaboratorError;

/// Extract the first JSON object from collaborator text.
///
/// Language models routinely wrap structured payloads in prose or code
/// fences; the declared contract is "one JSON object", so everything outside
/// the outermost braces is discarded.
pub(crate) fn extract_json_object(text: &str) -> Result<serde_json::Value, CollaboratorError> {
    let start = text.find('{').ok_or_else(|| CollaboratorError::Malformed {
        message: "no JSON object in response".into(),
    })?;
    let end = text.rfind('}').ok_or_else(|| CollaboratorError::Malformed {
        message: "unterminated JSON object in response".into(),
    })?;
    if end < start {
        return Err(CollaboratorError::Malformed {
            message: "unterminated JSON object in response".into(),
        });
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| CollaboratorError::Malformed {
        message: format!("invalid JSON payload: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_parses() {
        let v = extract_json_object(r#"{"momentum": 0.5}"#).unwrap();
        assert_eq!(v["momentum"], 0.5);
    }

    #[test]
    fn fenced_object_parses() {
        let text = "Here is the analysis:\n```json\n{\"momentum\": 0.9}\n```\nDone.";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["momentum"], 0.9);
    }

    #[test]
    fn prose_only_is_malformed() {
        let err = extract_json_object("The game is going well.").unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[test]
    fn broken_json_is_malformed() {
        let err = extract_json_object(r#"{"momentum": "#).unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
    }

    #[test]
    fn nested_objects_survive() {
        let v = extract_json_object(r#"{"a": {"b": 1}} trailing"#);
        // rfind('}') picks the last brace; trailing prose after it is fine.
        assert_eq!(v.unwrap()["a"]["b"], 1);
    }
}
