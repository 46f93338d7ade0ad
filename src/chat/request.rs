//! Validation of inbound chat turns.

use serde::{Deserialize, Serialize};

use crate::chat::orchestrator::TurnError;
use crate::memory::core::ids::ConversationId;

/// One element of the client-supplied transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Free-form role label; only `user` is meaningful for the last entry.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl TranscriptEntry {
    /// Build an entry.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A validated chat turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    /// Requested conversation; it may not exist yet.
    pub conversation_id: ConversationId,
    /// Non-empty transcript ending with the new user message.
    pub transcript: Vec<TranscriptEntry>,
}

impl TurnRequest {
    /// Validate a turn from raw query parameters.
    ///
    /// `conv` is the JSON-encoded transcript, already percent-decoded. An
    /// absent or empty `conversation_id` selects `default_id`.
    ///
    /// # Errors
    /// Returns [`TurnError::BadRequest`] if a parameter is missing or invalid.
    pub fn parse(
        conversation_id: Option<&str>,
        conv: Option<&str>,
        default_id: ConversationId,
    ) -> Result<Self, TurnError> {
        let conv = conv
            .filter(|raw| !raw.trim().is_empty())
            .ok_or_else(|| TurnError::BadRequest("missing conversation".to_string()))?;
        let transcript: Vec<TranscriptEntry> = serde_json::from_str(conv)
            .map_err(|err| TurnError::BadRequest(format!("invalid conversation format: {err}")))?;

        let conversation_id = match conversation_id.filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(raw.parse::<ConversationId>().map_err(|_| {
                TurnError::BadRequest(format!("invalid conversation_id: {raw}"))
            })?),
            None => None,
        };

        Self::new(conversation_id, transcript, default_id)
    }

    /// Validate an already-decoded turn.
    ///
    /// # Errors
    /// Returns [`TurnError::BadRequest`] if the transcript is empty or does
    /// not end with a non-blank user message.
    pub fn new(
        conversation_id: Option<ConversationId>,
        transcript: Vec<TranscriptEntry>,
        default_id: ConversationId,
    ) -> Result<Self, TurnError> {
        let Some(last) = transcript.last() else {
            return Err(TurnError::BadRequest("conversation is empty".to_string()));
        };
        if last.role != "user" {
            return Err(TurnError::BadRequest(format!(
                "last message must have role user, got {:?}",
                last.role
            )));
        }
        if last.content.trim().is_empty() {
            return Err(TurnError::BadRequest("user message is blank".to_string()));
        }

        Ok(Self {
            conversation_id: conversation_id.unwrap_or(default_id),
            transcript,
        })
    }

    /// The new user message, verbatim.
    #[must_use]
    pub fn user_message(&self) -> &str {
        self.transcript
            .last()
            .map_or("", |entry| entry.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: ConversationId = ConversationId::new(1);

    fn is_bad_request(result: &Result<TurnRequest, TurnError>) -> bool {
        matches!(result, Err(TurnError::BadRequest(_)))
    }

    #[test]
    fn test_parse_valid_turn() {
        let conv = r#"[{"role":"user","content":"Hello"},{"role":"assistant","content":"Hi"},{"role":"user","content":"What is Rust?"}]"#;
        let Ok(request) = TurnRequest::parse(Some("7"), Some(conv), DEFAULT) else {
            panic!("valid turn");
        };
        assert_eq!(request.conversation_id, ConversationId::new(7));
        assert_eq!(request.transcript.len(), 3);
        assert_eq!(request.user_message(), "What is Rust?");
    }

    #[test]
    fn test_absent_or_empty_id_uses_default() {
        let conv = r#"[{"role":"user","content":"Hello"}]"#;
        for id in [None, Some("")] {
            let request = TurnRequest::parse(id, Some(conv), DEFAULT);
            assert_eq!(request.map(|r| r.conversation_id).ok(), Some(DEFAULT));
        }
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let conv = r#"[{"role":"user","content":"Hello"}]"#;
        assert!(is_bad_request(&TurnRequest::parse(Some("abc"), Some(conv), DEFAULT)));
    }

    #[test]
    fn test_missing_or_malformed_transcript_is_rejected() {
        assert!(is_bad_request(&TurnRequest::parse(None, None, DEFAULT)));
        assert!(is_bad_request(&TurnRequest::parse(None, Some(""), DEFAULT)));
        assert!(is_bad_request(&TurnRequest::parse(None, Some("{not json"), DEFAULT)));
        assert!(is_bad_request(&TurnRequest::parse(None, Some(r#"{"role":"user"}"#), DEFAULT)));
    }

    #[test]
    fn test_empty_transcript_is_rejected() {
        assert!(is_bad_request(&TurnRequest::parse(None, Some("[]"), DEFAULT)));
    }

    #[test]
    fn test_last_entry_must_be_non_blank_user() {
        let assistant_last = vec![
            TranscriptEntry::new("user", "Hi"),
            TranscriptEntry::new("assistant", "Hello"),
        ];
        assert!(is_bad_request(&TurnRequest::new(None, assistant_last, DEFAULT)));

        let blank = vec![TranscriptEntry::new("user", "  \n")];
        assert!(is_bad_request(&TurnRequest::new(None, blank, DEFAULT)));
    }
}
