//! Webhook payloads exchanged with the voice platform.

use crate::orchestrator::TurnReply;
use serde::{Deserialize, Serialize};

/// Incoming turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliceRequest {
    #[serde(default)]
    pub session: RequestSession,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub request: RequestBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSession {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub new: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    /// Utterance exactly as the user said it
    #[serde(default)]
    pub original_utterance: String,
    /// Platform-normalised utterance (lower case, no punctuation)
    #[serde(default)]
    pub command: String,
}

impl AliceRequest {
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Raw utterance, falling back to the normalised command when the
    /// original is missing.
    pub fn utterance(&self) -> &str {
        if self.request.original_utterance.trim().is_empty() {
            &self.request.command
        } else {
            &self.request.original_utterance
        }
    }
}

/// Outgoing turn reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliceResponse {
    /// Echo of the request's session id
    pub session: String,
    pub version: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tts: String,
    /// The skill never ends the dialog itself.
    pub end_session: bool,
}

impl AliceResponse {
    pub fn from_turn(request: &AliceRequest, reply: &TurnReply) -> Self {
        Self {
            session: request.session.session_id.clone(),
            version: request.version.clone(),
            response: ResponseBody {
                text: reply.text().to_string(),
                tts: reply.tts().to_string(),
                end_session: false,
            },
        }
    }
}
