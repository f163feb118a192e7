//! OpenAI Responses API backend.
//!
//! Conversation context is kept server-side: the response `id` is the
//! continuation token and is sent back as `previous_response_id`.

use super::{Oracle, OracleError, OracleResult, Reply};
use alice_common::config::OracleConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    id: String,
    /// Convenience aggregate; not every deployment fills it in.
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ResponsesResponse {
    fn answer_text(&self) -> String {
        if let Some(text) = self.output_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return text.to_string();
        }

        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

// ============================================================================
// Client
// ============================================================================

/// Oracle backed by the OpenAI Responses API.
pub struct OpenAiOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    store: bool,
}

impl OpenAiOracle {
    /// Create a client from configuration. Fails when no API key is set.
    pub fn new(config: &OracleConfig) -> OracleResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::Auth("OPENAI_API_KEY is not set".into()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| OracleError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            store: config.store,
        })
    }

    fn map_transport_error(err: reqwest::Error, budget: Duration) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(budget)
        } else {
            OracleError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn query(
        &self,
        deadline: Instant,
        utterance: &str,
        continuation_token: &str,
    ) -> OracleResult<Reply> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(OracleError::Timeout(budget));
        }

        let url = format!("{}/responses", self.endpoint);
        let body = ResponsesRequest {
            model: &self.model,
            input: utterance,
            store: self.store,
            previous_response_id: Some(continuation_token).filter(|t| !t.is_empty()),
        };

        tracing::debug!(
            endpoint = %url,
            model = %self.model,
            continued = body.previous_response_id.is_some(),
            "Calling Responses API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(e, budget))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|e| Self::map_transport_error(e, budget))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&payload)
                .map(|e| e.error.message)
                .unwrap_or(payload);

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(OracleError::Auth(message));
            }
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ResponsesResponse = serde_json::from_str(&payload)
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        if parsed.id.is_empty() {
            return Err(OracleError::InvalidResponse("response id is missing".into()));
        }
        let text = parsed.answer_text();
        if text.trim().is_empty() {
            return Err(OracleError::InvalidResponse("response has no output text".into()));
        }

        tracing::debug!(response_id = %parsed.id, answer_len = text.len(), "Responses API answered");

        Ok(Reply::new(text, parsed.id))
    }
}

// ============================================================================
// Tests
// ============================================================================
