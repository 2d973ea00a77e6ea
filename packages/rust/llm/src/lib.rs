//! Chat-completions client for the LLM-backed pipeline capabilities.
//!
//! One [`LlmClient`] is shared across the expander, filter, sufficiency
//! checker, and synthesizer. All of them consume the single
//! [`LlmClient::complete`] entry point; schema-constrained decoding is used
//! when a schema is supplied and the endpoint honors `response_format`.

mod json;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dartsearch_shared::{DartSearchError, LlmConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use json::extract_json;

/// Request timeout; narrative synthesis is the slowest caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat-completions client with call accounting.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    calls: AtomicU64,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DartSearchError::LlmUnavailable(format!("client build: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            calls: AtomicU64::new(0),
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    /// Non-streaming completion. When `json_schema` is given, the request
    /// asks for schema-constrained decoding; the returned text still goes
    /// through [`extract_json`] at call sites that need structure, since not
    /// every endpoint honors `response_format`.
    pub async fn complete(
        &self,
        messages: &[Message],
        json_schema: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if let Some(schema) = json_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "result", "schema": schema },
            });
        }

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = tokio::select! {
            res = request.send() => res,
            _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
        }
        .map_err(|e| DartSearchError::LlmUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let text = tokio::select! {
            res = response.text() => res,
            _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
        }
        .map_err(|e| DartSearchError::LlmUnavailable(format!("response read: {e}")))?;

        if !status.is_success() {
            warn!(%status, "LLM endpoint returned error status");
            let preview: String = text.chars().take(200).collect();
            return Err(DartSearchError::LlmUnavailable(format!(
                "HTTP {status}: {preview}"
            )));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| DartSearchError::LlmUnavailable(format!("bad response JSON: {e}")))?;

        let content = parsed["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        if content.is_empty() {
            return Err(DartSearchError::LlmUnavailable(
                "empty completion content".into(),
            ));
        }

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }

    /// Completions issued since process start.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: String::new(),
            model: "test-model".into(),
            temperature: 0.2,
        }
    }

    #[test]
    fn endpoint_resolution() {
        let client = LlmClient::new(&test_config("https://api.openai.com/v1".into())).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );

        let client = LlmClient::new(&test_config("http://localhost:1234".into())).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn complete_extracts_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "응답 텍스트"}}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&test_config(format!("{}/v1", server.uri()))).unwrap();
        let cancel = CancellationToken::new();
        let content = client
            .complete(&[Message::user("질문")], None, &cancel)
            .await
            .unwrap();
        assert_eq!(content, "응답 텍스트");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn error_status_maps_to_llm_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&test_config(format!("{}/v1", server.uri()))).unwrap();
        let cancel = CancellationToken::new();
        let err = client
            .complete(&[Message::user("질문")], None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DartSearchError::LlmUnavailable(_)));
    }
}
