//! Anthropic-style provider adapter.
//!
//! Talks to the Anthropic Messages API (`/v1/messages`, `x-api-key` header).
//! Structured object generation is implemented as forced tool use: the
//! request carries a single permissive tool named after the requested
//! object, and the tool-use input block is returned as the object payload.
//!
//! Exactly one network attempt per invocation; retry lives upstream.

use crate::llm::error::ProviderError;
use crate::llm::http::post_json;
use crate::llm::{CompletionRequest, Provider, ProviderResponse, TokenUsage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Adapter for Anthropic-style backends.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    timeout_secs: u64,
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicProvider {
    /// Create an adapter with the default request timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn endpoint(request: &CompletionRequest) -> String {
        let base = request.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/v1/messages", base.trim_end_matches('/'))
    }

    fn headers(request: &CompletionRequest) -> Result<Vec<String>, ProviderError> {
        let key = request
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Authentication {
                message: "no API key supplied for anthropic".into(),
            })?;
        Ok(vec![
            format!("x-api-key: {key}"),
            format!("anthropic-version: {API_VERSION}"),
        ])
    }

    fn base_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model_id,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.user_prompt().unwrap_or_default()}],
        });
        if let Some(system) = request.system_prompt() {
            body["system"] = json!(system);
        }
        body
    }

    async fn call(
        &self,
        request: &CompletionRequest,
        body: serde_json::Value,
    ) -> Result<MessagesResponse, ProviderError> {
        let headers = Self::headers(request)?;
        let body_json = serde_json::to_string(&body).map_err(|e| ProviderError::InvalidRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let response = post_json(
            &Self::endpoint(request),
            &headers,
            &body_json,
            self.timeout_secs,
        )
        .await?;

        if !response.is_success() {
            return Err(classify_error_body(response.status, &response.body));
        }

        serde_json::from_str(&response.body).map_err(|e| ProviderError::InvalidResponse {
            message: format!("Failed to parse response: {e} - Body: {}", response.body),
        })
    }
}

/// Refine the generic status classification with the API's error envelope.
fn classify_error_body(status: u16, body: &str) -> ProviderError {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(body);
            let error_type = error.get("type").and_then(|t| t.as_str()).unwrap_or("");

            if error_type.contains("overloaded") {
                return ProviderError::Overloaded {
                    message: message.to_string(),
                };
            }
            if error_type.contains("rate_limit") {
                return ProviderError::from_status(429, message);
            }
            if error_type.contains("authentication") || error_type.contains("permission") {
                return ProviderError::Authentication {
                    message: message.to_string(),
                };
            }
            return ProviderError::from_status(status, message);
        }
    }
    ProviderError::from_status(status, body)
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    fn usage(&self) -> Option<TokenUsage> {
        self.usage.as_ref().map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn generate_text(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model_id, "anthropic generate_text");
        let response = self.call(request, Self::base_body(request)).await?;
        let usage = response.usage();

        let text = response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "response contained no text block".into(),
            })?;

        Ok(ProviderResponse::text(text, usage))
    }

    async fn generate_object(
        &self,
        request: &CompletionRequest,
        object_name: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model_id, object = object_name, "anthropic generate_object");

        let mut body = Self::base_body(request);
        body["tools"] = json!([{
            "name": object_name,
            "description": format!("Record the {object_name} payload"),
            "input_schema": {"type": "object", "additionalProperties": true},
        }]);
        body["tool_choice"] = json!({"type": "tool", "name": object_name});

        let response = self.call(request, body).await?;
        let usage = response.usage();

        let object = response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { input } => Some(input),
                _ => None,
            })
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "response contained no tool_use block".into(),
            })?;

        Ok(ProviderResponse::object(object, usage))
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_structured(&self) -> bool {
        true
    }
}
