//! OpenAI-style provider adapter.
//!
//! Talks to a chat-completions API (`/v1/chat/completions`, bearer auth).
//! Structured object generation uses `response_format: json_object` and
//! parses the returned message content as JSON.
//!
//! Exactly one network attempt per invocation; retry lives upstream.

use crate::llm::error::ProviderError;
use crate::llm::http::post_json;
use crate::llm::{CompletionRequest, Message, MessageRole, Provider, ProviderResponse, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Adapter for OpenAI-style backends.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    timeout_secs: u64,
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiProvider {
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
        format!("{}/v1/chat/completions", base.trim_end_matches('/'))
    }

    fn headers(request: &CompletionRequest) -> Result<Vec<String>, ProviderError> {
        let key = request
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Authentication {
                message: "no API key supplied for openai".into(),
            })?;
        Ok(vec![format!("Authorization: Bearer {key}")])
    }

    fn chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.role {
                    MessageRole::System => "system".to_string(),
                    MessageRole::User => "user".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    async fn call(
        &self,
        request: &CompletionRequest,
        body: &ChatCompletionBody,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let headers = Self::headers(request)?;
        let body_json = serde_json::to_string(body).map_err(|e| ProviderError::InvalidRequest {
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

    fn first_content(response: ChatCompletionResponse) -> Result<(String, Option<TokenUsage>), ProviderError> {
        let usage = response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "response contained no choices".into(),
            })?;
        Ok((content, usage))
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

            if error_type.contains("rate_limit") || message.contains("rate limit") {
                return ProviderError::from_status(429, message);
            }
            if error_type.contains("authentication") || message.contains("API key") {
                return ProviderError::Authentication {
                    message: message.to_string(),
                };
            }
            return ProviderError::from_status(status, message);
        }
    }
    ProviderError::from_status(status, body)
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate_text(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model_id, "openai generate_text");

        let body = ChatCompletionBody {
            model: request.model_id.clone(),
            messages: Self::chat_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: None,
        };

        let response = self.call(request, &body).await?;
        let (content, usage) = Self::first_content(response)?;
        Ok(ProviderResponse::text(content, usage))
    }

    async fn generate_object(
        &self,
        request: &CompletionRequest,
        object_name: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model_id, object = object_name, "openai generate_object");

        let body = ChatCompletionBody {
            model: request.model_id.clone(),
            messages: Self::chat_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self.call(request, &body).await?;
        let (content, usage) = Self::first_content(response)?;

        let object: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ProviderError::InvalidResponse {
                message: format!("structured response was not valid JSON: {e}"),
            })?;

        Ok(ProviderResponse::object(object, usage))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn supports_structured(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_base_url_override() {
        let default = CompletionRequest::new("gpt-4o").with_user("hi");
        assert_eq!(
            OpenAiProvider::endpoint(&default),
            "https://api.openai.com/v1/chat/completions"
        );

        let custom = default.with_base_url(Some("https://llm.internal".into()));
        assert_eq!(
            OpenAiProvider::endpoint(&custom),
            "https://llm.internal/v1/chat/completions"
        );
    }

    #[test]
    fn test_headers_require_api_key() {
        let without_key = CompletionRequest::new("gpt-4o").with_user("hi");
        assert!(matches!(
            OpenAiProvider::headers(&without_key),
            Err(ProviderError::Authentication { .. })
        ));

        let with_key = without_key.with_api_key(Some("sk-test".into()));
        let headers = OpenAiProvider::headers(&with_key).unwrap();
        assert_eq!(headers, vec!["Authorization: Bearer sk-test".to_string()]);
    }

    #[test]
    fn test_chat_messages_maps_roles() {
        let req = CompletionRequest::new("gpt-4o")
            .with_user("make tasks")
            .with_system("planner");
        let messages = OpenAiProvider::chat_messages(&req.messages);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "make tasks");
    }

    #[test]
    fn test_parse_response_with_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "done"}}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let (content, usage) = OpenAiProvider::first_content(parsed).unwrap();
        assert_eq!(content, "done");
        assert_eq!(
            usage,
            Some(TokenUsage {
                input_tokens: 7,
                output_tokens: 3
            })
        );
    }

    #[test]
    fn test_parse_response_without_choices_fails() {
        let raw = r#"{"choices": []}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            OpenAiProvider::first_content(parsed),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_classify_rate_limit_error_body() {
        let body = r#"{"error": {"type": "rate_limit_exceeded", "message": "retry after 20 seconds"}}"#;
        match classify_error_body(429, body) {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 20),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_auth_error_body() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "Incorrect API key provided"}}"#;
        assert!(matches!(
            classify_error_body(401, body),
            ProviderError::Authentication { .. }
        ));
    }

    #[test]
    fn test_object_body_sets_response_format() {
        let body = ChatCompletionBody {
            model: "gpt-4o".into(),
            messages: vec![],
            max_tokens: 100,
            temperature: 0.2,
            response_format: Some(ResponseFormat {
                format_type: "json_object".into(),
            }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""response_format":{"type":"json_object"}"#));

        let plain = ChatCompletionBody {
            response_format: None,
            ..body
        };
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("response_format"));
    }

    #[test]
    fn test_supports_structured() {
        assert!(OpenAiProvider::new().supports_structured());
        assert_eq!(OpenAiProvider::new().name(), "openai");
    }
}
