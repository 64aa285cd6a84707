//! Local/self-hosted provider adapter (Ollama-style).
//!
//! Talks to a locally running model server (`/api/chat`). No credential is
//! required - a missing API key is legitimate here, not an error. The
//! backend has no tool/function calling, so structured object generation is
//! reported as unsupported and the orchestrator raises a capability
//! mismatch before any network traffic happens.

use crate::llm::error::ProviderError;
use crate::llm::http::post_json;
use crate::llm::{CompletionRequest, MessageRole, Provider, ProviderResponse, TokenUsage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Adapter for a local Ollama-style model server.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    timeout_secs: u64,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    /// Create an adapter with the default request timeout.
    ///
    /// Local inference can be slow on modest hardware, so the default
    /// timeout is more generous than for hosted backends.
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
        format!("{}/api/chat", base.trim_end_matches('/'))
    }

    fn body(request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": request.model_id,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatResponse {
    fn usage(&self) -> Option<TokenUsage> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(input), Some(output)) => Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    async fn generate_text(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model_id, "local generate_text");

        let body = serde_json::to_string(&Self::body(request)).map_err(|e| {
            ProviderError::InvalidRequest {
                message: format!("Failed to serialize request: {e}"),
            }
        })?;

        let response = post_json(&Self::endpoint(request), &[], &body, self.timeout_secs).await?;

        if !response.is_success() {
            return Err(ProviderError::from_status(response.status, &response.body));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&response.body).map_err(|e| ProviderError::InvalidResponse {
                message: format!("Failed to parse response: {e} - Body: {}", response.body),
            })?;

        let usage = parsed.usage();
        Ok(ProviderResponse::text(parsed.message.content, usage))
    }

    async fn generate_object(
        &self,
        _request: &CompletionRequest,
        _object_name: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: "local".into(),
            operation: "structured output".into(),
        })
    }

    fn name(&self) -> &str {
        "local"
    }

    fn supports_structured(&self) -> bool {
        false
    }
}
