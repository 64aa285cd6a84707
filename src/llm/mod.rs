//! Provider abstraction layer for multi-backend AI support.
//!
//! This module provides a trait-based abstraction over AI backends, enabling
//! taskforge to talk to Anthropic-style, OpenAI-style, and local
//! (Ollama-style) APIs through a unified interface.
//!
//! # Architecture
//!
//! The [`Provider`] trait defines the uniform capability surface every
//! adapter must implement: `generate_text`, `stream_text`, and
//! `generate_object`. It is designed to be:
//!
//! - **Object-safe**: supports dynamic dispatch via `Arc<dyn Provider>`
//! - **Thread-safe**: `Send + Sync` bounds enable concurrent usage
//! - **Single-attempt**: adapters make exactly one network attempt per
//!   invocation; retry and fallback live in the orchestrator
//!
//! # Example
//!
//! ```rust,ignore
//! use taskforge::llm::{CompletionRequest, MockProvider, Provider};
//!
//! let provider: Box<dyn Provider> = Box::new(
//!     MockProvider::new().with_response("{\"tasks\": []}"),
//! );
//!
//! let request = CompletionRequest::new("mock-model").with_user("Generate tasks");
//! let response = provider.generate_text(&request).await?;
//! ```

pub mod anthropic;
pub mod error;
pub mod http;
pub mod local;
pub mod openai;
pub mod orchestrator;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use orchestrator::{CallOrchestrator, OrchestratorResult, OutputMode, RetryPolicy};
pub use registry::{ProviderKind, ProviderRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Request / Response Types
// =============================================================================

/// Role of a chat message. Only system and user messages are sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A single chat message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Uniform provider call payload.
///
/// Built by the orchestrator from the resolved role binding plus the
/// caller's prompt; adapters translate it into their backend's wire format.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Credential for the backend; `None` for local providers.
    pub api_key: Option<String>,
    /// Full model identifier as the backend expects it.
    pub model_id: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Ordered messages; at most one system message, exactly one user message.
    pub messages: Vec<Message>,
    /// Override for the backend base URL (self-hosted deployments).
    pub base_url: Option<String>,
}

impl CompletionRequest {
    /// Create a request for the given model with default generation parameters.
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model_id: model_id.into(),
            max_tokens: 4096,
            temperature: 0.2,
            messages: Vec::new(),
            base_url: None,
        }
    }

    /// Prepend a system message.
    #[must_use]
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.messages.insert(
            0,
            Message {
                role: MessageRole::System,
                content: content.into(),
            },
        );
        self
    }

    /// Append the user message.
    #[must_use]
    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role: MessageRole::User,
            content: content.into(),
        });
        self
    }

    /// Set the credential.
    #[must_use]
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Set generation parameters.
    #[must_use]
    pub fn with_params(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Set the base URL override.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// The user message content, if present.
    #[must_use]
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// The system message content, if present.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens in and out.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Result payload of a provider call: raw text or a structured object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Text(String),
    Object(serde_json::Value),
}

/// Normalized provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub payload: ResponsePayload,
    /// Usage is best-effort; some backends omit it.
    pub usage: Option<TokenUsage>,
}

impl ProviderResponse {
    /// Build a text response.
    #[must_use]
    pub fn text(text: impl Into<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            payload: ResponsePayload::Text(text.into()),
            usage,
        }
    }

    /// Build a structured-object response.
    #[must_use]
    pub fn object(value: serde_json::Value, usage: Option<TokenUsage>) -> Self {
        Self {
            payload: ResponsePayload::Object(value),
            usage,
        }
    }

    /// The text payload, if this is a text response.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ResponsePayload::Text(t) => Some(t),
            ResponsePayload::Object(_) => None,
        }
    }

    /// The object payload, if this is a structured response.
    #[must_use]
    pub fn as_object(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            ResponsePayload::Object(v) => Some(v),
            ResponsePayload::Text(_) => None,
        }
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Abstraction over a single AI backend.
///
/// Implementations translate the uniform [`CompletionRequest`] into their
/// backend's wire format and make **exactly one** network attempt per
/// invocation. They must not retry internally: retry and role fallback are
/// the orchestrator's job, and double-retrying would multiply backoff
/// delays unpredictably.
///
/// # Errors
///
/// All failures surface as [`ProviderError`] carrying enough structure
/// (message, nested cause, HTTP-like status) for classification upstream.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate plain text for the request.
    async fn generate_text(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Stream text for the request.
    ///
    /// Adapters without true streaming fall back to a single
    /// [`Provider::generate_text`] call; the contract (one network attempt,
    /// full text returned) is identical either way.
    async fn stream_text(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.generate_text(request).await
    }

    /// Generate a structured object for the request.
    ///
    /// `object_name` names the schema for backends that require one (e.g.
    /// a forced tool name). Callers must check
    /// [`Provider::supports_structured`] first; adapters for incapable
    /// backends return [`ProviderError::Unsupported`].
    async fn generate_object(
        &self,
        request: &CompletionRequest,
        object_name: &str,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Short provider name used in logs and telemetry.
    fn name(&self) -> &str;

    /// Whether the backend can perform tool/function calling, which
    /// structured object generation requires.
    fn supports_structured(&self) -> bool;
}

// =============================================================================
// Mock Provider (test support)
// =============================================================================

/// Error class a [`MockProvider`] should fabricate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Overloaded,
    Timeout,
    Connection,
    Server(u16),
    Authentication,
    InvalidRequest,
}

impl MockFailure {
    fn to_error(self) -> ProviderError {
        match self {
            Self::RateLimited => ProviderError::RateLimited {
                message: "mock rate limit".into(),
                retry_after_secs: 1,
            },
            Self::Overloaded => ProviderError::Overloaded {
                message: "mock overload".into(),
            },
            Self::Timeout => ProviderError::Timeout { timeout_secs: 1 },
            Self::Connection => ProviderError::Connection {
                message: "mock connection refused".into(),
            },
            Self::Server(status) => ProviderError::Server {
                status,
                message: "mock server error".into(),
            },
            Self::Authentication => ProviderError::Authentication {
                message: "mock invalid key".into(),
            },
            Self::InvalidRequest => ProviderError::InvalidRequest {
                message: "mock bad request".into(),
            },
        }
    }
}

/// Mock provider for testing.
///
/// Provides controllable behavior for unit tests without making network
/// calls. Thread-safe for use in async contexts.
///
/// # Example
///
/// ```rust,ignore
/// use taskforge::llm::{MockFailure, MockProvider};
///
/// let provider = MockProvider::new()
///     .with_response("ok")
///     .with_fail_count(2, MockFailure::Timeout);
/// ```
#[derive(Debug)]
pub struct MockProvider {
    /// Text to return from `generate_text`.
    response: String,
    /// Object to return from `generate_object`.
    object: serde_json::Value,
    /// Usage attached to successful responses.
    usage: Option<TokenUsage>,
    /// Permanent failure (if set, every call fails).
    failure: Option<MockFailure>,
    /// Number of calls to fail before succeeding.
    fail_count: AtomicU32,
    /// Failure class for `fail_count` failures.
    fail_with: MockFailure,
    /// Provider name.
    name: String,
    /// Whether structured output is supported.
    structured: bool,
    /// Count of adapter invocations (text + object).
    call_count: AtomicU32,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            response: String::new(),
            object: serde_json::Value::Null,
            usage: Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            }),
            failure: None,
            fail_count: AtomicU32::new(0),
            fail_with: MockFailure::Timeout,
            name: "mock".to_string(),
            structured: true,
            call_count: AtomicU32::new(0),
        }
    }
}

impl MockProvider {
    /// Create a new mock provider with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text response.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Set the structured-object response.
    #[must_use]
    pub fn with_object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    /// Set the usage attached to successes (`None` to omit usage).
    #[must_use]
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Make every call fail with the given class.
    #[must_use]
    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Fail the first `count` calls with `failure`, then succeed.
    #[must_use]
    pub fn with_fail_count(mut self, count: u32, failure: MockFailure) -> Self {
        self.fail_count = AtomicU32::new(count);
        self.fail_with = failure;
        self
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set whether structured output is supported.
    #[must_use]
    pub fn with_structured_support(mut self, supported: bool) -> Self {
        self.structured = supported;
        self
    }

    /// Number of adapter invocations so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<(), ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_count.load(Ordering::SeqCst) > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            return Err(self.fail_with.to_error());
        }

        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }

        Ok(())
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate_text(
        &self,
        _request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.next_outcome()?;
        Ok(ProviderResponse::text(self.response.clone(), self.usage))
    }

    async fn generate_object(
        &self,
        _request: &CompletionRequest,
        _object_name: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.structured {
            return Err(ProviderError::Unsupported {
                provider: self.name.clone(),
                operation: "structured output".into(),
            });
        }
        self.next_outcome()?;
        Ok(ProviderResponse::object(self.object.clone(), self.usage))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_structured(&self) -> bool {
        self.structured
    }
}
