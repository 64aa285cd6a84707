//! AI call orchestration: role sequencing, retry, and error aggregation.
//!
//! The orchestrator is the only way the rest of the crate talks to AI
//! backends. For a requested role it walks a deterministic fallback
//! sequence, resolving each role's provider/model/credential, invoking the
//! adapter with bounded retry on transient errors, and stopping at the
//! first success. Role attempts are strictly sequential - never raced - so
//! provider preference is deterministic.
//!
//! # Role sequences
//!
//! | requested     | sequence                      |
//! |---------------|-------------------------------|
//! | main          | main, fallback, research      |
//! | research      | research, fallback, main      |
//! | fallback      | fallback, main, research      |
//! | unrecognized  | main's sequence, with warning |
//!
//! # Failure handling
//!
//! Missing configuration or credentials for a role record the error and
//! advance. Retryable provider errors (rate-limit, overload, timeout,
//! network, 429/5xx) are retried in place up to twice with exponential
//! backoff, then the role fails and the sequence advances. A capability
//! mismatch (structured output against a model without tool support)
//! terminates the whole sequence immediately: no other role in the same
//! request can fix a structural mismatch. Only full exhaustion raises, as
//! one aggregated error carrying the most recent role's cleaned message.

use crate::config::{CredentialResolver, ProjectConfig, ResolvedRole, Role};
use crate::error::{Result, TaskForgeError};
use crate::llm::registry::ProviderRegistry;
use crate::llm::{CompletionRequest, Provider, ProviderError, ProviderResponse};
use crate::logging::SharedSink;
use crate::telemetry::{CostTable, TelemetryRecord};
use std::time::Duration;

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded-retry parameters for transient provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retries per role (attempts = retries + 1).
    pub max_retries: u32,
    /// Base backoff delay; attempt `n` waits `base * 2^(n-1)`.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1)))
    }
}

// =============================================================================
// Request / Result Types
// =============================================================================

/// Whether the caller wants plain text or a structured object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    /// Structured generation; the name labels the expected object (used as
    /// the forced tool name on backends that need one).
    Object { name: String },
}

impl OutputMode {
    /// Structured output with the given object name.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object { name: name.into() }
    }
}

/// Normalized result of a successful orchestrated call.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    /// The adapter's normalized response (text or object, plus usage).
    pub response: ProviderResponse,
    /// The role that actually served the request.
    pub role: Role,
    /// Provider name for logs and telemetry.
    pub provider: String,
    /// Model that served the request.
    pub model_id: String,
    /// Best-effort cost record; `None` when the backend reported no usage.
    pub telemetry: Option<TelemetryRecord>,
}

// =============================================================================
// Call Orchestrator
// =============================================================================

/// Sequences roles, retries transient errors, and normalizes results.
pub struct CallOrchestrator {
    config: ProjectConfig,
    registry: ProviderRegistry,
    credentials: CredentialResolver,
    costs: CostTable,
    sink: SharedSink,
    retry: RetryPolicy,
}

impl CallOrchestrator {
    /// Create an orchestrator with the default retry policy.
    #[must_use]
    pub fn new(
        config: ProjectConfig,
        registry: ProviderRegistry,
        credentials: CredentialResolver,
        sink: SharedSink,
    ) -> Self {
        let costs = CostTable::with_overrides(config.cost_overrides.clone());
        Self {
            config,
            registry,
            credentials,
            costs,
            sink,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use a millisecond base delay).
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deterministic fallback sequence for a requested role.
    #[must_use]
    pub fn role_sequence(role: Role) -> [Role; 3] {
        match role {
            Role::Main => [Role::Main, Role::Fallback, Role::Research],
            Role::Research => [Role::Research, Role::Fallback, Role::Main],
            Role::Fallback => [Role::Fallback, Role::Main, Role::Research],
        }
    }

    /// Run an orchestrated call.
    ///
    /// `requested_role` is the raw role name from the caller; unrecognized
    /// names default to main's sequence with a warning. `command_name` tags
    /// the telemetry record.
    pub async fn call(
        &self,
        requested_role: &str,
        command_name: &str,
        system_prompt: Option<&str>,
        prompt: &str,
        mode: OutputMode,
    ) -> Result<OrchestratorResult> {
        if prompt.trim().is_empty() {
            return Err(TaskForgeError::validation(
                "a non-empty user prompt is required",
            ));
        }

        let role = match Role::parse(requested_role) {
            Some(role) => role,
            None => {
                self.sink.warn(&format!(
                    "unrecognized role '{requested_role}'; defaulting to main"
                ));
                Role::Main
            }
        };

        let sequence = Self::role_sequence(role);
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        for role in sequence {
            attempted.push(role.to_string());

            let resolved = match self.config.resolve(role) {
                Ok(resolved) => resolved,
                Err(err) => {
                    self.sink
                        .debug(&format!("role '{role}' unavailable: {err}"));
                    last_error = Some(clean_message(&err.to_string()));
                    continue;
                }
            };

            let api_key = match self.credentials.resolve(resolved.provider) {
                Ok(key) => key,
                Err(err) => {
                    self.sink
                        .debug(&format!("role '{role}' unavailable: {err}"));
                    last_error = Some(clean_message(&err.to_string()));
                    continue;
                }
            };

            let Some(provider) = self.registry.get(resolved.provider) else {
                last_error = Some(format!(
                    "provider '{}' is not registered",
                    resolved.provider
                ));
                continue;
            };

            // A structural mismatch aborts the whole sequence: retrying on
            // another role cannot conjure tool support for this request.
            if matches!(mode, OutputMode::Object { .. }) && !provider.supports_structured() {
                return Err(TaskForgeError::CapabilityMismatch {
                    provider: resolved.provider.as_str().to_string(),
                    model: resolved.model_id.clone(),
                });
            }

            let request = build_request(&resolved, api_key, system_prompt, prompt);

            match self.attempt_role(provider.as_ref(), &request, &mode, role).await {
                Ok(response) => {
                    if attempted.len() > 1 {
                        self.sink.info(&format!(
                            "request served by role '{role}' after {} attempt(s)",
                            attempted.len()
                        ));
                    }
                    let telemetry = response.usage.map(|usage| {
                        self.costs.record(
                            self.sink.as_ref(),
                            command_name,
                            resolved.provider.as_str(),
                            &resolved.model_id,
                            usage,
                        )
                    });
                    if telemetry.is_none() {
                        self.sink
                            .debug("provider reported no usage; skipping telemetry");
                    }
                    self.sink
                        .success(&format!("AI call completed via {role}/{}", resolved.model_id));
                    return Ok(OrchestratorResult {
                        response,
                        role,
                        provider: resolved.provider.as_str().to_string(),
                        model_id: resolved.model_id,
                        telemetry,
                    });
                }
                Err(err) => {
                    self.sink.warn(&format!(
                        "role '{role}' failed ({err}); advancing to next role"
                    ));
                    last_error = Some(clean_message(&err.to_string()));
                }
            }
        }

        Err(TaskForgeError::AllRolesFailed {
            attempted,
            message: last_error.unwrap_or_else(|| "no roles are configured".to_string()),
        })
    }

    /// Invoke one provider with bounded retry on retryable error classes.
    async fn attempt_role(
        &self,
        provider: &dyn Provider,
        request: &CompletionRequest,
        mode: &OutputMode,
        role: Role,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let max_attempts = self.retry.max_retries + 1;

        let mut attempt = 1;
        loop {
            self.sink.debug(&format!(
                "role '{role}' attempt {attempt}/{max_attempts} on {}",
                provider.name()
            ));

            let outcome = match mode {
                OutputMode::Text => provider.generate_text(request).await,
                OutputMode::Object { name } => provider.generate_object(request, name).await,
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay(attempt);
                    self.sink.warn(&format!(
                        "retryable provider error ({err}); retrying in {}ms",
                        delay.as_millis()
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Build the uniform provider payload for a resolved role.
fn build_request(
    resolved: &ResolvedRole,
    api_key: Option<String>,
    system_prompt: Option<&str>,
    prompt: &str,
) -> CompletionRequest {
    let mut request = CompletionRequest::new(&resolved.model_id)
        .with_user(prompt)
        .with_api_key(api_key)
        .with_params(resolved.max_tokens, resolved.temperature)
        .with_base_url(resolved.base_url.clone());
    if let Some(system) = system_prompt {
        request = request.with_system(system);
    }
    request
}

/// Reduce an error chain to its first line, trimmed, for the consolidated
/// user-visible message. Full detail stays in debug logs.
fn clean_message(message: &str) -> String {
    message.lines().next().unwrap_or(message).trim().to_string()
}
