//! TaskForge - AI-assisted project task tracking.
//!
//! TaskForge turns a requirements document into a structured task graph,
//! lets an agent or human mutate that graph through natural-language
//! prompts, and persists the result as a tagged JSON document. The crate is
//! built around two cooperating cores: the call orchestrator, which makes
//! talking to heterogeneous AI backends reliable, and the reconciliation
//! engine, which turns raw (often malformed) AI output into schema-valid,
//! invariant-preserving task mutations.
//!
//! # Architecture
//!
//! - [`config`] - role bindings, project configuration, credential resolution
//! - [`error`] - custom error types and classification
//! - [`llm`] - provider adapters, registry, and the call orchestrator
//! - [`logging`] - logging capability interface with tracing/buffer sinks
//! - [`tasks`] - task data model, store, extraction, reconciliation
//! - [`telemetry`] - usage/cost records
//!
//! # Example
//!
//! ```rust,ignore
//! use taskforge::config::{CredentialResolver, ProjectConfig};
//! use taskforge::llm::{CallOrchestrator, OutputMode, ProviderRegistry};
//! use taskforge::logging::TracingSink;
//! use taskforge::tasks::Reconciler;
//!
//! let config = ProjectConfig::load(".")?;
//! let orchestrator = CallOrchestrator::new(
//!     config,
//!     ProviderRegistry::new(),
//!     CredentialResolver::new("."),
//!     TracingSink::shared(),
//! );
//!
//! let result = orchestrator
//!     .call("main", "parse-prd", Some(system), &prompt, OutputMode::Text)
//!     .await?;
//! let batch = Reconciler::new(TracingSink::shared())
//!     .parse_batch(result.response.as_text().unwrap_or_default())?;
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod tasks;
pub mod telemetry;

// Re-export commonly used types
pub use error::{FieldIssue, Result, TaskForgeError};

// Re-export configuration types
pub use config::{CredentialResolver, ProjectConfig, ResolvedRole, Role, RoleBinding};

// Re-export orchestration types
pub use llm::{
    CallOrchestrator, CompletionRequest, OrchestratorResult, OutputMode, Provider, ProviderError,
    ProviderKind, ProviderRegistry, ProviderResponse, RetryPolicy, TokenUsage,
};

// Re-export logging types
pub use logging::{BufferSink, LogLevel, LogSink, SharedSink, TracingSink};

// Re-export task types
pub use tasks::{
    MergeMode, Reconciler, Subtask, TagData, Task, TaskDocument, TaskPriority, TaskSelector,
    TaskStatus, TaskStore,
};

// Re-export telemetry types
pub use telemetry::{CostTable, ModelRates, TelemetryRecord};
