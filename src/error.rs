//! Custom error types for taskforge.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.
//!
//! The split that matters for callers: role-level failures (missing
//! configuration, missing credentials, exhausted provider retries) are
//! recorded and swallowed by the orchestrator while it advances through the
//! role sequence; only the variants for which [`TaskForgeError::is_fatal`]
//! returns `true` bypass role sequencing and surface immediately.

use std::path::PathBuf;
use thiserror::Error;

/// A single field-level problem found while validating an AI-produced task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field path, e.g. `"id"` or `"dependencies[2]"`.
    pub field: String,
    /// Human-readable description of what is wrong.
    pub message: String,
}

impl FieldIssue {
    /// Create a field issue
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Main error type for taskforge operations
#[derive(Error, Debug)]
pub enum TaskForgeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Provider or model missing (or invalid) for a role
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        role: Option<String>,
    },

    /// No credential could be resolved for a provider
    #[error("Missing credential for provider '{provider}': {detail}")]
    MissingCredential { provider: String, detail: String },

    /// Missing required file
    #[error("Missing required file: {}", path.display())]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// Malformed call request (e.g. no user prompt) - fatal, not role-advance
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Structured output requested from a model that cannot do tool calling.
    /// Fatal for the whole role sequence: no other role in the same request
    /// can fix a structural mismatch without a different model id.
    #[error(
        "Model '{model}' on provider '{provider}' does not support structured \
         output. Configure a tool-capable model for this role (see `taskforge \
         models`) or request plain text instead."
    )]
    CapabilityMismatch { provider: String, model: String },

    /// Every role in the sequence failed for ordinary reasons
    #[error("AI call failed after trying roles {attempted:?}: {message}")]
    AllRolesFailed {
        attempted: Vec<String>,
        message: String,
    },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// No extraction strategy produced parseable JSON
    #[error("Could not parse a JSON payload from the AI response: {message}")]
    ParseFailure {
        message: String,
        /// Raw response text, preserved for diagnostics.
        raw: String,
    },

    /// AI output failed task schema validation
    #[error("AI response failed schema validation: {}", format_issues(.issues))]
    SchemaViolation { issues: Vec<FieldIssue> },

    // =========================================================================
    // Task Store Errors
    // =========================================================================
    /// Task store operation failed
    #[error("Task store error: {message}")]
    Store { message: String },

    /// Refusal to overwrite an existing tag without explicit confirmation
    #[error(
        "Tag '{tag}' already contains {count} task(s). Pass --append to add to \
         it or --force to overwrite."
    )]
    TagNotEmpty { tag: String, count: usize },

    /// Referenced task does not exist
    #[error("Task {id} not found in tag '{tag}'")]
    TaskNotFound { id: String, tag: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(FieldIssue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TaskForgeError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            role: None,
        }
    }

    /// Create a configuration error scoped to a role
    pub fn configuration_for_role(message: impl Into<String>, role: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            role: Some(role.into()),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a task store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a parse failure, preserving the raw response text
    pub fn parse_failure(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ParseFailure {
            message: message.into(),
            raw: raw.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error bypasses role sequencing and aborts the whole call
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::CapabilityMismatch { .. }
                | Self::ParseFailure { .. }
                | Self::SchemaViolation { .. }
        )
    }

    /// Check if the orchestrator should record this and advance to the next role
    pub fn advances_role(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::MissingCredential { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } | Self::MissingCredential { .. } => 7,
            Self::CapabilityMismatch { .. } => 4,
            Self::ParseFailure { .. } | Self::SchemaViolation { .. } => 3,
            Self::TagNotEmpty { .. } => 2,
            Self::MissingFile { .. } => 6,
            _ => 1,
        }
    }
}

/// Type alias for taskforge results
pub type Result<T> = std::result::Result<T, TaskForgeError>;
