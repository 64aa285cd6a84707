//! Typed provider registry.
//!
//! Provider names from configuration are parsed into [`ProviderKind`] when
//! the configuration is loaded, so unknown names are rejected at startup
//! instead of surfacing as a string-lookup miss in the middle of a call.
//! The registry owns one adapter instance per kind and hands out
//! `Arc<dyn Provider>` handles.

use crate::llm::{AnthropicProvider, LocalProvider, OpenAiProvider, Provider};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The enumerated set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Anthropic-style Messages API.
    Anthropic,
    /// OpenAI-style chat-completions API.
    OpenAi,
    /// Local/self-hosted Ollama-style server.
    Local,
}

impl ProviderKind {
    /// All known kinds, in registry order.
    pub const ALL: [ProviderKind; 3] = [Self::Anthropic, Self::OpenAi, Self::Local];

    /// Canonical configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Local => "local",
        }
    }

    /// Environment variable consulted when resolving a credential.
    #[must_use]
    pub const fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Local => None,
        }
    }

    /// Whether this backend needs a credential at all.
    ///
    /// Local/self-hosted servers legitimately require none.
    #[must_use]
    pub const fn requires_credential(&self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Parse a configuration name. Accepts common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "open-ai" => Some(Self::OpenAi),
            "local" | "ollama" | "self-hosted" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Error for parsing [`ProviderKind`] from a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown provider: '{0}'. Valid options: anthropic, openai, local")]
pub struct ParseProviderKindError(pub String);

impl FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseProviderKindError(s.to_string()))
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registry of adapter instances, one per [`ProviderKind`].
///
/// Built once at startup; cloning is cheap (shared `Arc` handles).
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Build the standard registry with all real adapters.
    #[must_use]
    pub fn new() -> Self {
        let mut providers: HashMap<ProviderKind, Arc<dyn Provider>> = HashMap::new();
        providers.insert(ProviderKind::Anthropic, Arc::new(AnthropicProvider::new()));
        providers.insert(ProviderKind::OpenAi, Arc::new(OpenAiProvider::new()));
        providers.insert(ProviderKind::Local, Arc::new(LocalProvider::new()));
        Self { providers }
    }

    /// Build an empty registry for tests.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Replace or install the adapter for a kind (used by tests to inject
    /// mocks).
    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn Provider>) {
        self.providers.insert(kind, provider);
    }

    /// Get the adapter for a kind.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }

    /// Check whether a kind is registered.
    #[must_use]
    pub fn has(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Verify that the external tools the adapters depend on are present.
    ///
    /// The real adapters shell out to `curl`; better to find out at startup
    /// than on the first call.
    pub fn verify_tools() -> crate::error::Result<()> {
        which::which("curl").map_err(|_| {
            crate::error::TaskForgeError::configuration(
                "curl not found on PATH; taskforge needs it to reach AI providers",
            )
        })?;
        Ok(())
    }
}
