//! Project configuration: role bindings and credential resolution.
//!
//! Configuration lives in `.taskforge/config.json` under the project root
//! and binds each logical role (main/research/fallback) to a provider,
//! model id, and generation parameters. Provider names are parsed into the
//! typed [`ProviderKind`] set when the file is loaded, so a typo fails at
//! startup with an actionable message instead of at call time.
//!
//! # Example config.json
//!
//! ```json
//! {
//!   "models": {
//!     "main": {"provider": "anthropic", "modelId": "claude-sonnet-4", "maxTokens": 8192, "temperature": 0.2},
//!     "research": {"provider": "openai", "modelId": "gpt-4o"},
//!     "fallback": {"provider": "local", "modelId": "llama3"}
//!   }
//! }
//! ```

use crate::error::{Result, TaskForgeError};
use crate::llm::ProviderKind;
use crate::telemetry::ModelRates;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory under the project root holding taskforge state.
pub const CONFIG_DIR: &str = ".taskforge";
/// Configuration file name.
pub const CONFIG_FILE: &str = "config.json";
/// Project-local secret file name.
pub const KEYS_FILE: &str = "keys.json";

// =============================================================================
// Roles
// =============================================================================

/// A logical AI usage context, bound to a provider+model via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Main,
    Research,
    Fallback,
}

impl Role {
    /// All roles.
    pub const ALL: [Role; 3] = [Self::Main, Self::Research, Self::Fallback];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Research => "research",
            Self::Fallback => "fallback",
        }
    }

    /// Parse a role name. Returns `None` for unrecognized names; the
    /// orchestrator maps those to the main sequence with a warning.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "main" => Some(Self::Main),
            "research" => Some(Self::Research),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Role Bindings
// =============================================================================

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

/// Provider/model binding for one role, as stored in config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    /// Provider name (must parse as a [`ProviderKind`]).
    pub provider: String,
    /// Full model identifier as the backend expects it.
    pub model_id: String,
    /// Maximum output tokens for calls under this role.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature for calls under this role.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Base URL override for self-hosted deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// A role binding after provider-name validation.
#[derive(Debug, Clone)]
pub struct ResolvedRole {
    pub role: Role,
    pub provider: ProviderKind,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: Option<String>,
}

/// Per-role model bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<RoleBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<RoleBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<RoleBinding>,
}

// =============================================================================
// Project Configuration
// =============================================================================

/// Project configuration loaded from `.taskforge/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    /// Cost-table overrides keyed `"provider/modelId"`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cost_overrides: HashMap<String, ModelRates>,
}

impl ProjectConfig {
    /// Load and validate configuration for a project directory.
    ///
    /// A missing file yields the empty default configuration: every role is
    /// then unconfigured and the orchestrator will report that per role.
    pub fn load(project_dir: impl AsRef<Path>) -> Result<Self> {
        let path = project_dir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            TaskForgeError::configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configured bindings.
    ///
    /// Unknown provider names are rejected here, at configuration-load
    /// time, rather than at call time.
    pub fn validate(&self) -> Result<()> {
        for role in Role::ALL {
            if let Some(binding) = self.binding(role) {
                if ProviderKind::parse(&binding.provider).is_none() {
                    return Err(TaskForgeError::configuration_for_role(
                        format!(
                            "unknown provider '{}' (valid options: anthropic, openai, local)",
                            binding.provider
                        ),
                        role.as_str(),
                    ));
                }
                if binding.model_id.trim().is_empty() {
                    return Err(TaskForgeError::configuration_for_role(
                        "model id must not be empty",
                        role.as_str(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The raw binding for a role, if configured.
    #[must_use]
    pub fn binding(&self, role: Role) -> Option<&RoleBinding> {
        match role {
            Role::Main => self.models.main.as_ref(),
            Role::Research => self.models.research.as_ref(),
            Role::Fallback => self.models.fallback.as_ref(),
        }
    }

    /// Resolve a role to its provider, model, and generation parameters.
    pub fn resolve(&self, role: Role) -> Result<ResolvedRole> {
        let binding = self.binding(role).ok_or_else(|| {
            TaskForgeError::configuration_for_role(
                format!("no provider/model configured for role '{role}'"),
                role.as_str(),
            )
        })?;

        let provider = ProviderKind::parse(&binding.provider).ok_or_else(|| {
            TaskForgeError::configuration_for_role(
                format!("unknown provider '{}'", binding.provider),
                role.as_str(),
            )
        })?;

        Ok(ResolvedRole {
            role,
            provider,
            model_id: binding.model_id.clone(),
            max_tokens: binding.max_tokens,
            temperature: binding.temperature,
            base_url: binding.base_url.clone(),
        })
    }

    /// Write configuration back to the project directory.
    pub fn save(&self, project_dir: impl AsRef<Path>) -> Result<()> {
        let dir = project_dir.as_ref().join(CONFIG_DIR);
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(CONFIG_FILE), json)?;
        Ok(())
    }
}

// =============================================================================
// Credential Resolution
// =============================================================================

/// Environment lookup used during credential resolution.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves provider credentials in priority order:
/// caller-supplied session credential, process environment, project-local
/// secret file, then a user-level secret file.
#[derive(Clone, Default)]
pub struct CredentialResolver {
    project_dir: PathBuf,
    /// Caller-supplied session credentials, keyed by provider name.
    session_keys: HashMap<String, String>,
    /// Injected environment lookup; `None` reads the process environment.
    env: Option<EnvLookup>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("project_dir", &self.project_dir)
            .field("session_keys", &self.session_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialResolver {
    /// Create a resolver rooted at the project directory.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            session_keys: HashMap::new(),
            env: None,
        }
    }

    /// Supply a session credential for a provider.
    #[must_use]
    pub fn with_session_key(mut self, provider: &str, key: impl Into<String>) -> Self {
        self.session_keys.insert(provider.to_lowercase(), key.into());
        self
    }

    /// Replace the process-environment lookup (tests inject `|_| None`).
    #[must_use]
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = Some(env);
        self
    }

    /// Resolve the credential for a provider kind.
    ///
    /// Local/self-hosted providers resolve to `Ok(None)`: they legitimately
    /// require no credential.
    pub fn resolve(&self, kind: ProviderKind) -> Result<Option<String>> {
        match &self.env {
            Some(env) => self.resolve_with_env(kind, env.as_ref()),
            None => self.resolve_with_env(kind, &|name| std::env::var(name).ok()),
        }
    }

    /// Resolution with an injected environment lookup (testable).
    pub fn resolve_with_env(
        &self,
        kind: ProviderKind,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Option<String>> {
        if !kind.requires_credential() {
            return Ok(None);
        }

        if let Some(key) = self.session_keys.get(kind.as_str()) {
            return Ok(Some(key.clone()));
        }

        if let Some(env_var) = kind.api_key_env() {
            if let Some(key) = env(env_var).filter(|k| !k.trim().is_empty()) {
                return Ok(Some(key));
            }
        }

        let project_keys = self.project_dir.join(CONFIG_DIR).join(KEYS_FILE);
        if let Some(key) = read_key_file(&project_keys, kind)? {
            return Ok(Some(key));
        }

        if let Some(home) = dirs::home_dir() {
            let user_keys = home.join(CONFIG_DIR).join(KEYS_FILE);
            if let Some(key) = read_key_file(&user_keys, kind)? {
                return Ok(Some(key));
            }
        }

        Err(TaskForgeError::MissingCredential {
            provider: kind.as_str().to_string(),
            detail: format!(
                "no session credential, {} unset, and no entry in {}",
                kind.api_key_env().unwrap_or("(no env var)"),
                project_keys.display()
            ),
        })
    }
}

/// Read one provider's key from a `{"provider": "key"}` JSON file.
fn read_key_file(path: &Path, kind: ProviderKind) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let keys: HashMap<String, String> = serde_json::from_str(&contents).map_err(|e| {
        TaskForgeError::configuration(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(keys
        .get(kind.as_str())
        .filter(|k| !k.trim().is_empty())
        .cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn binding(provider: &str, model: &str) -> RoleBinding {
        RoleBinding {
            provider: provider.to_string(),
            model_id: model.to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: None,
        }
    }

    fn config_with_main(provider: &str, model: &str) -> ProjectConfig {
        ProjectConfig {
            models: ModelsConfig {
                main: Some(binding(provider, model)),
                research: None,
                fallback: None,
            },
            cost_overrides: HashMap::new(),
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("main"), Some(Role::Main));
        assert_eq!(Role::parse("RESEARCH"), Some(Role::Research));
        assert_eq!(Role::parse("fallback"), Some(Role::Fallback));
        assert_eq!(Role::parse("turbo"), None);
    }

    #[test]
    fn test_resolve_configured_role() {
        let config = config_with_main("anthropic", "claude-sonnet-4");
        let resolved = config.resolve(Role::Main).unwrap();
        assert_eq!(resolved.provider, ProviderKind::Anthropic);
        assert_eq!(resolved.model_id, "claude-sonnet-4");
        assert_eq!(resolved.max_tokens, 4096);
    }

    #[test]
    fn test_resolve_unconfigured_role_is_configuration_error() {
        let config = config_with_main("anthropic", "claude-sonnet-4");
        let err = config.resolve(Role::Fallback).unwrap_err();
        assert!(matches!(err, TaskForgeError::Configuration { .. }));
        assert!(err.advances_role());
    }

    #[test]
    fn test_validate_rejects_unknown_provider_at_load() {
        let config = config_with_main("bard", "gemini-pro");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bard"));
        assert!(err.to_string().contains("valid options"));
    }

    #[test]
    fn test_validate_rejects_empty_model_id() {
        let config = config_with_main("openai", "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        let config = ProjectConfig::load(temp.path()).unwrap();
        assert!(config.binding(Role::Main).is_none());
    }

    #[test]
    fn test_load_save_roundtrip_with_serde_defaults() {
        let temp = TempDir::new().unwrap();

        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE),
            r#"{"models": {"main": {"provider": "openai", "modelId": "gpt-4o"}}}"#,
        )
        .unwrap();

        let config = ProjectConfig::load(temp.path()).unwrap();
        let main = config.binding(Role::Main).unwrap();
        assert_eq!(main.max_tokens, 4096);
        assert!((main.temperature - 0.2).abs() < f32::EPSILON);

        config.save(temp.path()).unwrap();
        let reloaded = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(reloaded.binding(Role::Main).unwrap().model_id, "gpt-4o");
    }

    #[test]
    fn test_load_rejects_bad_provider() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE),
            r#"{"models": {"main": {"provider": "grok", "modelId": "g1"}}}"#,
        )
        .unwrap();

        assert!(ProjectConfig::load(temp.path()).is_err());
    }

    // =========================================================================
    // Credential resolution
    // =========================================================================

    #[test]
    fn test_credential_session_key_wins() {
        let temp = TempDir::new().unwrap();
        let resolver =
            CredentialResolver::new(temp.path()).with_session_key("anthropic", "sk-session");

        let key = resolver
            .resolve_with_env(ProviderKind::Anthropic, &|_| Some("sk-env".into()))
            .unwrap();
        assert_eq!(key, Some("sk-session".to_string()));
    }

    #[test]
    fn test_credential_env_beats_key_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(KEYS_FILE), r#"{"openai": "sk-file"}"#).unwrap();

        let resolver = CredentialResolver::new(temp.path());
        let key = resolver
            .resolve_with_env(ProviderKind::OpenAi, &|_| Some("sk-env".into()))
            .unwrap();
        assert_eq!(key, Some("sk-env".to_string()));
    }

    #[test]
    fn test_credential_falls_back_to_project_key_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(KEYS_FILE), r#"{"openai": "sk-file"}"#).unwrap();

        let resolver = CredentialResolver::new(temp.path());
        let key = resolver
            .resolve_with_env(ProviderKind::OpenAi, &|_| None)
            .unwrap();
        assert_eq!(key, Some("sk-file".to_string()));
    }

    #[test]
    fn test_credential_local_provider_needs_none() {
        let temp = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(temp.path());
        let key = resolver
            .resolve_with_env(ProviderKind::Local, &|_| None)
            .unwrap();
        assert_eq!(key, None);
    }

    #[test]
    fn test_credential_missing_everywhere_is_error() {
        let temp = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(temp.path());
        let err = resolver
            .resolve_with_env(ProviderKind::Anthropic, &|_| None)
            .unwrap_err();
        assert!(matches!(err, TaskForgeError::MissingCredential { .. }));
        assert!(err.advances_role());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_credential_blank_env_value_is_ignored() {
        let temp = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(temp.path());
        let result = resolver.resolve_with_env(ProviderKind::OpenAi, &|_| Some("   ".into()));
        assert!(result.is_err());
    }
}
