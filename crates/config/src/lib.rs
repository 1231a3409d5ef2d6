//! Configuration loading, validation, and management for Wayfinder.
//!
//! Loads configuration from `~/.wayfinder/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use wayfinder_core::Purpose;

/// The root configuration structure.
///
/// Maps directly to `~/.wayfinder/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model chains and request parameters
    #[serde(default)]
    pub models: ModelsConfig,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Context compaction
    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// Chunking, indexing and search
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Provider-specific configurations (credentials live here)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_temperature() -> f32 {
    0.3
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_reasoning_prefixes() -> Vec<String> {
    vec!["o1".into(), "o3".into(), "o4".into(), "gpt-5".into()]
}
fn default_chain() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new("gpt-4.1", "azure"),
        ModelEntry::new("gpt-4.1-mini", "azure"),
    ]
}
fn default_true() -> bool {
    true
}

/// One model in a fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model name sent to the backend (e.g., "gpt-4.1")
    pub name: String,

    /// Key into the provider registry (e.g., "azure", "groq")
    pub backend: String,

    /// Cooldown after a fallback-class failure; falls back to `models.cooldown_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            cooldown_secs: None,
        }
    }
}

/// Optional purpose-specific model placed ahead of the shared chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurposeOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calling: Option<ModelEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ModelEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarization: Option<ModelEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<ModelEntry>,
}

impl PurposeOverrides {
    pub fn get(&self, purpose: Purpose) -> Option<&ModelEntry> {
        match purpose {
            Purpose::ToolCalling => self.tool_calling.as_ref(),
            Purpose::Analysis => self.analysis.as_ref(),
            Purpose::Summarization => self.summarization.as_ref(),
            Purpose::Synthesis => self.synthesis.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Temperature sent to non-reasoning models
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Per-descriptor request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Default cooldown for failed descriptors
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Model name prefixes that reject the temperature parameter
    #[serde(default = "default_reasoning_prefixes")]
    pub reasoning_prefixes: Vec<String>,

    /// Shared default chain, in priority order
    #[serde(default = "default_chain")]
    pub chain: Vec<ModelEntry>,

    #[serde(default)]
    pub overrides: PurposeOverrides,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            cooldown_secs: default_cooldown_secs(),
            reasoning_prefixes: default_reasoning_prefixes(),
            chain: default_chain(),
            overrides: PurposeOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Upper bound on model invocations in one turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Base system prompt; `{user_profile}` is replaced with the live profile summary
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Synthesis prompt; `{user_question}` and `{tool_results}` are substituted
    #[serde(default = "default_synthesis_prompt")]
    pub synthesis_prompt: String,

    /// Text shown in place of masked analysis results
    #[serde(default = "default_analysis_marker")]
    pub analysis_marker: String,
}

fn default_max_iterations() -> usize {
    25
}
fn default_tool_timeout_secs() -> u64 {
    60
}
fn default_system_prompt() -> String {
    "You are Wayfinder, an intelligent career advisor.\n\n\
     ## User Profile\n{user_profile}\n\n\
     ## Guidelines\n\
     Before saying you lack information about the user, search the knowledge base. \
     Use the dedicated tool for each task. If you see a conversation summary in your \
     context, use it for context only and never repeat it."
        .into()
}
fn default_synthesis_prompt() -> String {
    "You are writing the final answer to the user's question using the tool results below.\n\n\
     ## Question\n{user_question}\n\n\
     ## Tool results\n{tool_results}\n\n\
     Answer the question directly. Cite concrete findings from the results and \
     suggest one or two next steps."
        .into()
}
fn default_analysis_marker() -> String {
    "[Detailed analysis was displayed directly to the user. Do not repeat or summarize it. \
     Suggest 1-2 concrete next steps instead.]"
        .into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: default_system_prompt(),
            synthesis_prompt: default_synthesis_prompt(),
            analysis_marker: default_analysis_marker(),
        }
    }
}

/// Which [`wayfinder_core::TokenCounter`] to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCounterKind {
    #[default]
    Chars,
    Words,
}

impl TokenCounterKind {
    pub fn counter(self) -> std::sync::Arc<dyn wayfinder_core::TokenCounter> {
        match self {
            Self::Chars => std::sync::Arc::new(wayfinder_core::CharEstimate),
            Self::Words => std::sync::Arc::new(wayfinder_core::WordEstimate),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Transcript size that triggers compaction
    #[serde(default = "default_trigger_tokens")]
    pub trigger_tokens: usize,

    /// Most recent messages kept verbatim
    #[serde(default = "default_keep_messages")]
    pub keep_messages: usize,

    #[serde(default)]
    pub token_counter: TokenCounterKind,
}

fn default_trigger_tokens() -> usize {
    12_000
}
fn default_keep_messages() -> usize {
    20
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_tokens: default_trigger_tokens(),
            keep_messages: default_keep_messages(),
            token_counter: TokenCounterKind::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,

    /// Chunks smaller than this are merged when possible
    #[serde(default = "default_chunk_min_tokens")]
    pub chunk_min_tokens: usize,

    /// Records written per store call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Candidates fetched per requested result before filtering
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Dimensions of the local hashing embedder
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_chunk_max_tokens() -> usize {
    500
}
fn default_chunk_min_tokens() -> usize {
    50
}
fn default_batch_size() -> usize {
    64
}
fn default_overfetch_factor() -> usize {
    3
}
fn default_search_limit() -> usize {
    5
}
fn default_embedding_dimensions() -> usize {
    256
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: default_chunk_max_tokens(),
            chunk_min_tokens: default_chunk_min_tokens(),
            batch_size: default_batch_size(),
            overfetch_factor: default_overfetch_factor(),
            default_limit: default_search_limit(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.wayfinder/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `WAYFINDER_TEMPERATURE`
    /// - `WAYFINDER_MAX_ITERATIONS`
    /// - `WAYFINDER_<BACKEND>_API_KEY` for every backend named in a chain
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("WAYFINDER_TEMPERATURE") {
            self.models.default_temperature = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYFINDER_TEMPERATURE is not a number: {raw}"))
            })?;
        }

        if let Some(raw) = lookup("WAYFINDER_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYFINDER_MAX_ITERATIONS is not an integer: {raw}"))
            })?;
        }

        for backend in self.backends() {
            let var = format!("WAYFINDER_{}_API_KEY", backend.to_uppercase().replace('-', "_"));
            if let Some(key) = lookup(&var) {
                self.providers.entry(backend).or_default().api_key = Some(key);
            }
        }

        Ok(())
    }

    /// Every backend referenced by the default chain or an override, deduplicated.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let overrides = Purpose::ALL.iter().filter_map(|p| self.models.overrides.get(*p));
        for entry in self.models.chain.iter().chain(overrides) {
            if !names.contains(&entry.backend) {
                names.push(entry.backend.clone());
            }
        }
        names
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wayfinder")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.default_temperature < 0.0 || self.models.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "models.default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.models.chain.is_empty() {
            return Err(ConfigError::ValidationError(
                "models.chain must contain at least one model".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        let k = &self.knowledge;
        if k.chunk_min_tokens == 0 || k.chunk_min_tokens > k.chunk_max_tokens {
            return Err(ConfigError::ValidationError(format!(
                "knowledge.chunk_min_tokens ({}) must be in 1..=chunk_max_tokens ({})",
                k.chunk_min_tokens, k.chunk_max_tokens
            )));
        }

        if k.batch_size == 0 || k.overfetch_factor == 0 || k.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.batch_size, overfetch_factor and embedding_dimensions must be > 0".into(),
            ));
        }

        let s = &self.summarization;
        if s.keep_messages == 0 || s.trigger_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "summarization.keep_messages and trigger_tokens must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Stable SHA-256 fingerprint of the configuration, hex encoded.
    ///
    /// Two configs with the same fingerprint build identical agent contexts.
    pub fn fingerprint(&self) -> String {
        // serde_json over a HashMap is unordered; sort providers first
        let mut providers: Vec<_> = self.providers.iter().collect();
        providers.sort_by(|a, b| a.0.cmp(b.0));
        let canonical = serde_json::json!({
            "models": self.models,
            "agent": self.agent,
            "summarization": self.summarization,
            "knowledge": self.knowledge,
            "providers": providers,
        });

        let digest = Sha256::digest(canonical.to_string().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    /// Render this configuration as TOML, without credentials.
    pub fn to_toml(&self) -> String {
        let mut redacted = self.clone();
        for provider in redacted.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("[REDACTED]".into());
            }
        }
        toml::to_string_pretty(&redacted).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            agent: AgentSettings::default(),
            summarization: SummarizationConfig::default(),
            knowledge: KnowledgeConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for wayfinder_core::Error {
    fn from(e: ConfigError) -> Self {
        wayfinder_core::Error::Config { message: e.to_string() }
    }
}
