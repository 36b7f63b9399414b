//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Weaver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Per-call oracle timeout; a timed-out call counts as an oracle failure
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: "anthropic/claude-sonnet-4-20250514".to_string(),
            fallback_models: vec![
                "anthropic/claude-3-5-haiku-latest".to_string(),
                "openai/gpt-4o".to_string(),
            ],
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

/// Knobs for the profile-driven discovery pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Candidates forwarded to the assessor after dedup
    pub top_n: usize,
    /// Minimum assessor confidence for a functional weave
    pub min_assessment_confidence: f64,
    /// Minimum match confidence for a philosophical weave
    pub min_philosophical_confidence: f64,
    /// Oracle calls in flight at once (1 = strictly serial)
    pub max_concurrency: usize,
    /// Run the philosophical profiling and matching stages
    pub philosophical: bool,
    /// Reuse cached profiles when repository inputs are unchanged
    pub use_profile_cache: bool,
    /// Keep one candidate per pair per type instead of one per pair
    pub allow_multiple_types_per_pair: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_n: 20,
            min_assessment_confidence: 0.6,
            min_philosophical_confidence: 0.5,
            max_concurrency: 4,
            philosophical: true,
            use_profile_cache: true,
            allow_multiple_types_per_pair: false,
        }
    }
}

/// Knobs for embedding-driven discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    pub max_results: usize,
    pub neighbors_per_fragment: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_results: 50,
            neighbors_per_fragment: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; defaults to `<config_dir>/weaver/weaver.db`
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            discovery: DiscoveryConfig::default(),
            retrieval: RetrievalConfig::default(),
            database: DatabaseSettings::default(),
        }
    }
}

/// Mask all but the last four characters of a key
fn redact_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let suffix: String = key.chars().skip(count - 4).collect();
    format!("***{}", suffix)
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("WEAVER_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key()
            .map(|opt| opt.map(|key| redact_key(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("WEAVER_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("weaver")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Database file path, honouring `database.path`
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("weaver.db")),
        }
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if self.discovery.max_concurrency == 0 {
            return Err(anyhow!("discovery.max_concurrency must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.discovery.min_assessment_confidence) {
            return Err(anyhow!("discovery.min_assessment_confidence must be between 0.0 and 1.0"));
        }
        if !(0.0..=1.0).contains(&self.discovery.min_philosophical_confidence) {
            return Err(anyhow!(
                "discovery.min_philosophical_confidence must be between 0.0 and 1.0"
            ));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(anyhow!("retrieval.similarity_threshold must be between -1.0 and 1.0"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.base_url" => Ok(self.llm.base_url.clone().unwrap_or_default()),
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // Discovery settings
            "discovery.top_n" => Ok(self.discovery.top_n.to_string()),
            "discovery.min_assessment_confidence" => {
                Ok(self.discovery.min_assessment_confidence.to_string())
            }
            "discovery.min_philosophical_confidence" => {
                Ok(self.discovery.min_philosophical_confidence.to_string())
            }
            "discovery.max_concurrency" => Ok(self.discovery.max_concurrency.to_string()),
            "discovery.philosophical" => Ok(self.discovery.philosophical.to_string()),
            "discovery.use_profile_cache" => Ok(self.discovery.use_profile_cache.to_string()),
            "discovery.allow_multiple_types_per_pair" => {
                Ok(self.discovery.allow_multiple_types_per_pair.to_string())
            }

            // Retrieval settings
            "retrieval.similarity_threshold" => Ok(self.retrieval.similarity_threshold.to_string()),
            "retrieval.max_results" => Ok(self.retrieval.max_results.to_string()),
            "retrieval.neighbors_per_fragment" => {
                Ok(self.retrieval.neighbors_per_fragment.to_string())
            }

            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use WEAVER_API_KEY or OPENROUTER_API_KEY env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `weaver config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.base_url" => {
                self.llm.base_url = if value.trim().is_empty() {
                    None
                } else {
                    Some(value.trim().to_string())
                };
            }
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "discovery.top_n" => {
                self.discovery.top_n = value
                    .parse()
                    .with_context(|| format!("Invalid top_n value: {}", value))?;
            }
            "discovery.min_assessment_confidence" => {
                self.discovery.min_assessment_confidence = parse_unit_interval(key, value)?;
            }
            "discovery.min_philosophical_confidence" => {
                self.discovery.min_philosophical_confidence = parse_unit_interval(key, value)?;
            }
            "discovery.max_concurrency" => {
                let n: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_concurrency value: {}", value))?;
                if n == 0 {
                    return Err(anyhow!("max_concurrency must be at least 1"));
                }
                self.discovery.max_concurrency = n;
            }
            "discovery.philosophical" => {
                self.discovery.philosophical = parse_bool(key, value)?;
            }
            "discovery.use_profile_cache" => {
                self.discovery.use_profile_cache = parse_bool(key, value)?;
            }
            "discovery.allow_multiple_types_per_pair" => {
                self.discovery.allow_multiple_types_per_pair = parse_bool(key, value)?;
            }

            "retrieval.similarity_threshold" => {
                let threshold: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid similarity_threshold value: {}", value))?;
                if !(-1.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("Similarity threshold must be between -1.0 and 1.0"));
                }
                self.retrieval.similarity_threshold = threshold;
            }
            "retrieval.max_results" => {
                self.retrieval.max_results = value
                    .parse()
                    .with_context(|| format!("Invalid max_results value: {}", value))?;
            }
            "retrieval.neighbors_per_fragment" => {
                self.retrieval.neighbors_per_fragment = value
                    .parse()
                    .with_context(|| format!("Invalid neighbors_per_fragment value: {}", value))?;
            }

            "database.path" => {
                self.database.path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value.trim()))
                };
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the WEAVER_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `weaver config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "llm.base_url",
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "discovery.top_n",
            "discovery.min_assessment_confidence",
            "discovery.min_philosophical_confidence",
            "discovery.max_concurrency",
            "discovery.philosophical",
            "discovery.use_profile_cache",
            "discovery.allow_multiple_types_per_pair",
            "retrieval.similarity_threshold",
            "retrieval.max_results",
            "retrieval.neighbors_per_fragment",
            "database.path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_unit_interval(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow!("Invalid boolean for {}: {}", key, value)),
    }
}
