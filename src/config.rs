use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::content::GenerationConfig;
use crate::llm::{LLMConfig, LLMProvider};
use crate::transcript::{Tier, TranscriptConfig};
use crate::video::ranking::RankingConfig;
use crate::video::youtube::YouTubeConfig;

/// Configuration for coursesmith
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model provider
    pub llm: LLMConfig,

    /// YouTube Data API access
    pub youtube: YouTubeConfig,

    /// Video filter floors and score weights
    pub ranking: RankingConfig,

    /// Transcript tiers, tools and timeouts
    pub transcript: TranscriptConfig,

    /// Structured output retries and content limits
    pub generation: GenerationConfig,

    pub cache: CacheConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// JSON file holding every cached generation
    pub file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from(".cache/ai-responses.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "coursesmith=info,warn".to_string(),
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("coursesmith.toml"),
        PathBuf::from("config/coursesmith.toml"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(Path::new(&home).join(".config/coursesmith/config.toml"));
    }
    paths
}

fn parse_provider(value: &str) -> Option<LLMProvider> {
    match value.trim().to_lowercase().as_str() {
        "gemini" => Some(LLMProvider::Gemini),
        "openai" => Some(LLMProvider::OpenAI),
        "lmstudio" | "lm_studio" | "local" => Some(LLMProvider::LMStudio),
        _ => None,
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load from the first readable config file, then apply environment
    /// overrides. Defaults are used when no file exists.
    pub fn load() -> Result<Self> {
        for path in config_paths() {
            let Ok(config_str) = std::fs::read_to_string(&path) else {
                continue;
            };
            match toml::from_str::<Config>(&config_str) {
                Ok(mut config) => {
                    tracing::info!("📄 Loaded configuration from: {}", path.display());
                    config.apply_env();
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                }
            }
        }

        Self::from_env()
    }

    /// Load a specific file, with environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&config_str)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(provider) = env_value("COURSESMITH_LLM_PROVIDER") {
            match parse_provider(&provider) {
                Some(provider) => self.llm.provider = provider,
                None => tracing::warn!("Unknown LLM provider in environment: {}", provider),
            }
        }

        let provider_key = match self.llm.provider {
            LLMProvider::Gemini => env_value("GEMINI_API_KEY"),
            LLMProvider::OpenAI => env_value("OPENAI_API_KEY"),
            LLMProvider::LMStudio => None,
        };
        if let Some(api_key) = env_value("COURSESMITH_LLM_API_KEY").or(provider_key) {
            self.llm.api_key = Some(api_key);
        }

        if let Some(model) = env_value("COURSESMITH_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(endpoint) = env_value("COURSESMITH_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Some(api_key) = env_value("YOUTUBE_API_KEY") {
            self.youtube.api_key = Some(api_key);
        }

        if let Some(api_key) = env_value("GOOGLE_TRANSLATE_API_KEY") {
            self.transcript.translate_api_key = Some(api_key);
        }

        if let Some(cache_file) = env_value("COURSESMITH_CACHE_FILE") {
            self.cache.file = PathBuf::from(cache_file);
        }

        if let Some(log_level) = env_value("COURSESMITH_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.generation.max_attempts == 0 {
            return Err(anyhow!("generation.max_attempts must be greater than 0"));
        }

        let weights = [
            ("weight_ratio", self.ranking.weight_ratio),
            ("weight_views", self.ranking.weight_views),
            ("weight_recency", self.ranking.weight_recency),
            ("min_like_ratio", self.ranking.min_like_ratio),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("ranking.{} must be a non-negative number, got {}", name, value));
            }
        }

        self.transcript.validate()?;

        match self.llm.provider {
            LLMProvider::Gemini | LLMProvider::OpenAI => {
                if self.llm.api_key.is_none() {
                    return Err(anyhow!("API key required for {:?} provider", self.llm.provider));
                }
            }
            LLMProvider::LMStudio => {
                if self.llm.endpoint.is_none() {
                    return Err(anyhow!("Endpoint required for LMStudio provider"));
                }
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        let tiers: Vec<String> = self.transcript.tiers.iter().map(|t| format!("{:?}", t)).collect();
        format!(
            "Coursesmith Configuration:\n\
            - LLM: {:?} ({})\n\
            - YouTube API key: {}\n\
            - Ranking: min {} views, min like ratio {}\n\
            - Transcript tiers: {}\n\
            - Translation: {}\n\
            - Max attempts: {}\n\
            - Cache: {} ({})",
            self.llm.provider,
            self.llm.model,
            if self.youtube.api_key.is_some() { "set" } else { "missing" },
            self.ranking.min_view_count,
            self.ranking.min_like_ratio,
            tiers.join(" → "),
            if self.transcript.translate_api_key.is_some() {
                format!("to {}", self.transcript.target_language)
            } else {
                "disabled".to_string()
            },
            self.generation.max_attempts,
            self.cache.file.display(),
            if self.cache.enabled { "enabled" } else { "disabled" }
        )
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_llm_provider(mut self, provider: LLMProvider) -> Self {
        self.config.llm.provider = provider;
        self
    }

    pub fn with_llm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.llm.api_key = Some(api_key.into());
        self
    }

    pub fn with_youtube_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.youtube.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.generation.max_attempts = attempts;
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<Tier>) -> Self {
        self.config.transcript.tiers = tiers;
        self
    }

    pub fn with_cache_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config.cache.file = file.into();
        self
    }

    pub fn enable_caching(mut self, enable: bool) -> Self {
        self.config.cache.enabled = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
