use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub captions: CaptionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` the control surface listens on.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// GGUF text model.
    pub model_path: PathBuf,
    /// GGUF multimodal projector (mmproj) matching the text model.
    pub projector_path: PathBuf,
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    /// Batch capacity; also the hard cap on generated tokens per caption.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Forward the engine's own log output.
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionsConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.batch_size == 0 {
            return Err(ConfigError::Invalid("engine.batch_size must be > 0".into()));
        }
        if self.engine.context_length == 0 {
            return Err(ConfigError::Invalid("engine.context_length must be > 0".into()));
        }
        if self.captions.interval_secs == 0 {
            return Err(ConfigError::Invalid("captions.interval_secs must be > 0".into()));
        }
        if self.captions.prompt.trim().is_empty() {
            return Err(ConfigError::Invalid("captions.prompt must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "localhost:8080".into()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_context_length() -> u32 {
    4096
}
fn default_batch_size() -> u32 {
    2048
}
fn default_prompt() -> String {
    "Give a very brief description of what is going on.".into()
}
fn default_interval() -> u64 {
    3
}
fn default_log_level() -> String {
    "info".into()
}
