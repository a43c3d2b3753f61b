use serde::Deserialize;
use std::fs;
use std::path::Path;

const ENV_CONFIG_PATH: &str = "T3C_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const DEFAULT_EXP_GROUP: &str = "provider_comparison";
const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_MAX_CONCURRENT_CALLS: usize = 1;

/// Supported text-generation providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    OpenRouter,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "openrouter" => Some(ProviderKind::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    /// Run name used when a request does not name its run
    pub fn default_run_name(&self) -> String {
        format!("custom_comments_{}", self.as_str())
    }

    /// Preset endpoint, pricing and credentials for this provider
    pub fn preset(&self) -> ProviderConfig {
        match self {
            ProviderKind::OpenAi => ProviderConfig {
                kind: *self,
                name: "OpenAI".to_string(),
                model: "gpt-4-turbo-preview".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                cost_in_per_10k: 0.1,
                cost_out_per_10k: 0.3,
                api_key_env: "OPENAI_API_KEY",
                api_key_prefix: "sk-",
                extra_headers: Vec::new(),
            },
            ProviderKind::OpenRouter => ProviderConfig {
                kind: *self,
                name: "OpenRouter (Gemini 2.0 Flash)".to_string(),
                model: "google/gemini-2.0-flash-001".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                cost_in_per_10k: 0.0075,
                cost_out_per_10k: 0.03,
                api_key_env: "OPENROUTER_API_KEY",
                api_key_prefix: "sk-or-",
                extra_headers: vec![
                    ("HTTP-Referer", "https://deepgov.ai"),
                    ("X-Title", "DeepGov LLM Pipeline"),
                ],
            },
        }
    }
}

/// Endpoint, pricing and credential settings of one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub name: String,
    pub model: String,
    pub base_url: String,
    /// USD per 10k input tokens
    pub cost_in_per_10k: f64,
    /// USD per 10k output tokens
    pub cost_out_per_10k: f64,
    pub api_key_env: &'static str,
    pub api_key_prefix: &'static str,
    pub extra_headers: Vec<(&'static str, &'static str)>,
}

impl ProviderConfig {
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = input_tokens as f64 * self.cost_in_per_10k / 10_000.0;
        let output_cost = output_tokens as f64 * self.cost_out_per_10k / 10_000.0;
        input_cost + output_cost
    }

    /// Read the API key from the provider's environment variable
    pub fn api_key(&self) -> Result<String, ApiKeyError> {
        self.validate_api_key(std::env::var(self.api_key_env).ok())
    }

    pub fn validate_api_key(&self, key: Option<String>) -> Result<String, ApiKeyError> {
        let key = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ApiKeyError::Missing(self.api_key_env))?;

        if !key.starts_with(self.api_key_prefix) {
            return Err(ApiKeyError::Malformed(self.api_key_env));
        }

        Ok(key)
    }
}

/// API key pre-flight failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiKeyError {
    #[error("API key not found in environment variable {0}")]
    Missing(&'static str),
    #[error("API key in {0} has an unexpected format")]
    Malformed(&'static str),
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub results_dir: Option<String>,
    #[serde(default)]
    pub max_concurrent_calls: Option<usize>,
    #[serde(default)]
    pub structured_outputs: Option<bool>,
    #[serde(default)]
    pub exp_group: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub results_dir: String,
    pub max_concurrent_calls: usize,
    pub structured_outputs: bool,
    pub exp_group: String,
    pub port: u16,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default().preset(),
            results_dir: DEFAULT_RESULTS_DIR.to_string(),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            structured_outputs: false,
            exp_group: DEFAULT_EXP_GROUP.to_string(),
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn from_env() -> Self {
        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = Self::load_config_file(&config_path).unwrap_or_default();

        let mut config = Self::from_file(file);

        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(provider) = std::env::var("T3C_PROVIDER") {
            match ProviderKind::parse(&provider) {
                Some(kind) => config.provider = kind.preset(),
                None => {
                    tracing::warn!(provider = %provider, "Unknown provider, keeping configured one")
                }
            }
        }
        if let Ok(model) = std::env::var("T3C_MODEL")
            && !model.trim().is_empty()
        {
            config.provider.model = model;
        }
        if let Ok(dir) = std::env::var("T3C_RESULTS_DIR") {
            config.results_dir = dir;
        }
        if let Ok(limit) = std::env::var("T3C_MAX_CONCURRENT_CALLS")
            && let Ok(limit) = limit.parse::<usize>()
        {
            config.max_concurrent_calls = limit.max(1);
        }

        config
    }

    /// Apply file settings on top of the defaults
    pub fn from_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        let mut provider = file.provider.unwrap_or_default().preset();
        if let Some(model) = file.model {
            provider.model = model;
        }

        Self {
            provider,
            results_dir: file.results_dir.unwrap_or(defaults.results_dir),
            max_concurrent_calls: file
                .max_concurrent_calls
                .unwrap_or(defaults.max_concurrent_calls)
                .max(1),
            structured_outputs: file.structured_outputs.unwrap_or(defaults.structured_outputs),
            exp_group: file.exp_group.unwrap_or(defaults.exp_group),
            port: defaults.port,
            host: defaults.host,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
