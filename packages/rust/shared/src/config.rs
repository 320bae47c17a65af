//! Application configuration for the tax-rate updater.
//!
//! User config lives at `~/.taxrates/taxrates.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaxRatesError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "taxrates.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".taxrates";

// ---------------------------------------------------------------------------
// Config structs (matching taxrates.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Narrative fetch service settings.
    #[serde(default)]
    pub content: ContentConfig,

    /// Destination file and log locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Worker pool size. 1 means strictly sequential.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Narrative size (in characters) above which extraction is chunked.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Total attempts per external call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base unit in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Only process keys that have a narrative file on the content service.
    #[serde(default)]
    pub only_with_files: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            only_with_files: false,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_chunk_size() -> usize {
    6000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider choice: `auto`, or a registered provider name.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the local chat-style endpoint.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_openai_url")]
    pub openai_url: String,

    /// Name of the env var holding the OpenAI API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token ceiling.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Request streamed (NDJSON) responses from the local endpoint.
    #[serde(default)]
    pub stream: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            ollama_url: default_ollama_url(),
            openai_url: default_openai_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            stream: false,
        }
    }
}

fn default_provider() -> String {
    "auto".into()
}
fn default_model() -> String {
    "gemma3:12b".into()
}
fn default_ollama_url() -> String {
    "http://localhost:5001".into()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_llm_timeout() -> u64 {
    300
}

/// `[content]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Base URL of the narrative fetch service.
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Timeout for extract and file downloads.
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,

    /// Timeout for health checks.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            extract_timeout_secs: default_extract_timeout(),
            health_timeout_secs: default_health_timeout(),
        }
    }
}

fn default_service_url() -> String {
    "http://localhost:5000".into()
}
fn default_extract_timeout() -> u64 {
    30
}
fn default_health_timeout() -> u64 {
    5
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Destination data module.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Name of the exported container object inside the data module.
    #[serde(default = "default_container")]
    pub container: String,

    /// Directory receiving trace logs.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            container: default_container(),
            logs_dir: default_logs_dir(),
        }
    }
}

fn default_data_file() -> String {
    "js/taxData.js".into()
}
fn default_container() -> String {
    "taxData".into()
}
fn default_logs_dir() -> String {
    "logs".into()
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Retry schedule shared by every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    /// Backoff unit; the delay before attempt `n` is `2^(n-2)` units.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: Duration::from_millis(default_backoff_ms()),
        }
    }
}

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Chunking threshold and chunk size, in characters.
    pub chunk_size: usize,
    /// Retry schedule for fetches and LLM calls.
    pub retry: RetryPolicy,
    /// Provider choice (`auto` or a provider name).
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: u32,
    /// Ask providers for streamed responses.
    pub stream: bool,
    /// Skip keys without a narrative file.
    pub only_with_files: bool,
    /// Destination data module.
    pub data_file: PathBuf,
    /// Exported container name.
    pub container: String,
    /// Trace log directory; `None` disables tracing to disk.
    pub logs_dir: Option<PathBuf>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.defaults.workers.max(1),
            chunk_size: config.defaults.chunk_size.max(1),
            retry: RetryPolicy {
                max_retries: config.defaults.max_retries.max(1),
                base_delay: Duration::from_millis(config.defaults.backoff_ms),
            },
            provider: config.llm.provider.clone(),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            stream: config.llm.stream,
            only_with_files: config.defaults.only_with_files,
            data_file: PathBuf::from(&config.paths.data_file),
            container: config.paths.container.clone(),
            logs_dir: Some(PathBuf::from(&config.paths.logs_dir)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.taxrates/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TaxRatesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.taxrates/taxrates.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TaxRatesError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TaxRatesError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TaxRatesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TaxRatesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TaxRatesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenAI API key from the configured env var, if set and non-empty.
pub fn openai_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.llm.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
