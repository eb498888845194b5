//! Application configuration for SiteGen.
//!
//! User config lives at `~/.sitegen/sitegen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitegenError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitegen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitegen";

// ---------------------------------------------------------------------------
// Config structs (matching sitegen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-completion service settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Retry/backoff schedule for pipeline steps.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Which stage failures halt the whole run.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum page generations in flight at once.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: u32,

    /// Directory where run snapshots are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Path of the content database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_page_concurrency(),
            output_dir: default_output_dir(),
            db_path: default_db_path(),
        }
    }
}

fn default_page_concurrency() -> u32 {
    3
}
fn default_output_dir() -> String {
    "~/sitegen-runs".into()
}
fn default_db_path() -> String {
    "~/.sitegen/content.db".into()
}

/// `[anthropic]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Completion token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    300
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before a step is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff delays in ms, indexed by the retry count before the retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,

    /// Delay used for any retry index past the end of `backoff_ms`.
    #[serde(default = "default_fallback_backoff_ms")]
    pub fallback_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            fallback_backoff_ms: default_fallback_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> Vec<u64> {
    vec![1_000, 3_000]
}
fn default_fallback_backoff_ms() -> u64 {
    5_000
}

/// `[policy]` section: `true` means a failure of that stage ends the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub theme_fatal: bool,

    #[serde(default = "default_true")]
    pub template_parts_fatal: bool,

    #[serde(default)]
    pub pages_fatal: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            theme_fatal: true,
            template_parts_fatal: true,
            pages_fatal: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitegen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SitegenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitegen/sitegen.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SitegenError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SitegenError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SitegenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SitegenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SitegenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.anthropic.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(SitegenError::MissingCredentials {
            env_var: var_name.clone(),
        }),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
