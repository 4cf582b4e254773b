use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u16,
    #[serde(default = "default_hydration_concurrency")]
    pub hydration_concurrency: usize,
    #[serde(default = "default_history_poll_seconds")]
    pub poll_interval_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Request-history endpoint of the inspection service. Empty keeps the
    /// built-in sample feed.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_webhook_per_page")]
    pub per_page: u16,
    #[serde(default = "default_webhook_poll_seconds")]
    pub poll_interval_seconds: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    #[serde(default = "default_cost_per_minute")]
    pub cost_per_minute: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_host")]
    pub host: String,
    #[serde(default = "default_monitor_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            api_key: String::new(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            hydration_concurrency: default_hydration_concurrency(),
            poll_interval_seconds: default_history_poll_seconds(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            per_page: default_webhook_per_page(),
            poll_interval_seconds: default_webhook_poll_seconds(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            cost_per_minute: default_cost_per_minute(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: default_monitor_host(),
            port: default_monitor_port(),
        }
    }
}

fn default_provider_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

fn default_api_key_env() -> String {
    "ELEVENLABS_API_KEY".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_page_size() -> u16 {
    50
}

fn default_hydration_concurrency() -> usize {
    8
}

fn default_history_poll_seconds() -> f64 {
    30.0
}

fn default_webhook_per_page() -> u16 {
    20
}

fn default_webhook_poll_seconds() -> f64 {
    10.0
}

fn default_cost_per_minute() -> f64 {
    0.16
}

fn default_monitor_host() -> String {
    "127.0.0.1".to_string()
}

fn default_monitor_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

pub fn expand_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{}", home.to_string_lossy(), stripped);
        }
    }
    path.to_string()
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".callboard").join("config.toml"))
}

fn repo_default_config_path() -> PathBuf {
    PathBuf::from("config/callboard.toml")
}

/// Env vars consulted for the config path, most specific first.
const CONFIG_ENV_KEYS: [&str; 2] = ["CALLBOARD_MONITOR_CONFIG", "CALLBOARD_CONFIG"];

fn resolve_config_path_from(
    raw_path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
    home_path: Option<PathBuf>,
    repo_default: PathBuf,
) -> PathBuf {
    if let Some(path) = raw_path {
        return path;
    }

    let from_env = CONFIG_ENV_KEYS.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    });
    if let Some(path) = from_env {
        return PathBuf::from(expand_path(&path));
    }

    match home_path {
        Some(path) if path.exists() || !repo_default.exists() => path,
        _ => repo_default,
    }
}

/// `--config` flag, then the env vars, then `~/.callboard/config.toml`,
/// then `config/callboard.toml` under the working directory.
pub fn resolve_monitor_config_path(raw_path: Option<PathBuf>) -> PathBuf {
    resolve_config_path_from(
        raw_path,
        |key| std::env::var(key).ok(),
        home_config_path(),
        repo_default_config_path(),
    )
}

fn resolve_api_key(provider: &ProviderConfig, lookup: impl Fn(&str) -> Option<String>) -> String {
    let configured = provider.api_key.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }

    let env_key = provider.api_key_env.trim();
    if env_key.is_empty() {
        return String::new();
    }

    lookup(env_key)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn normalize_config(mut cfg: AppConfig) -> AppConfig {
    cfg.provider.api_key = resolve_api_key(&cfg.provider, |key| std::env::var(key).ok());
    cfg.provider.url = cfg.provider.url.trim().trim_end_matches('/').to_string();
    cfg.webhook.url = cfg.webhook.url.trim().to_string();
    cfg.history.page_size = cfg.history.page_size.max(1);
    cfg.history.hydration_concurrency = cfg.history.hydration_concurrency.max(1);

    cfg
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let cfg: AppConfig = toml::from_str(&content).context("failed to parse TOML config")?;
    Ok(normalize_config(cfg))
}
