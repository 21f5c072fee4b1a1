//! Client configuration and API factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizdesk_core::engine::EngineConfig;
use quizdesk_core::traits::ExamApi;

use crate::http::{HttpExamApi, DEFAULT_TIMEOUT_SECS};

/// Where and how to reach the exam backend.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token of the signed-in student.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Timing of an exam attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamConfig {
    #[serde(default = "default_autosave")]
    pub autosave_interval_secs: u64,
    #[serde(default = "default_tick")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_retries")]
    pub max_submit_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave(),
            tick_interval_ms: default_tick(),
            max_submit_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Top-level quizdesk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizdeskConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub exam: ExamConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_autosave() -> u64 {
    30
}
fn default_tick() -> u64 {
    1000
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}

impl QuizdeskConfig {
    /// Engine settings derived from the `[exam]` table.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(self.exam.tick_interval_ms.max(1)),
            autosave_interval: Duration::from_secs(self.exam.autosave_interval_secs.max(1)),
            max_submit_retries: self.exam.max_submit_retries,
            retry_delay: Duration::from_millis(self.exam.retry_delay_ms),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizdesk.toml` in the current directory
/// 2. `~/.config/quizdesk/config.toml`
///
/// Environment variable overrides: `QUIZDESK_API_URL`, `QUIZDESK_TOKEN`.
pub fn load_config() -> Result<QuizdeskConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizdeskConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizdesk.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuizdeskConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizdeskConfig::default(),
    };

    if let Ok(url) = std::env::var("QUIZDESK_API_URL") {
        config.api.base_url = url;
    }
    if let Ok(token) = std::env::var("QUIZDESK_TOKEN") {
        config.api.token = Some(token);
    }

    config.api.base_url = resolve_env_vars(&config.api.base_url);
    config.api.token = config
        .api
        .token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizdesk"))
}

/// Create the HTTP exam API from its configuration.
pub fn create_api(config: &ApiConfig) -> Result<Arc<dyn ExamApi>> {
    let api = HttpExamApi::new(
        &config.base_url,
        config.token.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(api))
}
