//! Configuration management using the `prefer` crate (§6 environment
//! variables), simplified from the teacher's `config.rs` (DESIGN.md Open
//! Question 6): the multi-format config-next-to-database discovery and the
//! DB-backed `AppConfigSnapshot` cross-device sync are dropped — this
//! service's configuration surface is operator-supplied (container env or a
//! single config file), not a desktop tool with a roaming data directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::llm::ModelConfig;

/// File-loadable configuration (`prefer::FromValue` derive, same as the
/// teacher's `Config`). Every field is optional so a partial file, or no
/// file at all, is valid; `Settings::resolve` fills the rest with defaults
/// and environment-variable overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_retry_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_retrieval_top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_confidence_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_enable_self_correction: Option<bool>,
    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load a config file via `prefer`'s standard search paths
    /// (XDG config dir, `./dataforge.{toml,yaml,json,...}`, etc.).
    pub async fn load() -> Self {
        match prefer::load("dataforge").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_default(),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    pub async fn load_from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            Some("json") | Some("json5") => serde_json::from_str(&contents)?,
            _ => toml::from_str(&contents)?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }
}

/// Default batch size (§6 `BATCH_SIZE`).
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Default worker pool size (§6 `MAX_WORKERS`).
pub const DEFAULT_MAX_WORKERS: usize = 4;
/// Default per-task timeout in seconds (§6 `TASK_TIMEOUT`).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;
/// Default external-model retry budget (§6 `TASK_RETRY_LIMIT`).
pub const DEFAULT_TASK_RETRY_LIMIT: u32 = 3;
/// Default RAG retrieval breadth (§6 `RAG_RETRIEVAL_TOP_K`).
pub const DEFAULT_RAG_TOP_K: usize = 5;
/// Default RAG self-correction confidence gate (§6 `RAG_CONFIDENCE_THRESHOLD`).
pub const DEFAULT_RAG_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Resolved, immediately-usable settings: `Config::load()` plus defaults
/// plus environment-variable overrides (env always wins, matching the
/// teacher's `DATABASE_URL`-takes-highest-precedence rule).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub bind: String,
    pub batch_size: usize,
    pub max_workers: usize,
    pub task_timeout_secs: u64,
    pub task_retry_limit: u32,
    pub rag_retrieval_top_k: usize,
    pub rag_confidence_threshold: f32,
    pub rag_enable_self_correction: bool,
    pub model: ModelConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dataforge.db".to_string(),
            redis_url: None,
            bind: "127.0.0.1:3030".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            task_retry_limit: DEFAULT_TASK_RETRY_LIMIT,
            rag_retrieval_top_k: DEFAULT_RAG_TOP_K,
            rag_confidence_threshold: DEFAULT_RAG_CONFIDENCE_THRESHOLD,
            rag_enable_self_correction: true,
            model: ModelConfig::default(),
        }
    }
}

impl Settings {
    /// Apply a loaded `Config` over the defaults, then apply environment
    /// variable overrides (highest precedence, §6).
    pub fn resolve(config: &Config) -> Self {
        let mut settings = Self::default();

        if let Some(ref url) = config.database_url {
            settings.database_url = url.clone();
        }
        if config.redis_url.is_some() {
            settings.redis_url = config.redis_url.clone();
        }
        if let Some(ref bind) = config.bind {
            settings.bind = bind.clone();
        }
        if let Some(n) = config.batch_size {
            settings.batch_size = n;
        }
        if let Some(n) = config.max_workers {
            settings.max_workers = n;
        }
        if let Some(n) = config.task_timeout_secs {
            settings.task_timeout_secs = n;
        }
        if let Some(n) = config.task_retry_limit {
            settings.task_retry_limit = n;
        }
        if let Some(n) = config.rag_retrieval_top_k {
            settings.rag_retrieval_top_k = n;
        }
        if let Some(n) = config.rag_confidence_threshold {
            settings.rag_confidence_threshold = n;
        }
        if let Some(b) = config.rag_enable_self_correction {
            settings.rag_enable_self_correction = b;
        }

        settings.apply_env_overrides();
        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            if !v.is_empty() {
                self.database_url = v;
            }
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            if !v.is_empty() {
                self.redis_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                self.batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_workers = n;
            }
        }
        if let Ok(v) = std::env::var("TASK_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.task_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TASK_RETRY_LIMIT") {
            if let Ok(n) = v.parse() {
                self.task_retry_limit = n;
            }
        }
        if let Ok(v) = std::env::var("RAG_RETRIEVAL_TOP_K") {
            if let Ok(n) = v.parse() {
                self.rag_retrieval_top_k = n;
            }
        }
        if let Ok(v) = std::env::var("RAG_CONFIDENCE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.rag_confidence_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("RAG_ENABLE_SELF_CORRECTION") {
            if let Ok(b) = v.parse() {
                self.rag_enable_self_correction = b;
            }
        }
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url.starts_with("postgres://") || self.database_url.starts_with("postgresql://")
    }
}

/// Load settings via the full discovery chain: `prefer::load` then env
/// overrides (the async CLI/server entrypoint's usual first call).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    Settings::resolve(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_env_var_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.task_timeout_secs, 3600);
        assert_eq!(settings.task_retry_limit, 3);
        assert_eq!(settings.rag_retrieval_top_k, 5);
        assert!((settings.rag_confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert!(settings.rag_enable_self_correction);
    }

    #[test]
    fn config_file_values_override_defaults() {
        let config = Config {
            batch_size: Some(25),
            rag_enable_self_correction: Some(false),
            ..Default::default()
        };
        let settings = Settings::resolve(&config);
        assert_eq!(settings.batch_size, 25);
        assert!(!settings.rag_enable_self_correction);
        assert_eq!(settings.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn is_postgres_detects_the_scheme() {
        let mut settings = Settings::default();
        assert!(!settings.is_postgres());
        settings.database_url = "postgres://localhost/dataforge".to_string();
        assert!(settings.is_postgres());
    }
}
