//! Taskmind 配置系统
//!
//! 支持 YAML 配置文件和环境变量覆盖

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::llm::provider::{DEFAULT_TIMEOUT_MS, ProviderId, ProviderSettings, mask_key};

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = ".taskmind/config.yaml";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid config {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Taskmind 主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskmindConfig {
    /// LLM 配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Which providers take part in orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Every configured provider, in `order`
    #[default]
    Auto,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(alias = "google")]
    Gemini,
}

impl ProviderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMode::Auto => "auto",
            ProviderMode::OpenAi => "openai",
            ProviderMode::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ProviderMode::Auto),
            "openai" => Ok(ProviderMode::OpenAi),
            "gemini" | "google" => Ok(ProviderMode::Gemini),
            other => Err(format!("unknown provider mode: {other}")),
        }
    }
}

/// LLM 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// auto | openai | gemini
    #[serde(default)]
    pub mode: ProviderMode,

    /// 单次调用超时 (毫秒)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Trial order in auto mode
    #[serde(default = "default_order")]
    pub order: Vec<ProviderId>,

    #[serde(default)]
    pub openai: ProviderEntry,

    #[serde(default)]
    pub gemini: ProviderEntry,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_order() -> Vec<ProviderId> {
    ProviderId::ALL.to_vec()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            timeout_ms: default_timeout_ms(),
            order: default_order(),
            openai: ProviderEntry::default(),
            gemini: ProviderEntry::default(),
        }
    }
}

/// Provider 配置
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// API Key; a provider without one is not configured
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Overrides `llm.timeout_ms` for this provider
    pub timeout_ms: Option<u64>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("api_key", &self.api_key.as_deref().map(mask_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProviderEntry {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

impl LlmConfig {
    pub fn entry(&self, provider: ProviderId) -> &ProviderEntry {
        match provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Gemini => &self.gemini,
        }
    }

    pub fn entry_mut(&mut self, provider: ProviderId) -> &mut ProviderEntry {
        match provider {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Gemini => &mut self.gemini,
        }
    }

    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("llm.timeout_ms must be greater than 0".to_string());
        }
        for provider in [ProviderId::OpenAi, ProviderId::Gemini] {
            if self.entry(provider).timeout_ms == Some(0) {
                return Err(format!("llm.{provider}.timeout_ms must be greater than 0"));
            }
        }
        Ok(())
    }

    fn settings_for(&self, provider: ProviderId) -> Option<ProviderSettings> {
        let entry = self.entry(provider);
        let api_key = entry.api_key()?;

        let mut settings = ProviderSettings::new(provider, api_key)
            .with_timeout_ms(entry.timeout_ms.unwrap_or(self.timeout_ms));
        if let Some(model) = entry.model.as_deref().filter(|m| !m.trim().is_empty()) {
            settings = settings.with_model(model);
        }
        if let Some(base_url) = entry.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            settings = settings.with_base_url(base_url);
        }
        Some(settings)
    }

    /// Settings of every usable provider, in trial order.
    ///
    /// A pinned provider without credentials yields an empty chain.
    pub fn provider_chain(&self) -> Vec<ProviderSettings> {
        let ids: Vec<ProviderId> = match self.mode {
            ProviderMode::OpenAi => vec![ProviderId::OpenAi],
            ProviderMode::Gemini => vec![ProviderId::Gemini],
            ProviderMode::Auto => {
                let mut ids = Vec::new();
                for id in &self.order {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
                ids
            }
        };
        ids.into_iter()
            .filter_map(|id| self.settings_for(id))
            .collect()
    }
}

/// Backing store for tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Json,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储类型
    #[serde(default)]
    pub backend: StorageBackend,

    /// JSON 文件路径
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".taskmind/tasks.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

/// 配置加载器
///
/// File values first, then environment overrides.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    config: TaskmindConfig,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_CONFIG_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: TaskmindConfig::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file (a missing file means defaults) and the process environment
    pub fn load(&mut self) -> Result<(), ConfigError> {
        self.load_file()?;
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    fn load_file(&mut self) -> Result<(), ConfigError> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: TaskmindConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        config.llm.validate().map_err(|message| ConfigError::Invalid {
            path: self.path.clone(),
            message,
        })?;
        self.config = config;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in [`load`](Self::load))
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.trim().is_empty())
        };
        let llm = &mut self.config.llm;

        if let Some(value) = first(&["TASKMIND_AI_PROVIDER"]) {
            llm.mode = value.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "TASKMIND_AI_PROVIDER".to_string(),
                value,
            })?;
        }
        if let Some(key) = first(&["TASKMIND_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            llm.openai.api_key = Some(key);
        }
        if let Some(key) = first(&[
            "TASKMIND_GEMINI_API_KEY",
            "GOOGLE_AI_API_KEY",
            "GEMINI_API_KEY",
        ]) {
            llm.gemini.api_key = Some(key);
        }
        if let Some(value) = first(&["TASKMIND_LLM_TIMEOUT_MS"]) {
            llm.timeout_ms = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidEnv {
                    key: "TASKMIND_LLM_TIMEOUT_MS".to_string(),
                    value,
                })?;
        }
        Ok(())
    }

    pub fn config(&self) -> &TaskmindConfig {
        &self.config
    }

    pub fn into_config(self) -> TaskmindConfig {
        self.config
    }
}
