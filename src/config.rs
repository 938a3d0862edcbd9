use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactotumConfig {
    // HTTP server
    #[serde(default = "default_backend_bind")]
    pub backend_bind: String,

    // Storage
    #[serde(default = "default_database_path")]
    pub database_path: String,

    // LLM configuration (OpenAI-compatible: Ollama, LM Studio, vLLM, OpenAI, etc.)
    // An empty api_url selects the offline placeholder gateway.
    #[serde(default)]
    pub llm_api_url: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_bind() -> String {
    "127.0.0.1:2022".to_string()
}

fn default_database_path() -> String {
    "factotum_data.db".to_string()
}

fn default_llm_model() -> String {
    "gpt-4".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for FactotumConfig {
    fn default() -> Self {
        Self {
            backend_bind: default_backend_bind(),
            database_path: default_database_path(),
            llm_api_url: String::new(),
            llm_api_key: String::new(),
            llm_model: default_llm_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FactotumConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("factotum_config.toml")
    }

    /// Load config from factotum_config.toml (next to executable)
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<FactotumConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Save config to file (next to executable)
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind) = env::var("FACTOTUM_BACKEND_BIND") {
            if !bind.trim().is_empty() {
                config.backend_bind = bind;
            }
        }

        if let Ok(path) = env::var("FACTOTUM_DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = path;
            }
        }

        if let Ok(url) = env::var("LLM_API_URL") {
            config.llm_api_url = url;
        }

        if let Ok(key) = env::var("LLM_API_KEY") {
            config.llm_api_key = key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm_model = model;
        }

        if let Ok(timeout) = env::var("FACTOTUM_REQUEST_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse() {
                config.request_timeout_secs = seconds;
            }
        }

        config
    }
}
