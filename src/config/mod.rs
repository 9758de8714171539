//! Configuration management
//!
//! Loaded from `<config_dir>/ripple/config.toml`; every field has a
//! default so a missing or partial file always yields a usable config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub history: HistoryConfig,
}

/// Where the assistant daemon listens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model to request; empty lets the daemon pick its default
    pub model: String,
    /// Non-default system prompt to lead empty threads with
    pub system_prompt: Option<String>,
    /// Attach tool definitions to outgoing requests
    pub use_tools: bool,
    /// Bound on automatic tool-call continuations per submit
    pub max_auto_continuations: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: None,
            use_tools: true,
            max_auto_continuations: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryConfig {
    /// Override for the saved-chats directory
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load the user config, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Path of the user config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ripple")
            .join("config.toml")
    }
}
