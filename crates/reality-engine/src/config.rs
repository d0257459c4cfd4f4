//! Runtime configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. API keys are read from the environment, never from this file.

use reality_adapters::{FalConfig, GeminiConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealityConfig {
    /// Shared proxy in front of all external services.
    pub proxy: ProxyConfig,
    pub gemini: GeminiConfig,
    pub fal: FalConfig,
    pub audit: AuditConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// When non-empty, adapters call `<base_url>/fal/proxy`, `/gemini/proxy`, and `/proxy-image`.
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append audit events to this JSONL file when set.
    pub jsonl_path: String,
    /// POST audit events to `<proxy>/audit/log`.
    pub http: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for saved programs.
    pub programs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            programs_dir: PathBuf::from("programs"),
        }
    }
}

impl RealityConfig {
    /// Load from a TOML file. Falls back to defaults if the file doesn't exist or can't be parsed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn proxy_base(&self) -> Option<&str> {
        let base = self.proxy.base_url.trim();
        (!base.is_empty()).then_some(base)
    }

    pub fn audit_jsonl(&self) -> Option<&Path> {
        let path = self.audit.jsonl_path.trim();
        (!path.is_empty()).then(|| Path::new(path))
    }
}
