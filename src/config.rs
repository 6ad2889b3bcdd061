//! Runtime configuration: TOML file plus environment overrides.
//!
//! Provider API keys are usually supplied through the environment
//! (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`); the file
//! covers everything else. Credentials are opaque here, the core never
//! inspects them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_DB_PATH: &str = "codecritic.db";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind: String,
    /// Bearer token required on every API route. No token, no server.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub submissions_per_hour: u64,
    pub reviews_per_hour: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            submissions_per_hour: 5,
            reviews_per_hour: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: Option<String>,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        let mut config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config at {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("CODECRITIC_AUTH_TOKEN") {
            self.gateway.auth_token = Some(token);
        }
        if let Ok(bind) = std::env::var("CODECRITIC_BIND") {
            self.gateway.bind = bind;
        }
        if let Ok(path) = std::env::var("CODECRITIC_DB") {
            self.storage.path = PathBuf::from(path);
        }

        apply_provider_env(&mut self.providers.openai, "OPENAI_API_KEY", "gpt-4o");
        apply_provider_env(
            &mut self.providers.anthropic,
            "ANTHROPIC_API_KEY",
            "claude-sonnet-4-5",
        );
        apply_provider_env(&mut self.providers.gemini, "GEMINI_API_KEY", "gemini-2.5-flash");
    }
}

/// An env key fills in (or overrides) a provider's credential,
/// creating the entry with the default model when the file had none.
fn apply_provider_env(slot: &mut Option<ProviderConfig>, env_key: &str, default_model: &str) {
    let Ok(api_key) = std::env::var(env_key) else {
        return;
    };
    if api_key.is_empty() {
        return;
    }
    match slot {
        Some(config) => config.api_key = api_key,
        None => {
            *slot = Some(ProviderConfig {
                api_key,
                model: default_model.to_string(),
                endpoint: None,
            });
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
