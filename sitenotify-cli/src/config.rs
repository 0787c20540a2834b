//! Configuration management for the sitenotify CLI.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use sitenotify::{ChannelConfig, Interface, NotifyClient, RealtimeConfig};
use std::env;
use std::fs;
use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Authentication credentials.
    pub auth: Option<AuthConfig>,
    /// Push channel settings.
    #[serde(default)]
    pub realtime: RealtimeSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API base URL, e.g. `https://example.com/api/`.
    pub base_url: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token.
    pub token: String,
    /// User ID.
    pub user_id: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RealtimeSection {
    pub ws_url: Option<String>,
    pub app_key: Option<String>,
    pub auth_endpoint: Option<String>,
    pub channel_prefix: Option<String>,
    pub event: Option<String>,
    /// Audience to receive pushes for: `lk` or `admin`.
    pub interface: Option<String>,
}

/// Per-invocation overrides, from flags or `SITENOTIFY_*` variables.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// API base URL
    #[arg(long, global = true, env = "SITENOTIFY_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "SITENOTIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// User ID the token belongs to
    #[arg(long, global = true, env = "SITENOTIFY_USER_ID")]
    pub user_id: Option<String>,

    /// WebSocket server URL
    #[arg(long, global = true, env = "SITENOTIFY_WS_URL")]
    pub ws_url: Option<String>,

    /// Push application key
    #[arg(long, global = true, env = "SITENOTIFY_APP_KEY")]
    pub app_key: Option<String>,
}

impl Config {
    /// Credentials after applying overrides.
    pub fn effective_auth(&self, overrides: &Overrides) -> Option<AuthConfig> {
        let stored = self.auth.clone();
        let token = overrides
            .token
            .clone()
            .or_else(|| stored.as_ref().map(|a| a.token.clone()))?;
        let user_id = overrides
            .user_id
            .clone()
            .or_else(|| stored.map(|a| a.user_id))?;
        Some(AuthConfig { token, user_id })
    }

    /// Push transport settings after applying overrides.
    pub fn realtime_config(&self, overrides: &Overrides) -> RealtimeConfig {
        let defaults = RealtimeConfig::default();
        let section = &self.realtime;
        RealtimeConfig {
            ws_url: overrides
                .ws_url
                .clone()
                .or_else(|| section.ws_url.clone())
                .unwrap_or(defaults.ws_url),
            app_key: overrides
                .app_key
                .clone()
                .or_else(|| section.app_key.clone())
                .unwrap_or(defaults.app_key),
            auth_endpoint: section
                .auth_endpoint
                .clone()
                .unwrap_or(defaults.auth_endpoint),
            ..defaults
        }
    }

    /// Channel naming and audience.
    pub fn channel_config(&self) -> ChannelConfig {
        let defaults = ChannelConfig::default();
        let section = &self.realtime;
        ChannelConfig {
            channel_prefix: section
                .channel_prefix
                .clone()
                .unwrap_or(defaults.channel_prefix),
            event: section.event.clone().unwrap_or(defaults.event),
            audience: section
                .interface
                .as_deref()
                .map(Interface::from_param)
                .unwrap_or(defaults.audience),
        }
    }
}

/// Get the configuration file path.
pub fn config_path() -> Result<PathBuf> {
    let exe_path = env::current_exe().context("Could not determine executable path")?;
    let exe_dir = exe_path
        .parent()
        .context("Could not determine executable directory")?;

    Ok(exe_dir.join("sitenotify.toml"))
}

/// Load configuration from file.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).context("Failed to read config file")?;

    toml::from_str(&content).context("Failed to parse config file")
}

/// Save configuration to file.
pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&path, content).context("Failed to write config file")?;

    Ok(())
}

/// Build a client that requires authentication.
pub fn build_authed_client(config: &Config, overrides: &Overrides) -> Result<NotifyClient> {
    let auth = config
        .effective_auth(overrides)
        .context("Authentication required. Run 'sitenotify auth login' first.")?;

    let mut builder = NotifyClient::builder().auth(auth.token, auth.user_id);
    if let Some(base_url) = overrides.base_url.clone().or_else(|| config.api.base_url.clone()) {
        builder = builder.base_url(base_url);
    }

    builder.build().context("Failed to build notification client")
}
