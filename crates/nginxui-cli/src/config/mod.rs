//! Settings loading and resolution.
//!
//! Precedence, highest first: command-line flags, `NGINXUI_*` environment
//! variables, the settings file, built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use nginxui_engine::{EngineConfig, FallbackPolicy};

pub const DEFAULT_ROUTER_URL: &str = "http://192.168.1.1";

/// Persisted client settings (`settings.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub router_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub wait_secs: Option<u64>,
    pub strict: bool,
    pub endpoint: Option<String>,
    pub page: Option<String>,
    pub script: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub router_url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub wait_secs: Option<u64>,
    /// `Some(false)` turns off a `strict` set in the file.
    pub strict: Option<bool>,
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Overlay `NGINXUI_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("NGINXUI_ROUTER") {
            self.router_url = Some(v);
        }
        if let Some(v) = get("NGINXUI_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = get("NGINXUI_USER") {
            self.username = Some(v);
        }
        if let Some(v) = get("NGINXUI_PASSWORD") {
            self.password = Some(v);
        }
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        if let Some(v) = &o.router_url {
            self.router_url = Some(v.clone());
        }
        if let Some(v) = &o.token {
            self.token = Some(v.clone());
        }
        if let Some(v) = &o.username {
            self.username = Some(v.clone());
        }
        if let Some(v) = &o.password {
            self.password = Some(v.clone());
        }
        if let Some(v) = o.wait_secs {
            self.wait_secs = Some(v);
        }
        if let Some(v) = o.strict {
            self.strict = v;
        }
    }

    /// Credentials to log in with, when no token is already known.
    pub fn login_credentials(&self) -> Option<(&str, &str)> {
        if self.token.is_some() {
            return None;
        }
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            router_url: self
                .router_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ROUTER_URL.to_string()),
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            page: self.page.clone().unwrap_or(defaults.page),
            script: self.script.clone().unwrap_or(defaults.script),
            default_wait_secs: self.wait_secs.unwrap_or(defaults.default_wait_secs),
            timeout_slack_secs: defaults.timeout_slack_secs,
            fallback: if self.strict {
                FallbackPolicy::Reject
            } else {
                FallbackPolicy::AssumeSuccess
            },
            token: self.token.clone(),
        }
    }
}

/// Resolve the settings file path.
pub fn resolve_settings_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("NGINXUI_SETTINGS") {
        return PathBuf::from(env_path);
    }

    let cwd_settings = PathBuf::from(".nginxui/settings.json");
    if cwd_settings.exists() {
        return cwd_settings;
    }

    resolve_default_settings_path()
}

fn resolve_default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nginxui")
        .join("settings.json")
}
