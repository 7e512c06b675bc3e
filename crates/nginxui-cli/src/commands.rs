//! Command execution shared by the one-shot CLI and the REPL.

use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use serde_json::Value;

use nginxui_engine::{Engine, EngineResponse, LogQuery, SubmitAction};

use crate::config::Settings;

/// Build an engine from resolved settings, logging in when credentials are
/// configured and no token is.
pub async fn connect(settings: &Settings) -> anyhow::Result<Engine> {
    let config = settings.engine_config();
    let router = config.router_url.clone();
    let engine = Engine::new(config).with_context(|| format!("Cannot use router {router}"))?;

    if let Some((user, password)) = settings.login_credentials() {
        engine
            .login(user, password)
            .await
            .with_context(|| format!("Login to {router} failed"))?;
    } else if settings.token.is_none() {
        tracing::warn!("No session token or credentials configured, the router may refuse the request");
    }

    Ok(engine)
}

/// Submit one action. A concurrent submission is an error here.
pub async fn execute(
    engine: &Engine,
    action: SubmitAction,
    config: Option<&Value>,
    wait_secs: Option<u64>,
) -> anyhow::Result<EngineResponse> {
    engine
        .submit(action, config, wait_secs)
        .await
        .ok_or_else(|| anyhow!("Another request to the router is still in progress"))
}

pub async fn logs(engine: &Engine, query: &LogQuery) -> anyhow::Result<EngineResponse> {
    engine
        .get_logs(query)
        .await
        .ok_or_else(|| anyhow!("Another request to the router is still in progress"))
}

/// Poll `check_status` until nginx reports the wanted state.
pub async fn wait_for_state(
    engine: &Engine,
    running: bool,
    timeout: Duration,
    interval: Duration,
) -> anyhow::Result<EngineResponse> {
    let start = Instant::now();
    loop {
        let resp = execute(engine, SubmitAction::CheckStatus, None, None).await?;
        let reached = resp
            .nginxui_status
            .as_ref()
            .is_some_and(|s| s.running == running);
        if reached {
            return Ok(resp);
        }
        if start.elapsed() >= timeout {
            let wanted = if running { "running" } else { "stopped" };
            bail!("nginx did not reach state '{wanted}' within {}s", timeout.as_secs());
        }
        tracing::debug!("nginx not yet in wanted state, polling again");
        tokio::time::sleep(interval).await;
    }
}

/// Read a JSON config from a file, or from stdin when `source` is `-`.
pub fn read_config(source: &str) -> anyhow::Result<Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read config from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read config file {source}"))?
    };
    serde_json::from_str(&raw).with_context(|| format!("Config in {source} is not valid JSON"))
}

/// Write the payload of a `backup_config` reply to `path`.
///
/// The `data` block is written when present, otherwise the whole reply.
pub fn write_backup(resp: &EngineResponse, path: &Path) -> anyhow::Result<()> {
    let payload = resp.data.clone().unwrap_or_else(|| resp.to_json());
    let pretty = serde_json::to_string_pretty(&payload)?;
    std::fs::write(path, pretty)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;
    tracing::info!("Backup written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nginx.json");
        std::fs::write(&path, r#"{"listen_port": 8443}"#).unwrap();
        let value = read_config(path.to_str().unwrap()).unwrap();
        assert_eq!(value, json!({"listen_port": 8443}));
    }

    #[test]
    fn test_read_config_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nginx.json");
        std::fs::write(&path, "listen 80;").unwrap();
        assert!(read_config(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_write_backup_prefers_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let resp = EngineResponse {
            success: true,
            data: Some(json!({"servers": []})),
            ..Default::default()
        };
        write_backup(&resp, &path).unwrap();
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"servers": []}));
    }
}
