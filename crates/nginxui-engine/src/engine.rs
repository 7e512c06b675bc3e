//! The request/response adapter with its single in-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::client::{RouterClient, DEFAULT_ENDPOINT};
use crate::form::{FormTemplate, DEFAULT_PAGE, DEFAULT_SCRIPT};
use crate::scrape::{resolve_body, FallbackPolicy, UNRECOGNIZED_MESSAGE};
use crate::types::{
    EngineError, EngineResponse, EngineResult, LogQuery, ResponseOrigin, SubmitAction,
};

/// Seconds the firmware is told to wait before re-rendering the page.
pub const DEFAULT_WAIT_SECS: u64 = 10;
/// Extra seconds the HTTP client waits beyond `action_wait`.
pub const TIMEOUT_SLACK_SECS: u64 = 5;
/// `action_wait` used by [`Engine::ping`].
pub const PING_WAIT_SECS: u64 = 3;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub router_url: String,
    pub endpoint: String,
    pub page: String,
    pub script: String,
    pub default_wait_secs: u64,
    pub timeout_slack_secs: u64,
    pub fallback: FallbackPolicy,
    pub token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            router_url: "http://192.168.1.1".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            page: DEFAULT_PAGE.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
            default_wait_secs: DEFAULT_WAIT_SECS,
            timeout_slack_secs: TIMEOUT_SLACK_SECS,
            fallback: FallbackPolicy::default(),
            token: None,
        }
    }
}

impl EngineConfig {
    pub fn for_router(router_url: impl Into<String>) -> Self {
        Self {
            router_url: router_url.into(),
            ..Default::default()
        }
    }
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Adapter between typed actions and the firmware's apply endpoint.
///
/// At most one submission is outstanding per engine. A call made while
/// another is pending is turned away immediately instead of being queued:
/// the firmware handler is not built for concurrent applies.
#[derive(Debug)]
pub struct Engine {
    client: RouterClient,
    template: FormTemplate,
    default_wait_secs: u64,
    timeout_slack_secs: u64,
    fallback: FallbackPolicy,
    submitting: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let client = RouterClient::new(&config.router_url, &config.endpoint, &config.page)?
            .with_token(config.token);

        Ok(Self {
            client,
            template: FormTemplate {
                page: config.page,
                script: config.script,
            },
            default_wait_secs: config.default_wait_secs,
            timeout_slack_secs: config.timeout_slack_secs,
            fallback: config.fallback,
            submitting: AtomicBool::new(false),
        })
    }

    pub fn client(&self) -> &RouterClient {
        &self.client
    }

    /// Whether a submission is currently outstanding.
    pub fn submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Submit `action` and fold every error into the response.
    ///
    /// Returns `None` without touching the network when another submission
    /// is still pending.
    pub async fn submit<C: Serialize + ?Sized>(
        &self,
        action: SubmitAction,
        config: Option<&C>,
        wait_secs: Option<u64>,
    ) -> Option<EngineResponse> {
        match self.try_submit(action, config, wait_secs).await {
            Ok(resp) => Some(resp),
            Err(EngineError::Busy) => None,
            Err(EngineError::Unrecognized) => Some(EngineResponse::failure(UNRECOGNIZED_MESSAGE)),
            Err(e) => {
                tracing::error!(action = %action, "Engine submit error: {e}");
                Some(EngineResponse::failure(e.to_string()))
            }
        }
    }

    /// Submit `action` and propagate transport errors to the caller.
    ///
    /// Under [`FallbackPolicy::Reject`] an unrecognized reply is
    /// [`EngineError::Unrecognized`].
    pub async fn try_submit<C: Serialize + ?Sized>(
        &self,
        action: SubmitAction,
        config: Option<&C>,
        wait_secs: Option<u64>,
    ) -> EngineResult<EngineResponse> {
        let Some(_guard) = InFlight::acquire(&self.submitting) else {
            tracing::warn!(action = %action, "Engine is already submitting, please wait...");
            return Err(EngineError::Busy);
        };

        let wait = wait_secs.unwrap_or(self.default_wait_secs);
        let fields = self.template.fields(action, config, wait)?;
        let timeout = Duration::from_secs(wait + self.timeout_slack_secs);

        tracing::debug!(action = %action, wait, "Submitting");
        let body = self.client.post_apply(fields, timeout).await?;

        let resp = resolve_body(&body, action, self.fallback);
        if self.fallback == FallbackPolicy::Reject
            && resp.origin == ResponseOrigin::Failure
            && resp.message.as_deref() == Some(UNRECOGNIZED_MESSAGE)
        {
            return Err(EngineError::Unrecognized);
        }
        Ok(resp)
    }

    /// True when the router answers a quick status check successfully.
    pub async fn ping(&self) -> bool {
        self.submit::<Value>(SubmitAction::CheckStatus, None, Some(PING_WAIT_SECS))
            .await
            .map(|r| r.success)
            .unwrap_or(false)
    }

    /// Poll `condition` every 100 ms until it holds or `timeout` elapses.
    pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        false
    }

    pub async fn login(&self, username: &str, password: &str) -> EngineResult<()> {
        self.client.login(username, password).await
    }

    // ── Convenience calls ────────────────────────────────────────────────

    pub async fn check_status(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::CheckStatus, None, None).await
    }

    pub async fn start_service(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::StartService, None, None).await
    }

    pub async fn stop_service(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::StopService, None, None).await
    }

    pub async fn restart_service(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::RestartService, None, None).await
    }

    pub async fn reload_service(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::ReloadService, None, None).await
    }

    pub async fn test_config(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::TestConfig, None, None).await
    }

    /// Fetch the nginx log, optionally filtered by level and capped in lines.
    pub async fn get_logs(&self, query: &LogQuery) -> Option<EngineResponse> {
        if query.is_empty() {
            self.submit::<LogQuery>(SubmitAction::GetLogs, None, None).await
        } else {
            self.submit(SubmitAction::GetLogs, Some(query), None).await
        }
    }

    pub async fn clear_log(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::ClearLog, None, None).await
    }

    pub async fn apply_config<C: Serialize + ?Sized>(&self, config: &C) -> Option<EngineResponse> {
        self.submit(SubmitAction::ApplyConfig, Some(config), None).await
    }

    pub async fn generate_config(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::GenerateConfig, None, None).await
    }

    pub async fn backup_config(&self) -> Option<EngineResponse> {
        self.submit::<Value>(SubmitAction::BackupConfig, None, None).await
    }

    pub async fn restore_config<C: Serialize + ?Sized>(
        &self,
        config: &C,
    ) -> Option<EngineResponse> {
        self.submit(SubmitAction::RestoreConfig, Some(config), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = InFlight::acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[test]
    fn test_engine_starts_idle() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(!engine.submitting());
    }

    #[test]
    fn test_engine_rejects_bad_url() {
        let result = Engine::new(EngineConfig::for_router("192.168.1.1"));
        assert!(matches!(result, Err(EngineError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_engine_keeps_configured_token() {
        let config = EngineConfig {
            token: Some("abc".into()),
            ..Default::default()
        };
        let engine = Engine::new(config).unwrap();
        assert!(engine.client().has_token().await);
    }

    #[tokio::test]
    async fn test_wait_for_condition_met() {
        let calls = AtomicUsize::new(0);
        let met = Engine::wait_for(
            || calls.fetch_add(1, Ordering::SeqCst) >= 2,
            Duration::from_secs(2),
        )
        .await;
        assert!(met);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let met = Engine::wait_for(|| false, Duration::from_millis(250)).await;
        assert!(!met);
    }
}
