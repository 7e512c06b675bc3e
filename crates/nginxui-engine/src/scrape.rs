//! Recovery of structured results from apply-endpoint replies.
//!
//! The firmware answers `start_apply.htm` with whatever the `nginxui`
//! service script left behind: sometimes a JSON document, more often the
//! re-rendered ASP page with a few JavaScript assignments or an `alert()`
//! sprinkled in. Resolution tries, in order:
//!
//! 1. an empty body (treated as a plain acknowledgement),
//! 2. a JSON document, kept as it came,
//! 3. an embedded `nginxui_response = {...};` assignment,
//! 4. per-action markers (`nginx_status=`, `config_test=`, `<pre id="log_content">`),
//! 5. `alert("...success...")` / `alert("...error...")` strings.
//!
//! A page that matches none of these and carries no error alert is reported
//! as success with [`ResponseOrigin::Assumed`]. [`FallbackPolicy`] decides
//! whether that guess is kept.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::types::{
    ConfigTest, EngineResponse, LogBlock, NginxStatus, ResponseOrigin, SubmitAction,
};

/// What to do with a reply that matches no known marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Report `{success: true}` and log a warning.
    #[default]
    AssumeSuccess,
    /// Report `{success: false, message: "Unrecognized response"}`.
    Reject,
}

pub const UNRECOGNIZED_MESSAGE: &str = "Unrecognized response";
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse response";

struct Patterns {
    embedded: Regex,
    status: Regex,
    version: Regex,
    config_test: Regex,
    config_message: Regex,
    log_content: Regex,
    alert_success: Regex,
    alert_error: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        embedded: Regex::new(r"(?s)nginxui_response\s*=\s*(\{.*?\});")
            .expect("embedded response regex is valid"),
        status: Regex::new(r#"nginx_status\s*=\s*["']([^"']*)["']"#)
            .expect("status regex is valid"),
        version: Regex::new(r#"nginx_version\s*=\s*["']([^"']*)["']"#)
            .expect("version regex is valid"),
        config_test: Regex::new(r#"config_test\s*=\s*["']([^"']*)["']"#)
            .expect("config test regex is valid"),
        config_message: Regex::new(r#"config_message\s*=\s*["']([^"']*)["']"#)
            .expect("config message regex is valid"),
        log_content: Regex::new(r#"<pre[^>]*id=["']log_content["'][^>]*>([\s\S]*?)</pre>"#)
            .expect("log block regex is valid"),
        alert_success: Regex::new(r#"alert\(["']([^"']*success[^"']*)["']\)"#)
            .expect("success alert regex is valid"),
        alert_error: Regex::new(r#"alert\(["']([^"']*error[^"']*)["']\)"#)
            .expect("error alert regex is valid"),
    })
}

fn capture<'h>(re: &Regex, haystack: &'h str) -> Option<&'h str> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Resolve a raw reply body for `action`.
pub fn resolve_body(body: &str, action: SubmitAction, policy: FallbackPolicy) -> EngineResponse {
    if body.is_empty() {
        return EngineResponse::ok(ResponseOrigin::Empty);
    }

    if let Some(resp) = parse_json_body(body) {
        return resp;
    }

    let resp = parse_html_response(body, action);
    if resp.is_assumed() {
        match policy {
            FallbackPolicy::AssumeSuccess => {
                tracing::warn!(
                    action = %action,
                    body_len = body.len(),
                    "No recognizable markers in router reply, assuming success"
                );
            }
            FallbackPolicy::Reject => {
                tracing::warn!(action = %action, "Rejecting unrecognized router reply");
                return EngineResponse::failure(UNRECOGNIZED_MESSAGE);
            }
        }
    }
    resp
}

/// Strict JSON parse. Any well-formed document qualifies, whatever its shape.
pub fn parse_json_body(body: &str) -> Option<EngineResponse> {
    let value: Value = serde_json::from_str(body).ok()?;
    Some(EngineResponse::from_json(value, ResponseOrigin::Json))
}

/// Scrape an HTML/JS reply for the markers relevant to `action`.
pub fn parse_html_response(html: &str, action: SubmitAction) -> EngineResponse {
    let p = patterns();
    let mut response = EngineResponse::default();
    let mut scraped = false;

    if let Some(raw) = capture(&p.embedded, html) {
        return match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(data)) => {
                let mut merged = serde_json::Map::new();
                merged.insert("success".to_string(), Value::Bool(true));
                merged.extend(data);
                EngineResponse::from_object(merged, ResponseOrigin::Embedded)
            }
            Ok(_) => EngineResponse::failure(PARSE_FAILURE_MESSAGE),
            Err(e) => {
                tracing::error!("Error parsing embedded nginxui_response: {e}");
                EngineResponse::failure(PARSE_FAILURE_MESSAGE)
            }
        };
    }

    match action {
        SubmitAction::CheckStatus => {
            let status = capture(&p.status, html);
            let version = capture(&p.version, html);
            if status.is_some() || version.is_some() {
                response.success = true;
                response.nginxui_status = Some(NginxStatus {
                    running: status == Some("running"),
                    version: version
                        .filter(|v| !v.is_empty())
                        .unwrap_or("Unknown")
                        .to_string(),
                    pid: None,
                });
                scraped = true;
            }
        }
        SubmitAction::TestConfig => {
            if let Some(test) = capture(&p.config_test, html) {
                response.success = true;
                response.nginxui_config_test = Some(ConfigTest {
                    valid: test == "valid",
                    message: capture(&p.config_message, html)
                        .unwrap_or_default()
                        .to_string(),
                });
                scraped = true;
            }
        }
        SubmitAction::GetLogs => {
            if let Some(raw) = capture(&p.log_content, html) {
                // Counted on the raw capture, before trimming.
                let lines = raw.split('\n').count();
                response.success = true;
                response.nginxui_logs = Some(LogBlock {
                    content: raw.trim().to_string(),
                    lines,
                });
                scraped = true;
            }
        }
        _ => {}
    }

    let error_alert = capture(&p.alert_error, html);
    if let Some(msg) = capture(&p.alert_success, html) {
        response.success = true;
        response.message = Some(msg.to_string());
        scraped = true;
    } else if let Some(msg) = error_alert {
        response.success = false;
        response.message = Some(msg.to_string());
        scraped = true;
    }

    if !response.success && error_alert.is_none() {
        response.success = true;
        response.origin = ResponseOrigin::Assumed;
    } else if scraped {
        response.origin = ResponseOrigin::Scraped;
    }

    response
}
