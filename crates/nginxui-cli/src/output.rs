//! Rendering of engine responses for the terminal.

use nginxui_engine::EngineResponse;

/// Pretty JSON, as printed under `--json`.
pub fn render_json(resp: &EngineResponse) -> String {
    serde_json::to_string_pretty(&resp.to_json()).unwrap_or_else(|_| "{}".to_string())
}

/// Human-readable summary.
pub fn render_text(resp: &EngineResponse) -> String {
    let mut out = Vec::new();

    let verdict = if resp.success { "OK" } else { "FAILED" };
    if resp.is_assumed() {
        out.push(format!("{verdict} (no recognizable markers in reply, success assumed)"));
    } else {
        out.push(verdict.to_string());
    }

    if let Some(message) = &resp.message {
        out.push(format!("  Message: {message}"));
    }

    if let Some(status) = &resp.nginxui_status {
        let state = if status.running { "running" } else { "stopped" };
        let mut line = format!("  nginx:   {state}, version {}", status.version);
        if let Some(pid) = status.pid {
            line.push_str(&format!(", pid {pid}"));
        }
        out.push(line);
    }

    if let Some(test) = &resp.nginxui_config_test {
        let verdict = if test.valid { "valid" } else { "invalid" };
        if test.message.is_empty() {
            out.push(format!("  Config:  {verdict}"));
        } else {
            out.push(format!("  Config:  {verdict}: {}", test.message));
        }
    }

    if let Some(logs) = &resp.nginxui_logs {
        out.push(format!("  Log ({} lines):", logs.lines));
        for line in logs.content.lines() {
            out.push(format!("    {line}"));
        }
    }

    if let Some(data) = &resp.data {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
        out.push("  Data:".to_string());
        for line in pretty.lines() {
            out.push(format!("    {line}"));
        }
    }

    for (key, value) in &resp.extra {
        out.push(format!("  {key}: {value}"));
    }

    out.join("\n")
}

pub fn render(resp: &EngineResponse, json: bool) -> String {
    if json {
        render_json(resp)
    } else {
        render_text(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nginxui_engine::{LogBlock, NginxStatus, ResponseOrigin};

    #[test]
    fn test_status_text() {
        let resp = EngineResponse {
            success: true,
            nginxui_status: Some(NginxStatus {
                running: true,
                version: "1.25.3".into(),
                pid: Some(812),
            }),
            origin: ResponseOrigin::Scraped,
            ..Default::default()
        };
        let text = render_text(&resp);
        assert!(text.starts_with("OK"));
        assert!(text.contains("running, version 1.25.3, pid 812"));
    }

    #[test]
    fn test_assumed_success_is_flagged() {
        let text = render_text(&EngineResponse::ok(ResponseOrigin::Assumed));
        assert!(text.contains("success assumed"));
    }

    #[test]
    fn test_log_lines_are_indented() {
        let resp = EngineResponse {
            success: true,
            nginxui_logs: Some(LogBlock {
                content: "a\nb".into(),
                lines: 2,
            }),
            ..Default::default()
        };
        let text = render_text(&resp);
        assert!(text.contains("Log (2 lines):\n    a\n    b"));
    }

    #[test]
    fn test_failure_json() {
        let json = render_json(&EngineResponse::failure("boom"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "boom");
    }
}
