//! Action identifiers, response shapes, and errors for the apply endpoint.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An operation understood by the router-side `nginxui` script.
///
/// The wire identifier travels in the `amng_custom` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitAction {
    ApplyConfig,
    CheckStatus,
    StartService,
    StopService,
    RestartService,
    ReloadService,
    TestConfig,
    GetLogs,
    ClearLog,
    GenerateConfig,
    BackupConfig,
    RestoreConfig,
}

impl SubmitAction {
    pub const ALL: [SubmitAction; 12] = [
        SubmitAction::ApplyConfig,
        SubmitAction::CheckStatus,
        SubmitAction::StartService,
        SubmitAction::StopService,
        SubmitAction::RestartService,
        SubmitAction::ReloadService,
        SubmitAction::TestConfig,
        SubmitAction::GetLogs,
        SubmitAction::ClearLog,
        SubmitAction::GenerateConfig,
        SubmitAction::BackupConfig,
        SubmitAction::RestoreConfig,
    ];

    /// Identifier sent to the firmware.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitAction::ApplyConfig => "apply_config",
            SubmitAction::CheckStatus => "check_status",
            SubmitAction::StartService => "start_service",
            SubmitAction::StopService => "stop_service",
            SubmitAction::RestartService => "restart_service",
            SubmitAction::ReloadService => "reload_service",
            SubmitAction::TestConfig => "test_config",
            SubmitAction::GetLogs => "get_logs",
            SubmitAction::ClearLog => "clear_log",
            SubmitAction::GenerateConfig => "generate_config",
            SubmitAction::BackupConfig => "backup_config",
            SubmitAction::RestoreConfig => "restore_config",
        }
    }
}

impl fmt::Display for SubmitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitAction {
    type Err = EngineError;

    /// Accepts both `check_status` and `check-status`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        SubmitAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| EngineError::UnknownAction(s.to_string()))
    }
}

/// Running state reported by `check_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NginxStatus {
    pub running: bool,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Outcome of `nginx -t` as reported by `test_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTest {
    pub valid: bool,
    pub message: String,
}

/// Log excerpt returned by `get_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBlock {
    pub content: String,
    pub lines: usize,
}

/// How a response was obtained. Not part of the serialized shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrigin {
    /// The body was a JSON object.
    Json,
    /// A `nginxui_response = {...};` assignment inside HTML.
    Embedded,
    /// One or more HTML markers or alert strings matched.
    Scraped,
    /// Nothing recognizable and no error marker: success was assumed.
    Assumed,
    /// The router replied with an empty body.
    Empty,
    /// Transport, status, or parse failure folded into the response.
    #[default]
    Failure,
}

/// Normalized reply from the apply endpoint.
///
/// Replies built from a JSON document keep that document in `raw` and
/// [`EngineResponse::to_json`] returns it untouched. The typed fields are a
/// best-effort view of it: a known key whose value has an unexpected type
/// lands in `extra` next to the unknown keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginxui_status: Option<NginxStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginxui_config_test: Option<ConfigTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginxui_logs: Option<LogBlock>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub origin: ResponseOrigin,
    #[serde(skip)]
    pub raw: Option<Value>,
}

const KNOWN_KEYS: [&str; 6] = [
    "success",
    "message",
    "data",
    "nginxui_status",
    "nginxui_config_test",
    "nginxui_logs",
];

/// JavaScript truthiness, the way the page script reads `success`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn typed<T: DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
    extra: &mut Map<String, Value>,
) -> Option<T> {
    let value = object.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(key, "Reply field has unexpected shape, keeping it raw: {e}");
            extra.insert(key.to_string(), value.clone());
            None
        }
    }
}

impl EngineResponse {
    /// A bare `{success: true}` with the given origin.
    pub fn ok(origin: ResponseOrigin) -> Self {
        Self {
            success: true,
            origin,
            ..Default::default()
        }
    }

    /// A `{success: false, message}` failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            origin: ResponseOrigin::Failure,
            ..Default::default()
        }
    }

    /// View a JSON object reply without losing any of it.
    ///
    /// `success` follows JavaScript truthiness and is `false` when absent.
    pub fn from_object(object: Map<String, Value>, origin: ResponseOrigin) -> Self {
        let mut extra: Map<String, Value> = object
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            success: object.get("success").is_some_and(truthy),
            message: typed(&object, "message", &mut extra),
            data: object.get("data").cloned(),
            nginxui_status: typed(&object, "nginxui_status", &mut extra),
            nginxui_config_test: typed(&object, "nginxui_config_test", &mut extra),
            nginxui_logs: typed(&object, "nginxui_logs", &mut extra),
            extra,
            origin,
            raw: Some(Value::Object(object)),
        }
    }

    /// View any JSON reply. Anything but an object becomes `data`.
    pub fn from_json(value: Value, origin: ResponseOrigin) -> Self {
        match value {
            Value::Object(object) => Self::from_object(object, origin),
            other => Self {
                success: truthy(&other),
                data: Some(other.clone()),
                origin,
                raw: Some(other),
                ..Default::default()
            },
        }
    }

    /// True when success was not backed by any recognizable marker.
    pub fn is_assumed(&self) -> bool {
        self.origin == ResponseOrigin::Assumed
    }

    /// The reply as JSON: the original object when there was one.
    pub fn to_json(&self) -> Value {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }
}

/// Parameters for `get_logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<u32>,
}

impl LogQuery {
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.lines.is_none()
    }
}

/// Errors that can occur while talking to the router.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Engine is already submitting, please wait")]
    Busy,

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status code {status}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid router URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unrecognized response")]
    Unrecognized,
}

/// Convenience result type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_ids_round_trip() {
        for action in SubmitAction::ALL {
            assert_eq!(action.as_str().parse::<SubmitAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_action_accepts_kebab_case() {
        assert_eq!(
            "restart-service".parse::<SubmitAction>().unwrap(),
            SubmitAction::RestartService
        );
        assert!("reboot".parse::<SubmitAction>().is_err());
    }

    #[test]
    fn test_action_serde_matches_wire_id() {
        let v = serde_json::to_value(SubmitAction::GetLogs).unwrap();
        assert_eq!(v, json!("get_logs"));
    }

    #[test]
    fn test_response_keeps_unknown_keys() {
        let body = json!({"success": true, "logs": ["a", "b"], "total_lines": 2});
        let resp: EngineResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(resp.extra.get("total_lines"), Some(&json!(2)));
        assert_eq!(resp.to_json(), body);
    }

    #[test]
    fn test_from_object_without_success_round_trips() {
        let body = json!({"nginx_status": "running", "nginx_version": "1.20.1"});
        let Value::Object(map) = body.clone() else { unreachable!() };
        let resp = EngineResponse::from_object(map, ResponseOrigin::Json);
        assert!(!resp.success);
        assert_eq!(resp.to_json(), body);
    }

    #[test]
    fn test_from_object_keeps_mistyped_known_keys() {
        let body = json!({"success": false, "message": {"code": 3, "text": "bind failed"}});
        let Value::Object(map) = body.clone() else { unreachable!() };
        let resp = EngineResponse::from_object(map, ResponseOrigin::Json);
        assert!(!resp.success);
        assert!(resp.message.is_none());
        assert_eq!(resp.extra.get("message"), Some(&json!({"code": 3, "text": "bind failed"})));
        assert_eq!(resp.to_json(), body);
    }

    #[test]
    fn test_success_follows_truthiness() {
        for (value, expected) in [
            (json!(0), false),
            (json!(1), true),
            (json!(""), false),
            (json!("ok"), true),
            (json!(null), false),
        ] {
            let mut map = Map::new();
            map.insert("success".into(), value);
            let resp = EngineResponse::from_object(map, ResponseOrigin::Json);
            assert_eq!(resp.success, expected);
        }
    }

    #[test]
    fn test_from_json_keeps_non_objects() {
        let resp = EngineResponse::from_json(json!([1, 2]), ResponseOrigin::Json);
        assert!(resp.success);
        assert_eq!(resp.data, Some(json!([1, 2])));
        assert_eq!(resp.to_json(), json!([1, 2]));
    }

    #[test]
    fn test_failure_shape() {
        let resp = EngineResponse::failure("Network error");
        assert_eq!(resp.to_json(), json!({"success": false, "message": "Network error"}));
        assert_eq!(resp.origin, ResponseOrigin::Failure);
    }

    #[test]
    fn test_log_query_skips_unset_fields() {
        let q = LogQuery {
            level: Some("error".into()),
            lines: None,
        };
        assert_eq!(serde_json::to_value(&q).unwrap(), json!({"level": "error"}));
        assert!(LogQuery::default().is_empty());
    }
}
