//! Command flows against a mock router.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nginxui_cli::commands;
use nginxui_cli::config::Settings;
use nginxui_engine::SubmitAction;

fn settings_for(server: &MockServer) -> Settings {
    Settings {
        router_url: Some(server.uri()),
        token: Some("test-token".into()),
        ..Default::default()
    }
}

fn status_page(state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        r#"<script>nginx_status="{state}"; nginx_version="1.25.3";</script>"#
    ))
}

#[tokio::test]
async fn connect_logs_in_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "asus_token=fresh"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/start_apply.htm"))
        .and(header("cookie", "asus_token=fresh"))
        .respond_with(status_page("running"))
        .expect(1)
        .mount(&server)
        .await;

    let settings = Settings {
        router_url: Some(server.uri()),
        username: Some("admin".into()),
        password: Some("secret".into()),
        ..Default::default()
    };
    let engine = commands::connect(&settings).await.unwrap();
    let resp = commands::execute(&engine, SubmitAction::CheckStatus, None, None)
        .await
        .unwrap();
    assert!(resp.nginxui_status.unwrap().running);
}

#[tokio::test]
async fn connect_reports_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login.cgi"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let settings = Settings {
        router_url: Some(server.uri()),
        username: Some("admin".into()),
        password: Some("wrong".into()),
        ..Default::default()
    };
    let err = commands::connect(&settings).await.unwrap_err();
    assert!(format!("{err:#}").contains("Login"));
}

#[tokio::test]
async fn wait_for_state_polls_until_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/start_apply.htm"))
        .respond_with(status_page("stopped"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/start_apply.htm"))
        .respond_with(status_page("running"))
        .mount(&server)
        .await;

    let engine = commands::connect(&settings_for(&server)).await.unwrap();
    let resp = commands::wait_for_state(
        &engine,
        true,
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
    assert!(resp.nginxui_status.unwrap().running);
}

#[tokio::test]
async fn wait_for_state_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/start_apply.htm"))
        .respond_with(status_page("running"))
        .mount(&server)
        .await;

    let engine = commands::connect(&settings_for(&server)).await.unwrap();
    let err = commands::wait_for_state(
        &engine,
        false,
        Duration::from_millis(50),
        Duration::from_millis(10),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("stopped"));
}

#[tokio::test]
async fn backup_payload_lands_on_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/start_apply.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<script>var nginxui_response = {"data": {"listen_port": 8443}};</script>"#,
        ))
        .mount(&server)
        .await;

    let engine = commands::connect(&settings_for(&server)).await.unwrap();
    let resp = commands::execute(&engine, SubmitAction::BackupConfig, None, None)
        .await
        .unwrap();
    assert!(resp.success);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("backup.json");
    commands::write_backup(&resp, &out).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, json!({"listen_port": 8443}));
}
