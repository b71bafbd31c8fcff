// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod common;

use mb_rest_server::Server;
use serde_json::{Value, json};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_test::assert_ok;

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

async fn spawn_server(dir: &std::path::Path) -> (String, JoinHandle<()>) {
    common::write_scenarios(dir);
    let mut config = common::test_config(dir);
    config.bind_addr = free_addr();
    config.scenarios.session.auto_cleanup = true;

    let server = Server::new(config).await.expect("server");
    let base = format!("http://{}", server.addr());
    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    (base, handle)
}

async fn wait_for_health(client: &reqwest::Client, base: &str) {
    for _ in 0..50 {
        if let Ok(response) = client.get(format!("{}/health", base)).send().await {
            if response.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("server at {} never became healthy", base);
}

#[tokio::test]
async fn maestro_style_flow_over_http() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (base, handle) = spawn_server(dir.path()).await;
    let client = reqwest::Client::new();
    wait_for_health(&client, &base).await;

    let activation = assert_ok!(
        client
            .post(format!("{}/api/test-scenarios/activate", base))
            .json(&json!({"scenario": "rotation-test", "metadata": {"test_name": "rotate"}}))
            .send()
            .await
    );
    assert_eq!(activation.status(), reqwest::StatusCode::CREATED);
    let activation: Value = assert_ok!(activation.json().await);
    let session_id = activation["session_id"].as_str().expect("session id").to_string();

    let changes = assert_ok!(
        client
            .post(format!("{}/mobile-api/v1/catalog/changes", base))
            .bearer_auth("mock_pat_live")
            .header(common::SESSION_HEADER, &session_id)
            .json(&json!({"changes": {"media": [
                {"action": "create", "temp_id": "rotated"},
                {"action": "delete", "id": "m-1", "deleted": true},
            ]}}))
            .send()
            .await
    );
    assert_eq!(changes.status(), reqwest::StatusCode::OK);
    assert_eq!(
        changes
            .headers()
            .get("x-test-scenario")
            .and_then(|v| v.to_str().ok()),
        Some("rotation-test")
    );
    assert!(changes.headers().contains_key("x-request-id"));

    let analysis: Value = assert_ok!(
        assert_ok!(
            client
                .get(format!(
                    "{}/api/test-scenarios/rotation-test/analysis?test_session_id={}",
                    base, session_id
                ))
                .send()
                .await
        )
        .json()
        .await
    );
    assert_eq!(analysis["summary"]["matches_expected_pattern"], true);

    let reset = assert_ok!(
        client
            .post(format!("{}/api/test-scenarios/reset", base))
            .header(common::SESSION_HEADER, &session_id)
            .send()
            .await
    );
    assert_eq!(reset.status(), reqwest::StatusCode::OK);

    handle.abort();
}

#[tokio::test]
async fn missing_scenario_directory_serves_only_the_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = common::test_config(&dir.path().join("absent"));
    config.bind_addr = free_addr();

    let server = Server::new(config).await.expect("server");
    let base = format!("http://{}", server.addr());
    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    let client = reqwest::Client::new();
    wait_for_health(&client, &base).await;

    let available: Value = assert_ok!(
        assert_ok!(
            client
                .get(format!("{}/api/test-scenarios/available", base))
                .send()
                .await
        )
        .json()
        .await
    );
    let names: Vec<&str> = available["scenarios"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["default"]);

    handle.abort();
}
