mod common;

use std::time::Duration;

use serde_json::json;

fn snapshot(active: &str) -> serde_json::Value {
    json!({
        "openTabs": [
            { "id": "tab_1", "name": "main.rs", "path": "src/main.rs", "language": "rust", "unsaved": false },
            { "id": "tab_2", "name": "notes.md", "path": "notes.md", "unsaved": true }
        ],
        "activeTabId": active,
        "sidebarCollapsed": false,
        "sidebarWidth": 280
    })
}

#[tokio::test]
async fn get_without_saved_session_returns_null() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;

    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p1" } }))
        .await;

    let data = common::recv_event(&mut ws).await;
    assert_eq!(data["event"], "session:data");
    assert_eq!(data["data"]["projectId"], "p1");
    assert!(data["data"]["session"].is_null());
}

#[tokio::test]
async fn saved_session_survives_a_reconnect() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;

    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;
    common::send_event(
        &mut ws,
        &json!({
            "event": "session:update",
            "data": { "projectId": "p1", "session": snapshot("tab_1") }
        }),
    )
    .await;

    let saved = common::recv_event(&mut ws).await;
    assert_eq!(saved["event"], "session:saved");
    assert_eq!(saved["data"]["projectId"], "p1");
    drop(ws);

    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;
    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p1" } }))
        .await;

    let data = common::recv_event(&mut ws).await;
    assert_eq!(data["event"], "session:data");
    assert_eq!(data["data"]["session"]["activeTabId"], "tab_1");
    assert_eq!(data["data"]["session"]["openTabs"].as_array().unwrap().len(), 2);
    assert_eq!(data["data"]["session"]["openTabs"][1]["unsaved"], true);
}

#[tokio::test]
async fn rapid_updates_coalesce_into_one_save_of_the_latest() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;

    for active in ["tab_1", "tab_2", "tab_1"] {
        common::send_event(
            &mut ws,
            &json!({
                "event": "session:update",
                "data": { "projectId": "p1", "session": snapshot(active) }
            }),
        )
        .await;
    }

    // Exactly one confirmation for the burst.
    let saved = common::recv_event(&mut ws).await;
    assert_eq!(saved["event"], "session:saved");
    common::assert_silent(&mut ws, common::TEST_DEBOUNCE * 3).await;

    // And it persisted the last snapshot.
    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p1" } }))
        .await;
    let data = common::recv_event(&mut ws).await;
    assert_eq!(data["data"]["session"]["activeTabId"], "tab_1");
}

#[tokio::test]
async fn sessions_are_scoped_per_project() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;

    common::send_event(
        &mut ws,
        &json!({
            "event": "session:update",
            "data": { "projectId": "p1", "session": snapshot("tab_1") }
        }),
    )
    .await;
    let _ = common::recv_event(&mut ws).await;

    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p2" } }))
        .await;
    let data = common::recv_event(&mut ws).await;
    assert!(data["data"]["session"].is_null());
}

#[tokio::test]
async fn delete_removes_the_snapshot() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;

    common::send_event(
        &mut ws,
        &json!({
            "event": "session:update",
            "data": { "projectId": "p1", "session": snapshot("tab_1") }
        }),
    )
    .await;
    let _ = common::recv_event(&mut ws).await;

    common::send_event(
        &mut ws,
        &json!({ "event": "session:delete", "data": { "projectId": "p1" } }),
    )
    .await;
    let deleted = common::recv_event(&mut ws).await;
    assert_eq!(deleted["event"], "session:deleted");

    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p1" } }))
        .await;
    let data = common::recv_event(&mut ws).await;
    assert!(data["data"]["session"].is_null());
}

#[tokio::test]
async fn extend_acknowledges_even_when_nothing_is_stored() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect_authenticated(addr, "sessions", "usr_alice").await;

    common::send_event(
        &mut ws,
        &json!({ "event": "session:extend", "data": { "projectId": "p1" } }),
    )
    .await;

    let extended = common::recv_event(&mut ws).await;
    assert_eq!(extended["event"], "session:extended");
    assert_eq!(extended["data"]["projectId"], "p1");
}

#[tokio::test]
async fn sessions_channel_requires_authentication() {
    let (addr, _state) = common::start_server(Duration::ZERO).await;
    let mut ws = common::connect(addr, "sessions", None).await;

    let event = common::recv_event(&mut ws).await;
    assert_eq!(event["event"], "auth:error");

    common::send_event(&mut ws, &json!({ "event": "session:get", "data": { "projectId": "p1" } }))
        .await;
    let err = common::recv_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "UNAUTHORIZED");
}
