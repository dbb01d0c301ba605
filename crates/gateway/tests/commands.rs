//! End-to-end command-handler tests driving `wforce_gateway::api::commands`
//! directly against a real `AppState` (no subprocess, no HTTP socket) —
//! covers the denylist/allowlist precedence and netmask-match scenarios.

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use wforce_domain::config::Config;
use wforce_gateway::api::commands;
use wforce_gateway::metrics::Metrics;
use wforce_gateway::state::{AppState, Readiness, ServerCounters};
use wforce_gateway::worker::WorkerPool;
use wforce_lists::ListsRegistry;
use wforce_policy::PolicyDispatcher;
use wforce_stats::StatsRegistry;
use wforce_webhooks::WebhookRunner;

fn test_state() -> AppState {
    let config = Arc::new(Config::default());
    let stats = Arc::new(StatsRegistry::new(&config.stats));
    let lists = Arc::new(ListsRegistry::new(&config.lists));
    let webhooks = WebhookRunner::new(&config.webhooks);
    lists.denylist.set_event_sink(webhooks.clone());
    lists.allowlist.set_event_sink(webhooks.clone());
    let policy = Arc::new(PolicyDispatcher::null(1));
    let workers = WorkerPool::new(2, 16);
    let metrics = Arc::new(Metrics::new());

    AppState {
        config,
        stats,
        lists,
        policy,
        webhooks,
        replication: None,
        workers,
        metrics,
        counters: Arc::new(ServerCounters::default()),
        readiness: Arc::new(Readiness::default()),
        started_at: Instant::now(),
    }
}

fn json_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(axum::http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    h
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// S2 — denylist precedence: an IP entry rejects `allow` with the
// store's exact configured message, regardless of what the policy
// would otherwise decide (NullPolicy always allows).
#[tokio::test]
async fn denylisted_ip_rejects_allow_with_exact_message() {
    let state = test_state();

    let add_body = serde_json::to_vec(&serde_json::json!({
        "ip": "198.51.100.1",
        "expire_secs": 3600,
        "reason": "abuse",
    }))
    .unwrap();
    commands::add_bl_entry(state.clone(), json_headers(), add_body).await.unwrap();

    let allow_body = serde_json::to_vec(&serde_json::json!({
        "login": "alice",
        "remote": "198.51.100.1",
    }))
    .unwrap();
    let resp = commands::allow(state, json_headers(), allow_body).await.unwrap();
    let v = body_json(resp).await;

    assert_eq!(v["status"], -1);
    assert_eq!(v["msg"], "Temporarily blacklisted IP Address - try again later");
}

// S3 — netmask match: only addresses inside the configured prefix are
// rejected; others fall through to the policy (NullPolicy -> allow).
#[tokio::test]
async fn netmask_entry_matches_contained_address_only() {
    let state = test_state();

    let add_body = serde_json::to_vec(&serde_json::json!({
        "netmask": "10.0.0.0/8",
        "expire_secs": 3600,
        "reason": "abuse",
    }))
    .unwrap();
    commands::add_bl_entry(state.clone(), json_headers(), add_body).await.unwrap();

    let inside = serde_json::to_vec(&serde_json::json!({
        "login": "bob",
        "remote": "10.5.6.7",
    }))
    .unwrap();
    let resp = commands::allow(state.clone(), json_headers(), inside).await.unwrap();
    assert_eq!(body_json(resp).await["status"], -1);

    let outside = serde_json::to_vec(&serde_json::json!({
        "login": "bob",
        "remote": "11.0.0.1",
    }))
    .unwrap();
    let resp = commands::allow(state, json_headers(), outside).await.unwrap();
    assert_eq!(body_json(resp).await["status"], 0);
}

// Allowlist precedence: an allowlisted login/IP pair short-circuits to
// allow even if the same IP is also denylisted.
#[tokio::test]
async fn allowlist_takes_precedence_over_denylist() {
    let state = test_state();

    let bl_body = serde_json::to_vec(&serde_json::json!({
        "ip": "203.0.113.9",
        "expire_secs": 3600,
        "reason": "abuse",
    }))
    .unwrap();
    commands::add_bl_entry(state.clone(), json_headers(), bl_body).await.unwrap();

    let wl_body = serde_json::to_vec(&serde_json::json!({
        "ip": "203.0.113.9",
        "expire_secs": 3600,
        "reason": "trusted",
    }))
    .unwrap();
    state.lists.allowlist.add_entry(
        wforce_lists::ListKeyArg::Ip("203.0.113.9".to_string()),
        3600,
        "trusted".to_string(),
    );
    let _ = wl_body;

    let allow_body = serde_json::to_vec(&serde_json::json!({
        "login": "carol",
        "remote": "203.0.113.9",
    }))
    .unwrap();
    let resp = commands::allow(state, json_headers(), allow_body).await.unwrap();
    assert_eq!(body_json(resp).await["status"], 0);
}

// delBLEntry removes an entry previously added via addBLEntry.
#[tokio::test]
async fn del_bl_entry_removes_previously_added_entry() {
    let state = test_state();

    let add_body = serde_json::to_vec(&serde_json::json!({
        "login": "dave",
        "expire_secs": 3600,
        "reason": "abuse",
    }))
    .unwrap();
    commands::add_bl_entry(state.clone(), json_headers(), add_body).await.unwrap();

    let del_body = serde_json::to_vec(&serde_json::json!({ "login": "dave" })).unwrap();
    let resp = commands::del_bl_entry(state.clone(), json_headers(), del_body).await.unwrap();
    assert_eq!(body_json(resp).await["status"], "ok");

    let allow_body = serde_json::to_vec(&serde_json::json!({
        "login": "dave",
        "remote": "192.0.2.1",
    }))
    .unwrap();
    let resp = commands::allow(state, json_headers(), allow_body).await.unwrap();
    assert_eq!(body_json(resp).await["status"], 0);
}

// A non-JSON Content-Type on a POST command is rejected per spec.md §7.
#[tokio::test]
async fn non_json_content_type_is_rejected() {
    let state = test_state();
    let headers = HeaderMap::new();
    let err = commands::report(state, headers, b"{}".to_vec()).await.unwrap_err();
    let resp = err.into_response();
    assert_eq!(resp.status(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
