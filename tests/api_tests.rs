mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::{RecordingSink, date, memory_store, notification, scheduler};
use feed_service::{
    api::{AppState, router},
    models::event::DocType,
};
use serde_json::Value;
use tower::ServiceExt;

fn app_state() -> (Arc<AppState>, Arc<RecordingSink>) {
    let store = memory_store();
    let sink = RecordingSink::new();
    let state = Arc::new(AppState {
        health_checker: None,
        store: store.clone(),
        scheduler: Arc::new(scheduler(store, sink.clone())),
    });
    (state, sink)
}

async fn call(state: Arc<AppState>, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let response = router(state)
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn test_health_reports_scheduler_state() -> Result<()> {
    let (state, _) = app_state();

    let (status, body) = call(state, "GET", "/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "idle");

    Ok(())
}

#[tokio::test]
async fn test_get_bucket() -> Result<()> {
    let (state, _) = app_state();
    let day = date(2026, 3, 14);
    state
        .store
        .merge_contribution(day, "daily1@x.com", notification("evt-1", DocType::Audit))
        .await?;

    let (status, body) = call(state.clone(), "GET", "/buckets/2026-03-14").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processed"], false);
    assert_eq!(
        body["data"]["recipients"]["daily1@x.com"]["pending_notifications"][0]["event_id"],
        "evt-1"
    );

    let (status, _) = call(state.clone(), "GET", "/buckets/2026-03-15").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(state, "GET", "/buckets/yesterday").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    Ok(())
}

#[tokio::test]
async fn test_manual_digest_run() -> Result<()> {
    let (state, sink) = app_state();
    let day = date(2026, 3, 14);
    state
        .store
        .merge_contribution(day, "daily1@x.com", notification("evt-1", DocType::Audit))
        .await?;

    let (status, body) = call(state.clone(), "POST", "/buckets/2026-03-14/digest").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processed"], true);
    assert_eq!(body["data"]["dispatched"][0], "daily1@x.com");
    assert_eq!(sink.messages_to("daily1@x.com").len(), 1);

    let (status, body) = call(state, "POST", "/buckets/2026-03-14/digest").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["already_processed"], true);
    assert_eq!(sink.attempts(), 1);

    Ok(())
}

/// Test: A manual run for a day that has not started is refused
#[tokio::test]
async fn test_manual_digest_rejects_future_date() -> Result<()> {
    let (state, sink) = app_state();

    let (status, body) = call(state.clone(), "POST", "/buckets/2999-01-01/digest").await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(state.store.load(date(2999, 1, 1)).await?.is_none());
    assert_eq!(sink.attempts(), 0);

    Ok(())
}

#[test]
fn test_overall_health_status() {
    use std::collections::HashMap;

    use feed_service::{
        clients::health::determine_overall_status,
        models::health::{HealthStatus, ServiceHealth},
    };

    let mut checks = HashMap::new();
    checks.insert("database".to_string(), ServiceHealth::healthy(3));
    checks.insert("bucket_storage".to_string(), ServiceHealth::healthy(1));
    assert_eq!(determine_overall_status(&checks), HealthStatus::Healthy);

    checks.insert(
        "digest_scheduler".to_string(),
        ServiceHealth::unhealthy("stalled".to_string()),
    );
    assert_eq!(determine_overall_status(&checks), HealthStatus::Degraded);

    checks.insert(
        "message_broker".to_string(),
        ServiceHealth::unhealthy("Connection failed".to_string()),
    );
    assert_eq!(determine_overall_status(&checks), HealthStatus::Unhealthy);
}
