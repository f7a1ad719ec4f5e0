use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::health::HealthChecker,
    models::{
        bucket::DailyBucket, health::HealthStatus, response::ApiResponse, status::DigestReport,
    },
    services::{bucket_store::DailyBucketStore, scheduler::DigestScheduler},
};

pub struct AppState {
    pub health_checker: Option<HealthChecker>,
    pub store: Arc<DailyBucketStore>,
    pub scheduler: Arc<DigestScheduler>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/buckets/{date}", get(get_bucket))
        .route("/buckets/{date}/digest", post(run_digest))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Operator API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let Some(health_checker) = &state.health_checker else {
        return (
            StatusCode::OK,
            Json(ApiResponse::success(
                state.scheduler.state(),
                "Dependency checks disabled".to_string(),
            )),
        )
            .into_response();
    };

    let health = health_checker.check_all(&state.scheduler.state()).await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health)).into_response()
}

fn parse_date(raw: &str) -> Result<NaiveDate, Response> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                e.to_string(),
                format!("'{}' is not a YYYY-MM-DD date", raw),
            )),
        )
            .into_response()
    })
}

async fn get_bucket(State(state): State<Arc<AppState>>, Path(raw_date): Path<String>) -> Response {
    let date = match parse_date(&raw_date) {
        Ok(date) => date,
        Err(response) => return response,
    };

    match state.store.load(date).await {
        Ok(Some(bucket)) => (
            StatusCode::OK,
            Json(ApiResponse::<DailyBucket>::success(
                bucket,
                "Bucket retrieved".to_string(),
            )),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(
                "not_found".to_string(),
                format!("No bucket recorded for {}", date),
            )),
        )
            .into_response(),
        Err(e) => {
            error!(%date, error = %e, "Failed to load bucket");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(
                    e.to_string(),
                    "Failed to load bucket".to_string(),
                )),
            )
                .into_response()
        }
    }
}

async fn run_digest(State(state): State<Arc<AppState>>, Path(raw_date): Path<String>) -> Response {
    let date = match parse_date(&raw_date) {
        Ok(date) => date,
        Err(response) => return response,
    };

    let today = state.scheduler.schedule().local_date(Utc::now());
    if date > today {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                "future_date".to_string(),
                format!("Cannot digest {} before the day is over, today is {}", date, today),
            )),
        )
            .into_response();
    }

    info!(%date, "Manual digest run requested");

    match state.scheduler.run_for_date(date).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ApiResponse::<DigestReport>::success(
                report,
                "Digest run completed".to_string(),
            )),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(
                e.to_string(),
                "Digest run aborted".to_string(),
            )),
        )
            .into_response(),
    }
}
