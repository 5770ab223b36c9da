//! Health check endpoint.
//!
//! Lets the test runner and the CLI check that the agent is up before pushing
//! samples, and how much is waiting for the next flush.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Agent status (always "healthy" if reachable).
    pub status: String,
    /// Agent version.
    pub version: String,
    /// Sample containers waiting for the next flush cycle.
    pub buffered: usize,
}

/// Creates the health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        buffered: state.buffer().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use shared::models::{MetricType, Sample, SampleContainer};
    use tower::ServiceExt;

    async fn get_health(state: AppState) -> (StatusCode, HealthResponse) {
        let response = health_routes(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_body() {
        let (status, health) = get_health(AppState::default()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(health.buffered, 0);
    }

    #[tokio::test]
    async fn test_health_reports_buffered_containers() {
        let state = AppState::default();
        state
            .buffer()
            .add_samples([SampleContainer::from(Sample::new("vus", MetricType::Gauge, 1.0))]);

        let (_, health) = get_health(state).await;
        assert_eq!(health.buffered, 1);
    }
}
