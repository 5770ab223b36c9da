//! Sample ingestion endpoint.
//!
//! The test runner posts sample containers here; they are buffered until the
//! next flush cycle drains them.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use shared::models::SampleContainer;

/// Request for sample ingestion: one container or a batch of containers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SampleIngestRequest {
    /// A single container.
    Single(SampleContainer),
    /// Several containers, buffered in order.
    Batch(Vec<SampleContainer>),
}

impl SampleIngestRequest {
    fn into_containers(self) -> Vec<SampleContainer> {
        match self {
            Self::Single(container) => vec![container],
            Self::Batch(containers) => containers,
        }
    }
}

/// Response for sample ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleIngestResponse {
    /// Number of samples buffered.
    pub accepted: usize,
    /// Human readable summary.
    pub message: String,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct IngestError {
    /// Machine readable error code.
    pub error: String,
    /// Human readable description.
    pub message: String,
}

/// Creates the sample ingestion routes.
pub fn samples_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/samples", post(ingest_samples))
        .with_state(state)
}

async fn ingest_samples(
    State(state): State<AppState>,
    Json(request): Json<SampleIngestRequest>,
) -> Result<(StatusCode, Json<SampleIngestResponse>), (StatusCode, Json<IngestError>)> {
    let containers = request.into_containers();
    let accepted: usize = containers.iter().map(SampleContainer::len).sum();

    if accepted == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(IngestError {
                error: "empty_batch".to_string(),
                message: "At least one sample is required".to_string(),
            }),
        ));
    }

    state.buffer().add_samples(containers);
    tracing::debug!(accepted, "Buffered samples");

    Ok((
        StatusCode::ACCEPTED,
        Json(SampleIngestResponse {
            accepted,
            message: format!("Buffered {accepted} sample(s)"),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleSource;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn post(state: AppState, body: &'static str) -> (StatusCode, serde_json::Value) {
        let response = samples_routes(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/samples")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_ingest_single_container() {
        let state = AppState::default();
        let (status, body) = post(
            state.clone(),
            r#"{"samples": [{"metric": "vus", "metric_type": "gauge", "value": 5, "tags": {"scenario": "default"}}]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 1);

        let drained = state.buffer().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].samples()[0].tag("scenario"), Some("default"));
    }

    #[tokio::test]
    async fn test_ingest_batch_of_containers() {
        let state = AppState::default();
        let (status, body) = post(
            state.clone(),
            r#"[
                {"samples": [{"metric": "http_reqs", "metric_type": "counter", "value": 1}]},
                {"samples": [
                    {"metric": "http_req_duration", "metric_type": "trend", "value": 12.5, "tags": {"status": "200"}},
                    {"metric": "http_req_duration", "metric_type": "trend", "value": 3.1, "tags": {"status": "404"}}
                ]}
            ]"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 3);
        assert_eq!(state.buffer().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_empty_batch_rejected() {
        let state = AppState::default();
        let (status, body) = post(state.clone(), "[]").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "empty_batch");
        assert!(state.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_invalid_json_rejected() {
        let (status, _) = post(AppState::default(), r#"{"samples": "nope"}"#).await;
        assert!(status.is_client_error());
    }
}
