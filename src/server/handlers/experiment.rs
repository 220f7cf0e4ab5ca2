use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::debug;

use crate::error::PolyglotError;
use crate::metrics::ASSIGNMENTS_TOTAL;
use crate::server::AppState;

use super::ApiError;

pub const EXPERIMENT_ID: &str = "exp-localization-v1";

#[derive(Debug, Deserialize)]
pub struct ExperimentRequest {
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResponse<'a> {
    pub experiment_id: &'static str,
    pub selected_payload_name: &'a str,
    /// Embedded as JSON, never re-escaped into a string.
    pub payload: &'a RawValue,
}

/// Assign the caller's user to a payload variant and return it.
///
/// The body is decoded here rather than through the `Json` extractor so that
/// every malformed body maps to a 400 with an `error` field.
pub async fn assign_experiment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ExperimentRequest = serde_json::from_slice(&body)
        .map_err(|_| PolyglotError::Validation("invalid request body".into()))?;

    let user_id = req
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PolyglotError::Validation("userId is required".into()))?;

    let variant = state.store.select(&user_id);
    debug!(user_id = %user_id, payload = variant.name(), "assigned payload");
    ASSIGNMENTS_TOTAL
        .with_label_values(&[variant.name()])
        .inc();

    Ok(Json(ExperimentResponse {
        experiment_id: EXPERIMENT_ID,
        selected_payload_name: variant.name(),
        payload: variant.content(),
    })
    .into_response())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::assignment::assign;
    use crate::config::Config;
    use crate::payload::{PayloadStore, PayloadVariant};
    use crate::server::routes::build_router;
    use crate::server::AppState;

    fn test_state() -> AppState {
        let store = PayloadStore::from_variants(vec![
            PayloadVariant::from_json("de.json", r#"{"hello":"hallo"}"#).unwrap(),
            PayloadVariant::from_json("en.json", r#"{"hello":"hello"}"#).unwrap(),
            PayloadVariant::from_json("fr.json", r#"{"hello":"bonjour"}"#).unwrap(),
        ])
        .unwrap();
        AppState {
            store: Arc::new(store),
            config: Arc::new(Config::default()),
        }
    }

    async fn post(state: AppState, body: &'static str) -> (StatusCode, Value) {
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::post("/experiment")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_assigns_expected_variant() {
        let state = test_state();
        let expected = ["de.json", "en.json", "fr.json"][assign("user-123", 3)];

        let (status, body) = post(state, r#"{"userId":"user-123"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["experimentId"], "exp-localization-v1");
        assert_eq!(body["selectedPayloadName"], expected);
        assert!(body["payload"].is_object(), "payload must be embedded JSON");
    }

    #[tokio::test]
    async fn test_missing_user_id_is_400() {
        let (status, body) = post(test_state(), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "userId is required");
    }

    #[tokio::test]
    async fn test_empty_user_id_is_400() {
        let (status, body) = post(test_state(), r#"{"userId":""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "userId is required");
    }

    #[tokio::test]
    async fn test_null_user_id_is_400() {
        let (status, _) = post(test_state(), r#"{"userId":null}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unparsable_body_is_400() {
        for body in ["", "not json", r#"{"userId": 42}"#, "[1,2]"] {
            let (status, value) = post(test_state(), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert_eq!(value["error"], "invalid request body");
        }
    }
}
