//! REST-Handler fuer Logout und Session-Pruefung

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::rest::{ApiJson, ApiState, BenutzerAntwort};

#[derive(Debug, Deserialize)]
pub struct SessionBody {
    #[serde(default)]
    pub session_token: String,
}

/// POST /api/logout – gelingt immer, auch fuer unbekannte Tokens
pub async fn logout(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<SessionBody>,
) -> Json<serde_json::Value> {
    if !body.session_token.is_empty() {
        state.signaling.auth.abmelden(&body.session_token);
        tracing::debug!("Session abgemeldet");
    }
    Json(json!({ "success": true }))
}

/// POST /api/validate-session
pub async fn validate_session(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<SessionBody>,
) -> Response {
    match state.signaling.auth.session_validieren(&body.session_token) {
        Some(info) => (
            StatusCode::OK,
            Json(json!({ "valid": true, "user": BenutzerAntwort::from(info) })),
        )
            .into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "valid": false }))).into_response(),
    }
}
