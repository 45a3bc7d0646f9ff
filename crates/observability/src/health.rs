//! Health-Check-Endpunkt fuer Fernruf
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version und Uptime

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server faehrt herunter
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    bereit: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            bereit: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn ist_bereit(&self) -> bool {
        self.bereit.load(Ordering::Relaxed)
    }

    /// Beim Shutdown auf `false` setzen, damit Health-Checks den Server abmelden
    pub fn bereit_setzen(&self, bereit: bool) {
        self.bereit.store(bereit, Ordering::Relaxed);
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (status, http_status) = if state.ist_bereit() {
        (HealthStatus::Healthy, StatusCode::OK)
    } else {
        (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn health_state_frisch() {
        let state = HealthState::neu();
        assert!(state.uptime_seconds() < 5);
        assert!(state.ist_bereit());
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"version\":\"0.1.0\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
    }

    #[tokio::test]
    async fn health_endpunkt_ok() {
        let app = health_router(HealthState::neu());
        let antwort = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_endpunkt_beim_shutdown() {
        let state = HealthState::neu();
        state.bereit_setzen(false);
        let app = health_router(state);
        let antwort = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
