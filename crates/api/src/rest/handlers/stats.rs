//! REST-Handler fuer Serverstatistiken

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::rest::ApiState;

#[derive(Debug, Serialize)]
pub struct StatsAntwort {
    pub total_users: usize,
    pub online_users: usize,
    pub active_sessions: usize,
    pub active_connections: usize,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsAntwort> {
    let signaling = &state.signaling;
    Json(StatsAntwort {
        total_users: signaling.auth.credentials().anzahl(),
        online_users: signaling.auth.credentials().online_anzahl(),
        active_sessions: signaling.auth.aktive_sessions(),
        active_connections: signaling.presence.verbindungs_anzahl(),
    })
}
