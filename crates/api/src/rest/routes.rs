//! Route-Definitionen fuer die REST-API (/api/...)

use axum::{
    routing::{get, post},
    Router,
};

use crate::rest::{handlers, ApiState};

/// Erstellt den vollstaendigen /api/-Router
pub fn api_router() -> Router<ApiState> {
    Router::new()
        // Konten
        .route("/api/register", post(handlers::konto::register))
        .route("/api/login", post(handlers::konto::login))
        // Sessions
        .route("/api/logout", post(handlers::session::logout))
        .route(
            "/api/validate-session",
            post(handlers::session::validate_session),
        )
        // Statistiken
        .route("/api/stats", get(handlers::stats::get_stats))
}
