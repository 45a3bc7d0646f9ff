//! Axum HTTP-Server fuer Fernruf
//!
//! Ein Listener bedient REST-API, WebSocket-Endpunkt, Health-Check und
//! Prometheus-Metriken.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::Router;
use fernruf_observability::{
    health_router, http_metriken_middleware, metrics_router, request_trace_layer, HealthState,
};
use fernruf_signaling::ws_router;
use tower_http::cors::{Any, CorsLayer};

use crate::rest::{routes::api_router, ApiState};

/// REST-Server-Konfiguration
#[derive(Debug, Clone)]
pub struct RestServerKonfig {
    pub bind_addr: SocketAddr,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt.
    pub cors_origins: Vec<String>,
}

impl Default for RestServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cors_origins: vec![],
        }
    }
}

/// CORS konfigurieren: entweder spezifische Origins oder permissiv
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Baut die vollstaendige Anwendung aus allen Teil-Routern
pub fn app_bauen(state: ApiState, health: HealthState, cors_origins: &[String]) -> Router {
    let metriken = state.signaling.metriken.clone();

    api_router()
        .with_state(state.clone())
        .merge(ws_router(state.signaling))
        .merge(health_router(health))
        .merge(metrics_router(metriken.clone()))
        .layer(middleware::from_fn_with_state(
            metriken,
            http_metriken_middleware,
        ))
        .layer(request_trace_layer())
        .layer(cors_layer(cors_origins))
}

/// Axum HTTP-Server fuer Fernruf
pub struct RestServer {
    konfig: RestServerKonfig,
}

impl RestServer {
    pub fn neu(konfig: RestServerKonfig) -> Self {
        Self { konfig }
    }

    /// Bindet den Port und bedient `app` bis `shutdown` abschliesst
    ///
    /// Ein Fehler beim Binden ist der einzige fatale Startfehler.
    pub async fn starten<F>(self, app: Router, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.konfig.bind_addr).await?;
        tracing::info!(addr = %self.konfig.bind_addr, "Fernruf-Server gestartet");

        // ConnectInfo liefert die Peer-Adresse fuer Registrierung und WebSocket
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Fernruf-Server beendet");
        Ok(())
    }
}
