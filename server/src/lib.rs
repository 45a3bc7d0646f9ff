//! fernruf-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use config::ServerConfig;
use fernruf_api::{app_bauen, ApiState, RestServer, RestServerKonfig};
use fernruf_auth::AuthService;
use fernruf_observability::{FernrufMetriken, HealthState};
use fernruf_signaling::SignalingState;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    pub signaling: Arc<SignalingState>,
    pub health: HealthState,
}

impl Server {
    /// Baut alle Komponenten und legt ggf. die Bootstrap-Identitaet an
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let metriken = FernrufMetriken::neu()?;
        let auth = Arc::new(AuthService::neu(config.auth_konfig()?));

        if config.admin.anlegen {
            admin_anlegen(&auth, &config)?;
        }

        let signaling = SignalingState::mit_ws_konfig(auth, metriken, config.ws_konfig());
        Ok(Self {
            config,
            signaling,
            health: HealthState::neu(),
        })
    }

    /// Vollstaendige HTTP-Anwendung (REST, `/ws`, `/health`, `/metrics`)
    pub fn app(&self) -> Router {
        app_bauen(
            ApiState::neu(Arc::clone(&self.signaling)),
            self.health.clone(),
            &self.config.cors.origins,
        )
    }

    /// Startet den Listener und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        let health = self.health.clone();
        self.starten_bis(async move {
            shutdown_signal().await;
            health.bereit_setzen(false);
        })
        .await
    }

    /// Wie [`Self::starten`], mit eigenem Shutdown-Future
    pub async fn starten_bis<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_adresse()?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %bind_addr,
            "Server startet"
        );

        let app = self.app();
        let server = RestServer::neu(RestServerKonfig {
            bind_addr,
            cors_origins: self.config.cors.origins.clone(),
        });
        server.starten(app, shutdown).await
    }
}

fn admin_anlegen(auth: &AuthService, config: &ServerConfig) -> Result<()> {
    let admin = &config.admin;
    if auth.admin_anlegen(&admin.username, &admin.password)? {
        tracing::warn!(
            username = %admin.username,
            "Bootstrap-Identitaet mit bekanntem Passwort angelegt. Nur fuer Demos geeignet, \
             vor produktivem Einsatz admin.anlegen = false setzen"
        );
    }
    Ok(())
}

/// Wartet auf Ctrl-C oder SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(fehler = %e, "SIGTERM-Handler konnte nicht installiert werden");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
}
