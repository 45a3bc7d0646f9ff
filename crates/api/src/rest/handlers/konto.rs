//! REST-Handler fuer Registrierung und Login

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::rest::{ApiJson, ApiState, BenutzerAntwort};

/// Body fuer `/api/register` und `/api/login`
#[derive(Debug, Deserialize)]
pub struct ZugangBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ZugangBody {
    /// Trimmt den Namen und lehnt leere Felder ab
    fn pruefen(self) -> ApiResult<(String, String)> {
        let username = self.username.trim().to_string();
        if username.is_empty() || self.password.is_empty() {
            return Err(ApiError::UngueltigeEingabe(
                "Username and password required".into(),
            ));
        }
        Ok((username, self.password))
    }
}

#[derive(Debug, Serialize)]
pub struct ZugangAntwort {
    pub success: bool,
    pub user: BenutzerAntwort,
    pub session_token: String,
}

pub async fn register(
    State(state): State<ApiState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ApiJson(body): ApiJson<ZugangBody>,
) -> ApiResult<Json<ZugangAntwort>> {
    let (username, passwort) = body.pruefen()?;
    // Die Transportadresse des registrierenden Clients wird zur Identitaets-Adresse
    let adresse = peer
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let auth = Arc::clone(&state.signaling.auth);
    let (info, session) =
        tokio::task::spawn_blocking(move || auth.registrieren(&username, &passwort, &adresse))
            .await
            .map_err(|e| ApiError::Intern(e.to_string()))??;

    tracing::info!(user_id = %info.id, username = %info.username, "Neue Identitaet registriert");
    Ok(Json(ZugangAntwort {
        success: true,
        user: info.into(),
        session_token: session.token,
    }))
}

pub async fn login(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<ZugangBody>,
) -> ApiResult<Json<ZugangAntwort>> {
    let metriken = state.signaling.metriken.clone();
    let ergebnis = anmelden(state, body).await;
    match &ergebnis {
        Ok(_) => metriken.login("success"),
        Err(e) => metriken.login(e.login_ergebnis()),
    }
    ergebnis
}

async fn anmelden(state: ApiState, body: ZugangBody) -> ApiResult<Json<ZugangAntwort>> {
    let (username, passwort) = body.pruefen()?;
    let auth = Arc::clone(&state.signaling.auth);
    let (info, session) = tokio::task::spawn_blocking(move || auth.anmelden(&username, &passwort))
        .await
        .map_err(|e| ApiError::Intern(e.to_string()))??;

    Ok(Json(ZugangAntwort {
        success: true,
        user: info.into(),
        session_token: session.token,
    }))
}
