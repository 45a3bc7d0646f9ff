//! REST-Interface fuer Fernruf

pub mod handlers;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::extract::FromRequest;
use fernruf_core::UserId;
use fernruf_signaling::SignalingState;
use serde::Serialize;

use crate::error::ApiError;

/// Axum-State fuer die REST-Handler
#[derive(Clone)]
pub struct ApiState {
    pub signaling: Arc<SignalingState>,
}

impl ApiState {
    pub fn neu(signaling: Arc<SignalingState>) -> Self {
        Self { signaling }
    }
}

/// JSON-Extractor, dessen Ablehnung als `ApiError` (400) beantwortet wird
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Oeffentliche Sicht einer Identitaet in REST-Antworten
#[derive(Debug, Clone, Serialize)]
pub struct BenutzerAntwort {
    pub id: UserId,
    pub username: String,
    pub address: String,
}

impl From<fernruf_auth::IdentitaetsInfo> for BenutzerAntwort {
    fn from(info: fernruf_auth::IdentitaetsInfo) -> Self {
        Self {
            id: info.id,
            username: info.username,
            address: info.adresse,
        }
    }
}

pub use server::{app_bauen, RestServer, RestServerKonfig};
