//! Session-Management fuer Fernruf
//!
//! Kurzlebige Session-Tokens fuer angemeldete Identitaeten, im Speicher
//! gehalten. Abgelaufene Sessions werden erst beim naechsten Zugriff
//! entdeckt und entfernt; es gibt keinen Hintergrund-Task.
//!
//! Pro Identitaet ist hoechstens eine Session gueltig: eine neue Session
//! widerruft die vorherige.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use fernruf_core::UserId;
use rand::RngCore;

use crate::credentials::CredentialStore;
use crate::error::{AuthError, AuthResult};

/// Standard-Session-Lebensdauer: 24 Stunden
pub const SESSION_TTL_STUNDEN: i64 = 24;

/// Ein aktives Session-Token
#[derive(Debug, Clone)]
pub struct Session {
    /// Der Token-String (URL-sicheres Base64)
    pub token: String,
    /// ID der Identitaet der diese Session gehoert
    pub user_id: UserId,
    /// Zeitpunkt der Session-Erstellung
    pub erstellt_am: DateTime<Utc>,
    /// Zeitpunkt des Session-Ablaufs
    pub laeuft_ab_am: DateTime<Utc>,
}

impl Session {
    /// Gueltig bis einschliesslich `laeuft_ab_am`
    pub fn ist_gueltig_am(&self, jetzt: DateTime<Utc>) -> bool {
        jetzt <= self.laeuft_ab_am
    }
}

/// In-Memory Session-Store mit TTL
pub struct SessionStore {
    /// token -> Session
    sessions: DashMap<String, Session>,
    credentials: Arc<CredentialStore>,
    ttl: Duration,
}

impl SessionStore {
    /// Erstellt einen neuen leeren Session-Store
    pub fn neu(credentials: Arc<CredentialStore>, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            credentials,
            ttl,
        }
    }

    /// Erstellt eine neue Session fuer die Identitaet
    pub fn erstellen(&self, user_id: UserId) -> AuthResult<Session> {
        self.erstellen_am(user_id, Utc::now())
    }

    /// Wie [`Self::erstellen`], mit explizitem Zeitpunkt
    pub fn erstellen_am(&self, user_id: UserId, jetzt: DateTime<Utc>) -> AuthResult<Session> {
        if !self.credentials.existiert(&user_id) {
            return Err(AuthError::BenutzerNichtGefunden(user_id.to_string()));
        }

        let session = Session {
            token: token_generieren(),
            user_id,
            erstellt_am: jetzt,
            laeuft_ab_am: jetzt + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());

        // Auf der Identitaet vermerken; eine Vorgaenger-Session wird widerrufen
        if let Some(alt) =
            self.credentials
                .session_vermerken(&user_id, &session.token, session.laeuft_ab_am)
        {
            self.sessions.remove(&alt);
            tracing::debug!(user_id = %user_id, "Vorherige Session widerrufen");
        }

        tracing::debug!(user_id = %user_id, "Neue Session erstellt");
        Ok(session)
    }

    /// Validiert einen Token und gibt die zugehoerige Identitaet zurueck
    pub fn validieren(&self, token: &str) -> Option<UserId> {
        self.validieren_am(token, Utc::now())
    }

    /// Wie [`Self::validieren`], mit explizitem Zeitpunkt
    ///
    /// Eine abgelaufene Session wird dabei entfernt und die Session-Felder
    /// der Identitaet werden geleert.
    pub fn validieren_am(&self, token: &str, jetzt: DateTime<Utc>) -> Option<UserId> {
        let session = self.sessions.get(token)?.clone();

        if !session.ist_gueltig_am(jetzt) {
            self.sessions.remove(token);
            self.credentials.session_loeschen(&session.user_id, token);
            tracing::debug!(user_id = %session.user_id, "Abgelaufene Session entfernt");
            return None;
        }

        if !self.credentials.existiert(&session.user_id) {
            self.sessions.remove(token);
            return None;
        }
        Some(session.user_id)
    }

    /// Invalidiert eine Session (unbekannte Tokens sind kein Fehler)
    pub fn invalidieren(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            self.credentials.session_loeschen(&session.user_id, token);
            tracing::debug!(user_id = %session.user_id, "Session invalidiert");
        }
    }

    /// Anzahl der nicht abgelaufenen Sessions
    pub fn anzahl_aktive(&self) -> usize {
        let jetzt = Utc::now();
        self.sessions
            .iter()
            .filter(|s| s.value().ist_gueltig_am(jetzt))
            .count()
    }
}

/// Generiert einen kryptografisch sicheren Session-Token (URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
