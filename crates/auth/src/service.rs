//! Auth-Service fuer Fernruf
//!
//! Zentraler Service fuer Registrierung, Login, Logout und Session-Pruefung.
//! Verbindet den CredentialStore mit dem SessionStore und setzt die
//! Login-Sperre durch.
//!
//! Alle Operationen sind synchron. PBKDF2 ist CPU-lastig; asynchrone
//! Aufrufer lagern Registrierung und Login per `spawn_blocking` aus.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    credentials::{CredentialStore, IdentitaetsInfo, MIN_PASSWORT_LAENGE},
    error::{AuthError, AuthResult},
    password::STANDARD_RUNDEN,
    session::{Session, SessionStore, SESSION_TTL_STUNDEN},
};

/// Parameter fuer Hashing, Sessions und Login-Sperre
#[derive(Debug, Clone)]
pub struct AuthKonfig {
    pub session_ttl: Duration,
    pub min_passwort_laenge: usize,
    pub pbkdf2_runden: u32,
    /// Fehlversuche bis zur Sperre
    pub sperr_schwelle: u32,
    pub sperr_dauer: Duration,
}

impl Default for AuthKonfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(SESSION_TTL_STUNDEN),
            min_passwort_laenge: MIN_PASSWORT_LAENGE,
            pbkdf2_runden: STANDARD_RUNDEN,
            sperr_schwelle: 5,
            sperr_dauer: Duration::minutes(15),
        }
    }
}

/// Auth-Service – zentraler Einstiegspunkt fuer alle Authentifizierungsvorgaenge
pub struct AuthService {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionStore>,
    konfig: AuthKonfig,
}

impl AuthService {
    /// Erstellt einen neuen AuthService mit eigenem Register und Session-Store
    pub fn neu(konfig: AuthKonfig) -> Self {
        let credentials = Arc::new(CredentialStore::neu(
            konfig.pbkdf2_runden,
            konfig.min_passwort_laenge,
        ));
        let sessions = Arc::new(SessionStore::neu(
            Arc::clone(&credentials),
            konfig.session_ttl,
        ));
        Self {
            credentials,
            sessions,
            konfig,
        }
    }

    /// Zugriff auf das Identitaets-Register
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Zugriff auf den Session-Store
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Registriert eine neue Identitaet und stellt sofort eine Session aus
    pub fn registrieren(
        &self,
        username: &str,
        passwort: &str,
        adresse: &str,
    ) -> AuthResult<(IdentitaetsInfo, Session)> {
        let identitaet = self.credentials.registrieren(username, passwort, adresse)?;
        let session = self.sessions.erstellen(identitaet.id)?;
        Ok((identitaet.info(), session))
    }

    /// Meldet eine Identitaet an und erstellt eine neue Session
    pub fn anmelden(&self, username: &str, passwort: &str) -> AuthResult<(IdentitaetsInfo, Session)> {
        self.anmelden_am(username, passwort, Utc::now())
    }

    /// Wie [`Self::anmelden`], mit explizitem Zeitpunkt
    ///
    /// Waehrend einer Sperre wird das Passwort gar nicht erst geprueft.
    pub fn anmelden_am(
        &self,
        username: &str,
        passwort: &str,
        jetzt: DateTime<Utc>,
    ) -> AuthResult<(IdentitaetsInfo, Session)> {
        let id = self
            .credentials
            .id_fuer_name(username)
            .ok_or(AuthError::UngueltigeAnmeldedaten)?;

        if let Some(rest) = self.credentials.sperre_verbleibend(&id, jetzt) {
            return Err(AuthError::KontoGesperrt {
                verbleibend_sek: sekunden_aufgerundet(rest),
            });
        }

        if !self.credentials.verifizieren(username, passwort) {
            tracing::warn!(username = %username, "Fehlgeschlagener Login-Versuch");
            return match self.credentials.fehlversuch_vermerken(
                &id,
                jetzt,
                self.konfig.sperr_schwelle,
                self.konfig.sperr_dauer,
            ) {
                Some(bis) => Err(AuthError::KontoGesperrt {
                    verbleibend_sek: sekunden_aufgerundet(bis - jetzt),
                }),
                None => Err(AuthError::UngueltigeAnmeldedaten),
            };
        }

        // Ein paralleler Fehlversuch kann die Sperre seit der Pruefung gesetzt haben
        if let Err(bis) = self.credentials.anmeldung_erfolgreich(&id, jetzt) {
            return Err(AuthError::KontoGesperrt {
                verbleibend_sek: sekunden_aufgerundet(bis - jetzt),
            });
        }
        let session = self.sessions.erstellen_am(id, jetzt)?;
        let info = self
            .credentials
            .info(&id)
            .ok_or_else(|| AuthError::BenutzerNichtGefunden(username.to_string()))?;

        tracing::info!(user_id = %id, username = %username, "Benutzer angemeldet");
        Ok((info, session))
    }

    /// Meldet ab und invalidiert die Session (auch fuer unbekannte Tokens ok)
    pub fn abmelden(&self, session_token: &str) {
        self.sessions.invalidieren(session_token);
    }

    /// Prueft einen Session-Token und gibt die oeffentliche Sicht zurueck
    pub fn session_validieren(&self, session_token: &str) -> Option<IdentitaetsInfo> {
        let id = self.sessions.validieren(session_token)?;
        self.credentials.info(&id)
    }

    /// Legt die Bootstrap-Identitaet an, sofern der Name noch frei ist
    ///
    /// Gibt `true` zurueck wenn eine neue Identitaet angelegt wurde.
    pub fn admin_anlegen(&self, username: &str, passwort: &str) -> AuthResult<bool> {
        if self.credentials.id_fuer_name(username).is_some() {
            return Ok(false);
        }
        match self.credentials.registrieren(username, passwort, "") {
            Ok(_) => Ok(true),
            Err(AuthError::BenutzernameVergeben(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Anzahl der aktiven Sessions
    pub fn aktive_sessions(&self) -> usize {
        self.sessions.anzahl_aktive()
    }
}

fn sekunden_aufgerundet(dauer: Duration) -> u64 {
    let ms = dauer.num_milliseconds().max(0) as u64;
    ms.div_ceil(1000)
}
