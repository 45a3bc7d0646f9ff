//! Signaling-Router – Verteilt eingehende Frames einer Verbindung
//!
//! ## Zustandspruefung
//! - `auth-connect` ist immer erlaubt
//! - jede andere Nachricht auf einer ungebundenen Verbindung fuehrt zu
//!   `auth-error` und zum Schliessen
//! - `from` wird nie vom Client uebernommen: massgeblich ist die Bindung.
//!   Ein abweichendes `from` verwirft das Frame.
//!
//! Fehlerhafte Frames werden protokolliert und ohne Antwort verworfen.

use std::sync::Arc;

use fernruf_core::UserId;
use serde_json::Value;

use crate::error::{SignalingError, SignalingResult};
use crate::message::{
    parsen, ClientNachricht, Eingehend, ServerNachricht, SignalArt, CLIENT_EMPFAENGER,
    SERVER_ABSENDER,
};
use crate::presence::VerbindungsHandle;
use crate::server_state::SignalingState;

/// Fehlertext fuer ungueltige oder abgelaufene Sessions
pub const SESSION_UNGUELTIG: &str = "Invalid or expired session";

/// Fehlertext fuer Nachrichten vor `auth-connect`
pub const NICHT_AUTHENTIFIZIERT: &str = "Not authenticated";

/// Grund fuer `call-failed`
pub const ZIEL_NICHT_ERREICHBAR: &str = "User offline or unavailable";

/// Kontext einer Live-Verbindung
pub struct VerbindungsKontext {
    pub handle: VerbindungsHandle,
    /// Vom Transport gemeldete Peer-Adresse
    pub peer_adresse: Option<String>,
}

/// Wie die Verbindung nach einem Frame weitermacht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folge {
    Weiter,
    /// Ein `Schliessen` ist bereits eingereiht; keine weiteren Frames lesen
    Schliessen,
}

/// Zentraler Router fuer alle Frames der Live-Verbindungen
pub struct SignalingRouter {
    state: Arc<SignalingState>,
}

impl SignalingRouter {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein Text-Frame vollstaendig
    pub fn verarbeiten(&self, text: &str, ctx: &VerbindungsKontext) -> Folge {
        let eingehend = match parsen(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(verbindung = %ctx.handle.id, fehler = %e, "Frame verworfen");
                self.state.metriken.verworfen(e.grund());
                return Folge::Weiter;
            }
        };

        if let ClientNachricht::AuthConnect {
            session_token,
            adresse,
        } = &eingehend.nachricht
        {
            return self.auth_connect(session_token, adresse.as_deref(), ctx);
        }

        let absender = match self.absender_pruefen(&eingehend, ctx) {
            Ok(id) => id,
            Err(SignalingError::NichtAuthentifiziert) => {
                tracing::warn!(verbindung = %ctx.handle.id, "Nachricht vor auth-connect");
                self.state
                    .metriken
                    .verworfen(SignalingError::NichtAuthentifiziert.grund());
                return self.ablehnen(ctx, NICHT_AUTHENTIFIZIERT);
            }
            Err(e) => {
                tracing::warn!(verbindung = %ctx.handle.id, fehler = %e, "Frame verworfen");
                self.state.metriken.verworfen(e.grund());
                return Folge::Weiter;
            }
        };

        let ergebnis = match eingehend.nachricht {
            ClientNachricht::AddContact { username } => {
                self.kontakt_hinzufuegen(absender, username);
                Ok(())
            }
            ClientNachricht::CallRequest => {
                self.anruf_anfragen(absender, eingehend.to.as_deref())
            }
            ClientNachricht::Signal { art, data } => {
                self.signal_weiterleiten(absender, eingehend.to.as_deref(), art, data)
            }
            ClientNachricht::Unbekannt { typ } => {
                tracing::warn!(user_id = %absender, typ = %typ, "Unbekannter Nachrichtentyp");
                self.state.metriken.verworfen("unknown_type");
                Ok(())
            }
            // oben bereits behandelt
            ClientNachricht::AuthConnect { .. } => Ok(()),
        };

        if let Err(e) = ergebnis {
            tracing::debug!(user_id = %absender, fehler = %e, "Nachricht nicht zugestellt");
            self.state.metriken.verworfen(e.grund());
        }
        Folge::Weiter
    }

    /// Ermittelt den Absender aus der Bindung und gleicht `from` ab
    fn absender_pruefen(
        &self,
        eingehend: &Eingehend,
        ctx: &VerbindungsKontext,
    ) -> SignalingResult<UserId> {
        let gebunden = self
            .state
            .presence
            .identitaet_fuer(ctx.handle.id)
            .ok_or(SignalingError::NichtAuthentifiziert)?;

        match eingehend.from.as_deref() {
            Some(from) if UserId::parsen(from) != Some(gebunden) => {
                Err(SignalingError::AbsenderAbweichend {
                    erwartet: gebunden.als_draht(),
                    gemeldet: from.to_string(),
                })
            }
            _ => Ok(gebunden),
        }
    }

    /// Loest `to` zu einer existierenden Identitaet auf
    fn ziel_aufloesen(&self, to: Option<&str>) -> SignalingResult<UserId> {
        let roh = to.unwrap_or_default();
        UserId::parsen(roh)
            .filter(|id| self.state.auth.credentials().existiert(id))
            .ok_or_else(|| SignalingError::UnbekanntesZiel(roh.to_string()))
    }

    fn ablehnen(&self, ctx: &VerbindungsKontext, fehler: &str) -> Folge {
        let text = ServerNachricht::AuthFehler {
            error: fehler.to_string(),
        }
        .als_json(SERVER_ABSENDER, CLIENT_EMPFAENGER);
        ctx.handle.senden(text);
        ctx.handle.schliessen();
        Folge::Schliessen
    }

    // -----------------------------------------------------------------------
    // Handler
    // -----------------------------------------------------------------------

    fn auth_connect(
        &self,
        session_token: &str,
        gemeldete_adresse: Option<&str>,
        ctx: &VerbindungsKontext,
    ) -> Folge {
        let Some(info) = self.state.auth.session_validieren(session_token) else {
            tracing::warn!(verbindung = %ctx.handle.id, "auth-connect mit ungueltiger Session");
            return self.ablehnen(ctx, SESSION_UNGUELTIG);
        };

        let adresse = gemeldete_adresse.or(ctx.peer_adresse.as_deref());
        let bestaetigte_adresse = match adresse {
            Some(a) if info.adresse.is_empty() => a.to_string(),
            _ => info.adresse.clone(),
        };

        // Die Bestaetigung steht vor jedem contacts-update in der Queue
        let bestaetigung = ServerNachricht::VerbindungBestaetigt {
            id: info.id,
            username: info.username.clone(),
            adresse: bestaetigte_adresse,
        }
        .als_json(SERVER_ABSENDER, &info.id.als_draht());
        ctx.handle.senden(bestaetigung);

        if !self.state.presence.binden(info.id, ctx.handle.clone(), adresse) {
            return self.ablehnen(ctx, SESSION_UNGUELTIG);
        }
        self.state.kontakte.snapshot_senden(&info.id);

        tracing::info!(
            user_id = %info.id,
            username = %info.username,
            verbindung = %ctx.handle.id,
            "Live-Verbindung authentifiziert"
        );
        Folge::Weiter
    }

    /// Sucht mit getrimmtem Namen, antwortet mit dem Namen wie gesendet
    fn kontakt_hinzufuegen(&self, absender: UserId, username: String) {
        let success = self.state.kontakte.hinzufuegen(&absender, username.trim());
        let text = ServerNachricht::KontaktErgebnis { success, username }
            .als_json(SERVER_ABSENDER, &absender.als_draht());
        self.state.presence.senden(&absender, text);
    }

    fn anruf_anfragen(&self, absender: UserId, to: Option<&str>) -> SignalingResult<()> {
        let ziel = self.ziel_aufloesen(to)?;
        let presence = &self.state.presence;

        let zugestellt = if presence.ist_online(&ziel) {
            let anrufer = self
                .state
                .auth
                .credentials()
                .info(&absender)
                .ok_or(SignalingError::NichtAuthentifiziert)?;
            let text = ServerNachricht::Anruf {
                anrufer_id: anrufer.id,
                anrufer_name: anrufer.username,
                anrufer_adresse: anrufer.adresse,
            }
            .als_json(&absender.als_draht(), &ziel.als_draht());
            presence.senden(&ziel, text)
        } else {
            false
        };

        if zugestellt {
            self.state.metriken.weitergeleitet("call-request");
            tracing::info!(von = %absender, an = %ziel, "Anruf angefragt");
        } else {
            let text = ServerNachricht::AnrufFehlgeschlagen {
                reason: ZIEL_NICHT_ERREICHBAR.to_string(),
            }
            .als_json(SERVER_ABSENDER, &absender.als_draht());
            presence.senden(&absender, text);
            tracing::info!(von = %absender, an = %ziel, "Anruf fehlgeschlagen – Ziel offline");
        }
        Ok(())
    }

    fn signal_weiterleiten(
        &self,
        absender: UserId,
        to: Option<&str>,
        art: SignalArt,
        data: Value,
    ) -> SignalingResult<()> {
        let ziel = self.ziel_aufloesen(to)?;
        let text = ServerNachricht::Weitergeleitet { art, data }
            .als_json(&absender.als_draht(), &ziel.als_draht());

        // Offline-Ziele werden still verworfen, der Absender erfaehrt nichts
        if !self.state.presence.senden(&ziel, text) {
            return Err(SignalingError::ZielOffline);
        }
        self.state.metriken.weitergeleitet(art.als_str());
        tracing::debug!(von = %absender, an = %ziel, typ = art.als_str(), "Signal weitergeleitet");
        Ok(())
    }
}
