//! Presence-Verzeichnis – Bindet Live-Verbindungen an Identitaeten
//!
//! Wer ist online, und ueber welche Verbindung? Beide Richtungen der
//! Bindung liegen hinter einem Mutex und stimmen damit immer ueberein.
//! Pro Identitaet gibt es hoechstens eine Verbindung: eine neue Bindung
//! schliesst die alte.
//!
//! Statusaenderungen werden als [`PresenceEvent`] ausgegeben; der
//! Kontakt-Fan-out konsumiert sie in einem eigenen Task.
//!
//! Lock-Reihenfolge: Bindungen vor Identitaeten (CredentialStore).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use fernruf_auth::{CredentialStore, OnlineStatus};
use fernruf_core::{UserId, VerbindungsId};
use fernruf_observability::FernrufMetriken;
use parking_lot::Mutex;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Verbindungs-Handle
// ---------------------------------------------------------------------------

/// Auftrag an den Schreib-Teil einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ausgehend {
    Text(String),
    Schliessen,
}

/// Handle auf die Send-Queue einer Live-Verbindung
///
/// Die Queue ist unbegrenzt; es gibt keinen Rueckstau.
#[derive(Debug, Clone)]
pub struct VerbindungsHandle {
    pub id: VerbindungsId,
    tx: mpsc::UnboundedSender<Ausgehend>,
}

impl VerbindungsHandle {
    /// Erstellt ein Handle mit neuer ID und die zugehoerige Empfangsseite
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<Ausgehend>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: VerbindungsId::naechste(),
                tx,
            },
            rx,
        )
    }

    /// Reiht ein Text-Frame ein. `false` wenn die Verbindung schon weg ist.
    pub fn senden(&self, text: String) -> bool {
        self.tx.send(Ausgehend::Text(text)).is_ok()
    }

    /// Fordert das Schliessen an (nach allen bereits eingereihten Frames)
    pub fn schliessen(&self) {
        let _ = self.tx.send(Ausgehend::Schliessen);
    }
}

// ---------------------------------------------------------------------------
// Presence-Events
// ---------------------------------------------------------------------------

/// Events die das PresenceDirectory versendet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Online(UserId),
    Offline(UserId),
}

impl PresenceEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Online(id) | Self::Offline(id) => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceDirectory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Bindungen {
    nach_identitaet: HashMap<UserId, VerbindungsHandle>,
    nach_verbindung: HashMap<VerbindungsId, UserId>,
}

/// Verzeichnis aller gebundenen Live-Verbindungen
pub struct PresenceDirectory {
    bindungen: Mutex<Bindungen>,
    credentials: Arc<CredentialStore>,
    event_tx: mpsc::UnboundedSender<PresenceEvent>,
    metriken: FernrufMetriken,
}

impl PresenceDirectory {
    /// Erstellt ein leeres Verzeichnis und die Empfangsseite der Events
    pub fn neu(
        credentials: Arc<CredentialStore>,
        metriken: FernrufMetriken,
    ) -> (Self, mpsc::UnboundedReceiver<PresenceEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                bindungen: Mutex::new(Bindungen::default()),
                credentials,
                event_tx,
                metriken,
            },
            event_rx,
        )
    }

    /// Bindet eine Verbindung an eine Identitaet
    ///
    /// - eine andere Verbindung derselben Identitaet wird geschlossen
    /// - ist diese Verbindung an eine andere Identitaet gebunden, wird jene
    ///   zuerst abgemeldet
    /// - `adresse` ergaenzt die Identitaet nur, wenn dort noch keine steht
    ///
    /// Gibt `false` zurueck wenn die Identitaet unbekannt ist.
    pub fn binden(
        &self,
        user_id: UserId,
        handle: VerbindungsHandle,
        adresse: Option<&str>,
    ) -> bool {
        let jetzt = Utc::now();
        let mut events = Vec::with_capacity(2);
        let verbindung = handle.id;

        {
            let mut bindungen = self.bindungen.lock();
            if !self.credentials.existiert(&user_id) {
                return false;
            }

            if let Some(anderer) = bindungen.nach_verbindung.remove(&verbindung) {
                if anderer != user_id {
                    bindungen.nach_identitaet.remove(&anderer);
                    self.credentials
                        .status_setzen(&anderer, OnlineStatus::Offline, jetzt);
                    events.push(PresenceEvent::Offline(anderer));
                }
            }

            if let Some(alt) = bindungen.nach_identitaet.insert(user_id, handle) {
                if alt.id != verbindung {
                    bindungen.nach_verbindung.remove(&alt.id);
                    alt.schliessen();
                    tracing::info!(
                        user_id = %user_id,
                        alt = %alt.id,
                        neu = %verbindung,
                        "Vorherige Verbindung geschlossen"
                    );
                }
            }
            bindungen.nach_verbindung.insert(verbindung, user_id);

            self.credentials
                .status_setzen(&user_id, OnlineStatus::Online, jetzt);
            if let Some(adresse) = adresse {
                self.credentials.adresse_ergaenzen(&user_id, adresse);
            }
            self.metriken
                .connected_clients
                .set(bindungen.nach_verbindung.len() as i64);
        }

        events.push(PresenceEvent::Online(user_id));
        tracing::info!(user_id = %user_id, verbindung = %verbindung, "Identitaet online");
        self.events_senden(events);
        true
    }

    /// Loest die Bindung einer Verbindung (unbekannte Verbindungen: No-op)
    pub fn trennen(&self, verbindung: VerbindungsId) {
        let user_id = {
            let mut bindungen = self.bindungen.lock();
            let Some(user_id) = bindungen.nach_verbindung.remove(&verbindung) else {
                return;
            };
            if bindungen
                .nach_identitaet
                .get(&user_id)
                .is_some_and(|h| h.id == verbindung)
            {
                bindungen.nach_identitaet.remove(&user_id);
            }
            self.credentials
                .status_setzen(&user_id, OnlineStatus::Offline, Utc::now());
            self.metriken
                .connected_clients
                .set(bindungen.nach_verbindung.len() as i64);
            user_id
        };

        tracing::info!(user_id = %user_id, verbindung = %verbindung, "Identitaet offline");
        self.events_senden(vec![PresenceEvent::Offline(user_id)]);
    }

    /// Sendet ein Text-Frame an die Verbindung einer Identitaet
    ///
    /// Eine tote Verbindung gilt als implizites Trennen; dann `false`.
    pub fn senden(&self, user_id: &UserId, text: String) -> bool {
        let handle = self.bindungen.lock().nach_identitaet.get(user_id).cloned();
        let Some(handle) = handle else {
            return false;
        };

        if handle.senden(text) {
            return true;
        }
        tracing::warn!(user_id = %user_id, verbindung = %handle.id, "Senden fehlgeschlagen – Verbindung tot");
        self.trennen(handle.id);
        false
    }

    /// Prueft ob eine Identitaet eine gebundene Verbindung hat
    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.bindungen.lock().nach_identitaet.contains_key(user_id)
    }

    /// Identitaet hinter einer Verbindung
    pub fn identitaet_fuer(&self, verbindung: VerbindungsId) -> Option<UserId> {
        self.bindungen.lock().nach_verbindung.get(&verbindung).copied()
    }

    /// Anzahl gebundener Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.bindungen.lock().nach_verbindung.len()
    }

    fn events_senden(&self, events: Vec<PresenceEvent>) {
        for event in events {
            if self.event_tx.send(event).is_err() {
                tracing::debug!(?event, "Kein Abnehmer fuer Presence-Events");
            }
        }
    }
}
