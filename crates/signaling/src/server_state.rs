//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Komponenten als Arc-Referenzen. Der REST-Pfad und
//! die Live-Verbindungen arbeiten auf denselben Instanzen und damit
//! unter denselben Locks.

use std::sync::Arc;

use fernruf_auth::AuthService;
use fernruf_observability::FernrufMetriken;

use crate::connection::WsKonfig;
use crate::contacts::ContactGraph;
use crate::presence::PresenceDirectory;

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Auth-Service (Registrierung, Login, Sessions)
    pub auth: Arc<AuthService>,
    /// Presence-Verzeichnis (wer ist ueber welche Verbindung online)
    pub presence: Arc<PresenceDirectory>,
    /// Kontakt-Graph mit Fan-out
    pub kontakte: Arc<ContactGraph>,
    pub metriken: FernrufMetriken,
    /// Keepalive und Groessenlimit fuer `/ws`
    pub ws: WsKonfig,
}

impl SignalingState {
    /// Erstellt den Zustand und startet den Kontakt-Fan-out-Task
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn neu(auth: Arc<AuthService>, metriken: FernrufMetriken) -> Arc<Self> {
        Self::mit_ws_konfig(auth, metriken, WsKonfig::default())
    }

    /// Wie [`Self::neu`], mit eigener WebSocket-Konfiguration
    pub fn mit_ws_konfig(
        auth: Arc<AuthService>,
        metriken: FernrufMetriken,
        ws: WsKonfig,
    ) -> Arc<Self> {
        let credentials = Arc::clone(auth.credentials());
        let (presence, events) = PresenceDirectory::neu(Arc::clone(&credentials), metriken.clone());
        let presence = Arc::new(presence);
        let kontakte = Arc::new(ContactGraph::neu(credentials, Arc::clone(&presence)));

        tokio::spawn(Arc::clone(&kontakte).events_verarbeiten(events));

        Arc::new(Self {
            auth,
            presence,
            kontakte,
            metriken,
            ws,
        })
    }
}
