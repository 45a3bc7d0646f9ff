//! WebSocket-Verbindung – Verwaltet eine einzelne Live-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Die Schleife liest
//! ein Frame, verarbeitet es vollstaendig und liest dann das naechste; im
//! selben `select!` wird die Send-Queue der Verbindung geleert.
//!
//! ## Keepalive
//! - Server sendet alle `ping_intervall` einen Ping
//! - bleibt danach `pong_timeout` lang jedes Frame aus, wird getrennt
//! - ein Schreibvorgang der laenger als `pong_timeout` haengt trennt ebenfalls
//!
//! ## Ablauf
//! ```text
//! Upgrade -> ungebunden --auth-connect--> gebunden
//!                |                            |
//!                +---- auth-error/Close ------+--> trennen()
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatcher::{Folge, SignalingRouter, VerbindungsKontext};
use crate::presence::{Ausgehend, VerbindungsHandle};
use crate::server_state::SignalingState;

/// Keepalive und Groessenlimit der Live-Verbindungen
#[derive(Debug, Clone)]
pub struct WsKonfig {
    pub ping_intervall: Duration,
    /// Frist fuer eine Antwort auf den Ping und fuer jeden Schreibvorgang
    pub pong_timeout: Duration,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachricht_bytes: usize,
}

impl Default for WsKonfig {
    fn default() -> Self {
        Self {
            ping_intervall: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
            max_nachricht_bytes: 1024 * 1024,
        }
    }
}

/// Axum-Router fuer den `/ws`-Endpunkt
pub fn ws_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// WebSocket-Upgrade-Handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    peer: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<SignalingState>>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let max = state.ws.max_nachricht_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| WsVerbindung::neu(state, peer).verarbeiten(socket))
}

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct WsVerbindung {
    state: Arc<SignalingState>,
    peer: Option<SocketAddr>,
}

impl WsVerbindung {
    pub fn neu(state: Arc<SignalingState>, peer: Option<SocketAddr>) -> Self {
        Self { state, peer }
    }

    /// Laeuft bis der Client trennt, das Schliessen angefordert wird oder
    /// der Keepalive ausbleibt
    pub async fn verarbeiten(self, socket: WebSocket) {
        let (mut sender, mut receiver) = socket.split();
        let (handle, mut sende_rx) = VerbindungsHandle::neu();
        let verbindung = handle.id;
        let ctx = VerbindungsKontext {
            handle,
            peer_adresse: self.peer.map(|p| p.ip().to_string()),
        };
        let router = SignalingRouter::neu(Arc::clone(&self.state));
        let konfig = self.state.ws.clone();
        let mut schliessend = false;

        let mut ping_takt = tokio::time::interval_at(
            Instant::now() + konfig.ping_intervall,
            konfig.ping_intervall,
        );
        ping_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Gesetzt solange ein Ping unbeantwortet ist
        let mut pong_frist: Option<Instant> = None;

        tracing::info!(verbindung = %verbindung, peer = ?self.peer, "Neue Live-Verbindung");

        loop {
            let frist = pong_frist;
            let frist_abgelaufen = async move {
                match frist {
                    Some(frist) => tokio::time::sleep_until(frist).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                // Eingehendes Frame vom Client
                frame = receiver.next(), if !schliessend => {
                    // Jedes Frame belegt, dass die Gegenseite lebt
                    if matches!(frame, Some(Ok(_))) {
                        pong_frist = None;
                    }
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            tracing::trace!(verbindung = %verbindung, "Frame empfangen");
                            if router.verarbeiten(&text, &ctx) == Folge::Schliessen {
                                schliessend = true;
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            tracing::debug!(verbindung = %verbindung, "Binaer-Frame ignoriert");
                            self.state.metriken.verworfen("malformed");
                        }
                        // Pings vom Client beantwortet axum selbst
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(verbindung = %verbindung, "Verbindung vom Client getrennt");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(verbindung = %verbindung, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                ausgehend = sende_rx.recv() => {
                    match ausgehend {
                        Some(Ausgehend::Text(text)) => {
                            if !schreiben(&mut sender, Message::Text(text), konfig.pong_timeout).await {
                                tracing::warn!(verbindung = %verbindung, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        Some(Ausgehend::Schliessen) | None => {
                            let _ = schreiben(&mut sender, Message::Close(None), konfig.pong_timeout).await;
                            break;
                        }
                    }
                }

                // Keepalive
                _ = ping_takt.tick() => {
                    if pong_frist.is_none() {
                        if !schreiben(&mut sender, Message::Ping(Vec::new()), konfig.pong_timeout).await {
                            tracing::warn!(verbindung = %verbindung, "Ping fehlgeschlagen");
                            break;
                        }
                        pong_frist = Some(Instant::now() + konfig.pong_timeout);
                    }
                }

                _ = frist_abgelaufen => {
                    tracing::warn!(verbindung = %verbindung, "Verbindungs-Timeout, kein Pong");
                    break;
                }
            }
        }

        // Cleanup beim Verbindungsende
        self.state.presence.trennen(verbindung);
        tracing::info!(verbindung = %verbindung, "Verbindungs-Task beendet");
    }
}

/// Schreibt eine Nachricht mit Frist. `false` bei Fehler oder Zeitueberschreitung.
async fn schreiben<S>(sender: &mut S, nachricht: Message, frist: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(
        tokio::time::timeout(frist, sender.send(nachricht)).await,
        Ok(Ok(()))
    )
}
