//! fernruf-signaling – Presence und Anruf-Signalisierung
//!
//! Dieser Crate haelt die Live-Verbindungen der Clients, bindet sie an
//! Identitaeten, verwaltet gegenseitige Kontakte und leitet die
//! Verhandlungsnachrichten (Offer, Answer, ICE, Hang-up) zwischen zwei
//! verbundenen Peers weiter. Audio fliesst nie ueber den Server.
//!
//! ## Architektur
//!
//! ```text
//! GET /ws (axum WebSocket)
//!     |
//!     v
//! WsVerbindung (pro Verbindung ein Task)
//!     |
//!     v
//! SignalingRouter
//!     +-- auth-connect  -> AuthService + PresenceDirectory
//!     +-- add-contact   -> ContactGraph
//!     +-- call-request  -> PresenceDirectory
//!     +-- offer/answer/ice-candidate/hang-up/call-response -> Relay
//!
//! PresenceDirectory --PresenceEvent--> ContactGraph (Fan-out-Task)
//! ```

pub mod connection;
pub mod contacts;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod presence;
pub mod server_state;

// Bequeme Re-Exporte
pub use connection::{ws_router, WsKonfig, WsVerbindung};
pub use contacts::ContactGraph;
pub use dispatcher::{Folge, SignalingRouter, VerbindungsKontext};
pub use error::{SignalingError, SignalingResult};
pub use message::{ClientNachricht, KontaktAnsicht, ServerNachricht, SignalArt};
pub use presence::{Ausgehend, PresenceDirectory, PresenceEvent, VerbindungsHandle};
pub use server_state::SignalingState;
