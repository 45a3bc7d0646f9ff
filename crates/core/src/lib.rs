//! fernruf-core – Gemeinsame Typen fuer alle Fernruf-Crates

pub mod types;

pub use types::{UserId, VerbindungsId};
