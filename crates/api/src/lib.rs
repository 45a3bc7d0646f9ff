//! fernruf-api – Verwaltungs-API fuer Fernruf
//!
//! Stellt Registrierung, Login, Logout, Session-Pruefung und Statistiken
//! per REST bereit und fasst alle HTTP-Endpunkte (inklusive `/ws`,
//! `/health` und `/metrics`) zu einer Anwendung zusammen.
//!
//! ## Endpunkte
//! - `POST /api/register`
//! - `POST /api/login`
//! - `POST /api/logout`
//! - `POST /api/validate-session`
//! - `GET  /api/stats`

pub mod error;
pub mod rest;

pub use error::{ApiError, ApiResult};
pub use rest::{app_bauen, ApiState, RestServer, RestServerKonfig};
