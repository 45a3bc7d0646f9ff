//! REST-Handler Module

pub mod konto;
pub mod session;
pub mod stats;
