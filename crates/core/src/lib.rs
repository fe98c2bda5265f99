//! callveil-core – Gemeinsame Typen
//!
//! Identifikationstypen, die von Signaling, Krypto-Kern und Node gemeinsam
//! genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{CallId, UserId};
