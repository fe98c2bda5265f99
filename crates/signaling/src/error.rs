//! Fehlertypen fuer das Signaling

use callveil_core::{CallId, UserId};
use thiserror::Error;

/// Fehlertyp fuer Relay und Nachrichten-Konvertierung
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Empfaenger ist nicht am Relay registriert
    #[error("Unbekannter Empfaenger: {0}")]
    UnknownRecipient(UserId),

    /// Queue des Empfaengers ist voll
    #[error("Queue von {0} ist voll")]
    QueueFull(UserId),

    /// Empfaenger hat seine Queue geschlossen (getrennt)
    #[error("Queue von {0} ist geschlossen")]
    QueueClosed(UserId),

    /// Nachricht stammt nicht von der erwarteten Gegenstelle
    #[error("Unerwarteter Absender: {0}")]
    UnexpectedSender(UserId),

    /// Nachricht gehoert zu einem anderen Anruf
    #[error("Nachricht fuer fremden Anruf: {0}")]
    CallMismatch(CallId),

    /// Inhalt einer Nachricht ist ungueltig (Base64, Laengen)
    #[error("Ungueltiger Nachrichteninhalt: {0}")]
    Payload(String),

    /// JSON-Fehler
    #[error("Serialisierungsfehler: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SignalingError {
    /// Erstellt einen Inhaltsfehler
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }
}

/// Result-Typ fuer das Signaling
pub type SignalingResult<T> = Result<T, SignalingError>;
