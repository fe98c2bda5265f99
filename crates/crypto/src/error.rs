//! Fehlertypen fuer den E2EE-Kern
//!
//! Drei Klassen mit unterschiedlicher Propagation:
//! - `KeyExchangeError`: fatal fuer den Verbindungsaufbau, geht an den Aufrufer
//! - `FrameError`: wird pro Frame lokal abgefangen und nur geloggt
//! - `ConfigurationError`: fatal beim Start

use thiserror::Error;

use crate::types::KeyId;

/// Fehler beim Schluesselaustausch
#[derive(Debug, Error)]
pub enum KeyExchangeError {
    #[error("Keine lokale Identitaet vorhanden (generate_identity fehlt)")]
    NoLocalIdentity,

    #[error("Ungueltiges Schluessel-Bundle: {0}")]
    MalformedBundle(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),
}

/// Fehler bei der Ver- oder Entschluesselung eines einzelnen Frames
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Krypto-Provider-Fehler: {0}")]
    ProviderError(String),

    #[error("Unbekannte Key-ID {0}")]
    UnknownKeyId(KeyId),

    #[error("Ungueltiger Frame: {0}")]
    MalformedFrame(String),

    #[error("Auth-Tag stimmt nicht ueberein")]
    TagMismatch,

    #[error("Sequenz-Nummern erschoepft")]
    SequenceExhausted,
}

/// Fehler beim Verschluesseln (Sender-Seite)
pub type EncryptionFailure = FrameError;

/// Fehler beim Entschluesseln (Empfaenger-Seite)
pub type DecryptionFailure = FrameError;

/// Ungueltige Konfiguration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Ungueltiges Rotations-Intervall: {0} ms")]
    InvalidRotationInterval(u64),

    #[error("Ungueltiges Sink-Timeout: {0} ms")]
    InvalidSinkTimeout(u64),
}

/// Sammel-Fehler des Krypto-Crates
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    KeyExchange(#[from] KeyExchangeError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Konfiguration(#[from] ConfigurationError),

    #[error("Rotation nicht aktiv (kein initialer Session-Key)")]
    NotActive,

    #[error("Rotation bereits aktiv")]
    AlreadyActive,

    #[error("Key-ID-Raum erschoepft")]
    KeyIdExhausted,

    #[error("Ankuendigung an Gegenstelle fehlgeschlagen: {0}")]
    Announcement(String),

    #[error("Rotation durch Reset ueberholt")]
    RotationSuperseded,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
