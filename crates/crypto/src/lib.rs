//! # callveil-crypto
//!
//! Ende-zu-Ende Verschluesselung fuer Echtzeit-Audio und -Video.
//!
//! ## Module
//! - `e2e` - Schluesselaustausch, Rotation, Frame-Verschluesselung, Pipelines
//! - `config` - Laufzeit-Konfiguration (Rotationsintervall, Fehlerpolitik)
//! - `shutdown` - Abbruch-Signal fuer Tasks eines Anrufs
//! - `types` - Gemeinsame Typen (KeyMaterial, SessionKey, EncodedFrame, etc.)
//! - `error` - Fehlertypen

pub mod config;
pub mod e2e;
pub mod error;
pub mod shutdown;
pub mod types;

// Bequeme Re-Exports
pub use config::{E2eeConfig, FailurePolicy};
pub use error::{
    ConfigurationError, CryptoError, CryptoResult, DecryptionFailure, EncryptionFailure,
    FrameError, KeyExchangeError,
};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use types::{
    EncodedFrame, IdentityPublicKey, KeyId, KeyMaterial, MediaKind, RemoteBundle, SessionKey,
};

pub use e2e::{
    generate_sas, FrameCipher, FrameOutcome, KeyAnnouncer, KeyExchangeManager, KeyRing,
    KeyRotationCoordinator, PipelineStats, RotationAnnouncement, SenderKeySlot, TrackPipeline,
};
