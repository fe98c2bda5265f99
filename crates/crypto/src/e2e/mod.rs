//! Ende-zu-Ende Verschluesselung von Media-Frames
//!
//! Der Relay-Server und jede SFU sehen nur verschluesselte Frames; die
//! Schluessel existieren ausschliesslich bei den Teilnehmern.
//!
//! ## Ablauf
//! 1. Jeder Teilnehmer erzeugt eine X25519-Identitaet (`KeyExchangeManager`)
//! 2. Bundles werden ueber Signaling getauscht, beide Seiten leiten Key 0 ab
//! 3. Beide Seiten vergleichen die SAS muendlich
//! 4. `KeyRotationCoordinator` rotiert periodisch und kuendigt neue Keys an
//! 5. Pro Track laeuft eine `TrackPipeline` mit eigener `FrameCipher`

pub mod frame_cipher;
pub mod key_exchange;
pub mod key_ring;
pub mod pipeline;
pub mod rotation;
pub mod sas;
pub mod wire;

pub use frame_cipher::{
    CipherRole, FrameCipher, FrameOutcome, ReceiverCipher, SenderCipher, SenderKeySlot,
};
pub use key_exchange::{derive_key, KeyExchangeManager};
pub use key_ring::{KeyRing, KEY_RING_CAPACITY};
pub use pipeline::{PipelineStats, TrackPipeline};
pub use rotation::{KeyAnnouncer, KeyRotationCoordinator, RotationAnnouncement};
pub use sas::generate_sas;
pub use wire::{encode_wire, parse_wire, FrameMetadata, WireFrame};
