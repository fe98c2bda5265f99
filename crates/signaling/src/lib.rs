//! callveil-signaling – Nachrichten und Relay fuer den Verbindungsaufbau
//!
//! Transportiert alles, was zwei Teilnehmer vor und waehrend eines Anrufs
//! austauschen muessen, ohne es selbst zu interpretieren.
//!
//! ## Architektur
//!
//! ```text
//! Teilnehmer A                SignalingRelay                Teilnehmer B
//!   SignalingEnvelope{to} ---> DashMap<UserId, Queue> ---> RelayedMessage{from}
//!
//! KeyRotationCoordinator --RelayAnnouncer--> key-rotation --> on_peer_rotation
//! ```

pub mod announcer;
pub mod error;
pub mod messages;
pub mod relay;

// Bequeme Re-Exporte
pub use announcer::{rotation_uebernehmen, RelayAnnouncer};
pub use error::{SignalingError, SignalingResult};
pub use messages::{
    BundleMessage, IceCandidate, RelayedMessage, RotationMessage, SessionDescription,
    SignalingEnvelope, SignalingPayload,
};
pub use relay::SignalingRelay;
