//! Rotations-Ankuendigungen ueber das Signaling-Relay
//!
//! Verbindet den `KeyRotationCoordinator` mit dem Relay: ausgehende
//! Ankuendigungen werden als `key-rotation` an die Gegenstelle geschickt,
//! eingehende Nachrichten in den Koordinator eingespeist.

use callveil_core::{CallId, UserId};
use callveil_crypto::{
    CryptoError, CryptoResult, KeyAnnouncer, KeyId, KeyRotationCoordinator, RotationAnnouncement,
};

use crate::error::{SignalingError, SignalingResult};
use crate::messages::{RelayedMessage, RotationMessage, SignalingEnvelope, SignalingPayload};
use crate::relay::SignalingRelay;

/// `KeyAnnouncer` fuer genau eine Gegenstelle eines Anrufs
#[derive(Debug, Clone)]
pub struct RelayAnnouncer {
    relay: SignalingRelay,
    call_id: CallId,
    from: UserId,
    to: UserId,
}

impl RelayAnnouncer {
    pub fn new(relay: SignalingRelay, call_id: CallId, from: UserId, to: UserId) -> Self {
        Self {
            relay,
            call_id,
            from,
            to,
        }
    }
}

impl KeyAnnouncer for RelayAnnouncer {
    fn announce(&self, announcement: &RotationAnnouncement) -> CryptoResult<()> {
        let envelope = SignalingEnvelope::new(
            self.to,
            self.call_id,
            SignalingPayload::KeyRotation(RotationMessage::from_announcement(announcement)),
        );
        self.relay
            .weiterleiten(self.from, envelope)
            .map_err(|e| CryptoError::Announcement(e.to_string()))
    }
}

/// Speist eine empfangene `key-rotation`-Nachricht in den Koordinator ein
///
/// Nur Ankuendigungen von `gegenstelle` im Anruf `call_id` landen im Ring;
/// das Relay setzt `from`, der Absender kann ihn nicht waehlen.
/// Gibt `Ok(None)` fuer andere Nachrichtenarten zurueck, sonst die neue
/// Key-ID.
pub fn rotation_uebernehmen(
    coordinator: &KeyRotationCoordinator,
    gegenstelle: UserId,
    call_id: CallId,
    nachricht: &RelayedMessage,
) -> SignalingResult<Option<KeyId>> {
    let SignalingPayload::KeyRotation(rotation) = &nachricht.payload else {
        return Ok(None);
    };
    if nachricht.from != gegenstelle {
        return Err(SignalingError::UnexpectedSender(nachricht.from));
    }
    if nachricht.call_id != call_id {
        return Err(SignalingError::CallMismatch(nachricht.call_id));
    }
    let announcement = rotation.to_announcement()?;
    let key_id = announcement.key_id;
    coordinator.on_peer_rotation(announcement);
    Ok(Some(key_id))
}
