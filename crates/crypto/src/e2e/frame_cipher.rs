//! Frame-Verschluesselung fuer Encoded Transforms
//!
//! Jeder Track besitzt eine eigene `FrameCipher`-Instanz in einer von zwei
//! Rollen:
//! - `Sender`: verschluesselt ausgehende Frames mit dem aktuell installierten
//!   Session-Key (ein einziger Key, wird bei Rotation atomar getauscht)
//! - `Receiver`: entschluesselt eingehende Frames mit dem Key aus dem
//!   `KeyRing`, den die Metadaten des Frames benennen
//!
//! Beide Rollen teilen sich Key-Ableitung und Nonce-Aufbau:
//! pro Frame wird via HKDF-SHA256 ein eigener AES-256-GCM-Key aus dem
//! Session-Key abgeleitet (Info = Medienart, Key-ID, Sequenz).
//!
//! Fehler pro Frame werden nie an die Pipeline propagiert. Je nach
//! `FailurePolicy` wird der Frame unveraendert weitergereicht oder verworfen.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::FailurePolicy;
use crate::e2e::key_exchange::derive_key;
use crate::e2e::key_ring::KeyRing;
use crate::e2e::wire::{encode_wire, parse_wire, FrameMetadata};
use crate::error::FrameError;
use crate::types::{EncodedFrame, KeyId, KeyMaterial, MediaKind, SessionKey};

// ---------------------------------------------------------------------------
// Sender-Key-Slot
// ---------------------------------------------------------------------------

/// Aktiver Sende-Key, geteilt zwischen Rotation und Sender-Ciphers
///
/// Der Key selbst ist unveraenderlich; getauscht wird nur der `Arc`.
/// Leser halten den Lock nur fuer das Klonen des `Arc`.
#[derive(Clone, Default)]
pub struct SenderKeySlot {
    inner: Arc<RwLock<Option<Arc<SessionKey>>>>,
}

impl SenderKeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ersetzt den aktuellen Key bedingungslos
    pub fn install(&self, key: SessionKey) {
        let key_id = key.key_id();
        *self.inner.write() = Some(Arc::new(key));
        tracing::debug!(key_id, "Sende-Key installiert");
    }

    /// Entfernt den Key (zurueck in den Zustand Idle)
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn current(&self) -> Option<Arc<SessionKey>> {
        self.inner.read().clone()
    }

    pub fn key_id(&self) -> Option<KeyId> {
        self.inner.read().as_ref().map(|k| k.key_id())
    }
}

impl std::fmt::Debug for SenderKeySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderKeySlot")
            .field("key_id", &self.key_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ergebnis
// ---------------------------------------------------------------------------

/// Ergebnis einer Frame-Transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame wurde ver- bzw. entschluesselt
    Transformed(EncodedFrame),
    /// Frame unveraendert (kein Key installiert oder Fehler bei `PassThrough`)
    PassedThrough(EncodedFrame),
    /// Frame verworfen (Fehler bei `Drop`)
    Dropped,
}

impl FrameOutcome {
    pub fn into_frame(self) -> Option<EncodedFrame> {
        match self {
            FrameOutcome::Transformed(frame) | FrameOutcome::PassedThrough(frame) => Some(frame),
            FrameOutcome::Dropped => None,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameCipher
// ---------------------------------------------------------------------------

/// Rolle einer Cipher-Instanz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherRole {
    Sender,
    Receiver,
}

/// Zustandsbehaftete Transformation eines Tracks
#[derive(Debug)]
pub enum FrameCipher {
    Sender(SenderCipher),
    Receiver(ReceiverCipher),
}

impl FrameCipher {
    pub fn sender(slot: SenderKeySlot, policy: FailurePolicy) -> Self {
        FrameCipher::Sender(SenderCipher::new(slot, policy))
    }

    pub fn receiver(ring: KeyRing, policy: FailurePolicy) -> Self {
        FrameCipher::Receiver(ReceiverCipher::new(ring, policy))
    }

    pub fn role(&self) -> CipherRole {
        match self {
            FrameCipher::Sender(_) => CipherRole::Sender,
            FrameCipher::Receiver(_) => CipherRole::Receiver,
        }
    }

    /// `false` solange kein Key installiert ist (Zustand Idle)
    pub fn is_active(&self) -> bool {
        match self {
            FrameCipher::Sender(s) => s.slot.current().is_some(),
            FrameCipher::Receiver(r) => !r.ring.is_empty(),
        }
    }

    /// Installiert einen Session-Key
    ///
    /// Sender: ersetzt den einzigen Key. Receiver: fuegt in den Ring ein.
    pub fn set_session_key(&mut self, key: KeyMaterial, key_id: KeyId) {
        let key = SessionKey::new(key, key_id);
        match self {
            FrameCipher::Sender(s) => s.slot.install(key),
            FrameCipher::Receiver(r) => {
                r.ring.insert(key);
            }
        }
    }

    /// Wendet die rollenabhaengige Transformation an
    pub fn process(&mut self, frame: EncodedFrame) -> FrameOutcome {
        match self {
            FrameCipher::Sender(s) => s.encrypt_frame(frame),
            FrameCipher::Receiver(r) => r.decrypt_frame(frame),
        }
    }
}

/// Sender-Rolle: verschluesselt mit dem Key aus dem `SenderKeySlot`
#[derive(Debug)]
pub struct SenderCipher {
    slot: SenderKeySlot,
    policy: FailurePolicy,
    /// `None` sobald der 32-Bit-Raum verbraucht ist
    next_sequence: Option<u32>,
}

impl SenderCipher {
    pub fn new(slot: SenderKeySlot, policy: FailurePolicy) -> Self {
        Self {
            slot,
            policy,
            next_sequence: Some(0),
        }
    }

    /// Naechste zu vergebende Sequenz-Nummer
    pub fn next_sequence(&self) -> Option<u32> {
        self.next_sequence
    }

    /// Verschluesselt einen Frame
    ///
    /// Ohne installierten Key wird der Frame absichtlich unveraendert
    /// durchgereicht; das ist kein Fehler.
    pub fn encrypt_frame(&mut self, mut frame: EncodedFrame) -> FrameOutcome {
        let Some(key) = self.slot.current() else {
            tracing::trace!(track = %frame.kind, "Kein Sende-Key, Frame unverschluesselt");
            return FrameOutcome::PassedThrough(frame);
        };

        match self.try_encrypt(&key, &frame) {
            Ok(data) => {
                frame.data = data;
                FrameOutcome::Transformed(frame)
            }
            Err(e) => {
                log_frame_error(CipherRole::Sender, frame.kind, &e);
                apply_policy(self.policy, frame)
            }
        }
    }

    fn try_encrypt(&mut self, key: &SessionKey, frame: &EncodedFrame) -> Result<Vec<u8>, FrameError> {
        let sequence_number = self.next_sequence.ok_or(FrameError::SequenceExhausted)?;
        // Sequenz wird vor dem Krypto-Aufruf verbraucht: nie zweimal dieselbe Nonce
        self.next_sequence = sequence_number.checked_add(1);

        let metadata = FrameMetadata {
            kind: frame.kind,
            sequence_number,
            timestamp: frame.timestamp,
            key_id: key.key_id(),
            key_frame: frame.kind == MediaKind::Video && frame.key_frame,
        };
        let aad = metadata.encode();
        let ciphertext = seal(key.material(), &metadata, &aad, &frame.data)?;

        tracing::trace!(
            track = %frame.kind,
            seq = sequence_number,
            key_id = metadata.key_id,
            "Frame verschluesselt"
        );
        Ok(encode_wire(&aad, &ciphertext))
    }

    #[cfg(test)]
    pub(crate) fn set_next_sequence(&mut self, next: Option<u32>) {
        self.next_sequence = next;
    }
}

/// Receiver-Rolle: entschluesselt mit Keys aus dem geteilten `KeyRing`
#[derive(Debug)]
pub struct ReceiverCipher {
    ring: KeyRing,
    policy: FailurePolicy,
}

impl ReceiverCipher {
    pub fn new(ring: KeyRing, policy: FailurePolicy) -> Self {
        Self { ring, policy }
    }

    pub fn ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Entschluesselt einen Frame
    ///
    /// Unbekannte Key-IDs sind bei Rotationen erwartbar und fuehren nie zu
    /// einem Abbruch der Pipeline.
    pub fn decrypt_frame(&self, mut frame: EncodedFrame) -> FrameOutcome {
        match self.try_decrypt(frame.kind, &frame.data) {
            Ok(plaintext) => {
                frame.data = plaintext;
                FrameOutcome::Transformed(frame)
            }
            Err(e) => {
                log_frame_error(CipherRole::Receiver, frame.kind, &e);
                apply_policy(self.policy, frame)
            }
        }
    }

    fn try_decrypt(&self, track: MediaKind, data: &[u8]) -> Result<Vec<u8>, FrameError> {
        let wire = parse_wire(data)?;
        if wire.metadata.kind != track {
            return Err(FrameError::MalformedFrame(format!(
                "{}-Frame auf {}-Track",
                wire.metadata.kind, track
            )));
        }
        let key_id = wire.metadata.key_id;
        let key = self
            .ring
            .get(key_id)
            .ok_or(FrameError::UnknownKeyId(key_id))?;

        let plaintext = open(key.material(), &wire.metadata, wire.metadata_bytes, wire.ciphertext)?;

        tracing::trace!(
            track = %wire.metadata.kind,
            seq = wire.metadata.sequence_number,
            key_id,
            "Frame entschluesselt"
        );
        Ok(plaintext)
    }
}

// ---------------------------------------------------------------------------
// Gemeinsamer Kern: Key-Ableitung + AEAD
// ---------------------------------------------------------------------------

fn frame_cipher(session_key: &KeyMaterial, metadata: &FrameMetadata) -> Result<Aes256Gcm, FrameError> {
    let frame_key = derive_key(session_key.as_bytes(), &metadata.frame_key_info())
        .map_err(|e| FrameError::ProviderError(e.to_string()))?;
    Aes256Gcm::new_from_slice(frame_key.as_bytes())
        .map_err(|e| FrameError::ProviderError(e.to_string()))
}

fn seal(
    session_key: &KeyMaterial,
    metadata: &FrameMetadata,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let cipher = frame_cipher(session_key, metadata)?;
    let nonce = metadata.nonce();

    cipher
        .encrypt(AesNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| FrameError::ProviderError(e.to_string()))
}

fn open(
    session_key: &KeyMaterial,
    metadata: &FrameMetadata,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let cipher = frame_cipher(session_key, metadata)?;
    let nonce = metadata.nonce();

    cipher
        .decrypt(AesNonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| FrameError::TagMismatch)
}

fn apply_policy(policy: FailurePolicy, frame: EncodedFrame) -> FrameOutcome {
    match policy {
        FailurePolicy::PassThrough => FrameOutcome::PassedThrough(frame),
        FailurePolicy::Drop => FrameOutcome::Dropped,
    }
}

fn log_frame_error(role: CipherRole, kind: MediaKind, error: &FrameError) {
    match error {
        FrameError::UnknownKeyId(_) | FrameError::MalformedFrame(_) => {
            tracing::debug!(rolle = ?role, track = %kind, fehler = %error, "Frame nicht transformiert");
        }
        _ => {
            tracing::warn!(rolle = ?role, track = %kind, fehler = %error, "Frame nicht transformiert");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
