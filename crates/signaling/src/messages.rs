//! Signaling-Nachrichten
//!
//! JSON-Serialisierung via serde. Binaere Inhalte (Schluessel, Bundles)
//! werden als Base64 (Standard-Alphabet mit Padding) uebertragen.
//!
//! ```json
//! {"to":"...","call_id":"...","payload":{"type":"key-rotation","key_id":1,"key":"..."}}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use callveil_core::{CallId, UserId};
use callveil_crypto::types::KEY_LEN;
use callveil_crypto::{KeyId, KeyMaterial, RemoteBundle, RotationAnnouncement};

use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Alle Signaling-Inhalte (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    KeyBundle(BundleMessage),
    KeyRotation(RotationMessage),
}

impl SignalingPayload {
    /// Kurzname fuer Logs
    pub fn art(&self) -> &'static str {
        match self {
            SignalingPayload::Offer(_) => "offer",
            SignalingPayload::Answer(_) => "answer",
            SignalingPayload::IceCandidate(_) => "ice-candidate",
            SignalingPayload::KeyBundle(_) => "key-bundle",
            SignalingPayload::KeyRotation(_) => "key-rotation",
        }
    }
}

/// SDP fuer Offer und Answer (wird nicht interpretiert)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Schluessel-Bundle eines Teilnehmers (Base64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMessage {
    pub identity: String,
    #[serde(default)]
    pub signed_pre_key: String,
    #[serde(default)]
    pub signature: String,
}

impl BundleMessage {
    pub fn from_bundle(bundle: &RemoteBundle) -> Self {
        Self {
            identity: STANDARD.encode(&bundle.identity),
            signed_pre_key: STANDARD.encode(&bundle.signed_pre_key),
            signature: STANDARD.encode(&bundle.signature),
        }
    }

    /// Dekodiert das Bundle; die Laenge der Identitaet prueft erst der
    /// Schluesselaustausch
    pub fn to_bundle(&self) -> SignalingResult<RemoteBundle> {
        Ok(RemoteBundle {
            identity: decode_field("identity", &self.identity)?,
            signed_pre_key: decode_field("signed_pre_key", &self.signed_pre_key)?,
            signature: decode_field("signature", &self.signature)?,
        })
    }
}

/// Ankuendigung eines rotierten Session-Keys
///
/// Der Key wird im Klartext (Base64) uebertragen; der Signaling-Kanal muss
/// vertraulich und authentifiziert sein.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationMessage {
    pub key_id: KeyId,
    pub key: String,
}

impl std::fmt::Debug for RotationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationMessage")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl RotationMessage {
    pub fn from_announcement(announcement: &RotationAnnouncement) -> Self {
        Self {
            key_id: announcement.key_id,
            key: STANDARD.encode(announcement.key.as_bytes()),
        }
    }

    pub fn to_announcement(&self) -> SignalingResult<RotationAnnouncement> {
        let bytes = decode_field("key", &self.key)?;
        let key = KeyMaterial::from_slice(&bytes).ok_or_else(|| {
            SignalingError::payload(format!(
                "Rotations-Key hat {} statt {KEY_LEN} Bytes",
                bytes.len()
            ))
        })?;
        Ok(RotationAnnouncement {
            key_id: self.key_id,
            key,
        })
    }
}

fn decode_field(feld: &str, wert: &str) -> SignalingResult<Vec<u8>> {
    STANDARD
        .decode(wert)
        .map_err(|e| SignalingError::payload(format!("Feld '{feld}' ist kein Base64: {e}")))
}

// ---------------------------------------------------------------------------
// Umschlaege
// ---------------------------------------------------------------------------

/// Vom Absender an das Relay uebergebene Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    pub to: UserId,
    pub call_id: CallId,
    pub payload: SignalingPayload,
}

impl SignalingEnvelope {
    pub fn new(to: UserId, call_id: CallId, payload: SignalingPayload) -> Self {
        Self {
            to,
            call_id,
            payload,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Vom Relay zugestellte Nachricht (Absender wird vom Relay gesetzt)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub from: UserId,
    pub call_id: CallId,
    pub payload: SignalingPayload,
}

impl RelayedMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tags_sind_kebab_case() {
        let payload = SignalingPayload::IceCandidate(IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(payload.art(), "ice-candidate");

        let bundle = SignalingPayload::KeyBundle(BundleMessage::from_bundle(&RemoteBundle {
            identity: vec![1; 32],
            signed_pre_key: vec![],
            signature: vec![],
        }));
        assert_eq!(serde_json::to_value(&bundle).unwrap()["type"], "key-bundle");
    }

    #[test]
    fn bundle_ueberlebt_base64() {
        let bundle = RemoteBundle {
            identity: (0..32).collect(),
            signed_pre_key: vec![9, 9],
            signature: vec![0xFF],
        };
        let msg = BundleMessage::from_bundle(&bundle);
        assert_eq!(msg.signature, "/w==");
        assert_eq!(msg.to_bundle().unwrap(), bundle);
    }

    #[test]
    fn bundle_ohne_optionale_felder() {
        let json = r#"{"type":"key-bundle","identity":"AAAA"}"#;
        let payload: SignalingPayload = serde_json::from_str(json).unwrap();
        let SignalingPayload::KeyBundle(msg) = payload else {
            panic!("falscher Typ");
        };
        let bundle = msg.to_bundle().unwrap();
        assert_eq!(bundle.identity, vec![0, 0, 0]);
        assert!(bundle.signature.is_empty());
    }

    #[test]
    fn ungueltiges_base64_ist_payload_fehler() {
        let msg = BundleMessage {
            identity: "kein base64!".into(),
            signed_pre_key: String::new(),
            signature: String::new(),
        };
        assert!(matches!(msg.to_bundle(), Err(SignalingError::Payload(_))));
    }

    #[test]
    fn rotation_mit_falscher_key_laenge() {
        let msg = RotationMessage {
            key_id: 4,
            key: STANDARD.encode([1u8; 16]),
        };
        assert!(matches!(msg.to_announcement(), Err(SignalingError::Payload(_))));
    }

    #[test]
    fn rotation_nachricht_hin_und_zurueck() {
        let announcement = RotationAnnouncement {
            key_id: 7,
            key: KeyMaterial::new([0xAB; 32]),
        };
        let msg = RotationMessage::from_announcement(&announcement);
        assert!(!format!("{msg:?}").contains(&msg.key));

        let back = msg.to_announcement().unwrap();
        assert_eq!(back.key_id, 7);
        assert_eq!(back.key.as_bytes(), &[0xAB; 32]);
    }

    #[test]
    fn umschlag_json() {
        let envelope = SignalingEnvelope::new(
            UserId::new(),
            CallId::new(),
            SignalingPayload::Offer(SessionDescription { sdp: "v=0".into() }),
        );
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""type":"offer""#));
        assert_eq!(SignalingEnvelope::from_json(&json).unwrap(), envelope);
    }
}
