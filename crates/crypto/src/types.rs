//! Gemeinsame Typen fuer den E2EE-Kern

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Laenge eines Session-Keys in Bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Laenge eines X25519-Public-Keys in Bytes
pub const PUBLIC_KEY_LEN: usize = 32;

/// Rotations-Epoche eines Session-Keys
pub type KeyId = u32;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial([REDACTED] {} bytes)", KEY_LEN)
    }
}

impl KeyMaterial {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Uebernimmt ein Slice; `None` bei falscher Laenge
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Session-Key einer Rotations-Epoche
///
/// Unveraenderlich nach dem Erstellen. Eine Rotation erzeugt immer einen
/// neuen Wert, der bestehende wird nie in-place veraendert.
#[derive(Debug, Clone)]
pub struct SessionKey {
    material: KeyMaterial,
    key_id: KeyId,
    created_at: DateTime<Utc>,
}

impl SessionKey {
    pub fn new(material: KeyMaterial, key_id: KeyId) -> Self {
        Self {
            material,
            key_id,
            created_at: Utc::now(),
        }
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Oeffentlicher X25519-Identitaetsschluessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl IdentityPublicKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Bundle nur mit Identitaetsschluessel (Pre-Key und Signatur leer)
    pub fn to_bundle(&self) -> RemoteBundle {
        RemoteBundle {
            identity: self.0.to_vec(),
            signed_pre_key: Vec::new(),
            signature: Vec::new(),
        }
    }
}

/// Schluessel-Bundle der Gegenstelle
///
/// `signed_pre_key` und `signature` werden transportiert, aber nicht
/// kryptografisch geprueft. Einzige Absicherung ist der SAS-Vergleich.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBundle {
    /// Roher X25519-Public-Key (32 Bytes erwartet)
    pub identity: Vec<u8>,
    pub signed_pre_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Medienart eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ein bereits kodierter Medien-Frame aus der Codec-Pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub kind: MediaKind,
    /// Medien-Zeitstempel des Frames
    pub timestamp: u64,
    /// Nur fuer Video relevant
    pub key_frame: bool,
    pub data: Vec<u8>,
}

impl EncodedFrame {
    pub fn audio(timestamp: u64, data: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Audio,
            timestamp,
            key_frame: false,
            data,
        }
    }

    pub fn video(timestamp: u64, key_frame: bool, data: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Video,
            timestamp,
            key_frame,
            data,
        }
    }
}
