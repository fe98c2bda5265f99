//! Wire-Format verschluesselter Frames
//!
//! ## Layout
//! ```text
//! [metadata_len(4, BE)] [metadata(metadata_len)] [ciphertext + auth_tag(16)]
//! ```
//!
//! ## Metadaten (kanonisch, 18 Bytes, Big-Endian)
//! ```text
//! [kind(1)] [flags(1)] [sequence(4)] [timestamp(8)] [key_id(4)]
//! ```
//! `kind`: 0 = Audio, 1 = Video. `flags`: Bit 0 = Keyframe (nur Video).
//! Die Metadaten-Bytes sind gleichzeitig die AAD der AEAD-Verschluesselung.
//!
//! ## Nonce (12 Bytes)
//! ```text
//! [sequence(4)] [timestamp mod 2^32 (4)] [key_id(4)]
//! ```

use crate::error::FrameError;
use crate::types::{KeyId, MediaKind};

/// Laenge des Laengen-Praefixes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Laenge der kanonisch kodierten Metadaten
pub const METADATA_LEN: usize = 18;

/// AES-GCM Nonce-Laenge
pub const NONCE_LEN: usize = 12;

/// AES-GCM Auth-Tag-Laenge
pub const TAG_LEN: usize = 16;

const KIND_AUDIO: u8 = 0;
const KIND_VIDEO: u8 = 1;
const FLAG_KEY_FRAME: u8 = 0b0000_0001;

/// Metadaten eines verschluesselten Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub kind: MediaKind,
    pub sequence_number: u32,
    pub timestamp: u64,
    pub key_id: KeyId,
    pub key_frame: bool,
}

impl FrameMetadata {
    /// Kanonische Kodierung (feste Feldreihenfolge und -breiten)
    pub fn encode(&self) -> [u8; METADATA_LEN] {
        let mut out = [0u8; METADATA_LEN];
        out[0] = match self.kind {
            MediaKind::Audio => KIND_AUDIO,
            MediaKind::Video => KIND_VIDEO,
        };
        out[1] = if self.key_frame { FLAG_KEY_FRAME } else { 0 };
        out[2..6].copy_from_slice(&self.sequence_number.to_be_bytes());
        out[6..14].copy_from_slice(&self.timestamp.to_be_bytes());
        out[14..18].copy_from_slice(&self.key_id.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let bytes: &[u8; METADATA_LEN] = bytes.try_into().map_err(|_| {
            FrameError::MalformedFrame(format!(
                "Metadaten haben {} statt {} Bytes",
                bytes.len(),
                METADATA_LEN
            ))
        })?;

        let kind = match bytes[0] {
            KIND_AUDIO => MediaKind::Audio,
            KIND_VIDEO => MediaKind::Video,
            other => {
                return Err(FrameError::MalformedFrame(format!(
                    "Unbekannte Medienart {other}"
                )))
            }
        };

        let flags = bytes[1];
        if flags & !FLAG_KEY_FRAME != 0 {
            return Err(FrameError::MalformedFrame(format!(
                "Unbekannte Flags {flags:#04x}"
            )));
        }
        let key_frame = flags & FLAG_KEY_FRAME != 0;
        if key_frame && kind == MediaKind::Audio {
            return Err(FrameError::MalformedFrame(
                "Keyframe-Flag bei Audio".to_string(),
            ));
        }

        let mut seq = [0u8; 4];
        seq.copy_from_slice(&bytes[2..6]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[6..14]);
        let mut key_id = [0u8; 4];
        key_id.copy_from_slice(&bytes[14..18]);

        Ok(Self {
            kind,
            sequence_number: u32::from_be_bytes(seq),
            timestamp: u64::from_be_bytes(ts),
            key_id: KeyId::from_be_bytes(key_id),
            key_frame,
        })
    }

    /// 12-Byte-Nonce aus (sequence, timestamp mod 2^32, key_id)
    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[0..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        nonce[4..8].copy_from_slice(&(self.timestamp as u32).to_be_bytes());
        nonce[8..12].copy_from_slice(&self.key_id.to_be_bytes());
        nonce
    }

    /// HKDF-Info fuer den Frame-Key: Medienart, Key-ID und Sequenz
    pub fn frame_key_info(&self) -> Vec<u8> {
        format!(
            "callveil-frame-{}-{}-{}",
            self.kind, self.key_id, self.sequence_number
        )
        .into_bytes()
    }
}

/// Zerlegter verschluesselter Frame (leiht sich die Bytes des Eingangs)
#[derive(Debug)]
pub struct WireFrame<'a> {
    pub metadata: FrameMetadata,
    /// Rohe Metadaten-Bytes (AAD)
    pub metadata_bytes: &'a [u8],
    /// Ciphertext inkl. Auth-Tag
    pub ciphertext: &'a [u8],
}

/// Serialisiert zu `[len(4)] [metadata] [ciphertext]`
pub fn encode_wire(metadata_bytes: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let len = metadata_bytes.len() as u32;
    let mut out =
        Vec::with_capacity(LENGTH_PREFIX_LEN + metadata_bytes.len() + ciphertext.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(metadata_bytes);
    out.extend_from_slice(ciphertext);
    out
}

/// Parst einen empfangenen Frame
pub fn parse_wire(data: &[u8]) -> Result<WireFrame<'_>, FrameError> {
    if data.len() < LENGTH_PREFIX_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "Frame zu kurz ({} Bytes)",
            data.len()
        )));
    }

    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&data[..LENGTH_PREFIX_LEN]);
    let metadata_len = u32::from_be_bytes(prefix) as usize;

    let rest = &data[LENGTH_PREFIX_LEN..];
    if metadata_len > rest.len() {
        return Err(FrameError::MalformedFrame(format!(
            "Metadaten-Laenge {metadata_len} ueberschreitet Frame ({} Bytes)",
            rest.len()
        )));
    }

    let (metadata_bytes, ciphertext) = rest.split_at(metadata_len);
    let metadata = FrameMetadata::decode(metadata_bytes)?;

    if ciphertext.len() < TAG_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "Ciphertext kuerzer als Auth-Tag ({} Bytes)",
            ciphertext.len()
        )));
    }

    Ok(WireFrame {
        metadata,
        metadata_bytes,
        ciphertext,
    })
}
