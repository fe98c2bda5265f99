//! Short Authentication String (SAS)
//!
//! Kurzer, vorlesbarer Code zum Vergleich ueber einen zweiten Kanal
//! (Telefon, persoenlich). Stimmen die Codes beider Seiten ueberein, wurde
//! kein fremder Schluessel untergeschoben.
//!
//! Format: 6 Gruppen zu je 2 Dezimalziffern, z.B. `07-42-93-10-55-01`

use sha2::{Digest, Sha256};

use crate::types::KeyMaterial;

/// Anzahl der Bytes aus dem Session-Key, die in den SAS eingehen
const SAS_INPUT_LEN: usize = 16;

/// Anzahl der Zifferngruppen
const SAS_GROUPS: usize = 6;

/// Leitet den SAS aus den ersten 16 Bytes des Session-Keys ab
pub fn generate_sas(session_key: &KeyMaterial) -> String {
    let digest = Sha256::digest(&session_key.as_bytes()[..SAS_INPUT_LEN]);

    digest[..SAS_GROUPS]
        .iter()
        .map(|b| format!("{:02}", b % 100))
        .collect::<Vec<_>>()
        .join("-")
}
