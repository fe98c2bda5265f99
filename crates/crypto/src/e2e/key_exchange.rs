//! Vereinfachter X3DH-Schluesselaustausch (X25519)
//!
//! Ablauf:
//! 1. `generate_identity` erzeugt ein lokales Identitaets-Schluessel-Paar
//! 2. Der oeffentliche Schluessel wird ueber Signaling verteilt
//! 3. `perform_exchange` berechnet mit dem Bundle der Gegenstelle das
//!    gemeinsame DH-Geheimnis und leitet via HKDF-SHA256 den Session-Key ab
//!
//! Die Signatur des Pre-Keys wird NICHT geprueft. Der Austausch
//! authentifiziert damit nur "irgendein Schluessel wurde praesentiert";
//! der SAS-Vergleich (`sas`) ist die einzige Absicherung dagegen.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::KeyExchangeError;
use crate::types::{IdentityPublicKey, KeyMaterial, RemoteBundle, KEY_LEN, PUBLIC_KEY_LEN};

/// Domain-Separation fuer die Session-Key-Ableitung
pub const SESSION_KEY_INFO: &[u8] = b"callveil-session-key-v1";

/// Fester Salt (32 Null-Bytes) fuer alle HKDF-Ableitungen
pub const HKDF_SALT: [u8; 32] = [0u8; 32];

/// Lokales Identitaets-Schluessel-Paar (nie persistiert)
struct IdentityKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

/// Verwaltet die lokale Identitaet und berechnet Session-Keys
#[derive(Default)]
pub struct KeyExchangeManager {
    identity: Option<IdentityKeyPair>,
}

impl KeyExchangeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Erzeugt eine neue Identitaet und ersetzt eine eventuell vorhandene
    ///
    /// Alle aus der alten Identitaet abgeleiteten Session-Keys sind danach
    /// ungueltig und duerfen vom Aufrufer nicht weiterverwendet werden.
    pub fn generate_identity(&mut self) -> IdentityPublicKey {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        let replaced = self.identity.is_some();
        self.identity = Some(IdentityKeyPair { secret, public });

        tracing::info!(ersetzt = replaced, "Lokale Identitaet generiert");
        IdentityPublicKey(public.to_bytes())
    }

    /// Oeffentlicher Schluessel der aktuellen Identitaet (falls vorhanden)
    pub fn public_identity(&self) -> Option<IdentityPublicKey> {
        self.identity
            .as_ref()
            .map(|pair| IdentityPublicKey(pair.public.to_bytes()))
    }

    /// Bundle zur Verteilung an die Gegenstelle
    pub fn local_bundle(&self) -> Result<RemoteBundle, KeyExchangeError> {
        self.public_identity()
            .map(|pk| pk.to_bundle())
            .ok_or(KeyExchangeError::NoLocalIdentity)
    }

    /// Berechnet den Session-Key mit dem Bundle der Gegenstelle
    ///
    /// Die Key-ID vergibt der Aufrufer (`KeyRotationCoordinator`).
    pub fn perform_exchange(&self, remote: &RemoteBundle) -> Result<KeyMaterial, KeyExchangeError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or(KeyExchangeError::NoLocalIdentity)?;

        let remote_bytes: [u8; PUBLIC_KEY_LEN] =
            remote.identity.as_slice().try_into().map_err(|_| {
                KeyExchangeError::MalformedBundle(format!(
                    "Identitaetsschluessel hat {} statt {} Bytes",
                    remote.identity.len(),
                    PUBLIC_KEY_LEN
                ))
            })?;
        let remote_pk = X25519PublicKey::from(remote_bytes);

        let shared = identity.secret.diffie_hellman(&remote_pk);
        if !shared.was_contributory() {
            return Err(KeyExchangeError::MalformedBundle(
                "Public Key niedriger Ordnung".to_string(),
            ));
        }

        let session_key = derive_key(shared.as_bytes(), SESSION_KEY_INFO)
            .map_err(|e| KeyExchangeError::KeyDerivation(e.to_string()))?;

        tracing::debug!("Session-Key aus DH-Geheimnis abgeleitet");
        Ok(session_key)
    }
}

impl std::fmt::Debug for KeyExchangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchangeManager")
            .field("identity", &self.public_identity())
            .finish()
    }
}

/// HKDF-SHA256 mit festem Null-Salt auf 32 Bytes Schluesselmaterial
pub fn derive_key(ikm: &[u8], info: &[u8]) -> Result<KeyMaterial, hkdf::InvalidLength> {
    let hk = Hkdf::<Sha256>::new(Some(&HKDF_SALT), ikm);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)?;
    let key = KeyMaterial::new(okm);
    okm.iter_mut().for_each(|b| *b = 0);
    Ok(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn party() -> (KeyExchangeManager, IdentityPublicKey) {
        let mut manager = KeyExchangeManager::new();
        let pk = manager.generate_identity();
        (manager, pk)
    }

    #[test]
    fn austausch_ist_symmetrisch() {
        let (alice, alice_pk) = party();
        let (bob, bob_pk) = party();

        let k_alice = alice.perform_exchange(&bob_pk.to_bundle()).unwrap();
        let k_bob = bob.perform_exchange(&alice_pk.to_bundle()).unwrap();

        // Beide Seiten muessen identische Schluessel ableiten
        assert_eq!(k_alice.as_bytes(), k_bob.as_bytes());
    }

    #[test]
    fn ohne_identitaet_schlaegt_fehl() {
        let manager = KeyExchangeManager::new();
        let (_, bob_pk) = party();
        let result = manager.perform_exchange(&bob_pk.to_bundle());
        assert!(matches!(result, Err(KeyExchangeError::NoLocalIdentity)));
        assert!(manager.local_bundle().is_err());
    }

    #[test]
    fn falsche_laenge_ist_malformed() {
        let (alice, _) = party();
        let bundle = RemoteBundle {
            identity: vec![1u8; 31],
            signed_pre_key: Vec::new(),
            signature: Vec::new(),
        };
        let result = alice.perform_exchange(&bundle);
        assert!(matches!(result, Err(KeyExchangeError::MalformedBundle(_))));
    }

    #[test]
    fn null_schluessel_ist_malformed() {
        let (alice, _) = party();
        let bundle = IdentityPublicKey([0u8; 32]).to_bundle();
        let result = alice.perform_exchange(&bundle);
        assert!(matches!(result, Err(KeyExchangeError::MalformedBundle(_))));
    }

    #[test]
    fn signatur_wird_nicht_geprueft() {
        let (alice, _) = party();
        let (_, bob_pk) = party();
        let mut bundle = bob_pk.to_bundle();
        bundle.signed_pre_key = vec![0xAA; 32];
        bundle.signature = vec![0xFF; 64];
        assert!(alice.perform_exchange(&bundle).is_ok());
    }

    #[test]
    fn neue_identitaet_ergibt_neuen_key() {
        let (mut alice, _) = party();
        let (_, bob_pk) = party();

        let k1 = alice.perform_exchange(&bob_pk.to_bundle()).unwrap();
        let pk_alt = alice.public_identity().unwrap();
        let pk_neu = alice.generate_identity();
        let k2 = alice.perform_exchange(&bob_pk.to_bundle()).unwrap();

        assert_ne!(pk_alt, pk_neu);
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn derive_key_deterministisch() {
        let k1 = derive_key(b"ikm", b"info").unwrap();
        let k2 = derive_key(b"ikm", b"info").unwrap();
        let k3 = derive_key(b"ikm", b"info-2").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }
}
