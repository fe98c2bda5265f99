//! Schluesselring der Empfaenger-Seite
//!
//! Haelt bis zu drei Session-Keys gleichzeitig, damit Frames, die waehrend
//! einer Rotation noch mit dem vorherigen Key verschluesselt wurden,
//! entschluesselbar bleiben.
//!
//! Verdraengung: bei Ueberlauf faellt der Eintrag mit der numerisch
//! kleinsten Key-ID heraus. Das ist nur ein Alters-Ersatz und setzt global
//! monoton vergebene Key-IDs voraus; rotieren beide Seiten gleichzeitig,
//! kann ein noch aktiver Key verdraengt werden.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{KeyId, SessionKey};

/// Maximale Anzahl gleichzeitig gueltiger Empfangs-Keys
pub const KEY_RING_CAPACITY: usize = 3;

/// Geteilter Schluesselring (Clone teilt den inneren Zustand)
///
/// Audio- und Video-Empfaenger derselben Gegenstelle teilen sich eine
/// Instanz. Einfuegen/Verdraengen laeuft exklusiv unter dem Write-Lock,
/// Lookups nehmen nur den Read-Lock und klonen den `Arc`.
#[derive(Clone, Default)]
pub struct KeyRing {
    inner: Arc<RwLock<BTreeMap<KeyId, Arc<SessionKey>>>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuegt einen Key ein; gibt die ggf. verdraengte Key-ID zurueck
    ///
    /// Eine bereits vorhandene Key-ID wird ersetzt.
    pub fn insert(&self, key: SessionKey) -> Option<KeyId> {
        let key_id = key.key_id();
        let mut ring = self.inner.write();
        ring.insert(key_id, Arc::new(key));

        if ring.len() <= KEY_RING_CAPACITY {
            tracing::debug!(key_id, groesse = ring.len(), "Key in Ring eingefuegt");
            return None;
        }

        let evicted = ring.pop_first().map(|(id, _)| id);
        tracing::debug!(key_id, verdraengt = ?evicted, "Key in Ring eingefuegt, aeltester verdraengt");
        evicted
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn get(&self, key_id: KeyId) -> Option<Arc<SessionKey>> {
        self.inner.read().get(&key_id).cloned()
    }

    pub fn contains(&self, key_id: KeyId) -> bool {
        self.inner.read().contains_key(&key_id)
    }

    /// Aktuell gehaltene Key-IDs (aufsteigend)
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.inner.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("key_ids", &self.key_ids())
            .finish()
    }
}
