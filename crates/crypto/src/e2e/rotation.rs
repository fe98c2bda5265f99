//! Periodische Schluessel-Rotation
//!
//! Zustaende: `Uninitialized -> Active`. Nach dem ersten erfolgreichen
//! Austausch (`activate`) laeuft ein Timer; pro Tick wird ein neuer
//! Session-Key mit `key_id = vorherige + 1` zufaellig erzeugt, der
//! Gegenstelle angekuendigt und als Sende-Key installiert.
//!
//! Rotierte Keys sind pro Richtung unabhaengig: die Gegenstelle kann sie
//! nicht ableiten, sie erhaelt sie nur ueber die Ankuendigung.
//!
//! Die Sender-Seite haelt immer nur einen Key; nur der Empfaenger-Ring
//! behaelt mehrere, damit Frames waehrend der Umstellung entschluesselbar
//! bleiben.

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::E2eeConfig;
use crate::e2e::frame_cipher::SenderKeySlot;
use crate::e2e::key_ring::KeyRing;
use crate::error::{ConfigurationError, CryptoError, CryptoResult};
use crate::shutdown::Shutdown;
use crate::types::{KeyId, KeyMaterial, SessionKey, KEY_LEN};

/// Ankuendigung eines neuen Session-Keys an die Gegenstelle
#[derive(Debug, Clone)]
pub struct RotationAnnouncement {
    pub key_id: KeyId,
    pub key: KeyMaterial,
}

/// Kanal zur Gegenstelle fuer Rotations-Ankuendigungen
///
/// Der Kanal gilt als bereits authentifiziert; seine Vertraulichkeit liegt
/// ausserhalb dieses Crates.
pub trait KeyAnnouncer: Send + Sync {
    fn announce(&self, announcement: &RotationAnnouncement) -> CryptoResult<()>;
}

enum RotationState {
    Uninitialized,
    Active { current_key_id: KeyId },
}

struct CoordinatorInner {
    state: Mutex<RotationState>,
    /// Serialisiert `rotate`; der Zustand bleibt waehrend der Ankuendigung lesbar
    rotation: Mutex<()>,
    sender_slot: SenderKeySlot,
    ring: KeyRing,
    announcer: Arc<dyn KeyAnnouncer>,
    interval: Duration,
    active_tx: watch::Sender<bool>,
}

/// Besitzt den Key-ID-Zaehler eines Anrufs (Clone teilt den Zustand)
#[derive(Clone)]
pub struct KeyRotationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl KeyRotationCoordinator {
    pub fn new(
        config: &E2eeConfig,
        sender_slot: SenderKeySlot,
        ring: KeyRing,
        announcer: Arc<dyn KeyAnnouncer>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let (active_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                state: Mutex::new(RotationState::Uninitialized),
                rotation: Mutex::new(()),
                sender_slot,
                ring,
                announcer,
                interval: config.rotation_interval(),
                active_tx,
            }),
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.inner.state.lock(), RotationState::Active { .. })
    }

    /// Aktuelle Sende-Key-ID (`None` solange nicht aktiv)
    pub fn current_key_id(&self) -> Option<KeyId> {
        match &*self.inner.state.lock() {
            RotationState::Active { current_key_id, .. } => Some(*current_key_id),
            RotationState::Uninitialized => None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Uebernimmt den Session-Key des ersten Austauschs als Key-ID 0
    ///
    /// Beide Seiten leiten Key 0 unabhaengig ab, daher landet er sowohl im
    /// Sende-Slot als auch im eigenen Empfangs-Ring.
    pub fn activate(&self, session_key: KeyMaterial) -> CryptoResult<()> {
        let mut state = self.inner.state.lock();
        if matches!(*state, RotationState::Active { .. }) {
            return Err(CryptoError::AlreadyActive);
        }

        let key = SessionKey::new(session_key, 0);
        self.inner.ring.insert(key.clone());
        self.inner.sender_slot.install(key);
        *state = RotationState::Active { current_key_id: 0 };
        drop(state);

        self.inner.active_tx.send_replace(true);
        tracing::info!(key_id = 0, "Schluessel-Rotation aktiviert");
        Ok(())
    }

    /// Zurueck auf `Uninitialized` (z.B. nach neuer Identitaet)
    ///
    /// Sende-Key und Empfangs-Ring werden geleert.
    pub fn reset(&self) {
        *self.inner.state.lock() = RotationState::Uninitialized;
        self.inner.sender_slot.clear();
        self.inner.ring.clear();
        self.inner.active_tx.send_replace(false);
        tracing::info!("Schluessel-Rotation zurueckgesetzt");
    }

    /// Fuehrt eine Rotation aus und gibt die neue Key-ID zurueck
    ///
    /// Erst nach erfolgreicher Ankuendigung wird der neue Key lokal
    /// installiert; schlaegt sie fehl, bleibt die Key-ID unveraendert.
    /// Die Ankuendigung laeuft ohne gehaltenen Zustands-Lock.
    pub fn rotate(&self) -> CryptoResult<KeyId> {
        let _rotation = self.inner.rotation.lock();

        let current = self.current_key_id().ok_or(CryptoError::NotActive)?;
        let next = current.checked_add(1).ok_or(CryptoError::KeyIdExhausted)?;
        let material = fresh_key();

        self.inner.announcer.announce(&RotationAnnouncement {
            key_id: next,
            key: material.clone(),
        })?;

        let mut state = self.inner.state.lock();
        match &mut *state {
            RotationState::Active { current_key_id } if *current_key_id == current => {
                self.inner.sender_slot.install(SessionKey::new(material, next));
                *current_key_id = next;
            }
            _ => {
                tracing::warn!(key_id = next, "Rotation waehrend der Ankuendigung zurueckgesetzt");
                return Err(CryptoError::RotationSuperseded);
            }
        }
        drop(state);

        tracing::info!(key_id = next, "Session-Key rotiert");
        Ok(next)
    }

    /// Uebernimmt einen von der Gegenstelle angekuendigten Key in den Ring
    ///
    /// Reihenfolge und Zustand sind egal; gibt die ggf. verdraengte Key-ID
    /// zurueck.
    pub fn on_peer_rotation(&self, announcement: RotationAnnouncement) -> Option<KeyId> {
        let key_id = announcement.key_id;
        let evicted = self
            .inner
            .ring
            .insert(SessionKey::new(announcement.key, key_id));
        tracing::info!(key_id, verdraengt = ?evicted, "Rotation der Gegenstelle uebernommen");
        evicted
    }

    /// Startet den periodischen Rotations-Task
    ///
    /// Der Timer laeuft nur im Zustand `Active`; nach `reset` wartet der Task
    /// auf die naechste Aktivierung. Endet mit dem Shutdown-Signal.
    pub fn starten(&self, mut shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        let mut active_rx = self.inner.active_tx.subscribe();
        let period = self.inner.interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    aktiv = async { active_rx.wait_for(|a| *a).await.is_ok() } => {
                        if !aktiv {
                            break;
                        }
                    }
                    _ = shutdown.requested() => break,
                }

                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => match coordinator.rotate() {
                            Ok(_) => {}
                            Err(CryptoError::NotActive) => break,
                            Err(e) => tracing::warn!(fehler = %e, "Rotation fehlgeschlagen"),
                        },
                        _ = shutdown.requested() => {
                            tracing::debug!("Rotations-Task beendet");
                            return;
                        }
                    }
                }
            }
            tracing::debug!("Rotations-Task beendet");
        })
    }
}

impl std::fmt::Debug for KeyRotationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotationCoordinator")
            .field("current_key_id", &self.current_key_id())
            .field("interval", &self.inner.interval)
            .finish()
    }
}

fn fresh_key() -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial::new(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Aufzeichner {
        angekuendigt: Mutex<Vec<RotationAnnouncement>>,
        fehlschlagen: AtomicBool,
    }

    impl KeyAnnouncer for Aufzeichner {
        fn announce(&self, announcement: &RotationAnnouncement) -> CryptoResult<()> {
            if self.fehlschlagen.load(Ordering::SeqCst) {
                return Err(CryptoError::Announcement("Queue voll".into()));
            }
            self.angekuendigt.lock().push(announcement.clone());
            Ok(())
        }
    }

    fn coordinator(interval_ms: u64) -> (KeyRotationCoordinator, SenderKeySlot, KeyRing, Arc<Aufzeichner>) {
        let slot = SenderKeySlot::new();
        let ring = KeyRing::new();
        let announcer = Arc::new(Aufzeichner::default());
        let config = E2eeConfig {
            rotation_interval_ms: interval_ms,
            ..Default::default()
        };
        let c = KeyRotationCoordinator::new(&config, slot.clone(), ring.clone(), announcer.clone())
            .unwrap();
        (c, slot, ring, announcer)
    }

    #[test]
    fn ungueltiges_intervall_wird_abgelehnt() {
        let config = E2eeConfig {
            rotation_interval_ms: 0,
            ..Default::default()
        };
        let result = KeyRotationCoordinator::new(
            &config,
            SenderKeySlot::new(),
            KeyRing::new(),
            Arc::new(Aufzeichner::default()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidRotationInterval(0))
        ));
    }

    #[test]
    fn aktivierung_installiert_key_null() {
        let (c, slot, ring, _) = coordinator(1000);
        assert!(!c.is_active());
        c.activate(KeyMaterial::new([1; 32])).unwrap();

        assert_eq!(c.current_key_id(), Some(0));
        assert_eq!(slot.key_id(), Some(0));
        assert!(ring.contains(0));
    }

    #[test]
    fn doppelte_aktivierung_schlaegt_fehl() {
        let (c, _, _, _) = coordinator(1000);
        c.activate(KeyMaterial::new([1; 32])).unwrap();
        assert!(matches!(
            c.activate(KeyMaterial::new([1; 32])),
            Err(CryptoError::AlreadyActive)
        ));
    }

    #[test]
    fn rotation_ohne_aktivierung() {
        let (c, _, _, _) = coordinator(1000);
        assert!(matches!(c.rotate(), Err(CryptoError::NotActive)));
    }

    #[test]
    fn rotation_erhoeht_key_id_und_kuendigt_an() {
        let (c, slot, _, announcer) = coordinator(1000);
        c.activate(KeyMaterial::new([1; 32])).unwrap();

        assert_eq!(c.rotate().unwrap(), 1);
        assert_eq!(c.rotate().unwrap(), 2);
        assert_eq!(slot.key_id(), Some(2));

        let angekuendigt = announcer.angekuendigt.lock();
        assert_eq!(angekuendigt.len(), 2);
        assert_eq!(angekuendigt[1].key_id, 2);
        let aktueller = slot.current().unwrap();
        assert_eq!(angekuendigt[1].key.as_bytes(), aktueller.material().as_bytes());
        assert_ne!(angekuendigt[0].key.as_bytes(), angekuendigt[1].key.as_bytes());
    }

    #[test]
    fn fehlgeschlagene_ankuendigung_haelt_key_id() {
        let (c, slot, _, announcer) = coordinator(1000);
        c.activate(KeyMaterial::new([1; 32])).unwrap();
        announcer.fehlschlagen.store(true, Ordering::SeqCst);

        assert!(matches!(c.rotate(), Err(CryptoError::Announcement(_))));
        assert_eq!(c.current_key_id(), Some(0));
        assert_eq!(slot.key_id(), Some(0));

        announcer.fehlschlagen.store(false, Ordering::SeqCst);
        assert_eq!(c.rotate().unwrap(), 1);
    }

    #[test]
    fn gleicher_key_null_ergibt_verschiedene_rotations_keys() {
        let (a, slot_a, _, _) = coordinator(1000);
        let (b, slot_b, _, _) = coordinator(1000);
        a.activate(KeyMaterial::new([5; 32])).unwrap();
        b.activate(KeyMaterial::new([5; 32])).unwrap();
        assert_eq!(a.rotate().unwrap(), 1);
        assert_eq!(b.rotate().unwrap(), 1);

        let key_a = slot_a.current().unwrap();
        let key_b = slot_b.current().unwrap();
        assert_eq!(key_a.key_id(), key_b.key_id());
        assert_ne!(key_a.material().as_bytes(), key_b.material().as_bytes());
        assert_ne!(key_a.material().as_bytes(), &[5; 32]);
    }

    /// Fragt waehrend der Ankuendigung den Zustand ab
    struct Neugierig {
        coordinator: Mutex<Option<KeyRotationCoordinator>>,
        gesehen: Mutex<Vec<(Option<KeyId>, bool)>>,
        zuruecksetzen: AtomicBool,
    }

    impl KeyAnnouncer for Neugierig {
        fn announce(&self, _announcement: &RotationAnnouncement) -> CryptoResult<()> {
            if let Some(c) = self.coordinator.lock().as_ref() {
                self.gesehen.lock().push((c.current_key_id(), c.is_active()));
                if self.zuruecksetzen.load(Ordering::SeqCst) {
                    c.reset();
                }
            }
            Ok(())
        }
    }

    fn neugieriger_coordinator() -> (KeyRotationCoordinator, SenderKeySlot, Arc<Neugierig>) {
        let slot = SenderKeySlot::new();
        let announcer = Arc::new(Neugierig {
            coordinator: Mutex::new(None),
            gesehen: Mutex::new(Vec::new()),
            zuruecksetzen: AtomicBool::new(false),
        });
        let c = KeyRotationCoordinator::new(
            &E2eeConfig::default(),
            slot.clone(),
            KeyRing::new(),
            announcer.clone(),
        )
        .unwrap();
        *announcer.coordinator.lock() = Some(c.clone());
        (c, slot, announcer)
    }

    #[test]
    fn zustand_ist_waehrend_ankuendigung_lesbar() {
        let (c, slot, announcer) = neugieriger_coordinator();
        c.activate(KeyMaterial::new([1; 32])).unwrap();

        assert_eq!(c.rotate().unwrap(), 1);
        assert_eq!(*announcer.gesehen.lock(), vec![(Some(0), true)]);
        assert_eq!(slot.key_id(), Some(1));
        // Zyklus Coordinator <-> Announcer aufloesen
        announcer.coordinator.lock().take();
    }

    #[test]
    fn reset_waehrend_ankuendigung_verwirft_rotation() {
        let (c, slot, announcer) = neugieriger_coordinator();
        c.activate(KeyMaterial::new([1; 32])).unwrap();
        announcer.zuruecksetzen.store(true, Ordering::SeqCst);

        assert!(matches!(c.rotate(), Err(CryptoError::RotationSuperseded)));
        assert!(!c.is_active());
        assert_eq!(slot.key_id(), None);
        announcer.coordinator.lock().take();
    }

    #[test]
    fn peer_rotation_landet_im_ring() {
        let (c, slot, ring, _) = coordinator(1000);
        // Auch vor der eigenen Aktivierung
        c.on_peer_rotation(RotationAnnouncement {
            key_id: 3,
            key: KeyMaterial::new([3; 32]),
        });
        assert!(ring.contains(3));
        assert_eq!(slot.key_id(), None);
    }

    #[test]
    fn reset_leert_zustand() {
        let (c, slot, ring, _) = coordinator(1000);
        c.activate(KeyMaterial::new([1; 32])).unwrap();
        c.reset();
        assert!(!c.is_active());
        assert_eq!(slot.key_id(), None);
        assert!(ring.is_empty());
        assert!(matches!(c.rotate(), Err(CryptoError::NotActive)));
        assert!(c.activate(KeyMaterial::new([2; 32])).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_rotiert_periodisch() {
        let (c, slot, _, announcer) = coordinator(1000);
        let (trigger, shutdown) = shutdown_channel();
        let task = c.starten(shutdown);

        c.activate(KeyMaterial::new([1; 32])).unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(c.current_key_id(), Some(3));
        assert_eq!(slot.key_id(), Some(3));
        assert_eq!(announcer.angekuendigt.lock().len(), 3);

        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_wartet_auf_aktivierung() {
        let (c, _, _, announcer) = coordinator(1000);
        let (trigger, shutdown) = shutdown_channel();
        let task = c.starten(shutdown);

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(announcer.angekuendigt.lock().is_empty());

        trigger.trigger();
        task.await.unwrap();
    }
}
