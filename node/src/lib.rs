//! callveil-node – Bibliotheks-Root
//!
//! Fuehrt einen verschluesselten Loopback-Anruf zwischen zwei lokalen
//! Teilnehmern aus. Alles, was in einer echten Anwendung ueber das Netz
//! liefe (Signaling, Medien), geht hier ueber In-Process-Queues; der
//! E2EE-Kern ist derselbe.
//!
//! Ablauf:
//! 1. Beide Teilnehmer erzeugen eine Identitaet und tauschen Bundles ueber das Relay
//! 2. Beide leiten Key 0 ab und loggen die SAS
//! 3. Rotations-Koordinatoren werden aktiviert; jede Seite rotiert sofort
//!    einmal, damit keine Medien unter dem gemeinsamen Key 0 laufen
//! 4. Pro Richtung je ein Audio- und ein Video-Track mit synthetischen Frames
//! 5. Nach Ablauf der Dauer oder Ctrl-C: Shutdown und Statistik pro Track

pub mod config;

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use callveil_core::{CallId, UserId};
use callveil_crypto::{
    generate_sas, shutdown_channel, E2eeConfig, EncodedFrame, FrameCipher, KeyExchangeManager,
    KeyId, KeyMaterial, KeyRing, KeyRotationCoordinator, MediaKind, PipelineStats,
    SenderKeySlot, Shutdown, TrackPipeline,
};
use callveil_signaling::{
    rotation_uebernehmen, BundleMessage, RelayAnnouncer, RelayedMessage, SignalingEnvelope,
    SignalingPayload, SignalingRelay,
};

use config::{DemoEinstellungen, NodeConfig};

// ---------------------------------------------------------------------------
// Teilnehmer
// ---------------------------------------------------------------------------

struct Teilnehmer {
    name: &'static str,
    user_id: UserId,
    gegenstelle: UserId,
    schluessel: KeyExchangeManager,
    slot: SenderKeySlot,
    ring: KeyRing,
    coordinator: KeyRotationCoordinator,
    signaling_rx: Option<mpsc::Receiver<RelayedMessage>>,
}

impl Teilnehmer {
    fn neu(
        name: &'static str,
        user_id: UserId,
        gegenstelle: UserId,
        call_id: CallId,
        relay: &SignalingRelay,
        e2ee: &E2eeConfig,
    ) -> Result<Self> {
        let signaling_rx = relay.registrieren(user_id);
        let mut schluessel = KeyExchangeManager::new();
        schluessel.generate_identity();

        let slot = SenderKeySlot::new();
        let ring = KeyRing::new();
        let announcer = Arc::new(RelayAnnouncer::new(
            relay.clone(),
            call_id,
            user_id,
            gegenstelle,
        ));
        let coordinator = KeyRotationCoordinator::new(e2ee, slot.clone(), ring.clone(), announcer)?;

        Ok(Self {
            name,
            user_id,
            gegenstelle,
            schluessel,
            slot,
            ring,
            coordinator,
            signaling_rx: Some(signaling_rx),
        })
    }

    fn bundle_senden(&self, relay: &SignalingRelay, call_id: CallId, an: UserId) -> Result<()> {
        let bundle = BundleMessage::from_bundle(&self.schluessel.local_bundle()?);
        relay.weiterleiten(
            self.user_id,
            SignalingEnvelope::new(an, call_id, SignalingPayload::KeyBundle(bundle)),
        )?;
        Ok(())
    }

    /// Wartet auf das Bundle der Gegenstelle und leitet Key 0 ab
    async fn bundle_empfangen(&mut self) -> Result<KeyMaterial> {
        let rx = self
            .signaling_rx
            .as_mut()
            .context("Signaling-Queue bereits uebergeben")?;
        loop {
            let nachricht = rx
                .recv()
                .await
                .context("Signaling-Queue geschlossen")?;
            match nachricht.payload {
                SignalingPayload::KeyBundle(bundle) if nachricht.from == self.gegenstelle => {
                    let key = self.schluessel.perform_exchange(&bundle.to_bundle()?)?;
                    tracing::info!(teilnehmer = self.name, von = %nachricht.from, "Schluesselaustausch abgeschlossen");
                    return Ok(key);
                }
                andere => {
                    tracing::debug!(teilnehmer = self.name, art = andere.art(), "Nachricht vor Key-Bundle ignoriert");
                }
            }
        }
    }

    /// Verarbeitet eingehende Signaling-Nachrichten im Hintergrund
    fn signaling_starten(&mut self, call_id: CallId, mut shutdown: Shutdown) -> Result<JoinHandle<()>> {
        let mut rx = self
            .signaling_rx
            .take()
            .context("Signaling-Queue bereits uebergeben")?;
        let name = self.name;
        let gegenstelle = self.gegenstelle;
        let coordinator = self.coordinator.clone();

        Ok(tokio::spawn(async move {
            loop {
                let nachricht = tokio::select! {
                    _ = shutdown.requested() => break,
                    next = rx.recv() => match next {
                        Some(n) => n,
                        None => break,
                    },
                };
                match rotation_uebernehmen(&coordinator, gegenstelle, call_id, &nachricht) {
                    Ok(Some(key_id)) => {
                        tracing::debug!(teilnehmer = name, key_id, "Key der Gegenstelle installiert");
                    }
                    Ok(None) => {
                        tracing::debug!(teilnehmer = name, art = nachricht.payload.art(), "Signaling-Nachricht ignoriert");
                    }
                    Err(e) => {
                        tracing::warn!(teilnehmer = name, fehler = %e, "Ungueltige Signaling-Nachricht");
                    }
                }
            }
        }))
    }

    /// Rotiert einmal und wartet, bis die Gegenstelle den Key im Ring hat
    async fn eigenen_key_verteilen(&self, gegenstelle: &Teilnehmer) -> Result<KeyId> {
        let key_id = self.coordinator.rotate()?;
        tokio::time::timeout(KEY_VERTEILUNG_TIMEOUT, async {
            while !gegenstelle.ring.contains(key_id) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .with_context(|| format!("{} hat Key {key_id} nicht uebernommen", gegenstelle.name))?;
        Ok(key_id)
    }
}

const KEY_VERTEILUNG_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Synthetische Medien
// ---------------------------------------------------------------------------

fn intervall_ms(kind: MediaKind, demo: &DemoEinstellungen) -> u64 {
    match kind {
        MediaKind::Audio => demo.audio_intervall_ms,
        MediaKind::Video => demo.video_intervall_ms,
    }
}

/// Deterministischer Frame Nummer `index` eines Tracks
pub fn synthetischer_frame(kind: MediaKind, index: u64, demo: &DemoEinstellungen) -> EncodedFrame {
    let timestamp = index * intervall_ms(kind, demo);
    match kind {
        MediaKind::Audio => EncodedFrame::audio(timestamp, muster(index, demo.audio_payload_bytes)),
        MediaKind::Video => EncodedFrame::video(
            timestamp,
            index % demo.keyframe_intervall == 0,
            muster(index, demo.video_payload_bytes),
        ),
    }
}

fn muster(index: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| (index as usize).wrapping_add(i) as u8).collect()
}

/// Prueft, ob ein empfangener Frame exakt dem erzeugten entspricht
pub fn frame_intakt(frame: &EncodedFrame, demo: &DemoEinstellungen) -> bool {
    let intervall = intervall_ms(frame.kind, demo);
    if intervall == 0 || frame.timestamp % intervall != 0 {
        return false;
    }
    *frame == synthetischer_frame(frame.kind, frame.timestamp / intervall, demo)
}

/// Quelle: erzeugt Frames im Takt; eine volle Queue kostet den Frame
async fn frames_erzeugen(
    kind: MediaKind,
    demo: DemoEinstellungen,
    tx: mpsc::Sender<EncodedFrame>,
    mut shutdown: Shutdown,
) -> u64 {
    let mut takt = tokio::time::interval(Duration::from_millis(intervall_ms(kind, &demo)));
    takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut index = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.requested() => break,
            _ = takt.tick() => {}
        }
        match tx.try_send(synthetischer_frame(kind, index, &demo)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(track = %kind, index, "Quelle ueberlastet, Frame verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
        index += 1;
    }
    index
}

/// Senke: zaehlt intakte und fehlerhafte Frames
async fn frames_pruefen(
    demo: DemoEinstellungen,
    mut rx: mpsc::Receiver<EncodedFrame>,
    mut shutdown: Shutdown,
) -> (u64, u64) {
    let (mut intakt, mut fehlerhaft) = (0u64, 0u64);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.requested() => break,
            next = rx.recv() => match next {
                Some(frame) if frame_intakt(&frame, &demo) => intakt += 1,
                Some(frame) => {
                    fehlerhaft += 1;
                    tracing::debug!(track = %frame.kind, ts = frame.timestamp, "Frame nicht intakt");
                }
                None => break,
            },
        }
    }
    (intakt, fehlerhaft)
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// Ergebnis eines Tracks (eine Richtung, eine Medienart)
#[derive(Debug, Clone)]
pub struct TrackBericht {
    pub von: &'static str,
    pub an: &'static str,
    pub kind: MediaKind,
    pub erzeugt: u64,
    pub sender: PipelineStats,
    pub empfaenger: PipelineStats,
    pub intakt: u64,
    pub fehlerhaft: u64,
}

struct TrackTasks {
    von: &'static str,
    an: &'static str,
    kind: MediaKind,
    erzeuger: JoinHandle<u64>,
    sender: JoinHandle<PipelineStats>,
    empfaenger: JoinHandle<PipelineStats>,
    pruefer: JoinHandle<(u64, u64)>,
}

impl TrackTasks {
    /// Quelle -> Sender-Pipeline -> "Netz" -> Empfaenger-Pipeline -> Senke
    fn starten(
        von: &Teilnehmer,
        an: &Teilnehmer,
        kind: MediaKind,
        config: &NodeConfig,
        shutdown: &Shutdown,
    ) -> Self {
        let groesse = config.demo.queue_groesse;
        let policy = config.e2ee.failure_policy;
        let (quelle_tx, quelle_rx) = mpsc::channel(groesse);
        let (netz_tx, netz_rx) = mpsc::channel(groesse);
        let (senke_tx, senke_rx) = mpsc::channel(groesse);

        let sender = TrackPipeline::new(kind, FrameCipher::sender(von.slot.clone(), policy), &config.e2ee)
            .starten(quelle_rx, netz_tx, shutdown.clone());
        let empfaenger =
            TrackPipeline::new(kind, FrameCipher::receiver(an.ring.clone(), policy), &config.e2ee)
                .starten(netz_rx, senke_tx, shutdown.clone());
        let erzeuger = tokio::spawn(frames_erzeugen(
            kind,
            config.demo.clone(),
            quelle_tx,
            shutdown.clone(),
        ));
        let pruefer = tokio::spawn(frames_pruefen(config.demo.clone(), senke_rx, shutdown.clone()));

        Self {
            von: von.name,
            an: an.name,
            kind,
            erzeuger,
            sender,
            empfaenger,
            pruefer,
        }
    }

    async fn einsammeln(self) -> Result<TrackBericht> {
        let erzeugt = self.erzeuger.await?;
        let sender = self.sender.await?;
        let empfaenger = self.empfaenger.await?;
        let (intakt, fehlerhaft) = self.pruefer.await?;
        Ok(TrackBericht {
            von: self.von,
            an: self.an,
            kind: self.kind,
            erzeugt,
            sender,
            empfaenger,
            intakt,
            fehlerhaft,
        })
    }
}

// ---------------------------------------------------------------------------
// Anruf
// ---------------------------------------------------------------------------

/// Zusammenfassung eines beendeten Anrufs
#[derive(Debug, Clone)]
pub struct AnrufBericht {
    pub call_id: CallId,
    /// Von beiden Seiten verglichene SAS
    pub sas: String,
    pub key_id_alice: Option<KeyId>,
    pub key_id_bob: Option<KeyId>,
    pub tracks: Vec<TrackBericht>,
}

impl AnrufBericht {
    fn loggen(&self) {
        for t in &self.tracks {
            tracing::info!(
                von = t.von,
                an = t.an,
                track = %t.kind,
                erzeugt = t.erzeugt,
                verschluesselt = t.sender.transformed,
                entschluesselt = t.empfaenger.transformed,
                durchgereicht = t.empfaenger.passed_through,
                verworfen = t.empfaenger.dropped,
                sink_timeouts = t.sender.sink_timeouts + t.empfaenger.sink_timeouts,
                intakt = t.intakt,
                fehlerhaft = t.fehlerhaft,
                "Track-Statistik"
            );
        }
        tracing::info!(
            call_id = %self.call_id,
            key_id_alice = ?self.key_id_alice,
            key_id_bob = ?self.key_id_bob,
            "Anruf beendet"
        );
    }
}

/// Baut den Loopback-Anruf auf und laeuft bis `abbruch` oder Ablauf der Dauer
pub async fn anruf_ausfuehren<F>(config: &NodeConfig, abbruch: F) -> Result<AnrufBericht>
where
    F: Future<Output = ()>,
{
    config.validieren()?;

    let relay = SignalingRelay::neu();
    let call_id = CallId::new();
    let alice_id = UserId::new();
    let bob_id = UserId::new();

    let mut alice = Teilnehmer::neu("alice", alice_id, bob_id, call_id, &relay, &config.e2ee)?;
    let mut bob = Teilnehmer::neu("bob", bob_id, alice_id, call_id, &relay, &config.e2ee)?;
    tracing::info!(call_id = %call_id, alice = %alice_id, bob = %bob_id, "Loopback-Anruf wird aufgebaut");

    alice.bundle_senden(&relay, call_id, bob_id)?;
    bob.bundle_senden(&relay, call_id, alice_id)?;
    let key_alice = alice.bundle_empfangen().await?;
    let key_bob = bob.bundle_empfangen().await?;

    let sas_alice = generate_sas(&key_alice);
    let sas_bob = generate_sas(&key_bob);
    tracing::info!(teilnehmer = "alice", sas = %sas_alice, "SAS zum muendlichen Vergleich");
    tracing::info!(teilnehmer = "bob", sas = %sas_bob, "SAS zum muendlichen Vergleich");
    if sas_alice != sas_bob {
        anyhow::bail!("SAS stimmt nicht ueberein, Anruf abgebrochen");
    }

    alice.coordinator.activate(key_alice)?;
    bob.coordinator.activate(key_bob)?;

    let (trigger, shutdown) = shutdown_channel();
    let mut hintergrund = vec![
        alice.signaling_starten(call_id, shutdown.clone())?,
        bob.signaling_starten(call_id, shutdown.clone())?,
    ];

    // Key 0 ist in beiden Richtungen identisch; Medien laufen erst unter
    // den eigenen, unabhaengigen Keys
    alice.eigenen_key_verteilen(&bob).await?;
    bob.eigenen_key_verteilen(&alice).await?;

    hintergrund.push(alice.coordinator.starten(shutdown.clone()));
    hintergrund.push(bob.coordinator.starten(shutdown.clone()));

    let mut tracks = Vec::new();
    for (von, an) in [(&alice, &bob), (&bob, &alice)] {
        for kind in [MediaKind::Audio, MediaKind::Video] {
            tracks.push(TrackTasks::starten(von, an, kind, config, &shutdown));
        }
    }

    tracing::info!(
        tracks = tracks.len(),
        rotation_ms = config.e2ee.rotation_interval_ms,
        dauer_ms = config.demo.dauer_ms,
        "Anruf laeuft"
    );

    match config.demo.dauer() {
        Some(dauer) => {
            tokio::select! {
                _ = abbruch => tracing::info!("Abbruch-Signal empfangen"),
                _ = tokio::time::sleep(dauer) => {}
            }
        }
        None => abbruch.await,
    }

    tracing::info!("Anruf wird beendet");
    trigger.trigger();

    let mut berichte = Vec::with_capacity(tracks.len());
    for track in tracks {
        berichte.push(track.einsammeln().await?);
    }
    for task in hintergrund {
        task.await?;
    }
    relay.entfernen(&alice_id);
    relay.entfernen(&bob_id);

    let bericht = AnrufBericht {
        call_id,
        sas: sas_alice,
        key_id_alice: alice.coordinator.current_key_id(),
        key_id_bob: bob.coordinator.current_key_id(),
        tracks: berichte,
    };
    bericht.loggen();
    Ok(bericht)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
