//! Frame-Pipeline pro Track
//!
//! Eine einzelne kooperative Schleife pro Track und Richtung:
//! naechsten Frame aus der Quelle lesen, transformieren, in den Sink
//! schreiben. Ein Frame ist vollstaendig verarbeitet, bevor der naechste
//! gelesen wird; die Reihenfolge bleibt damit strikt erhalten.
//!
//! Abbruch ueber `Shutdown` unterbricht sowohl das Warten auf die Quelle als
//! auch das Warten auf den Sink. Das Warten auf den Sink ist zusaetzlich
//! durch `sink_timeout` begrenzt; der Frame wird dann verworfen.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::config::E2eeConfig;
use crate::e2e::frame_cipher::{CipherRole, FrameCipher, FrameOutcome};
use crate::shutdown::Shutdown;
use crate::types::{EncodedFrame, MediaKind};

/// Zaehler einer beendeten Pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Aus der Quelle gelesene Frames
    pub processed: u64,
    /// Erfolgreich ver-/entschluesselte Frames
    pub transformed: u64,
    /// Unveraendert weitergereichte Frames
    pub passed_through: u64,
    /// Durch `FailurePolicy::Drop` verworfene Frames
    pub dropped: u64,
    /// Frames, die der Sink nicht rechtzeitig angenommen hat
    pub sink_timeouts: u64,
}

/// Pipeline eines Tracks (besitzt ihre `FrameCipher`)
#[derive(Debug)]
pub struct TrackPipeline {
    kind: MediaKind,
    cipher: FrameCipher,
    sink_timeout: Duration,
}

impl TrackPipeline {
    pub fn new(kind: MediaKind, cipher: FrameCipher, config: &E2eeConfig) -> Self {
        Self {
            kind,
            cipher,
            sink_timeout: config.sink_timeout(),
        }
    }

    pub fn role(&self) -> CipherRole {
        self.cipher.role()
    }

    /// Startet die Pipeline als eigenen Task
    pub fn starten(
        self,
        source: mpsc::Receiver<EncodedFrame>,
        sink: mpsc::Sender<EncodedFrame>,
        shutdown: Shutdown,
    ) -> tokio::task::JoinHandle<PipelineStats> {
        tokio::spawn(self.run(source, sink, shutdown))
    }

    /// Laeuft bis die Quelle erschoepft ist, der Sink schliesst oder
    /// das Shutdown-Signal kommt
    pub async fn run(
        mut self,
        mut source: mpsc::Receiver<EncodedFrame>,
        sink: mpsc::Sender<EncodedFrame>,
        mut shutdown: Shutdown,
    ) -> PipelineStats {
        let mut stats = PipelineStats::default();
        let role = self.cipher.role();
        tracing::debug!(track = %self.kind, rolle = ?role, "Pipeline gestartet");

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.requested() => break,
                next = source.recv() => match next {
                    Some(frame) => frame,
                    None => break,
                },
            };
            stats.processed += 1;

            let frame = match self.cipher.process(frame) {
                FrameOutcome::Transformed(frame) => {
                    stats.transformed += 1;
                    frame
                }
                FrameOutcome::PassedThrough(frame) => {
                    stats.passed_through += 1;
                    frame
                }
                FrameOutcome::Dropped => {
                    stats.dropped += 1;
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.requested() => break,
                result = sink.send_timeout(frame, self.sink_timeout) => match result {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(_)) => {
                        stats.sink_timeouts += 1;
                        tracing::warn!(track = %self.kind, rolle = ?role, "Sink-Timeout, Frame verworfen");
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        tracing::debug!(track = %self.kind, rolle = ?role, "Sink geschlossen");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            track = %self.kind,
            rolle = ?role,
            verarbeitet = stats.processed,
            transformiert = stats.transformed,
            durchgereicht = stats.passed_through,
            verworfen = stats.dropped,
            "Pipeline beendet"
        );
        stats
    }
}
