//! In-Process Signaling-Relay
//!
//! Das Relay haelt pro Teilnehmer eine begrenzte Empfangs-Queue und stellt
//! Nachrichten gezielt zu. Der Absender wird vom Relay gesetzt, nicht vom
//! Aufrufer. Fehler (unbekannter Empfaenger, volle Queue) gehen an den
//! Absender zurueck; das Relay verwirft nichts stillschweigend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use callveil_core::UserId;

use crate::error::{SignalingError, SignalingResult};
use crate::messages::{RelayedMessage, SignalingEnvelope};

/// Groesse der Empfangs-Queue pro Teilnehmer
pub const RELAY_QUEUE_GROESSE: usize = 64;

/// Zentrales Relay fuer alle Teilnehmer
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    teilnehmer: DashMap<UserId, mpsc::Sender<RelayedMessage>>,
    queue_groesse: usize,
}

impl SignalingRelay {
    pub fn neu() -> Self {
        Self::mit_queue_groesse(RELAY_QUEUE_GROESSE)
    }

    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                teilnehmer: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert einen Teilnehmer und gibt seine Empfangs-Queue zurueck
    ///
    /// Eine erneute Registrierung ersetzt die alte Queue.
    pub fn registrieren(&self, user_id: UserId) -> mpsc::Receiver<RelayedMessage> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner.teilnehmer.insert(user_id, tx);
        tracing::debug!(user_id = %user_id, "Teilnehmer am Relay registriert");
        rx
    }

    pub fn entfernen(&self, user_id: &UserId) {
        self.inner.teilnehmer.remove(user_id);
        tracing::debug!(user_id = %user_id, "Teilnehmer vom Relay entfernt");
    }

    /// Stellt eine Nachricht nicht-blockierend zu
    pub fn weiterleiten(&self, from: UserId, envelope: SignalingEnvelope) -> SignalingResult<()> {
        let to = envelope.to;
        let art = envelope.payload.art();
        let tx = self
            .inner
            .teilnehmer
            .get(&to)
            .map(|entry| entry.value().clone())
            .ok_or(SignalingError::UnknownRecipient(to))?;

        let nachricht = RelayedMessage {
            from,
            call_id: envelope.call_id,
            payload: envelope.payload,
        };

        match tx.try_send(nachricht) {
            Ok(()) => {
                tracing::trace!(from = %from, to = %to, art, "Nachricht weitergeleitet");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(from = %from, to = %to, art, "Relay-Queue voll");
                Err(SignalingError::QueueFull(to))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(to = %to, "Relay-Queue geschlossen, Teilnehmer wird entfernt");
                self.inner.teilnehmer.remove(&to);
                Err(SignalingError::QueueClosed(to))
            }
        }
    }

    /// Wie `weiterleiten`, aber mit JSON-kodiertem Umschlag
    pub fn weiterleiten_json(&self, from: UserId, json: &str) -> SignalingResult<()> {
        let envelope = SignalingEnvelope::from_json(json)?;
        self.weiterleiten(from, envelope)
    }

    pub fn ist_registriert(&self, user_id: &UserId) -> bool {
        self.inner.teilnehmer.contains_key(user_id)
    }

    pub fn teilnehmer_anzahl(&self) -> usize {
        self.inner.teilnehmer.len()
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::neu()
    }
}

impl std::fmt::Debug for SignalingRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingRelay")
            .field("teilnehmer", &self.teilnehmer_anzahl())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
