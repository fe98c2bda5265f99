//! Abbruch-Signal fuer laufende Pipelines und Timer
//!
//! Ein Anruf-Teardown setzt das Signal einmal; alle Tracks und der
//! Rotations-Timer des Anrufs beenden sich daraufhin.

use tokio::sync::watch;

/// Ausloeser (gehoert dem Anruf)
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Beobachter (Clone pro Task)
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // Fehler nur wenn kein Beobachter mehr existiert
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wartet bis das Signal gesetzt oder der Ausloeser gedroppt wurde
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_erreicht_alle_beobachter() {
        let (trigger, shutdown) = shutdown_channel();
        let mut a = shutdown.clone();
        let mut b = shutdown;
        assert!(!a.is_requested());

        trigger.trigger();
        a.requested().await;
        b.requested().await;
        assert!(b.is_requested());
    }

    #[tokio::test]
    async fn gedroppter_ausloeser_beendet_warten() {
        let (trigger, mut shutdown) = shutdown_channel();
        drop(trigger);
        shutdown.requested().await;
    }
}
