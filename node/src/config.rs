//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, der Knoten laeuft also auch ohne Datei.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use callveil_crypto::E2eeConfig;
use callveil_observability::LogFormat;

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub logging: LoggingEinstellungen,
    /// E2EE-Kern (Rotation, Fehlerpolitik, Sink-Timeout)
    pub e2ee: E2eeConfig,
    /// Synthetische Medien des Loopback-Anrufs
    pub demo: DemoEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Filter-Direktive, z.B. "info" oder "callveil_crypto=debug"
    pub level: String,
    /// "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Einstellungen des Loopback-Anrufs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoEinstellungen {
    /// Laufzeit in ms; 0 = bis Ctrl-C
    pub dauer_ms: u64,
    /// Abstand zwischen Audio-Frames (20 ms = typischer Opus-Frame)
    pub audio_intervall_ms: u64,
    /// Abstand zwischen Video-Frames
    pub video_intervall_ms: u64,
    pub audio_payload_bytes: usize,
    pub video_payload_bytes: usize,
    /// Jeder n-te Video-Frame ist ein Keyframe
    pub keyframe_intervall: u64,
    /// Kapazitaet der Frame-Queues zwischen den Pipeline-Stufen
    pub queue_groesse: usize,
}

impl Default for DemoEinstellungen {
    fn default() -> Self {
        Self {
            dauer_ms: 0,
            audio_intervall_ms: 20,
            video_intervall_ms: 33,
            audio_payload_bytes: 160,
            video_payload_bytes: 1200,
            keyframe_intervall: 30,
            queue_groesse: 32,
        }
    }
}

impl DemoEinstellungen {
    /// `None` wenn der Anruf bis Ctrl-C laufen soll
    pub fn dauer(&self) -> Option<Duration> {
        (self.dauer_ms > 0).then(|| Duration::from_millis(self.dauer_ms))
    }
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Logging ist hier noch nicht initialisiert
                eprintln!("Konfigurationsdatei '{pfad}' nicht gefunden, verwende Standardwerte");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft alle Werte, die erst zur Laufzeit auffallen wuerden
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.e2ee.validate()?;
        self.logging.format.parse::<LogFormat>()?;

        let demo = &self.demo;
        if demo.audio_intervall_ms == 0 || demo.video_intervall_ms == 0 {
            anyhow::bail!("Frame-Intervalle muessen groesser als 0 sein");
        }
        if demo.keyframe_intervall == 0 {
            anyhow::bail!("keyframe_intervall muss groesser als 0 sein");
        }
        if demo.queue_groesse == 0 {
            anyhow::bail!("queue_groesse muss groesser als 0 sein");
        }
        Ok(())
    }
}
