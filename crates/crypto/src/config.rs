//! E2EE-Konfiguration
//!
//! Alle Felder haben Standardwerte, sodass eine leere `[e2ee]`-Sektion
//! gueltig ist. `validate` muss beim Start aufgerufen werden.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Standard-Rotationsintervall: 5 Minuten
pub const DEFAULT_ROTATION_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Verhalten bei einem Krypto-Fehler in einem einzelnen Frame
///
/// Sicherheitsrelevant: `PassThrough` leitet den Frame unveraendert weiter,
/// opfert also die Vertraulichkeit dieses Frames fuer die Verfuegbarkeit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    PassThrough,
    Drop,
}

/// Einstellungen des E2EE-Kerns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eeConfig {
    /// Intervall der Schluessel-Rotation in Millisekunden
    pub rotation_interval_ms: u64,
    /// Verhalten bei Frame-Fehlern
    pub failure_policy: FailurePolicy,
    /// Maximale Wartezeit auf den ausgehenden Sink in Millisekunden
    pub sink_timeout_ms: u64,
}

impl Default for E2eeConfig {
    fn default() -> Self {
        Self {
            rotation_interval_ms: DEFAULT_ROTATION_INTERVAL_MS,
            failure_policy: FailurePolicy::PassThrough,
            sink_timeout_ms: 1000,
        }
    }
}

impl E2eeConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.rotation_interval_ms == 0 {
            return Err(ConfigurationError::InvalidRotationInterval(
                self.rotation_interval_ms,
            ));
        }
        if self.sink_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidSinkTimeout(self.sink_timeout_ms));
        }
        Ok(())
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}
