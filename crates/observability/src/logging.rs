//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `CV_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `callveil_crypto=trace`)
//! - `CV_LOG_FORMAT`: Format (text/json)

use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "CV_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CV_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unbekanntes Log-Format '{0}' (erlaubt: text, json)")]
    UnbekanntesFormat(String),

    #[error("Ungueltige Filter-Direktive '{0}'")]
    UngueltigerFilter(String),

    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::UnbekanntesFormat(other.to_string())),
        }
    }
}

/// Effektive Einstellungen nach Anwendung der Umgebungsvariablen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEinstellungen {
    pub filter: String,
    pub format: LogFormat,
}

impl LogEinstellungen {
    /// Kombiniert konfigurierte Werte mit optionalen Umgebungswerten
    ///
    /// Leere Umgebungswerte zaehlen als nicht gesetzt.
    pub fn aufloesen(
        level: &str,
        format: &str,
        env_level: Option<String>,
        env_format: Option<String>,
    ) -> Result<Self, LoggingError> {
        let filter = env_level
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| level.to_string());
        let format = match env_format.filter(|v| !v.trim().is_empty()) {
            Some(v) => v.parse()?,
            None => format.parse()?,
        };
        Ok(Self { filter, format })
    }

    /// Liest `CV_LOG_LEVEL` und `CV_LOG_FORMAT` aus der Prozess-Umgebung
    pub fn aus_umgebung(level: &str, format: &str) -> Result<Self, LoggingError> {
        Self::aufloesen(
            level,
            format,
            std::env::var(ENV_LOG_LEVEL).ok(),
            std::env::var(ENV_LOG_FORMAT).ok(),
        )
    }
}

/// Initialisiert das globale Logging
///
/// `level` und `format` stammen aus der Konfiguration; die Umgebung hat
/// Vorrang. Darf nur einmal pro Prozess aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<LogEinstellungen, LoggingError> {
    let einstellungen = LogEinstellungen::aus_umgebung(level, format)?;
    let filter = EnvFilter::try_new(&einstellungen.filter)
        .map_err(|_| LoggingError::UngueltigerFilter(einstellungen.filter.clone()))?;

    let ergebnis = match einstellungen.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|_| LoggingError::BereitsInitialisiert)?;

    tracing::debug!(filter = %einstellungen.filter, format = ?einstellungen.format, "Logging initialisiert");
    Ok(einstellungen)
}

/// Prueft einen einfachen Level-Namen (ohne Modul-Direktiven)
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_namen() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::UnbekanntesFormat(_))
        ));
    }

    #[test]
    fn konfiguration_ohne_umgebung() {
        let e = LogEinstellungen::aufloesen("debug", "json", None, None).unwrap();
        assert_eq!(e.filter, "debug");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let e = LogEinstellungen::aufloesen(
            "info",
            "text",
            Some("callveil_crypto=trace".into()),
            Some("json".into()),
        )
        .unwrap();
        assert_eq!(e.filter, "callveil_crypto=trace");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn leere_umgebung_wird_ignoriert() {
        let e = LogEinstellungen::aufloesen("warn", "text", Some(" ".into()), Some(String::new()))
            .unwrap();
        assert_eq!(e.filter, "warn");
        assert_eq!(e.format, LogFormat::Text);
    }

    #[test]
    fn ungueltiges_format_aus_umgebung() {
        assert!(LogEinstellungen::aufloesen("info", "text", None, Some("yaml".into())).is_err());
    }
}
