//! Callveil-Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt den
//! Loopback-Anruf aus.

use anyhow::Result;
use callveil_node::{anruf_ausfuehren, config::NodeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("CALLVEIL_CONFIG").unwrap_or_else(|_| "callveil.toml".into());

    let config = NodeConfig::laden(&config_pfad)?;
    config.validieren()?;

    callveil_observability::logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Callveil-Knoten wird initialisiert"
    );

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
            std::future::pending::<()>().await;
        }
    };
    anruf_ausfuehren(&config, ctrl_c).await?;

    Ok(())
}
