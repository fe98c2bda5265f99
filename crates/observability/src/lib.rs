//! # callveil-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON).
//! Schluesselmaterial wird nie geloggt; alle Key-Typen haben ein
//! geschwaerztes `Debug`.

pub mod logging;

pub use logging::{
    log_level_gueltig, logging_initialisieren, LogEinstellungen, LogFormat, LoggingError,
    ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};
