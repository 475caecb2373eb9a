use thiserror::Error;

/// Failures while configuring or installing the global logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected text, json or journald")]
    InvalidFormat(String),

    #[error("journald output requires linux")]
    JournaldNotSupported,

    #[error("journald socket unavailable: {0}")]
    JournaldInitFailed(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("unknown time zone {0:?}, expected utc or local")]
    InvalidTimeZone(String),

    #[error("bad log filter {0}")]
    InvalidLevel(String),
}

pub type LoggerResult<T> = Result<T, LoggerError>;
