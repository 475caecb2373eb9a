use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::LoggerError;

/// Validated `EnvFilter` expression, e.g. `"info"` or
/// `"runplane_core=debug,tower_http=warn,info"`.
///
/// ```
/// use runplane_observe::LoggerLevel;
///
/// let lvl: LoggerLevel = "runplane_core=trace,info".parse().unwrap();
/// assert_eq!(lvl.as_str(), "runplane_core=trace,info");
/// assert!("runplane_core=loud".parse::<LoggerLevel>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(s: impl Into<String>) -> Result<Self, LoggerError> {
        Self::try_from(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the filter. Falls back to `info` should the expression stop
    /// parsing, which construction already rules out.
    pub fn to_env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.as_str()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for LoggerLevel {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match EnvFilter::try_new(&s) {
            Ok(_) => Ok(LoggerLevel(s)),
            Err(e) => Err(LoggerError::InvalidLevel(format!("{s}: {e}"))),
        }
    }
}

impl From<LoggerLevel> for String {
    fn from(l: LoggerLevel) -> Self {
        l.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directives() {
        for lvl in ["info", "warn", "trace", "runplane_core=debug,runplane_api=trace,info"] {
            assert!(lvl.parse::<LoggerLevel>().is_ok(), "{lvl} must parse");
        }
    }

    #[test]
    fn rejects_unknown_levels() {
        for lvl in ["my_crate=lol", "runplane_core=verbose", "a=trace,b=wat"] {
            assert!(
                matches!(lvl.parse::<LoggerLevel>(), Err(LoggerError::InvalidLevel(_))),
                "{lvl} must be rejected"
            );
        }
    }

    #[test]
    fn serde_goes_through_validation() {
        let lvl: LoggerLevel = serde_json::from_str(r#""debug""#).unwrap();
        assert_eq!(lvl.as_str(), "debug");
        assert!(serde_json::from_str::<LoggerLevel>(r#""x=nope""#).is_err());
    }

    #[test]
    fn default_is_info() {
        assert_eq!(LoggerLevel::default().as_str(), "info");
        let _ = LoggerLevel::default().to_env_filter();
    }
}
