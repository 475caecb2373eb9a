use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Simulated latency of each runner lifecycle step.
///
/// Values are in milliseconds so the profile can be set from config files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LatencyProfile {
    pub allocate_ms: u64,
    pub connect_ms: u64,
    pub execute_ms: u64,
}

impl LatencyProfile {
    /// No simulated latency at all.
    pub const fn instant() -> Self {
        Self {
            allocate_ms: 0,
            connect_ms: 0,
            execute_ms: 0,
        }
    }

    #[inline]
    pub fn allocate(&self) -> Duration {
        Duration::from_millis(self.allocate_ms)
    }

    #[inline]
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    #[inline]
    pub fn execute(&self) -> Duration {
        Duration::from_millis(self.execute_ms)
    }
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            allocate_ms: 100,
            connect_ms: 200,
            execute_ms: 500,
        }
    }
}

/// Suspend for `d`; zero durations return without touching the timer.
pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile() {
        let p = LatencyProfile::default();
        assert_eq!(p.allocate(), Duration::from_millis(100));
        assert_eq!(p.connect(), Duration::from_millis(200));
        assert_eq!(p.execute(), Duration::from_millis(500));
    }

    #[test]
    fn partial_deserialization_keeps_defaults() {
        let p: LatencyProfile = serde_json::from_str(r#"{"executeMs": 5}"#).unwrap();
        assert_eq!(p.allocate_ms, 100);
        assert_eq!(p.execute_ms, 5);
    }
}
