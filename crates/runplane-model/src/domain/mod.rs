mod id;
pub use id::{RunId, RunnerId};

mod constants;
pub use constants::{RUN_ID_PREFIX, RUNNER_ID_PREFIX};

/// Runner label a job asks for (e.g. `ubuntu-latest`).
///
/// Labels are opaque: the pool does not interpret them beyond recording
/// which label a runner was allocated for.
pub type Label = String;

/// Wall-clock instant used for every lifecycle timestamp.
pub type Timestamp = time::OffsetDateTime;

/// Current UTC time.
#[inline]
pub fn now() -> Timestamp {
    time::OffsetDateTime::now_utc()
}
