//! Run status store and the event bus behind it.
//!
//! [`RunStatusStore`] is the single writer of [`runplane_model::RunStatus`]
//! records; every mutation is broadcast on the [`EventBus`]. Observers either
//! pull snapshots or hold a self-terminating [`RunSubscription`].
mod bus;
pub use bus::EventBus;

mod store;
pub use store::{RunStatusStore, RunUpdate};

mod subscriber;
pub use subscriber::StatusSubscriber;

mod subscription;
pub use subscription::{RunSubscription, SubscriptionConfig};
