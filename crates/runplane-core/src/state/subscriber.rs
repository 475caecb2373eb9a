use async_trait::async_trait;
use runplane_model::RunStatus;

/// In-process consumer of run status broadcasts.
///
/// Attached with [`crate::EventBus::attach`]; each subscriber gets its own
/// worker and receive buffer, so a slow subscriber never stalls the publisher
/// or its peers.
#[async_trait]
pub trait StatusSubscriber: Send + Sync + 'static {
    /// Handle one broadcast status.
    async fn on_status(&self, status: &RunStatus);

    /// Subscriber name used in logs.
    fn name(&self) -> &'static str;
}
