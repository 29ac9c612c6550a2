use async_trait::async_trait;
use relay_triage::RouteDecision;

/// Receives a routing decision after its task is persisted.
///
/// Delivery is best effort; the gateway does not wait on a result.
#[async_trait]
pub trait RoutingNotifier: Send + Sync {
    async fn notify(&self, decision: &RouteDecision);
}
