//! Event publisher port — the outward reporting boundary.

use std::future::Future;

use ecotrv_domain::event::Event;

/// Publishes domain events toward the presentation/telemetry sink.
///
/// Publishing must never fail the producing cycle: implementations drop
/// events when nobody listens rather than surfacing an error upstream.
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: Event) -> impl Future<Output = ()> + Send;
}
