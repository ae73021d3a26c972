//! Contract for the external time-synchronized publish/subscribe bus.
//!
//! The real transport lives outside this repository; federates drive it
//! through the [`Bus`] trait. [`loopback`] provides a purpose-built
//! in-process implementation for the fixed topic sets the federates use,
//! so the protocol can be exercised end to end in tests and the demo
//! binary. It is not a general pub/sub framework.

pub mod loopback;

use thiserror::Error;

/// End-of-simulation sentinel. Requesting it asks the bus for "as late as
/// possible"; being granted it means the federation has finished.
pub const MAX_TIME: f64 = 9_223_372_036.0;

/// Handle to a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub usize);

/// Handle to a registered publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicationId(pub usize);

/// Failure reported by the bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// Another federate already owns this publication topic.
    #[error("topic \"{0}\" already has a publisher")]
    TopicOwned(String),
    /// The handle does not belong to this connection.
    #[error("unknown subscription handle")]
    UnknownSubscription,
    /// The handle does not belong to this connection.
    #[error("unknown publication handle")]
    UnknownPublication,
    /// The connection was already torn down.
    #[error("bus connection is closed")]
    Closed,
}

/// One federate's connection to the bus.
///
/// Registration happens before [`Bus::enter_executing`]; afterwards the
/// connection exchanges data and time grants until [`Bus::disconnect`].
/// [`Bus::request_time`] is the protocol's sole suspension point and may
/// block arbitrarily long waiting on peer federates; no local timeout is
/// applied.
pub trait Bus {
    /// Declares interest in a topic. `units` is informational only.
    fn register_subscription(
        &mut self,
        topic: &str,
        units: &str,
    ) -> Result<SubscriptionId, BusError>;

    /// Claims a publication topic. At most one federate may own a topic.
    fn register_publication(&mut self, topic: &str) -> Result<PublicationId, BusError>;

    /// Blocks until the federation quorum has entered execution.
    fn enter_executing(&mut self) -> Result<(), BusError>;

    /// Blocks until the bus grants a time. The granted time is
    /// authoritative, globally monotone, and may be earlier than
    /// `requested` when peer activity wakes this federate first.
    fn request_time(&mut self, requested: f64) -> Result<f64, BusError>;

    /// Latest raw payload on a subscription, or `None` when nothing has
    /// been delivered yet. Reading clears the updated flag.
    fn latest(&mut self, subscription: SubscriptionId) -> Result<Option<String>, BusError>;

    /// True when the subscription received a payload since the last read.
    fn is_updated(&self, subscription: SubscriptionId) -> Result<bool, BusError>;

    /// Publishes a payload on an owned topic.
    fn publish(&mut self, publication: PublicationId, payload: &str) -> Result<(), BusError>;

    /// Releases all bus resources. Idempotent.
    fn disconnect(&mut self) -> Result<(), BusError>;
}
