use log::{debug, info, warn};
use thiserror::Error;

use crate::bus::{Bus, BusError, PublicationId, SubscriptionId};

/// Connection state of a federate.
///
/// Registration is only legal in `Initializing`; data exchange only in
/// `Executing`. `Draining` covers the window between the last processed
/// grant and teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FederateState {
    /// Identity exists but the bus connection is not established yet.
    #[default]
    Created,
    /// Connected; subscriptions and publications may be registered.
    Initializing,
    /// Time grants and data exchange are live.
    Executing,
    /// Loop finished; no further time requests will be made.
    Draining,
    /// Bus resources released. Terminal.
    Disconnected,
}

/// A registered subscription: read-only mirror of a bus topic.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    /// Bus topic this subscription mirrors.
    pub topic: String,
    /// Declared unit, informational only.
    pub units: String,
}

/// A registered publication: write-only handle to an owned topic.
#[derive(Debug, Clone)]
pub struct Publication {
    pub(crate) id: PublicationId,
    /// Owned bus topic.
    pub topic: String,
}

/// Lifecycle or protocol failure of a federate.
#[derive(Debug, Error)]
pub enum FederateError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("\"{name}\": cannot {action} in state {state:?}")]
    InvalidState {
        name: String,
        action: &'static str,
        state: FederateState,
    },
    #[error("\"{name}\": time request {requested} precedes earlier request {previous}")]
    TimeRegression {
        name: String,
        requested: f64,
        previous: f64,
    },
    #[error("subscription \"{0}\" has not delivered a value yet")]
    MissingPayload(String),
}

/// One participant in the co-simulation.
///
/// Owns its subscription and publication sets exclusively and tracks the
/// `(requested, granted)` time pair. All bus interaction flows through this
/// struct; the blocking [`Federate::request_time`] call is the only
/// suspension point.
///
/// Teardown is guaranteed on every exit path: [`Federate::disconnect`] is
/// idempotent and also invoked from `Drop`, so an error unwinding out of a
/// step body still releases the bus resources.
pub struct Federate<B: Bus> {
    bus: B,
    name: String,
    time_delta: f64,
    state: FederateState,
    requested: f64,
    granted: f64,
}

impl<B: Bus> Federate<B> {
    /// Creates a federate on an established bus connection.
    ///
    /// The federate starts in `Initializing`, ready for registration.
    pub fn create(bus: B, name: &str, time_delta: f64) -> Self {
        info!("federate \"{name}\" created (delta {time_delta})");
        Self {
            bus,
            name: name.to_string(),
            time_delta,
            state: FederateState::Initializing,
            requested: 0.0,
            granted: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FederateState {
        self.state
    }

    /// Declared time-step granularity.
    pub fn time_delta(&self) -> f64 {
        self.time_delta
    }

    /// Latest granted simulated time.
    pub fn granted(&self) -> f64 {
        self.granted
    }

    /// Registers a subscription. Only legal in `Initializing`.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::InvalidState`] outside `Initializing`, or a
    /// bus error.
    pub fn register_subscription(
        &mut self,
        topic: &str,
        units: &str,
    ) -> Result<Subscription, FederateError> {
        self.ensure_state(FederateState::Initializing, "register subscription")?;
        let id = self.bus.register_subscription(topic, units)?;
        info!("\"{}\": subscribed to \"{topic}\"", self.name);
        Ok(Subscription {
            id,
            topic: topic.to_string(),
            units: units.to_string(),
        })
    }

    /// Registers a publication. Only legal in `Initializing`.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::InvalidState`] outside `Initializing`, or a
    /// bus error (the topic may already be owned).
    pub fn register_publication(&mut self, topic: &str) -> Result<Publication, FederateError> {
        self.ensure_state(FederateState::Initializing, "register publication")?;
        let id = self.bus.register_publication(topic)?;
        info!("\"{}\": publication \"{topic}\" registered", self.name);
        Ok(Publication {
            id,
            topic: topic.to_string(),
        })
    }

    /// Enters execution. Blocks until the federation quorum is ready; no
    /// registration is possible afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::InvalidState`] outside `Initializing`, or a
    /// bus error.
    pub fn enter_executing(&mut self) -> Result<(), FederateError> {
        self.ensure_state(FederateState::Initializing, "enter executing")?;
        self.bus.enter_executing()?;
        self.state = FederateState::Executing;
        info!("\"{}\": entered execution mode", self.name);
        Ok(())
    }

    /// Requests simulated time `requested` and blocks until the bus grants
    /// a time. Granted time is authoritative and monotone; requests must
    /// never decrease.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::TimeRegression`] on an out-of-order
    /// request, [`FederateError::InvalidState`] outside `Executing`, or a
    /// bus error.
    pub fn request_time(&mut self, requested: f64) -> Result<f64, FederateError> {
        self.ensure_state(FederateState::Executing, "request time")?;
        if requested < self.requested {
            return Err(FederateError::TimeRegression {
                name: self.name.clone(),
                requested,
                previous: self.requested,
            });
        }
        self.requested = requested;
        debug!("\"{}\": requesting time {requested}", self.name);
        let granted = self.bus.request_time(requested)?;
        debug_assert!(granted >= self.granted, "granted time went backwards");
        self.granted = granted;
        debug!("\"{}\": granted time {granted}", self.name);
        Ok(granted)
    }

    /// Latest payload on a subscription, clearing its updated flag.
    ///
    /// # Errors
    ///
    /// Returns a bus error on an invalid handle.
    pub fn latest(&mut self, subscription: &Subscription) -> Result<Option<String>, FederateError> {
        Ok(self.bus.latest(subscription.id)?)
    }

    /// Latest payload on a subscription, requiring that one has been
    /// delivered. Reading before the first delivery is a precondition
    /// violation, not a silently defaulted value.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::MissingPayload`] when nothing has arrived.
    pub fn require_latest(&mut self, subscription: &Subscription) -> Result<String, FederateError> {
        self.latest(subscription)?
            .ok_or_else(|| FederateError::MissingPayload(subscription.topic.clone()))
    }

    /// True when the subscription received a payload since the last read.
    pub fn is_updated(&self, subscription: &Subscription) -> Result<bool, FederateError> {
        Ok(self.bus.is_updated(subscription.id)?)
    }

    /// Publishes a payload. Legal in `Initializing` (initialization-phase
    /// exchange, delivered at execution entry) and `Executing`.
    ///
    /// # Errors
    ///
    /// Returns [`FederateError::InvalidState`] in other states, or a bus
    /// error.
    pub fn publish(
        &mut self,
        publication: &Publication,
        payload: &str,
    ) -> Result<(), FederateError> {
        match self.state {
            FederateState::Initializing | FederateState::Executing => {}
            state => {
                return Err(FederateError::InvalidState {
                    name: self.name.clone(),
                    action: "publish",
                    state,
                });
            }
        }
        self.bus.publish(publication.id, payload)?;
        debug!("\"{}\": published on \"{}\"", self.name, publication.topic);
        Ok(())
    }

    /// Marks the loop finished; no further time requests will be made.
    pub fn begin_draining(&mut self) {
        if self.state == FederateState::Executing {
            self.state = FederateState::Draining;
        }
    }

    /// Releases all bus resources. Idempotent; safe on every exit path.
    ///
    /// # Errors
    ///
    /// Returns a bus error if the transport fails to tear down.
    pub fn disconnect(&mut self) -> Result<(), FederateError> {
        if self.state == FederateState::Disconnected {
            return Ok(());
        }
        self.bus.disconnect()?;
        self.state = FederateState::Disconnected;
        info!("federate \"{}\" disconnected", self.name);
        Ok(())
    }

    fn ensure_state(
        &self,
        expected: FederateState,
        action: &'static str,
    ) -> Result<(), FederateError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FederateError::InvalidState {
                name: self.name.clone(),
                action,
                state: self.state,
            })
        }
    }
}

impl<B: Bus> Drop for Federate<B> {
    fn drop(&mut self) {
        if self.state == FederateState::Disconnected {
            return;
        }
        if let Err(e) = self.disconnect() {
            warn!("federate \"{}\": teardown failed: {e}", self.name);
        }
    }
}
