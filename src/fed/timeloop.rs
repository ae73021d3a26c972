//! The time-stepped synchronization loop shared by all federates.

use log::debug;

use crate::bus::{Bus, MAX_TIME};
use crate::fed::federate::{Federate, FederateError};

/// How far a federate's loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Walk the ordered target sequence `0..n`, then drain.
    Steps(u64),
    /// Keep requesting the end-of-simulation sentinel; a grant at or past
    /// it terminates the loop.
    Unbounded,
}

/// Drives the request/grant protocol and invokes a step body.
///
/// For a finite horizon the loop never requests time out of order: for each
/// target `T` it repeatedly requests `T` until the granted time reaches
/// `T`, then runs the body exactly once for that target. The blocking
/// request is the sole suspension point and may wait arbitrarily long on
/// peer federates.
///
/// # Examples
///
/// ```
/// use gridfed::bus::loopback::LoopbackBus;
/// use gridfed::fed::{Federate, Horizon, SyncClock};
///
/// let bus = LoopbackBus::new(1);
/// let mut fed = Federate::create(bus.join("demo", 1.0), "demo", 1.0);
/// fed.enter_executing().unwrap();
///
/// let mut seen = Vec::new();
/// SyncClock::new(Horizon::Steps(3))
///     .run(&mut fed, |_, granted| -> Result<(), gridfed::fed::FederateError> {
///         seen.push(granted);
///         Ok(())
///     })
///     .unwrap();
/// assert_eq!(seen, vec![0.0, 1.0, 2.0]);
/// ```
pub struct SyncClock {
    horizon: Horizon,
}

impl SyncClock {
    pub fn new(horizon: Horizon) -> Self {
        Self { horizon }
    }

    /// Runs the loop to completion, then drains and disconnects the
    /// federate. A body error propagates immediately; the federate's drop
    /// guard still tears the connection down.
    ///
    /// # Errors
    ///
    /// Returns the first body or protocol error.
    pub fn run<B, E>(
        &self,
        fed: &mut Federate<B>,
        mut body: impl FnMut(&mut Federate<B>, f64) -> Result<(), E>,
    ) -> Result<(), E>
    where
        B: Bus,
        E: From<FederateError>,
    {
        match self.horizon {
            Horizon::Steps(n) => {
                for target in 0..n {
                    let target = target as f64;
                    while fed.granted() < target {
                        fed.request_time(target).map_err(E::from)?;
                    }
                    debug!("\"{}\": step body at time {}", fed.name(), fed.granted());
                    body(fed, fed.granted())?;
                }
            }
            Horizon::Unbounded => {
                let mut granted = fed.request_time(MAX_TIME).map_err(E::from)?;
                while granted < MAX_TIME {
                    body(fed, granted)?;
                    granted = fed.request_time(MAX_TIME).map_err(E::from)?;
                }
            }
        }
        fed.begin_draining();
        fed.disconnect().map_err(E::from)
    }
}

/// String names accepted for [`GateMode`] in configuration.
pub const GATE_MODES: &[&str] = &["single-shot", "every-grant"];

/// Whether the expensive pipeline runs on every grant or only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Only the very first admitted step runs the pipeline; later grants
    /// merely advance time.
    SingleShot,
    /// Every grant runs the pipeline.
    EveryGrant,
}

impl GateMode {
    /// Parses a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "single-shot" => Some(Self::SingleShot),
            "every-grant" => Some(Self::EveryGrant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Primed,
    Steady,
}

/// One-shot admission gate for the step body, made explicit as a
/// `Primed -> Steady` transition.
#[derive(Debug)]
pub struct PipelineGate {
    mode: GateMode,
    state: GateState,
}

impl PipelineGate {
    pub fn new(mode: GateMode) -> Self {
        Self {
            mode,
            state: GateState::Primed,
        }
    }

    /// Returns true when the pipeline should run for this grant. The first
    /// call always admits and moves the gate to `Steady`; afterwards
    /// admission depends on the mode.
    pub fn admit(&mut self) -> bool {
        match self.state {
            GateState::Primed => {
                self.state = GateState::Steady;
                true
            }
            GateState::Steady => self.mode == GateMode::EveryGrant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::loopback::LoopbackBus;

    fn executing_federate(
        name: &str,
    ) -> Federate<crate::bus::loopback::LoopbackHandle> {
        let bus = LoopbackBus::new(1);
        let mut fed = Federate::create(bus.join(name, 1.0), name, 1.0);
        fed.enter_executing().expect("enter");
        fed
    }

    #[test]
    fn finite_horizon_runs_body_once_per_target() {
        let mut fed = executing_federate("steps");
        let mut seen = Vec::new();
        SyncClock::new(Horizon::Steps(4))
            .run(&mut fed, |_, granted| -> Result<(), FederateError> {
                seen.push(granted);
                Ok(())
            })
            .expect("loop");
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(fed.state(), crate::fed::FederateState::Disconnected);
    }

    #[test]
    fn granted_times_are_monotone_non_decreasing() {
        let mut fed = executing_federate("monotone");
        let mut grants = Vec::new();
        SyncClock::new(Horizon::Steps(6))
            .run(&mut fed, |fed, _| -> Result<(), FederateError> {
                grants.push(fed.granted());
                Ok(())
            })
            .expect("loop");
        assert!(grants.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*grants.last().expect("nonempty"), 5.0);
    }

    #[test]
    fn zero_step_horizon_runs_nothing_and_still_tears_down() {
        let mut fed = executing_federate("empty");
        let mut ran = false;
        SyncClock::new(Horizon::Steps(0))
            .run(&mut fed, |_, _| -> Result<(), FederateError> {
                ran = true;
                Ok(())
            })
            .expect("loop");
        assert!(!ran);
        assert_eq!(fed.state(), crate::fed::FederateState::Disconnected);
    }

    #[test]
    fn unbounded_horizon_terminates_on_sentinel() {
        // A lone federate requesting the sentinel is granted it at once.
        let mut fed = executing_federate("sentinel");
        let mut ran = false;
        SyncClock::new(Horizon::Unbounded)
            .run(&mut fed, |_, _| -> Result<(), FederateError> {
                ran = true;
                Ok(())
            })
            .expect("loop");
        assert!(!ran);
        assert_eq!(fed.state(), crate::fed::FederateState::Disconnected);
    }

    #[test]
    fn single_shot_gate_admits_exactly_once() {
        let mut gate = PipelineGate::new(GateMode::SingleShot);
        assert!(gate.admit());
        assert!(!gate.admit());
        assert!(!gate.admit());
    }

    #[test]
    fn every_grant_gate_always_admits() {
        let mut gate = PipelineGate::new(GateMode::EveryGrant);
        assert!(gate.admit());
        assert!(gate.admit());
    }

    #[test]
    fn gate_mode_parses_config_names() {
        assert_eq!(GateMode::from_name("single-shot"), Some(GateMode::SingleShot));
        assert_eq!(GateMode::from_name("every-grant"), Some(GateMode::EveryGrant));
        assert_eq!(GateMode::from_name("bogus"), None);
    }
}
