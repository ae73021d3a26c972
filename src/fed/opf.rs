//! The optimal-power-flow federate.
//!
//! Subscribes to the grid federate's full measurement set, assembles a
//! snapshot, dispatches the external OPF routine, and publishes the
//! optimized setpoints back to the feeder. The expensive pipeline sits
//! behind a [`PipelineGate`]; in the default single-shot mode only the
//! first granted step runs it and all later grants merely advance time.

use log::info;

use crate::bus::Bus;
use crate::config::FederateConfig;
use crate::fed::dispatch::{OpfSolver, OpfVariant};
use crate::fed::federate::Federate;
use crate::fed::publish::{OpfPublications, publish_opf_setpoints};
use crate::fed::snapshot::{OpfSubscriptions, assemble_grid_snapshot};
use crate::fed::timeloop::{Horizon, PipelineGate, SyncClock};
use crate::fed::PipelineError;

/// The OPF federate, generic over the bus transport and the external
/// solver routine.
pub struct OpfFederate<B: Bus, S: OpfSolver> {
    fed: Federate<B>,
    subs: OpfSubscriptions,
    pubs: OpfPublications,
    solver: S,
    variant: OpfVariant,
    gate: PipelineGate,
    steps: u64,
}

impl<B: Bus, S: OpfSolver> OpfFederate<B, S> {
    /// Creates the federate and registers its full topic set.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] on an invalid configuration or a
    /// registration failure.
    pub fn new(bus: B, config: &FederateConfig, solver: S) -> Result<Self, PipelineError> {
        let variant = config.opf_variant()?;
        let gate = PipelineGate::new(config.gate_mode()?);
        let mut fed = Federate::create(bus, &config.federate.name, config.federate.time_delta);

        let topics = &config.topics;
        let subs = OpfSubscriptions {
            topology: fed.register_subscription(topics.resolve("topology")?, "")?,
            tap_info: fed.register_subscription(topics.resolve("tap_info")?, "")?,
            cap_info: fed.register_subscription(topics.resolve("cap_info")?, "")?,
            flex_info: fed.register_subscription(topics.resolve("flex_info")?, "")?,
            voltages_real: fed.register_subscription(topics.resolve("voltages_real")?, "V")?,
            voltages_imag: fed.register_subscription(topics.resolve("voltages_imag")?, "V")?,
            powers_real: fed.register_subscription(topics.resolve("powers_real")?, "W")?,
            powers_imag: fed.register_subscription(topics.resolve("powers_imag")?, "Var")?,
            cap_powers_imag: fed
                .register_subscription(topics.resolve("cap_powers_imag")?, "Var")?,
            pv_powers_real: fed.register_subscription(topics.resolve("pv_powers_real")?, "W")?,
            pv_powers_imag: fed
                .register_subscription(topics.resolve("pv_powers_imag")?, "Var")?,
            tap_values: fed.register_subscription(topics.resolve("tap_values")?, "")?,
        };
        let pubs = OpfPublications {
            flex_p: fed.register_publication("opf_flex_powers_real")?,
            cap_q: fed.register_publication("opf_cap_powers_imag")?,
            pv_p: fed.register_publication("opf_pv_powers_real")?,
            pv_q: fed.register_publication("opf_pv_powers_imag")?,
            tap_values: fed.register_publication("opf_tap_values")?,
        };

        Ok(Self {
            fed,
            subs,
            pubs,
            solver,
            variant,
            gate,
            steps: config.federate.steps,
        })
    }

    /// Runs the federate to completion: enters execution, walks the finite
    /// target-time sequence, and tears down.
    ///
    /// # Errors
    ///
    /// The first pipeline error propagates; there is no local recovery.
    pub fn run(self) -> Result<(), PipelineError> {
        let Self {
            mut fed,
            subs,
            pubs,
            solver,
            variant,
            mut gate,
            steps,
        } = self;

        fed.enter_executing()?;
        info!("\"{}\": {variant:?} OPF over {steps} steps", fed.name());

        SyncClock::new(Horizon::Steps(steps)).run(&mut fed, |fed, granted| {
            if !gate.admit() {
                return Ok(());
            }
            let snapshot = assemble_grid_snapshot(fed, &subs)?;
            let setpoints = solver.solve(&snapshot)?;
            info!("\"{}\": optimization complete at time {granted}", fed.name());
            publish_opf_setpoints(fed, &pubs, &snapshot, &setpoints)
        })
    }
}
