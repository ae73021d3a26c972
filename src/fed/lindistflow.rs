//! The localized LinDistFlow controller federate.
//!
//! Unbounded horizon: the federate keeps requesting the end-of-simulation
//! sentinel and runs its pipeline whenever the voltage-magnitude
//! subscription has fresh data. Each run rebuilds the area from scratch;
//! nothing is cached between steps.

use log::{debug, info};

use crate::bus::Bus;
use crate::config::FederateConfig;
use crate::fed::PipelineError;
use crate::fed::dispatch::{ControlType, LdfSolver};
use crate::fed::federate::{Federate, Publication, Subscription};
use crate::fed::publish::inverter_commands;
use crate::fed::snapshot::{extract_network, fold_injection, fold_voltages, parse_slack};
use crate::fed::timeloop::{Horizon, SyncClock};
use crate::wire::{CommandList, Injection, LabelledVector, Topology};

/// The localized controller's subscription set.
pub struct LdfSubscriptions {
    pub topology: Subscription,
    pub voltages_magnitude: Subscription,
    pub injections: Subscription,
}

/// The localized controller's publication set.
pub struct LdfPublications {
    pub commands: Publication,
    pub voltages: Publication,
}

/// The LinDistFlow federate, generic over the bus transport and the
/// external solver routine.
pub struct LdfFederate<B: Bus, S: LdfSolver> {
    fed: Federate<B>,
    subs: LdfSubscriptions,
    pubs: LdfPublications,
    solver: S,
    control: ControlType,
    enforce_power_factor: bool,
}

impl<B: Bus, S: LdfSolver> LdfFederate<B, S> {
    /// Creates the federate and registers its topic set.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] on an invalid configuration or a
    /// registration failure.
    pub fn new(bus: B, config: &FederateConfig, solver: S) -> Result<Self, PipelineError> {
        let control = config.control_type()?;
        let mut fed = Federate::create(bus, &config.federate.name, config.federate.time_delta);
        let topics = &config.topics;
        let subs = LdfSubscriptions {
            topology: fed.register_subscription(topics.resolve("topology")?, "")?,
            voltages_magnitude: fed
                .register_subscription(topics.resolve("voltages_magnitude")?, "")?,
            injections: fed.register_subscription(topics.resolve("injections")?, "")?,
        };
        let pubs = LdfPublications {
            commands: fed.register_publication("change_commands")?,
            voltages: fed.register_publication("opf_voltages_magnitude")?,
        };
        Ok(Self {
            fed,
            subs,
            pubs,
            solver,
            control,
            enforce_power_factor: config.control.enforce_power_factor,
        })
    }

    /// Runs the federate until the bus signals end of simulation, then
    /// tears down.
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
            control,
            enforce_power_factor,
        } = self;

        fed.enter_executing()?;
        info!("\"{}\": {control:?} control live", fed.name());

        SyncClock::new(Horizon::Unbounded).run(&mut fed, |fed, granted| {
            if !fed.is_updated(&subs.voltages_magnitude)? {
                debug!("\"{}\": no fresh voltages at {granted}", fed.name());
                return Ok(());
            }

            let topology = Topology::from_json(&fed.require_latest(&subs.topology)?)?;
            let (branch, bus) = extract_network(&topology);
            let slack_bus = parse_slack(&topology)?;

            let (area_branch, mut area_bus) = solver.partition(&branch, &bus, &slack_bus)?;

            let voltages =
                LabelledVector::from_json(&fed.require_latest(&subs.voltages_magnitude)?)?;
            let injection = Injection::from_json(&fed.require_latest(&subs.injections)?)?;
            fold_voltages(&mut area_bus, &voltages);
            fold_injection(&mut area_bus, &injection);

            let solution = solver.optimal_power_flow(
                &area_branch,
                &area_bus,
                &slack_bus,
                control,
                enforce_power_factor,
            )?;
            debug!(
                "\"{}\": solve at {granted} took {} iterations",
                fed.name(),
                solution.diagnostics.iterations
            );

            let commands = inverter_commands(solution.setpoints, &area_bus);
            info!(
                "\"{}\": {} inverter commands at {granted}",
                fed.name(),
                commands.len()
            );
            fed.publish(&pubs.commands, &CommandList(commands).to_json()?)?;
            fed.publish(&pubs.voltages, &solution.voltages.to_json()?)?;
            Ok(())
        })
    }
}
