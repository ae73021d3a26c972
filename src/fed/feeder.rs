//! Synthetic grid federate.
//!
//! Stands in for the external distribution feeder during demos and tests:
//! publishes a small fixed network (topology, equipment models) once during
//! initialization, then noisy measurements on every granted step. The
//! initialization-phase publishes are delivered at execution entry, so
//! consumers can assemble a snapshot on their very first step.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bus::Bus;
use crate::fed::PipelineError;
use crate::fed::federate::{Federate, Publication};
use crate::fed::timeloop::{Horizon, SyncClock};
use crate::wire::topology::Admittance;
use crate::wire::{
    ComplexPair, EquipmentModelInfo, EquipmentNodeVector, Injection, LabelledVector,
    MeasurementRow, Topology, WireError,
};

/// Parameters of the synthetic three-node feeder.
#[derive(Debug, Clone)]
pub struct FeederProfile {
    /// Seed for the measurement noise generator.
    pub seed: u64,
    /// Relative noise amplitude on published measurements.
    pub noise: f64,
    /// Nominal load active power (W).
    pub load_p: f64,
    /// Nominal PV active power (W).
    pub pv_p: f64,
}

impl Default for FeederProfile {
    fn default() -> Self {
        Self {
            seed: 42,
            noise: 0.05,
            load_p: 1800.0,
            pv_p: 500.0,
        }
    }
}

impl FeederProfile {
    /// Node ids of the synthetic network, slack first.
    pub fn node_ids(&self) -> Vec<String> {
        vec!["src.1".into(), "mid.1".into(), "pv.1".into()]
    }

    /// Flexible-load equipment names.
    pub fn flex_names(&self) -> Vec<String> {
        vec!["Load.f1".into()]
    }

    /// Capacitor equipment names.
    pub fn cap_names(&self) -> Vec<String> {
        vec!["Capacitor.c1".into()]
    }

    /// Tap regulator equipment names.
    pub fn tap_names(&self) -> Vec<String> {
        vec!["RegControl.t1".into()]
    }

    /// PV system equipment names.
    pub fn pv_names(&self) -> Vec<String> {
        vec!["PVSystem.pv1".into()]
    }

    fn topology(&self) -> Topology {
        let y = |real: f64, imag: f64| ComplexPair { real, imag };
        let z = || y(0.0, 0.0);
        Topology {
            admittance: Admittance {
                admittance_matrix: vec![
                    vec![y(4.0, -2.0), y(-4.0, 2.0), z()],
                    vec![y(-4.0, 2.0), y(8.0, -4.0), y(-4.0, 2.0)],
                    vec![z(), y(-4.0, 2.0), y(4.0, -2.0)],
                ],
            },
            base_voltage_magnitudes: LabelledVector {
                values: vec![2400.0, 2400.0, 2400.0],
                ids: self.node_ids(),
                units: "V".into(),
            },
            base_voltage_angles: LabelledVector {
                values: vec![0.0, 0.0, 0.0],
                ids: self.node_ids(),
                units: "rad".into(),
            },
            slack_bus: vec!["src.1".into()],
        }
    }
}

struct FeederPublications {
    topology: Publication,
    tap_info: Publication,
    cap_info: Publication,
    flex_info: Publication,
    voltages_real: Publication,
    voltages_imag: Publication,
    voltages_magnitude: Publication,
    powers_real: Publication,
    powers_imag: Publication,
    cap_powers_imag: Publication,
    pv_powers_real: Publication,
    pv_powers_imag: Publication,
    tap_values: Publication,
    injections: Publication,
    load_powers: Publication,
}

/// The synthetic feeder federate.
pub struct FeederFederate<B: Bus> {
    fed: Federate<B>,
    pubs: FeederPublications,
    profile: FeederProfile,
    rng: StdRng,
    steps: u64,
}

impl<B: Bus> FeederFederate<B> {
    /// Creates the feeder, registers its topic set, and publishes the
    /// initial payloads during initialization.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] on a registration or encoding failure.
    pub fn new(bus: B, profile: &FeederProfile, steps: u64) -> Result<Self, PipelineError> {
        let mut fed = Federate::create(bus, "feeder", 1.0);
        let pubs = FeederPublications {
            topology: fed.register_publication("topology")?,
            tap_info: fed.register_publication("tap_info")?,
            cap_info: fed.register_publication("cap_info")?,
            flex_info: fed.register_publication("flex_info")?,
            voltages_real: fed.register_publication("voltages_real")?,
            voltages_imag: fed.register_publication("voltages_imag")?,
            voltages_magnitude: fed.register_publication("voltages_magnitude")?,
            powers_real: fed.register_publication("powers_real")?,
            powers_imag: fed.register_publication("powers_imag")?,
            cap_powers_imag: fed.register_publication("cap_powers_imag")?,
            pv_powers_real: fed.register_publication("pv_powers_real")?,
            pv_powers_imag: fed.register_publication("pv_powers_imag")?,
            tap_values: fed.register_publication("tap_values")?,
            injections: fed.register_publication("injections")?,
            load_powers: fed.register_publication("load_powers")?,
        };
        let mut feeder = Self {
            fed,
            pubs,
            profile: profile.clone(),
            rng: StdRng::seed_from_u64(profile.seed),
            steps,
        };
        feeder.publish_network()?;
        feeder.publish_measurements()?;
        info!("feeder: initial payload set published");
        Ok(feeder)
    }

    /// Runs the feeder over its finite horizon, publishing fresh
    /// measurements on every granted step, then tears down.
    ///
    /// # Errors
    ///
    /// The first pipeline error propagates.
    pub fn run(self) -> Result<(), PipelineError> {
        let Self {
            mut fed,
            pubs,
            profile,
            mut rng,
            steps,
        } = self;
        fed.enter_executing()?;
        SyncClock::new(Horizon::Steps(steps)).run(&mut fed, |fed, _granted| {
            Self::publish_measurements_inner(fed, &pubs, &profile, &mut rng)
        })
    }

    fn publish_network(&mut self) -> Result<(), PipelineError> {
        let topology = self.profile.topology();
        self.fed
            .publish(&self.pubs.topology, &topology.to_json()?)?;

        let model = |names: Vec<String>, values: Vec<f64>| EquipmentModelInfo {
            adj_matrix: vec![vec![0.0, 1.0, 0.0]; names.len()],
            values,
            names,
        };
        let tap = model(self.profile.tap_names(), vec![1.0]);
        let cap = model(self.profile.cap_names(), vec![300.0]);
        let flex = model(self.profile.flex_names(), vec![self.profile.load_p]);
        self.fed.publish(&self.pubs.tap_info, &tap.to_json()?)?;
        self.fed.publish(&self.pubs.cap_info, &cap.to_json()?)?;
        self.fed.publish(&self.pubs.flex_info, &flex.to_json()?)?;
        Ok(())
    }

    fn publish_measurements(&mut self) -> Result<(), PipelineError> {
        Self::publish_measurements_inner(&mut self.fed, &self.pubs, &self.profile, &mut self.rng)
    }

    fn publish_measurements_inner(
        fed: &mut Federate<B>,
        pubs: &FeederPublications,
        profile: &FeederProfile,
        rng: &mut StdRng,
    ) -> Result<(), PipelineError> {
        let mut jitter = |base: f64| base * (1.0 + rng.random_range(-profile.noise..profile.noise));

        let nodes = profile.node_ids();
        let load_p = jitter(profile.load_p);
        let load_q = jitter(profile.load_p * 0.2);
        let pv_p = jitter(profile.pv_p);
        let pv_q = jitter(profile.pv_p * 0.1);
        let v_mid = jitter(2390.0);
        let v_pv = jitter(2385.0);

        let vector = |values: Vec<f64>, ids: Vec<String>, units: &str| {
            Ok::<_, PipelineError>(LabelledVector::new(values, ids, units)?)
        };

        let voltages_real = vector(vec![2400.0, v_mid, v_pv], nodes.clone(), "V")?;
        let voltages_imag = vector(vec![0.0, -12.0, -15.0], nodes.clone(), "V")?;
        let voltages_magnitude = vector(vec![2400.0, v_mid, v_pv], nodes.clone(), "V")?;
        let powers_real = vector(vec![0.0, load_p, -pv_p], nodes.clone(), "W")?;
        let powers_imag = vector(vec![0.0, load_q, -pv_q], nodes.clone(), "Var")?;
        let cap_q = vector(vec![300.0], profile.cap_names(), "Var")?;
        let pv_powers_real = vector(vec![pv_p], profile.pv_names(), "W")?;
        let pv_powers_imag = vector(vec![pv_q], profile.pv_names(), "Var")?;
        let tap_values = vector(vec![1.0], profile.tap_names(), "-")?;

        let injections = Injection {
            power_real: EquipmentNodeVector {
                values: vec![load_p, -pv_p],
                ids: vec!["mid.1".into(), "pv.1".into()],
                equipment_ids: vec!["Load.f1".into(), "PVSystem.pv1".into()],
                units: "W".into(),
            },
            power_imag: EquipmentNodeVector {
                values: vec![load_q, -pv_q],
                ids: vec!["mid.1".into(), "pv.1".into()],
                equipment_ids: vec!["Load.f1".into(), "PVSystem.pv1".into()],
                units: "Var".into(),
            },
        };

        let rows = vec![
            MeasurementRow("Load.f1".into(), load_p, load_q),
            MeasurementRow("PVSystem.pv1".into(), -pv_p, -pv_q),
        ];

        fed.publish(&pubs.voltages_real, &voltages_real.to_json()?)?;
        fed.publish(&pubs.voltages_imag, &voltages_imag.to_json()?)?;
        fed.publish(&pubs.voltages_magnitude, &voltages_magnitude.to_json()?)?;
        fed.publish(&pubs.powers_real, &powers_real.to_json()?)?;
        fed.publish(&pubs.powers_imag, &powers_imag.to_json()?)?;
        fed.publish(&pubs.cap_powers_imag, &cap_q.to_json()?)?;
        fed.publish(&pubs.pv_powers_real, &pv_powers_real.to_json()?)?;
        fed.publish(&pubs.pv_powers_imag, &pv_powers_imag.to_json()?)?;
        fed.publish(&pubs.tap_values, &tap_values.to_json()?)?;
        fed.publish(&pubs.injections, &injections.to_json()?)?;
        let rows_json = serde_json::to_string(&rows).map_err(WireError::from)?;
        fed.publish(&pubs.load_powers, &rows_json)?;
        Ok(())
    }
}
