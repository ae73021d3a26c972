//! Interfaces to the external optimization routines.
//!
//! The numerical solvers live outside this repository; federates invoke
//! them through these traits. Failure is not handled locally: a solver
//! error terminates the federate. The `Echo*` implementations are
//! deterministic placeholders used by tests and the demo binary.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::fed::snapshot::{BranchMap, BusMap, GridSnapshot};
use crate::wire::LabelledVector;

/// Opaque failure from an external routine.
#[derive(Debug, Error)]
#[error("solver failure: {0}")]
pub struct SolverError(pub String);

/// String names accepted for [`ControlType`] in configuration.
pub const CONTROL_TYPES: &[&str] = &["watt", "var", "watt_var"];

/// Which physical quantity the controller may adjust per inverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Watt,
    Var,
    WattVar,
}

impl ControlType {
    /// Parses a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "watt" => Some(Self::Watt),
            "var" => Some(Self::Var),
            "watt_var" => Some(Self::WattVar),
            _ => None,
        }
    }
}

/// String names accepted for [`OpfVariant`] in configuration.
pub const OPF_VARIANTS: &[&str] = &["centralized", "distributed"];

/// Which external OPF formulation is dispatched. The choice is baked in at
/// construction; the dispatcher itself never branches between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpfVariant {
    Centralized,
    Distributed,
}

impl OpfVariant {
    /// Parses a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "centralized" => Some(Self::Centralized),
            "distributed" => Some(Self::Distributed),
            _ => None,
        }
    }
}

/// Named setpoint vectors produced by the OPF routine, each parallel to the
/// corresponding equipment model's `names`. Tap positions are computed and
/// carried but not re-published; see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub struct OpfSetpoints {
    /// Flexible-load active power (W).
    pub flex_p: Vec<f64>,
    /// Capacitor reactive power (Var).
    pub cap_q: Vec<f64>,
    /// PV active power (W).
    pub pv_p: Vec<f64>,
    /// PV reactive power (Var).
    pub pv_q: Vec<f64>,
    /// Transformer tap positions.
    pub tap: Vec<f64>,
}

/// External optimal-power-flow routine.
pub trait OpfSolver {
    /// Solves against a full grid snapshot.
    ///
    /// # Errors
    ///
    /// Any [`SolverError`] propagates and terminates the federate.
    fn solve(&self, snapshot: &GridSnapshot) -> Result<OpfSetpoints, SolverError>;
}

/// Diagnostics the caller carries but does not interpret.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LdfDiagnostics {
    pub iterations: usize,
    pub objective: f64,
}

/// Output of the localized linear-power-flow routine.
#[derive(Debug, Clone, PartialEq)]
pub struct LdfSolution {
    /// Updated voltage magnitudes per area node.
    pub voltages: LabelledVector,
    /// Per-branch power flows.
    pub power_flow: LabelledVector,
    /// Raw control setpoints keyed by area node id.
    pub setpoints: BTreeMap<String, f64>,
    pub diagnostics: LdfDiagnostics,
}

/// External LinDistFlow routine plus the area partitioner it relies on.
pub trait LdfSolver {
    /// Partitions the network into the single area rooted at `slack_bus`.
    ///
    /// # Errors
    ///
    /// Any [`SolverError`] propagates and terminates the federate.
    fn partition(
        &self,
        branch: &BranchMap,
        bus: &BusMap,
        slack_bus: &str,
    ) -> Result<(BranchMap, BusMap), SolverError>;

    /// Solves the localized optimal power flow over one area.
    ///
    /// # Errors
    ///
    /// Any [`SolverError`] propagates and terminates the federate.
    fn optimal_power_flow(
        &self,
        area_branch: &BranchMap,
        area_bus: &BusMap,
        slack_bus: &str,
        control: ControlType,
        enforce_power_factor: bool,
    ) -> Result<LdfSolution, SolverError>;
}

/// Placeholder OPF routine: echoes each equipment class's current operating
/// values back as its setpoints. Deterministic by construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoOpfSolver;

impl OpfSolver for EchoOpfSolver {
    fn solve(&self, snapshot: &GridSnapshot) -> Result<OpfSetpoints, SolverError> {
        Ok(OpfSetpoints {
            flex_p: snapshot.flex_info.values.clone(),
            cap_q: snapshot.cap_info.values.clone(),
            pv_p: snapshot.pv_p.values.clone(),
            pv_q: snapshot.pv_q.values.clone(),
            tap: snapshot.tap_info.values.clone(),
        })
    }
}

/// Placeholder LinDistFlow routine: the whole network is one area, measured
/// voltages pass through unchanged, and each equipped node's setpoint
/// echoes its current injection in the controlled quantity.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoLdfSolver;

impl LdfSolver for EchoLdfSolver {
    fn partition(
        &self,
        branch: &BranchMap,
        bus: &BusMap,
        slack_bus: &str,
    ) -> Result<(BranchMap, BusMap), SolverError> {
        let rooted = bus
            .keys()
            .any(|node| node.split_once('.').is_some_and(|(b, _)| b == slack_bus));
        if !rooted {
            return Err(SolverError(format!(
                "slack bus \"{slack_bus}\" is not part of the network"
            )));
        }
        Ok((branch.clone(), bus.clone()))
    }

    fn optimal_power_flow(
        &self,
        area_branch: &BranchMap,
        area_bus: &BusMap,
        _slack_bus: &str,
        control: ControlType,
        _enforce_power_factor: bool,
    ) -> Result<LdfSolution, SolverError> {
        let mut ids = Vec::with_capacity(area_bus.len());
        let mut values = Vec::with_capacity(area_bus.len());
        let mut setpoints = BTreeMap::new();
        for (node, record) in area_bus {
            ids.push(node.clone());
            values.push(record.voltage_mag.unwrap_or(record.base_voltage));
            if record.eqid.is_some() {
                let setpoint = match control {
                    ControlType::Watt | ControlType::WattVar => record.p,
                    ControlType::Var => record.q,
                };
                setpoints.insert(node.clone(), setpoint);
            }
        }
        let voltages = LabelledVector::new(values, ids, "V")
            .map_err(|e| SolverError(format!("voltage assembly: {e}")))?;
        let power_flow = LabelledVector::new(
            vec![0.0; area_branch.len()],
            area_branch.keys().cloned().collect(),
            "W",
        )
        .map_err(|e| SolverError(format!("flow assembly: {e}")))?;
        Ok(LdfSolution {
            voltages,
            power_flow,
            setpoints,
            diagnostics: LdfDiagnostics {
                iterations: 1,
                objective: 0.0,
            },
        })
    }
}
