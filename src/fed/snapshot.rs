//! Assembles subscription payloads into per-step solver inputs.
//!
//! A snapshot is built fresh on every step that runs the pipeline and
//! discarded afterwards. Assembly must not run before every required
//! subscription has delivered at least one value; an early read is a
//! precondition violation, not a silent default.

use std::collections::BTreeMap;

use log::{debug, info};
use num_complex::Complex64;
use thiserror::Error;

use crate::bus::Bus;
use crate::fed::federate::{Federate, FederateError, Subscription};
use crate::wire::{EquipmentModelInfo, Injection, LabelledVector, Topology, WireError};

/// Snapshot assembly failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Federate(#[from] FederateError),
    /// A payload failed to decode or violated a shape invariant.
    #[error("\"{topic}\": {source}")]
    Decode { topic: String, source: WireError },
    /// Two correlated subscriptions disagree on their id space.
    #[error("\"{left}\" and \"{right}\" are not a valid pair: {source}")]
    Paired {
        left: String,
        right: String,
        source: WireError,
    },
    /// The slack identifier is not of the form `"<bus>.<phase>"`.
    #[error("slack bus id \"{0}\" is not of the form \"<bus>.<phase>\"")]
    SlackFormat(String),
    /// The topology payload lists no slack bus.
    #[error("topology lists no slack bus")]
    NoSlackBus,
}

/// The optimization federate's subscription set.
pub struct OpfSubscriptions {
    pub topology: Subscription,
    pub tap_info: Subscription,
    pub cap_info: Subscription,
    pub flex_info: Subscription,
    pub voltages_real: Subscription,
    pub voltages_imag: Subscription,
    pub powers_real: Subscription,
    pub powers_imag: Subscription,
    pub cap_powers_imag: Subscription,
    pub pv_powers_real: Subscription,
    pub pv_powers_imag: Subscription,
    pub tap_values: Subscription,
}

/// Ephemeral per-step aggregate of the optimization federate's inputs.
pub struct GridSnapshot {
    pub admittance: Vec<Vec<Complex64>>,
    pub slack_bus: Vec<String>,
    pub base_voltage_magnitudes: LabelledVector,
    pub base_voltage_angles: LabelledVector,
    pub voltages_real: LabelledVector,
    pub voltages_imag: LabelledVector,
    pub powers_real: LabelledVector,
    pub powers_imag: LabelledVector,
    pub cap_q: LabelledVector,
    pub pv_p: LabelledVector,
    pub pv_q: LabelledVector,
    pub tap_values: LabelledVector,
    pub tap_info: EquipmentModelInfo,
    pub cap_info: EquipmentModelInfo,
    pub flex_info: EquipmentModelInfo,
}

fn decode<T>(
    fed: &mut Federate<impl Bus>,
    subscription: &Subscription,
    parse: impl FnOnce(&str) -> Result<T, WireError>,
) -> Result<T, SnapshotError> {
    let payload = fed.require_latest(subscription)?;
    parse(&payload).map_err(|source| SnapshotError::Decode {
        topic: subscription.topic.clone(),
        source,
    })
}

fn ensure_paired(
    left: (&LabelledVector, &Subscription),
    right: (&LabelledVector, &Subscription),
) -> Result<(), SnapshotError> {
    left.0
        .ensure_paired(right.0)
        .map_err(|source| SnapshotError::Paired {
            left: left.1.topic.clone(),
            right: right.1.topic.clone(),
            source,
        })
}

/// Builds a [`GridSnapshot`] from the current subscription values.
///
/// # Errors
///
/// Returns a [`SnapshotError`] when a required subscription has not
/// delivered yet, a payload is malformed, or correlated vectors disagree.
pub fn assemble_grid_snapshot(
    fed: &mut Federate<impl Bus>,
    subs: &OpfSubscriptions,
) -> Result<GridSnapshot, SnapshotError> {
    let topology = decode(fed, &subs.topology, Topology::from_json)?;
    let tap_info = decode(fed, &subs.tap_info, EquipmentModelInfo::from_json)?;
    let cap_info = decode(fed, &subs.cap_info, EquipmentModelInfo::from_json)?;
    let flex_info = decode(fed, &subs.flex_info, EquipmentModelInfo::from_json)?;
    let voltages_real = decode(fed, &subs.voltages_real, LabelledVector::from_json)?;
    let voltages_imag = decode(fed, &subs.voltages_imag, LabelledVector::from_json)?;
    let powers_real = decode(fed, &subs.powers_real, LabelledVector::from_json)?;
    let powers_imag = decode(fed, &subs.powers_imag, LabelledVector::from_json)?;
    let cap_q = decode(fed, &subs.cap_powers_imag, LabelledVector::from_json)?;
    let pv_p = decode(fed, &subs.pv_powers_real, LabelledVector::from_json)?;
    let pv_q = decode(fed, &subs.pv_powers_imag, LabelledVector::from_json)?;
    let tap_values = decode(fed, &subs.tap_values, LabelledVector::from_json)?;

    ensure_paired(
        (&powers_real, &subs.powers_real),
        (&powers_imag, &subs.powers_imag),
    )?;
    ensure_paired(
        (&pv_p, &subs.pv_powers_real),
        (&pv_q, &subs.pv_powers_imag),
    )?;
    ensure_paired(
        (&voltages_real, &subs.voltages_real),
        (&voltages_imag, &subs.voltages_imag),
    )?;

    info!("\"{}\": all grid quantities received", fed.name());
    Ok(GridSnapshot {
        admittance: topology.admittance_matrix(),
        slack_bus: topology.slack_bus.clone(),
        base_voltage_magnitudes: topology.base_voltage_magnitudes,
        base_voltage_angles: topology.base_voltage_angles,
        voltages_real,
        voltages_imag,
        powers_real,
        powers_imag,
        cap_q,
        pv_p,
        pv_q,
        tap_values,
        tap_info,
        cap_info,
        flex_info,
    })
}

/// One network branch, keyed by its endpoint node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRecord {
    pub from_node: String,
    pub to_node: String,
    pub admittance: Complex64,
}

/// One network node with the measurements folded onto it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusRecord {
    pub base_voltage: f64,
    /// Measured voltage magnitude, once folded in.
    pub voltage_mag: Option<f64>,
    /// Active power injection (W).
    pub p: f64,
    /// Reactive power injection (Var).
    pub q: f64,
    /// Controllable equipment behind this node, if any.
    pub eqid: Option<String>,
}

/// Branches keyed `"<from>--<to>"`.
pub type BranchMap = BTreeMap<String, BranchRecord>;
/// Buses keyed by node id `"<bus>.<phase>"`.
pub type BusMap = BTreeMap<String, BusRecord>;

/// Extracts branch and bus maps from a topology payload. Nodes come from
/// the base-voltage id space; branches from the strictly-upper-triangular
/// non-zero admittance entries.
pub fn extract_network(topology: &Topology) -> (BranchMap, BusMap) {
    let nodes = &topology.base_voltage_magnitudes.ids;
    let mut bus = BusMap::new();
    for (i, node) in nodes.iter().enumerate() {
        bus.insert(
            node.clone(),
            BusRecord {
                base_voltage: topology.base_voltage_magnitudes.values[i],
                ..BusRecord::default()
            },
        );
    }

    let matrix = topology.admittance_matrix();
    let mut branch = BranchMap::new();
    for (i, row) in matrix.iter().enumerate() {
        for (j, y) in row.iter().enumerate().skip(i + 1) {
            if y.norm_sqr() == 0.0 {
                continue;
            }
            let from_node = nodes[i].clone();
            let to_node = nodes[j].clone();
            branch.insert(
                format!("{from_node}--{to_node}"),
                BranchRecord {
                    from_node,
                    to_node,
                    admittance: *y,
                },
            );
        }
    }
    (branch, bus)
}

/// Parses the declared slack identifier. Only the bus component of
/// `"<bus>.<phase>"` is used for partitioning.
///
/// # Errors
///
/// Returns a [`SnapshotError`] when no slack bus is declared or the
/// identifier has no phase separator.
pub fn parse_slack(topology: &Topology) -> Result<String, SnapshotError> {
    let slack = topology
        .slack_bus
        .first()
        .ok_or(SnapshotError::NoSlackBus)?;
    let (bus, _phase) = slack
        .split_once('.')
        .ok_or_else(|| SnapshotError::SlackFormat(slack.clone()))?;
    Ok(bus.to_string())
}

/// Folds measured voltage magnitudes onto the bus map. Nodes outside the
/// map (out-of-area measurements) are skipped.
pub fn fold_voltages(bus: &mut BusMap, voltages: &LabelledVector) {
    for (id, &value) in voltages.ids.iter().zip(voltages.values.iter()) {
        match bus.get_mut(id) {
            Some(record) => record.voltage_mag = Some(value),
            None => debug!("voltage for out-of-area node \"{id}\" skipped"),
        }
    }
}

/// Folds power injections onto the bus map, attaching the owning equipment
/// id to each matched node. Out-of-area nodes are skipped.
pub fn fold_injection(bus: &mut BusMap, injection: &Injection) {
    let real = &injection.power_real;
    for ((id, &value), eqid) in real
        .ids
        .iter()
        .zip(real.values.iter())
        .zip(real.equipment_ids.iter())
    {
        match bus.get_mut(id) {
            Some(record) => {
                record.p = value;
                record.eqid = Some(eqid.clone());
            }
            None => debug!("injection for out-of-area node \"{id}\" skipped"),
        }
    }
    let imag = &injection.power_imag;
    for (id, &value) in imag.ids.iter().zip(imag.values.iter()) {
        if let Some(record) = bus.get_mut(id) {
            record.q = value;
        }
    }
}
