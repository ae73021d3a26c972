//! Re-encodes solver outputs as wire payloads and publishes them.
//!
//! Publishes within one granted step are one-shot and not transactional
//! across topics: a reader may observe one topic updated before a
//! correlated topic on the same step.

use log::info;

use crate::bus::Bus;
use crate::fed::PipelineError;
use crate::fed::dispatch::OpfSetpoints;
use crate::fed::federate::{Federate, Publication};
use crate::fed::snapshot::{BusMap, GridSnapshot};
use crate::wire::{Command, LabelledVector};

/// The optimization federate's publication set.
///
/// `tap_values` is registered for parity with the deployed topic set but is
/// never written; tap positions stay in [`OpfSetpoints`].
pub struct OpfPublications {
    pub flex_p: Publication,
    pub cap_q: Publication,
    pub pv_p: Publication,
    pub pv_q: Publication,
    pub tap_values: Publication,
}

/// Publishes the four setpoint vectors, each keyed by its equipment
/// model's names. A setpoint vector whose length disagrees with its id set
/// is rejected; zero registered equipment publishes an empty vector.
///
/// # Errors
///
/// Returns a [`PipelineError`] on an encoding failure or a bus error.
pub fn publish_opf_setpoints(
    fed: &mut Federate<impl Bus>,
    pubs: &OpfPublications,
    snapshot: &GridSnapshot,
    setpoints: &OpfSetpoints,
) -> Result<(), PipelineError> {
    let flex_p = LabelledVector::new(
        setpoints.flex_p.clone(),
        snapshot.flex_info.names.clone(),
        "W",
    )?;
    let cap_q = LabelledVector::new(
        setpoints.cap_q.clone(),
        snapshot.cap_info.names.clone(),
        "Var",
    )?;
    let pv_p = LabelledVector::new(setpoints.pv_p.clone(), snapshot.pv_p.ids.clone(), "W")?;
    let pv_q = LabelledVector::new(setpoints.pv_q.clone(), snapshot.pv_q.ids.clone(), "Var")?;

    fed.publish(&pubs.flex_p, &flex_p.to_json()?)?;
    fed.publish(&pubs.cap_q, &cap_q.to_json()?)?;
    fed.publish(&pubs.pv_p, &pv_p.to_json()?)?;
    fed.publish(&pubs.pv_q, &pv_q.to_json()?)?;
    info!("\"{}\": optimized setpoints published", fed.name());
    Ok(())
}

/// Builds the inverter command batch from raw control setpoints.
///
/// Only equipment whose identifier prefix is `"PVSystem"` receives a
/// command; the value is the raw setpoint rescaled from W/Var to a
/// kVA-equivalent, the same mapping for every control type.
pub fn inverter_commands(
    setpoints: impl IntoIterator<Item = (String, f64)>,
    area_bus: &BusMap,
) -> Vec<Command> {
    let mut commands = Vec::new();
    for (node, setpoint) in setpoints {
        let Some(record) = area_bus.get(&node) else {
            continue;
        };
        let Some(eqid) = record.eqid.as_deref() else {
            continue;
        };
        let Some((kind, _)) = eqid.split_once('.') else {
            continue;
        };
        if kind != "PVSystem" {
            continue;
        }
        commands.push(Command {
            obj_name: eqid.to_string(),
            obj_property: "kVA".to_string(),
            val: setpoint / 1000.0,
        });
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fed::snapshot::BusRecord;

    fn bus_with(entries: &[(&str, Option<&str>)]) -> BusMap {
        let mut bus = BusMap::new();
        for (node, eqid) in entries {
            bus.insert(
                node.to_string(),
                BusRecord {
                    base_voltage: 2400.0,
                    eqid: eqid.map(str::to_string),
                    ..BusRecord::default()
                },
            );
        }
        bus
    }

    #[test]
    fn pv_system_setpoint_maps_to_kva_command() {
        let bus = bus_with(&[("pv.1", Some("PVSystem.pv1"))]);
        let commands = inverter_commands([("pv.1".to_string(), 500.0)], &bus);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].obj_name, "PVSystem.pv1");
        assert_eq!(commands[0].obj_property, "kVA");
        assert_eq!(commands[0].val, 0.5);
    }

    #[test]
    fn non_pv_equipment_produces_no_command() {
        let bus = bus_with(&[("cap.1", Some("Capacitor.c1"))]);
        let commands = inverter_commands([("cap.1".to_string(), 900.0)], &bus);
        assert!(commands.is_empty());
    }

    #[test]
    fn unequipped_and_unknown_nodes_are_skipped() {
        let bus = bus_with(&[("mid.1", None)]);
        let commands = inverter_commands(
            [("mid.1".to_string(), 100.0), ("ghost.1".to_string(), 200.0)],
            &bus,
        );
        assert!(commands.is_empty());
    }

    #[test]
    fn negative_setpoints_rescale_too() {
        let bus = bus_with(&[("pv.1", Some("PVSystem.pv1"))]);
        let commands = inverter_commands([("pv.1".to_string(), -2500.0)], &bus);
        assert_eq!(commands[0].val, -2.5);
    }
}
