//! Per-node power measurements.

use serde::{Deserialize, Serialize};

use super::{EquipmentNodeVector, WireError};

/// One recorder input row: `[equipment_id, p, q]` in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow(pub String, pub f64, pub f64);

impl MeasurementRow {
    pub fn equipment_id(&self) -> &str {
        &self.0
    }

    pub fn p(&self) -> f64 {
        self.1
    }

    pub fn q(&self) -> f64 {
        self.2
    }
}

/// Decodes the recorder's subscribed payload: an array of `[id, p, q]` rows.
///
/// # Errors
///
/// Returns a [`WireError`] on malformed JSON.
pub fn measurement_rows_from_json(payload: &str) -> Result<Vec<MeasurementRow>, WireError> {
    Ok(serde_json::from_str(payload)?)
}

/// Active and reactive power injections keyed by network node, with the
/// owning equipment attached to each entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    pub power_real: EquipmentNodeVector,
    pub power_imag: EquipmentNodeVector,
}

impl Injection {
    /// Decodes and validates an injection payload.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON or mismatched shapes.
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        let injection: Self = serde_json::from_str(payload)?;
        injection.power_real.validate()?;
        injection.power_imag.validate()?;
        Ok(injection)
    }

    /// Encodes the injection as its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_decode_from_heterogeneous_arrays() {
        let payload = r#"[["bus1", 1.0, 0.5], ["bus2", 2.0, 1.0]]"#;
        let rows = measurement_rows_from_json(payload).expect("decode should succeed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].equipment_id(), "bus1");
        assert_eq!(rows[0].p(), 1.0);
        assert_eq!(rows[1].q(), 1.0);
    }

    #[test]
    fn malformed_row_is_rejected() {
        let payload = r#"[["bus1", 1.0]]"#;
        assert!(measurement_rows_from_json(payload).is_err());
    }

    #[test]
    fn injection_validates_both_halves() {
        let payload = r#"{
            "power_real": {"values": [1.0], "ids": ["b1.1"], "equipment_ids": ["Load.l1"], "units": "W"},
            "power_imag": {"values": [0.5, 0.1], "ids": ["b1.1"], "equipment_ids": ["Load.l1"], "units": "Var"}
        }"#;
        assert!(Injection::from_json(payload).is_err());
    }
}
