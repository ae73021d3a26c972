//! Controllable equipment descriptions.

use serde::{Deserialize, Serialize};

use super::WireError;

/// Describes one controllable equipment class (taps, capacitors, flexible
/// loads): its bus-adjacency matrix, current operating values, and names.
///
/// `names` keys the setpoint vectors a controller publishes back for this
/// class. Zero registered equipment is a valid state and yields empty
/// vectors throughout the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentModelInfo {
    /// Equipment-to-bus adjacency, one row per equipment.
    pub adj_matrix: Vec<Vec<f64>>,
    /// Current operating values, one per equipment.
    pub values: Vec<f64>,
    /// Equipment names, the id order for derived setpoint vectors.
    pub names: Vec<String>,
}

impl EquipmentModelInfo {
    /// Decodes and validates an equipment description.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON or when `values` and
    /// `names` disagree in length.
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        let info: Self = serde_json::from_str(payload)?;
        info.validate()?;
        Ok(info)
    }

    /// Encodes the description as its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Number of registered equipment.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no equipment is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn validate(&self) -> Result<(), WireError> {
        if self.values.len() != self.names.len() {
            return Err(WireError::LengthMismatch {
                values: self.values.len(),
                ids: self.names.len(),
            });
        }
        Ok(())
    }
}

/// A labelled vector whose entries additionally carry the owning equipment
/// identifier. Used by the injection payload so a controller can map node
/// measurements back to the controllable equipment behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentNodeVector {
    /// Numeric values, one per node.
    pub values: Vec<f64>,
    /// Node identifiers (`"<bus>.<phase>"`).
    pub ids: Vec<String>,
    /// Owning equipment identifiers, parallel to `ids`.
    pub equipment_ids: Vec<String>,
    /// Declared unit of all values (informational).
    pub units: String,
}

impl EquipmentNodeVector {
    /// Decodes and validates an equipment-node vector.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON or when the three parallel
    /// sequences disagree in length.
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        let v: Self = serde_json::from_str(payload)?;
        v.validate()?;
        Ok(v)
    }

    /// Encodes the vector as its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn validate(&self) -> Result<(), WireError> {
        if self.values.len() != self.ids.len() {
            return Err(WireError::LengthMismatch {
                values: self.values.len(),
                ids: self.ids.len(),
            });
        }
        if self.equipment_ids.len() != self.ids.len() {
            return Err(WireError::LengthMismatch {
                values: self.equipment_ids.len(),
                ids: self.ids.len(),
            });
        }
        Ok(())
    }
}
