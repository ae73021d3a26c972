use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{LabelledVector, WireError};

/// Complex value in wire form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexPair {
    pub real: f64,
    pub imag: f64,
}

impl From<ComplexPair> for Complex64 {
    fn from(c: ComplexPair) -> Self {
        Complex64::new(c.real, c.imag)
    }
}

/// Nodal admittance in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admittance {
    /// Square matrix, one row/column per network node.
    pub admittance_matrix: Vec<Vec<ComplexPair>>,
}

/// Network description published by the grid federate.
///
/// Node ordering is shared by the admittance matrix and both base-voltage
/// vectors; the base-voltage ids name the nodes as `"<bus>.<phase>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub admittance: Admittance,
    pub base_voltage_magnitudes: LabelledVector,
    pub base_voltage_angles: LabelledVector,
    /// Slack bus identifiers, `"<bus>.<phase>"`.
    pub slack_bus: Vec<String>,
}

impl Topology {
    /// Decodes and validates a topology payload.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON, a non-square admittance
    /// matrix, or a node count that disagrees with the base-voltage vectors.
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        let topology: Self = serde_json::from_str(payload)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Encodes the topology as its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Number of network nodes.
    pub fn node_count(&self) -> usize {
        self.base_voltage_magnitudes.len()
    }

    /// Converts the wire-form matrix into complex numbers.
    pub fn admittance_matrix(&self) -> Vec<Vec<Complex64>> {
        self.admittance
            .admittance_matrix
            .iter()
            .map(|row| row.iter().map(|&c| c.into()).collect())
            .collect()
    }

    fn validate(&self) -> Result<(), WireError> {
        let n = self.node_count();
        let matrix = &self.admittance.admittance_matrix;
        if matrix.len() != n {
            return Err(WireError::MatrixShape {
                row: 0,
                expected: n,
                found: matrix.len(),
            });
        }
        for (row, entries) in matrix.iter().enumerate() {
            if entries.len() != n {
                return Err(WireError::MatrixShape {
                    row,
                    expected: n,
                    found: entries.len(),
                });
            }
        }
        self.base_voltage_magnitudes
            .ensure_paired(&self.base_voltage_angles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_topology() -> Topology {
        let y = |real, imag| ComplexPair { real, imag };
        Topology {
            admittance: Admittance {
                admittance_matrix: vec![
                    vec![y(2.0, -1.0), y(-2.0, 1.0)],
                    vec![y(-2.0, 1.0), y(2.0, -1.0)],
                ],
            },
            base_voltage_magnitudes: LabelledVector::new(
                vec![2400.0, 2400.0],
                vec!["sourcebus.1".into(), "load.1".into()],
                "V",
            )
            .expect("magnitudes"),
            base_voltage_angles: LabelledVector::new(
                vec![0.0, -0.02],
                vec!["sourcebus.1".into(), "load.1".into()],
                "rad",
            )
            .expect("angles"),
            slack_bus: vec!["sourcebus.1".into()],
        }
    }

    #[test]
    fn topology_round_trips_with_complex_entries() {
        let topology = two_bus_topology();
        let json = topology.to_json().expect("encode should succeed");
        let back = Topology::from_json(&json).expect("decode should succeed");
        assert_eq!(back, topology);
        assert_eq!(back.admittance_matrix()[0][1], Complex64::new(-2.0, 1.0));
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        let mut topology = two_bus_topology();
        topology.admittance.admittance_matrix[1].pop();
        let json = serde_json::to_string(&topology).expect("encode");
        assert!(matches!(
            Topology::from_json(&json),
            Err(WireError::MatrixShape { row: 1, .. })
        ));
    }

    #[test]
    fn base_voltage_vectors_must_pair() {
        let mut topology = two_bus_topology();
        topology.base_voltage_angles.ids[1] = "other.1".into();
        let json = serde_json::to_string(&topology).expect("encode");
        assert!(matches!(
            Topology::from_json(&json),
            Err(WireError::PairedIdMismatch { .. })
        ));
    }
}
