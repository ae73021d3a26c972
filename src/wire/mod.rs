//! Wire payload types exchanged over the co-simulation bus.
//!
//! Everything a federate publishes or consumes is structured text: the
//! labelled-vector codec, equipment model descriptions, switch commands,
//! topology, and the recorder's measurement rows. All decoding is typed and
//! shape-checked at the boundary; a malformed payload is a fatal error, not
//! a silently defaulted value.

pub mod command;
pub mod equipment;
/// Identifier-indexed numeric vectors, the canonical payload shape.
pub mod labelled;
pub mod measurement;
/// Admittance matrix, base voltages, and slack bus identifiers.
pub mod topology;

pub use command::{Command, CommandList};
pub use equipment::{EquipmentModelInfo, EquipmentNodeVector};
pub use labelled::LabelledVector;
pub use measurement::{Injection, MeasurementRow};
pub use topology::{ComplexPair, Topology};

use thiserror::Error;

/// Decode or shape-invariant failure on a wire payload.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload was not valid JSON for the expected record type.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A vector's `values` and `ids` sequences disagree in length.
    #[error("length mismatch: {values} values against {ids} ids")]
    LengthMismatch { values: usize, ids: usize },
    /// An identifier occurs more than once within a single vector.
    #[error("duplicate id \"{0}\" within one vector")]
    DuplicateId(String),
    /// Two correlated vectors differ in length.
    #[error("paired vectors differ in length: {left} against {right}")]
    PairedLengthMismatch { left: usize, right: usize },
    /// Two correlated vectors disagree on id ordering.
    #[error("paired vectors disagree at index {index}: \"{left}\" against \"{right}\"")]
    PairedIdMismatch {
        index: usize,
        left: String,
        right: String,
    },
    /// A matrix payload is not rectangular or has the wrong dimensions.
    #[error("matrix shape mismatch: expected {expected} columns in row {row}, found {found}")]
    MatrixShape {
        row: usize,
        expected: usize,
        found: usize,
    },
}
