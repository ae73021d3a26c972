use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::WireError;

/// An identifier-indexed numeric array.
///
/// `ids` defines the vector's index space: `values[i]` belongs to `ids[i]`.
/// The protocol never re-sorts by id, so producers and consumers must agree
/// on ordering out of band. Paired vectors (active/reactive power of the
/// same equipment set) must share the same id ordering; see
/// [`LabelledVector::ensure_paired`].
///
/// # Examples
///
/// ```
/// use gridfed::wire::LabelledVector;
///
/// let v = LabelledVector::new(vec![1.0, 2.0], vec!["a".into(), "b".into()], "W").unwrap();
/// let json = v.to_json().unwrap();
/// assert_eq!(LabelledVector::from_json(&json).unwrap(), v);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledVector {
    /// Numeric values, one per id.
    pub values: Vec<f64>,
    /// Identifiers, unique within the vector.
    pub ids: Vec<String>,
    /// Declared unit of all values (informational).
    pub units: String,
}

impl LabelledVector {
    /// Builds a labelled vector, validating the shape invariants.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::LengthMismatch`] when `values` and `ids` differ
    /// in length, or [`WireError::DuplicateId`] when an id repeats.
    pub fn new(values: Vec<f64>, ids: Vec<String>, units: &str) -> Result<Self, WireError> {
        let v = Self {
            values,
            ids,
            units: units.to_string(),
        };
        v.validate()?;
        Ok(v)
    }

    /// Decodes a labelled vector from its JSON wire form and validates it.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON or violated shape invariants.
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

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the vector holds no entries.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Checks that `other` is a valid pair for this vector: identical id
    /// sequences, element for element.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::PairedLengthMismatch`] or
    /// [`WireError::PairedIdMismatch`] describing the first disagreement.
    pub fn ensure_paired(&self, other: &Self) -> Result<(), WireError> {
        if self.ids.len() != other.ids.len() {
            return Err(WireError::PairedLengthMismatch {
                left: self.ids.len(),
                right: other.ids.len(),
            });
        }
        for (index, (left, right)) in self.ids.iter().zip(other.ids.iter()).enumerate() {
            if left != right {
                return Err(WireError::PairedIdMismatch {
                    index,
                    left: left.clone(),
                    right: right.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), WireError> {
        if self.values.len() != self.ids.len() {
            return Err(WireError::LengthMismatch {
                values: self.values.len(),
                ids: self.ids.len(),
            });
        }
        let mut seen = HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            if !seen.insert(id.as_str()) {
                return Err(WireError::DuplicateId(id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(ids: &[&str]) -> LabelledVector {
        let values = (0..ids.len()).map(|i| i as f64).collect();
        LabelledVector::new(values, ids.iter().map(|s| s.to_string()).collect(), "W")
            .expect("test vector should be valid")
    }

    #[test]
    fn round_trip_preserves_values_ids_and_units() {
        let v = LabelledVector::new(
            vec![1.5, -2.0, 0.0],
            vec!["load1".into(), "load2".into(), "load3".into()],
            "Var",
        )
        .expect("vector should build");

        let json = v.to_json().expect("encode should succeed");
        let back = LabelledVector::from_json(&json).expect("decode should succeed");

        assert_eq!(back.values, v.values);
        assert_eq!(back.ids, v.ids);
        assert_eq!(back.units, v.units);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = LabelledVector::new(vec![1.0], vec!["a".into(), "b".into()], "W");
        assert!(matches!(err, Err(WireError::LengthMismatch { .. })));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let err = LabelledVector::new(vec![1.0, 2.0], vec!["a".into(), "a".into()], "W");
        assert!(matches!(err, Err(WireError::DuplicateId(_))));
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let payload = r#"{"values": [1.0, 2.0], "ids": ["a"], "units": "W"}"#;
        assert!(LabelledVector::from_json(payload).is_err());
    }

    #[test]
    fn paired_vectors_with_identical_ids_pass() {
        let p = vector(&["a", "b", "c"]);
        let q = vector(&["a", "b", "c"]);
        assert!(p.ensure_paired(&q).is_ok());
    }

    #[test]
    fn paired_vectors_with_different_length_are_rejected() {
        let p = vector(&["a", "b", "c"]);
        let q = vector(&["a", "b"]);
        assert!(matches!(
            p.ensure_paired(&q),
            Err(WireError::PairedLengthMismatch { left: 3, right: 2 })
        ));
    }

    #[test]
    fn paired_vectors_with_reordered_ids_are_rejected() {
        let p = vector(&["a", "b"]);
        let q = vector(&["b", "a"]);
        assert!(matches!(
            p.ensure_paired(&q),
            Err(WireError::PairedIdMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn empty_vector_is_valid() {
        let v = LabelledVector::new(Vec::new(), Vec::new(), "W").expect("empty should be valid");
        assert!(v.is_empty());
        assert_eq!(v.len(), 0);
    }
}
