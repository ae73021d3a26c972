//! Equipment change commands published by the localized controller.

use serde::{Deserialize, Serialize};

use super::WireError;

/// A single property change addressed to one piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Fully qualified equipment identifier, e.g. `"PVSystem.pv1"`.
    pub obj_name: String,
    /// Property to set, e.g. `"kVA"`.
    pub obj_property: String,
    /// New property value.
    pub val: f64,
}

/// An ordered command batch. Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandList(pub Vec<Command>);

impl CommandList {
    /// Decodes a command list from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on malformed JSON.
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Encodes the list as its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}
