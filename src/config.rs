//! TOML-based static configuration loaded once at process start.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::fed::dispatch::{CONTROL_TYPES, ControlType, OPF_VARIANTS, OpfVariant};
use crate::fed::timeloop::{GATE_MODES, GateMode};

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field} — {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"federate.steps"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

/// Top-level federate configuration parsed from TOML.
///
/// All fields have defaults. Load from TOML with
/// [`FederateConfig::from_toml_file`] or start from `Default`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FederateConfig {
    /// Identity, time granularity, and horizon.
    #[serde(default)]
    pub federate: FederateSection,
    /// Optimization dispatcher selection.
    #[serde(default)]
    pub opf: OpfSection,
    /// Localized controller parameters.
    #[serde(default)]
    pub control: ControlSection,
    /// Output locations.
    #[serde(default)]
    pub output: OutputSection,
    /// Logical-name to bus-topic mapping.
    #[serde(default)]
    pub topics: TopicMap,
}

/// Identity, time granularity, and horizon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FederateSection {
    /// Federate name, also the bus identity.
    pub name: String,
    /// Declared time-step granularity (must be > 0).
    pub time_delta: f64,
    /// Finite-horizon step count (must be > 0 for finite-horizon loops).
    pub steps: u64,
}

impl Default for FederateSection {
    fn default() -> Self {
        Self {
            name: "opf_federate".to_string(),
            time_delta: 1.0,
            steps: 24,
        }
    }
}

/// Optimization dispatcher selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpfSection {
    /// OPF formulation: `"centralized"` or `"distributed"`.
    pub variant: String,
    /// Pipeline trigger: `"single-shot"` or `"every-grant"`.
    pub pipeline: String,
}

impl Default for OpfSection {
    fn default() -> Self {
        Self {
            variant: "distributed".to_string(),
            pipeline: "single-shot".to_string(),
        }
    }
}

/// Localized controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlSection {
    /// Controlled quantity: `"watt"`, `"var"`, or `"watt_var"`.
    pub control_type: String,
    /// Whether the solve must hold the power factor.
    pub enforce_power_factor: bool,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            control_type: "watt".to_string(),
            enforce_power_factor: false,
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Directory for recorder tables.
    pub directory: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

/// Logical-name to bus-topic dictionary, resolved once at startup. The
/// core treats it as an opaque lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TopicMap(BTreeMap<String, String>);

impl TopicMap {
    /// Resolves a logical name to its bus topic.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the missing key.
    pub fn resolve(&self, key: &str) -> Result<&str, ConfigError> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError {
                field: format!("topics.{key}"),
                message: "no bus topic mapped".to_string(),
            })
    }

    /// Adds or replaces a mapping.
    pub fn set(&mut self, key: &str, topic: &str) {
        self.0.insert(key.to_string(), topic.to_string());
    }
}

impl<const N: usize> From<[(&str, &str); N]> for TopicMap {
    fn from(entries: [(&str, &str); N]) -> Self {
        let mut map = Self::default();
        for (key, topic) in entries {
            map.set(key, topic);
        }
        map
    }
}

impl FederateConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let f = &self.federate;

        if f.name.is_empty() {
            errors.push(ConfigError {
                field: "federate.name".into(),
                message: "must not be empty".into(),
            });
        }
        if !(f.time_delta > 0.0) {
            errors.push(ConfigError {
                field: "federate.time_delta".into(),
                message: "must be > 0".into(),
            });
        }
        if f.steps == 0 {
            errors.push(ConfigError {
                field: "federate.steps".into(),
                message: "must be > 0".into(),
            });
        }
        if OpfVariant::from_name(&self.opf.variant).is_none() {
            errors.push(ConfigError {
                field: "opf.variant".into(),
                message: format!(
                    "must be one of {}, got \"{}\"",
                    OPF_VARIANTS.join(", "),
                    self.opf.variant
                ),
            });
        }
        if GateMode::from_name(&self.opf.pipeline).is_none() {
            errors.push(ConfigError {
                field: "opf.pipeline".into(),
                message: format!(
                    "must be one of {}, got \"{}\"",
                    GATE_MODES.join(", "),
                    self.opf.pipeline
                ),
            });
        }
        if ControlType::from_name(&self.control.control_type).is_none() {
            errors.push(ConfigError {
                field: "control.control_type".into(),
                message: format!(
                    "must be one of {}, got \"{}\"",
                    CONTROL_TYPES.join(", "),
                    self.control.control_type
                ),
            });
        }

        errors
    }

    /// Resolved pipeline gate mode.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on an unknown name.
    pub fn gate_mode(&self) -> Result<GateMode, ConfigError> {
        GateMode::from_name(&self.opf.pipeline).ok_or_else(|| ConfigError {
            field: "opf.pipeline".into(),
            message: format!("unknown pipeline mode \"{}\"", self.opf.pipeline),
        })
    }

    /// Resolved OPF variant.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on an unknown name.
    pub fn opf_variant(&self) -> Result<OpfVariant, ConfigError> {
        OpfVariant::from_name(&self.opf.variant).ok_or_else(|| ConfigError {
            field: "opf.variant".into(),
            message: format!("unknown variant \"{}\"", self.opf.variant),
        })
    }

    /// Resolved control type.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on an unknown name.
    pub fn control_type(&self) -> Result<ControlType, ConfigError> {
        ControlType::from_name(&self.control.control_type).ok_or_else(|| ConfigError {
            field: "control.control_type".into(),
            message: format!("unknown control type \"{}\"", self.control.control_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = FederateConfig::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "defaults should be valid: {errors:?}");
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[federate]
name = "lindistflow_federate"
time_delta = 0.01
steps = 96

[opf]
variant = "centralized"
pipeline = "every-grant"

[control]
control_type = "watt_var"
enforce_power_factor = true

[output]
directory = "out"

[topics]
topology = "feeder/topology"
voltages_magnitude = "feeder/voltages_magnitude"
"#;
        let cfg = FederateConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.expect("parsed");
        assert_eq!(cfg.federate.name, "lindistflow_federate");
        assert_eq!(cfg.federate.steps, 96);
        assert_eq!(cfg.control_type().expect("control"), ControlType::WattVar);
        assert_eq!(cfg.gate_mode().expect("gate"), GateMode::EveryGrant);
        assert_eq!(
            cfg.topics.resolve("topology").expect("topic"),
            "feeder/topology"
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = FederateConfig::from_toml_str("[federate]\nname = \"rec\"\n").expect("parse");
        assert_eq!(cfg.federate.name, "rec");
        assert_eq!(cfg.federate.time_delta, 1.0);
        assert_eq!(cfg.opf.pipeline, "single-shot");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = FederateConfig::from_toml_str("[federate]\nbogus = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn validation_catches_zero_steps() {
        let mut cfg = FederateConfig::default();
        cfg.federate.steps = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "federate.steps"));
    }

    #[test]
    fn validation_catches_bad_control_type() {
        let mut cfg = FederateConfig::default();
        cfg.control.control_type = "volt".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "control.control_type"));
    }

    #[test]
    fn validation_catches_negative_time_delta() {
        let mut cfg = FederateConfig::default();
        cfg.federate.time_delta = -1.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "federate.time_delta"));
    }

    #[test]
    fn missing_topic_is_a_config_error() {
        let topics = TopicMap::from([("topology", "feeder/topology")]);
        assert!(topics.resolve("topology").is_ok());
        let err = topics.resolve("voltages_magnitude");
        assert!(err.is_err());
        assert!(err.unwrap_err().field.contains("voltages_magnitude"));
    }
}
