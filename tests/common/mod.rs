//! Shared fixtures for integration tests.

use gridfed::config::{FederateConfig, TopicMap};

/// OPF federate configuration wired to the synthetic feeder's topics.
pub fn opf_config(steps: u64, pipeline: &str) -> FederateConfig {
    let mut config = FederateConfig::default();
    config.federate.name = "opf_federate".to_string();
    config.federate.steps = steps;
    config.opf.pipeline = pipeline.to_string();
    config.topics = TopicMap::from([
        ("topology", "topology"),
        ("tap_info", "tap_info"),
        ("cap_info", "cap_info"),
        ("flex_info", "flex_info"),
        ("voltages_real", "voltages_real"),
        ("voltages_imag", "voltages_imag"),
        ("powers_real", "powers_real"),
        ("powers_imag", "powers_imag"),
        ("cap_powers_imag", "cap_powers_imag"),
        ("pv_powers_real", "pv_powers_real"),
        ("pv_powers_imag", "pv_powers_imag"),
        ("tap_values", "tap_values"),
    ]);
    config
}

/// LinDistFlow federate configuration wired to the synthetic feeder.
pub fn ldf_config(control_type: &str) -> FederateConfig {
    let mut config = FederateConfig::default();
    config.federate.name = "lindistflow_federate".to_string();
    config.control.control_type = control_type.to_string();
    config.topics = TopicMap::from([
        ("topology", "topology"),
        ("voltages_magnitude", "voltages_magnitude"),
        ("injections", "injections"),
    ]);
    config
}

/// Recorder federate configuration subscribing to `topic`.
pub fn recorder_config(name: &str, topic: &str) -> FederateConfig {
    let mut config = FederateConfig::default();
    config.federate.name = name.to_string();
    config.federate.time_delta = 0.01;
    config.topics = TopicMap::from([("subscription", topic)]);
    config
}
