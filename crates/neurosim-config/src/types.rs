// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `neurosim_configuration.toml`.

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "std"))]
use alloc::string::{String, ToString};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeurosimConfig {
    pub simulation: SimulationConfig,
    pub neurons: NeuronsConfig,
    pub probes: ProbesConfig,
    pub logging: LoggingConfig,
}

/// Step loop configuration handed to the simulator initializer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated seconds per step
    pub dt: f64,
    /// Seed for every construction-time random draw (calibration targets)
    pub seed: u64,
    /// Verify at initialization that the operator list respects signal ordering
    pub validate_schedule: bool,
    /// Unit count at which neuron updates switch to rayon
    pub parallel_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            seed: 0,
            validate_schedule: true,
            parallel_threshold: 4096,
        }
    }
}

impl SimulationConfig {
    /// Default configuration with a different time step
    pub fn with_dt(dt: f64) -> Self {
        Self {
            dt,
            ..Self::default()
        }
    }
}

/// Neuron model constants
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeuronsConfig {
    pub lif: LifConfig,
}

/// Leaky integrate-and-fire membrane constants
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifConfig {
    /// Membrane RC time constant (seconds)
    pub tau_rc: f64,
    /// Absolute refractory period (seconds)
    pub tau_ref: f64,
    /// Voltage floor applied after integration
    pub min_voltage: f64,
    /// Output value emitted on a spike
    pub amplitude: f64,
}

impl Default for LifConfig {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
            min_voltage: 0.0,
            amplitude: 1.0,
        }
    }
}

/// Probe sampling defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbesConfig {
    /// Steps between samples when a probe does not specify its own period
    pub sample_every: usize,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self { sample_every: 1 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip_through_json() {
        let config = NeurosimConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: NeurosimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: NeurosimConfig =
            serde_json::from_str(r#"{"simulation": {"dt": 0.0005}, "logging": {"format": "json"}}"#)
                .unwrap();
        assert_eq!(config.simulation.dt, 0.0005);
        assert_eq!(config.simulation.parallel_threshold, 4096);
        assert_eq!(config.neurons.lif.tau_rc, 0.02);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
