// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within valid ranges and consistent with
//! each other before a simulator is built from them.

use crate::{ConfigError, ConfigResult, NeurosimConfig};

#[cfg(not(feature = "std"))]
use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    NotPositive { field: String, value: f64 },
    NotFinite { field: String },
    InvalidValue { field: String, reason: String },
}

impl core::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotPositive { field, value } => {
                write!(f, "{} = {} must be strictly positive", field, value)
            }
            Self::NotFinite { field } => write!(f, "{} must be finite", field),
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Positive, finite time step and membrane constants
/// - Non-negative refractory period and a rate ceiling above zero
/// - Non-zero sampling and parallelism thresholds
/// - Known log levels
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation found
pub fn validate_config(config: &NeurosimConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_simulation(config, &mut errors);
    validate_neurons(config, &mut errors);
    validate_probes_and_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn require_positive(field: &str, value: f64, errors: &mut Vec<ConfigValidationError>) {
    if !value.is_finite() {
        errors.push(ConfigValidationError::NotFinite {
            field: field.to_string(),
        });
    } else if value <= 0.0 {
        errors.push(ConfigValidationError::NotPositive {
            field: field.to_string(),
            value,
        });
    }
}

fn validate_simulation(config: &NeurosimConfig, errors: &mut Vec<ConfigValidationError>) {
    require_positive("simulation.dt", config.simulation.dt, errors);

    if config.simulation.parallel_threshold == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "simulation.parallel_threshold".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

fn validate_neurons(config: &NeurosimConfig, errors: &mut Vec<ConfigValidationError>) {
    let lif = &config.neurons.lif;
    require_positive("neurons.lif.tau_rc", lif.tau_rc, errors);

    if !lif.tau_ref.is_finite() || lif.tau_ref < 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neurons.lif.tau_ref".to_string(),
            reason: format!("{} must be finite and >= 0", lif.tau_ref),
        });
    }
    if !lif.min_voltage.is_finite() || lif.min_voltage > 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neurons.lif.min_voltage".to_string(),
            reason: format!("{} must be finite and <= 0 (the reset value)", lif.min_voltage),
        });
    }
    if !lif.amplitude.is_finite() {
        errors.push(ConfigValidationError::NotFinite {
            field: "neurons.lif.amplitude".to_string(),
        });
    }
}

fn validate_probes_and_logging(config: &NeurosimConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.probes.sample_every == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "probes.sample_every".to_string(),
            reason: "must be at least 1 step".to_string(),
        });
    }

    const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
    let level = config.logging.level.to_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {:?}", config.logging.level, LEVELS),
        });
    }
}
