// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared contract of all neuron models

use crate::error::{NeuralError, Result};

/// A per-unit transfer function with a closed-form calibration
///
/// Implementors supply the steady-state rate curve and the exact gain/bias
/// solve that places a unit's threshold at its intercept and its rate at
/// input 1 on its max rate. Stepping lives on the concrete types because
/// stateful models need extra arrays.
pub trait NeuronModel: Send + Sync {
    /// Human readable model name (used in logs and errors)
    fn model_name(&self) -> &'static str;

    /// Names of the per-unit state arrays the model integrates between steps
    fn state_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Steady-state output for a constant drive current `current`
    fn rate(&self, current: f64) -> f64;

    /// Solve for per-unit gain and bias from calibration targets
    fn gain_bias(&self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)>;

    /// Apply [`NeuronModel::rate`] to every element of `currents`
    fn rates_from_current(&self, currents: &[f64]) -> Vec<f64> {
        currents.iter().map(|&j| self.rate(j)).collect()
    }
}

/// Validation hook for model constants
pub trait ModelParameters {
    /// Validate parameter values
    fn validate(&self) -> Result<()>;
}

/// Reject calibration targets outside the domain every model shares
///
/// `max_rates` must be finite and strictly positive, `intercepts` finite and
/// strictly below 1. Nothing is clamped.
pub fn check_calibration_targets(max_rates: &[f64], intercepts: &[f64]) -> Result<()> {
    crate::error::check_len("intercepts", max_rates.len(), intercepts.len())?;

    for (index, (&max_rate, &intercept)) in max_rates.iter().zip(intercepts).enumerate() {
        if !max_rate.is_finite() || max_rate <= 0.0 {
            return Err(NeuralError::InvalidParameter {
                name: "max_rates",
                index,
                value: max_rate,
                reason: "must be finite and > 0".to_string(),
            });
        }
        if !intercept.is_finite() || intercept >= 1.0 {
            return Err(NeuralError::InvalidParameter {
                name: "intercepts",
                index,
                value: intercept,
                reason: "must be finite and < 1".to_string(),
            });
        }
    }
    Ok(())
}
