// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # LIF (Leaky Integrate-and-Fire) Neuron Model
//!
//! ## Model Dynamics
//!
//! ```text
//! Membrane (normalized so the threshold is 1 and the reset is 0):
//!     tau_rc × dV/dt = J − V
//!
//! Per step of length dt:
//!     refractory_time -= dt
//!     Δt = clamp(dt − refractory_time, 0, dt)       (time left to integrate)
//!     V  = V − (J − V) × expm1(−Δt / tau_rc)         (exact solution over Δt)
//!
//! Firing:
//!     if V > 1:
//!         t_spike = dt + tau_rc × ln1p(−(V − 1) / (J − 1))
//!         V = 0, refractory_time = tau_ref + t_spike, output = amplitude
//!     else:
//!         V = max(V, min_voltage), output = 0
//!
//! Steady-state rate (constant J):
//!     rate(J) = 1 / (tau_ref + tau_rc × ln1p(1 / (J − 1)))   for J > 1, else 0
//! ```
//!
//! The calibration inverts `rate` so that input 1 yields `max_rate` and the
//! intercept sits exactly on the threshold `J = 1`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::traits::{check_calibration_targets, ModelParameters, NeuronModel};
use crate::error::{check_len, NeuralError, Result};

/// Unit count at which [`LIFModel::step_math`] switches to rayon
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// LIF model constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LIFParameters {
    /// Membrane RC time constant (seconds)
    pub tau_rc: f64,

    /// Absolute refractory period (seconds)
    pub tau_ref: f64,

    /// Floor applied to the voltage after integration
    pub min_voltage: f64,

    /// Output value on a spike step
    pub amplitude: f64,
}

impl LIFParameters {
    /// Create LIF parameters with custom time constants
    pub fn with_values(tau_rc: f64, tau_ref: f64) -> Self {
        Self {
            tau_rc,
            tau_ref,
            ..Self::default()
        }
    }

    /// Highest firing rate the refractory period allows (`1 / tau_ref`)
    pub fn max_attainable_rate(&self) -> f64 {
        if self.tau_ref > 0.0 {
            1.0 / self.tau_ref
        } else {
            f64::INFINITY
        }
    }

    /// Steady-state firing rate for drive `current`; NaN drive gives NaN
    #[inline(always)]
    pub fn rate(&self, current: f64) -> f64 {
        if current.is_nan() {
            current
        } else if current > 1.0 {
            1.0 / (self.tau_ref + self.tau_rc * (1.0 / (current - 1.0)).ln_1p())
        } else {
            0.0
        }
    }

    /// Exact inverse of [`LIFParameters::rate`] for the calibration targets
    pub fn gain_bias(&self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        self.validate()?;
        check_calibration_targets(max_rates, intercepts)?;

        let ceiling = self.max_attainable_rate();
        let mut gain = Vec::with_capacity(max_rates.len());
        let mut bias = Vec::with_capacity(max_rates.len());

        for (index, (&max_rate, &intercept)) in max_rates.iter().zip(intercepts).enumerate() {
            if max_rate >= ceiling {
                return Err(NeuralError::InvalidParameter {
                    name: "max_rates",
                    index,
                    value: max_rate,
                    reason: format!("must be below 1/tau_ref = {}", ceiling),
                });
            }
            // x is the drive at input 1: rate(x) == max_rate.
            let x = -1.0 / ((self.tau_ref - 1.0 / max_rate) / self.tau_rc).exp_m1();
            let g = (1.0 - x) / (intercept - 1.0);
            gain.push(g);
            bias.push(1.0 - g * intercept);
        }

        Ok((gain, bias))
    }
}

impl Default for LIFParameters {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
            min_voltage: 0.0,
            amplitude: 1.0,
        }
    }
}

impl From<&neurosim_config::LifConfig> for LIFParameters {
    fn from(config: &neurosim_config::LifConfig) -> Self {
        Self {
            tau_rc: config.tau_rc,
            tau_ref: config.tau_ref,
            min_voltage: config.min_voltage,
            amplitude: config.amplitude,
        }
    }
}

impl ModelParameters for LIFParameters {
    fn validate(&self) -> Result<()> {
        if !self.tau_rc.is_finite() || self.tau_rc <= 0.0 {
            return Err(NeuralError::InvalidModelParameters(format!(
                "LIF: tau_rc must be finite and > 0, got {}",
                self.tau_rc
            )));
        }
        if !self.tau_ref.is_finite() || self.tau_ref < 0.0 {
            return Err(NeuralError::InvalidModelParameters(format!(
                "LIF: tau_ref must be finite and >= 0, got {}",
                self.tau_ref
            )));
        }
        if !self.min_voltage.is_finite() || self.min_voltage > 0.0 {
            return Err(NeuralError::InvalidModelParameters(format!(
                "LIF: min_voltage must be finite and <= 0, got {}",
                self.min_voltage
            )));
        }
        Ok(())
    }
}

/// Spiking leaky integrate-and-fire model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LIFModel {
    pub params: LIFParameters,
}

impl LIFModel {
    /// Create a LIF model with default constants
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a LIF model with custom constants
    pub fn with_params(params: LIFParameters) -> Self {
        Self { params }
    }

    /// Advance every unit by one step
    ///
    /// All arrays must have the same length. `voltage` and `refractory_time`
    /// are updated in place; `spiked` is overwritten with `amplitude` for
    /// units that fired this step and 0 otherwise.
    pub fn step_math(
        &self,
        dt: f64,
        current: &[f64],
        voltage: &mut [f64],
        refractory_time: &mut [f64],
        spiked: &mut [f64],
    ) -> Result<()> {
        let parallel = current.len() >= DEFAULT_PARALLEL_THRESHOLD;
        self.step_math_with(dt, current, voltage, refractory_time, spiked, parallel)
    }

    /// [`LIFModel::step_math`] with an explicit choice of execution strategy
    ///
    /// Both strategies run the same per-unit update, so their results are
    /// bit-identical.
    pub fn step_math_with(
        &self,
        dt: f64,
        current: &[f64],
        voltage: &mut [f64],
        refractory_time: &mut [f64],
        spiked: &mut [f64],
        parallel: bool,
    ) -> Result<()> {
        let n = current.len();
        check_len("voltage", n, voltage.len())?;
        check_len("refractory_time", n, refractory_time.len())?;
        check_len("spiked", n, spiked.len())?;

        let params = &self.params;
        if parallel {
            spiked
                .par_iter_mut()
                .zip(voltage.par_iter_mut())
                .zip(refractory_time.par_iter_mut())
                .zip(current.par_iter())
                .for_each(|(((out, v), r), &j)| {
                    *out = step_unit(params, dt, j, v, r);
                });
        } else {
            for (((out, v), r), &j) in spiked
                .iter_mut()
                .zip(voltage.iter_mut())
                .zip(refractory_time.iter_mut())
                .zip(current)
            {
                *out = step_unit(params, dt, j, v, r);
            }
        }
        Ok(())
    }
}

/// One unit, one step. Returns the spike output.
#[inline(always)]
fn step_unit(params: &LIFParameters, dt: f64, current: f64, voltage: &mut f64, refractory: &mut f64) -> f64 {
    let remaining = *refractory - dt;
    let delta_t = (dt - remaining).clamp(0.0, dt);

    let v = *voltage - (current - *voltage) * (-delta_t / params.tau_rc).exp_m1();

    if v > 1.0 {
        let overshoot = (v - 1.0) / (current - 1.0);
        // Linear fallback when the drive alone cannot explain the crossing
        // (voltage started above threshold).
        let t_spike = if current > 1.0 && overshoot < 1.0 {
            dt + params.tau_rc * (-overshoot).ln_1p()
        } else {
            dt
        };
        *voltage = 0.0;
        *refractory = (params.tau_ref + t_spike).max(0.0);
        params.amplitude
    } else {
        // f64::max drops NaN; keep it so divergence stays visible.
        *voltage = if v.is_nan() { v } else { v.max(params.min_voltage) };
        *refractory = if remaining.is_nan() { remaining } else { remaining.max(0.0) };
        0.0
    }
}

impl NeuronModel for LIFModel {
    fn model_name(&self) -> &'static str {
        "Leaky Integrate-and-Fire (LIF)"
    }

    fn state_names(&self) -> &'static [&'static str] {
        &["voltage", "refractory_time"]
    }

    #[inline(always)]
    fn rate(&self, current: f64) -> f64 {
        self.params.rate(current)
    }

    fn gain_bias(&self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        self.params.gain_bias(max_rates, intercepts)
    }
}
