// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # LIF Rate Model
//!
//! Deterministic, stateless counterpart of [`super::LIFModel`]: each step
//! outputs the steady-state firing rate for the current drive instead of
//! simulating spikes.
//!
//! ```text
//! output = amplitude × rate(J)
//! ```

use super::lif::LIFParameters;
use super::traits::NeuronModel;
use crate::error::{check_len, Result};

/// Leaky integrate-and-fire rate model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LIFRateModel {
    pub params: LIFParameters,
}

impl LIFRateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: LIFParameters) -> Self {
        Self { params }
    }

    /// Write `amplitude × rate(J)` for every unit into `output`
    pub fn step_math(&self, current: &[f64], output: &mut [f64]) -> Result<()> {
        check_len("output", current.len(), output.len())?;
        let amplitude = self.params.amplitude;
        for (out, &j) in output.iter_mut().zip(current) {
            *out = amplitude * self.params.rate(j);
        }
        Ok(())
    }
}

impl NeuronModel for LIFRateModel {
    fn model_name(&self) -> &'static str {
        "LIF Rate"
    }

    #[inline(always)]
    fn rate(&self, current: f64) -> f64 {
        self.params.rate(current)
    }

    fn gain_bias(&self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        self.params.gain_bias(max_rates, intercepts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_writes_rate() {
        let model = LIFRateModel::new();
        let current = [0.5, 1.0, 2.0, 10.0];
        let mut output = [f64::NAN; 4];
        model.step_math(&current, &mut output).unwrap();
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.0);
        assert_eq!(output[2], model.rate(2.0));
        assert_eq!(output[3], model.rate(10.0));
    }

    #[test]
    fn test_amplitude_scales_output() {
        let params = LIFParameters {
            amplitude: 0.5,
            ..LIFParameters::default()
        };
        let model = LIFRateModel::with_params(params);
        let mut output = [0.0];
        model.step_math(&[3.0], &mut output).unwrap();
        assert_eq!(output[0], 0.5 * params.rate(3.0));
    }

    #[test]
    fn test_nan_drive_gives_nan_output() {
        let model = LIFRateModel::new();
        let mut output = [0.0; 2];
        model.step_math(&[f64::NAN, 2.0], &mut output).unwrap();
        assert!(output[0].is_nan());
        assert!(output[1].is_finite());
    }
}
