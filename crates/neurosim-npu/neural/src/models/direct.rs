// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Direct (identity) model: the output is the drive current itself.

use super::traits::{check_calibration_targets, NeuronModel};
use crate::error::{check_len, Result};

/// Identity activation, no state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectModel;

impl DirectModel {
    pub fn step_math(&self, current: &[f64], output: &mut [f64]) -> Result<()> {
        check_len("output", current.len(), output.len())?;
        output.copy_from_slice(current);
        Ok(())
    }
}

impl NeuronModel for DirectModel {
    fn model_name(&self) -> &'static str {
        "Direct"
    }

    fn rate(&self, current: f64) -> f64 {
        current
    }

    /// Targets are validated but ignored: gain is 1 and bias 0 for every unit.
    fn gain_bias(&self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        check_calibration_targets(max_rates, intercepts)?;
        Ok((vec![1.0; max_rates.len()], vec![0.0; max_rates.len()]))
    }
}
