// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Calibration targets (max rate and intercept per unit)
//!
//! Populations either carry explicit targets or a pair of uniform ranges that
//! are sampled with the simulation's seeded RNG at compile time.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{check_len, NeuralError, Result};

/// Default `max_rates` range for [`CalibrationTargets::Uniform`]
pub const DEFAULT_MAX_RATES: (f64, f64) = (200.0, 400.0);

/// Default `intercepts` range for [`CalibrationTargets::Uniform`]
pub const DEFAULT_INTERCEPTS: (f64, f64) = (-1.0, 1.0);

/// Where a population's `max_rates` and `intercepts` come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationTargets {
    /// One value per unit
    Explicit {
        max_rates: Vec<f64>,
        intercepts: Vec<f64>,
    },
    /// Half-open ranges `[low, high)` sampled independently per unit
    Uniform {
        max_rates: (f64, f64),
        intercepts: (f64, f64),
    },
}

impl Default for CalibrationTargets {
    fn default() -> Self {
        CalibrationTargets::Uniform {
            max_rates: DEFAULT_MAX_RATES,
            intercepts: DEFAULT_INTERCEPTS,
        }
    }
}

impl CalibrationTargets {
    pub fn explicit(max_rates: Vec<f64>, intercepts: Vec<f64>) -> Self {
        CalibrationTargets::Explicit {
            max_rates,
            intercepts,
        }
    }

    pub fn uniform(max_rates: (f64, f64), intercepts: (f64, f64)) -> Self {
        CalibrationTargets::Uniform {
            max_rates,
            intercepts,
        }
    }

    /// Produce `n` `(max_rates, intercepts)` pairs
    ///
    /// Explicit targets are returned as-is after a length check; uniform
    /// ranges consume `2 × n` draws from `rng` (all rates first, then all
    /// intercepts) so a fixed seed always yields the same population.
    pub fn draw<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<(Vec<f64>, Vec<f64>)> {
        match self {
            CalibrationTargets::Explicit {
                max_rates,
                intercepts,
            } => {
                check_len("max_rates", n, max_rates.len())?;
                check_len("intercepts", n, intercepts.len())?;
                Ok((max_rates.clone(), intercepts.clone()))
            }
            CalibrationTargets::Uniform {
                max_rates,
                intercepts,
            } => {
                check_range("max_rates", *max_rates)?;
                check_range("intercepts", *intercepts)?;
                let rates = (0..n).map(|_| rng.gen_range(max_rates.0..max_rates.1)).collect();
                let icpts = (0..n)
                    .map(|_| rng.gen_range(intercepts.0..intercepts.1))
                    .collect();
                Ok((rates, icpts))
            }
        }
    }
}

fn check_range(name: &str, (low, high): (f64, f64)) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(NeuralError::InvalidModelParameters(format!(
            "{} range must be finite with low < high, got ({}, {})",
            name, low, high
        )));
    }
    Ok(())
}
