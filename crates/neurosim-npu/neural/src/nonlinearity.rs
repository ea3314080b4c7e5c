// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Nonlinearity
//!
//! A population's transfer function: a model kind plus one gain and one bias
//! per unit. The input-to-drive mapping is
//!
//! ```text
//! J = gain ⊙ x + bias
//! ```
//!
//! and `step_math` turns `J` into the population output for one time step.

use serde::{Deserialize, Serialize};

use crate::error::{check_len, NeuralError, Result};
use crate::models::{DirectModel, LIFModel, LIFParameters, LIFRateModel, NeuronModel};

/// Model kind with its constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeuronKind {
    /// Output equals the drive
    Direct(DirectModel),
    /// Steady-state LIF rate, no state
    LifRate(LIFRateModel),
    /// Spiking LIF with voltage and refractory state
    Lif(LIFModel),
}

impl NeuronKind {
    /// The kind's model behind the shared [`NeuronModel`] contract
    pub fn model(&self) -> &dyn NeuronModel {
        match self {
            NeuronKind::Direct(m) => m,
            NeuronKind::LifRate(m) => m,
            NeuronKind::Lif(m) => m,
        }
    }

    pub fn is_spiking(&self) -> bool {
        matches!(self, NeuronKind::Lif(_))
    }
}

/// Serializable tag for [`NeuronKind`], used by model descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuronType {
    Direct,
    LifRate,
    Lif,
}

impl NeuronType {
    /// Instantiate the kind with LIF constants `params` (ignored by `Direct`)
    pub fn with_params(self, params: LIFParameters) -> NeuronKind {
        match self {
            NeuronType::Direct => NeuronKind::Direct(DirectModel),
            NeuronType::LifRate => NeuronKind::LifRate(LIFRateModel::with_params(params)),
            NeuronType::Lif => NeuronKind::Lif(LIFModel::with_params(params)),
        }
    }
}

/// Mutable per-unit state arrays handed to [`Nonlinearity::step_math`]
///
/// Stateless kinds ignore both fields.
#[derive(Debug, Default)]
pub struct NeuronState<'a> {
    pub voltage: Option<&'a mut [f64]>,
    pub refractory_time: Option<&'a mut [f64]>,
}

/// Per-unit transfer function with gain and bias
#[derive(Debug, Clone, PartialEq)]
pub struct Nonlinearity {
    n_neurons: usize,
    kind: NeuronKind,
    gain: Option<Vec<f64>>,
    bias: Option<Vec<f64>>,
}

impl Nonlinearity {
    /// Create an uncalibrated nonlinearity over `n_neurons` units
    pub fn new(n_neurons: usize, kind: NeuronKind) -> Self {
        Self {
            n_neurons,
            kind,
            gain: None,
            bias: None,
        }
    }

    pub fn lif(n_neurons: usize, params: LIFParameters) -> Self {
        Self::new(n_neurons, NeuronKind::Lif(LIFModel::with_params(params)))
    }

    pub fn lif_rate(n_neurons: usize, params: LIFParameters) -> Self {
        Self::new(n_neurons, NeuronKind::LifRate(LIFRateModel::with_params(params)))
    }

    pub fn direct(n_neurons: usize) -> Self {
        Self::new(n_neurons, NeuronKind::Direct(DirectModel))
    }

    pub fn n_neurons(&self) -> usize {
        self.n_neurons
    }

    pub fn kind(&self) -> &NeuronKind {
        &self.kind
    }

    pub fn model_name(&self) -> &'static str {
        self.kind.model().model_name()
    }

    /// Names of the state arrays `step_math` needs (`voltage`, `refractory_time` for LIF)
    pub fn state_names(&self) -> &'static [&'static str] {
        self.kind.model().state_names()
    }

    pub fn is_calibrated(&self) -> bool {
        self.gain.is_some() && self.bias.is_some()
    }

    /// Solve and store gain/bias from per-unit calibration targets
    ///
    /// Returns the stored `(gain, bias)`. On error nothing is stored.
    pub fn set_gain_bias(&mut self, max_rates: &[f64], intercepts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        check_len("max_rates", self.n_neurons, max_rates.len())?;
        check_len("intercepts", self.n_neurons, intercepts.len())?;

        let (gain, bias) = self.kind.model().gain_bias(max_rates, intercepts)?;
        self.gain = Some(gain.clone());
        self.bias = Some(bias.clone());
        Ok((gain, bias))
    }

    /// Store explicit gain/bias vectors, bypassing calibration
    pub fn set_explicit_gain_bias(&mut self, gain: Vec<f64>, bias: Vec<f64>) -> Result<()> {
        check_len("gain", self.n_neurons, gain.len())?;
        check_len("bias", self.n_neurons, bias.len())?;
        self.gain = Some(gain);
        self.bias = Some(bias);
        Ok(())
    }

    /// Builder-style [`Nonlinearity::set_explicit_gain_bias`]
    pub fn with_gain_bias(mut self, gain: Vec<f64>, bias: Vec<f64>) -> Result<Self> {
        self.set_explicit_gain_bias(gain, bias)?;
        Ok(self)
    }

    pub fn gain(&self) -> Result<&[f64]> {
        self.gain.as_deref().ok_or(NeuralError::GainBiasUnset {
            model: self.model_name(),
        })
    }

    pub fn bias(&self) -> Result<&[f64]> {
        self.bias.as_deref().ok_or(NeuralError::GainBiasUnset {
            model: self.model_name(),
        })
    }

    /// `J = gain ⊙ x + bias`
    pub fn drive(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_len("x", self.n_neurons, x.len())?;
        let gain = self.gain()?;
        let bias = self.bias()?;
        Ok(x.iter()
            .zip(gain)
            .zip(bias)
            .map(|((&x, &g), &b)| g * x + b)
            .collect())
    }

    /// Steady-state output for each unit at input `x`
    pub fn rates(&self, x: &[f64]) -> Result<Vec<f64>> {
        Ok(self.rates_from_current(&self.drive(x)?))
    }

    /// Steady-state output at a scalar input, shared by every unit
    pub fn rates_for(&self, x: f64) -> Result<Vec<f64>> {
        self.rates(&vec![x; self.n_neurons])
    }

    /// Steady-state output for raw drive currents (no gain/bias applied)
    pub fn rates_from_current(&self, current: &[f64]) -> Vec<f64> {
        self.kind.model().rates_from_current(current)
    }

    /// Advance all units one step on drive `current`, writing into `output`
    ///
    /// `parallel` selects the rayon path for spiking kinds; the result does
    /// not depend on it.
    pub fn step_math(
        &self,
        dt: f64,
        current: &[f64],
        output: &mut [f64],
        state: NeuronState<'_>,
        parallel: bool,
    ) -> Result<()> {
        if !self.is_calibrated() {
            return Err(NeuralError::GainBiasUnset {
                model: self.model_name(),
            });
        }
        check_len("J", self.n_neurons, current.len())?;

        match &self.kind {
            NeuronKind::Direct(model) => model.step_math(current, output),
            NeuronKind::LifRate(model) => model.step_math(current, output),
            NeuronKind::Lif(model) => {
                let model_name = model.model_name();
                let voltage = state.voltage.ok_or(NeuralError::MissingState {
                    model: model_name,
                    state: "voltage",
                })?;
                let refractory_time = state.refractory_time.ok_or(NeuralError::MissingState {
                    model: model_name,
                    state: "refractory_time",
                })?;
                model.step_math_with(dt, current, voltage, refractory_time, output, parallel)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTargets;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn calibrated_lif(n: usize, seed: u64) -> Nonlinearity {
        let mut nl = Nonlinearity::lif(n, LIFParameters::default());
        let (max_rates, intercepts) = CalibrationTargets::uniform((80.0, 100.0), (-1.0, 1.0))
            .draw(n, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        nl.set_gain_bias(&max_rates, &intercepts).unwrap();
        nl
    }

    #[test]
    fn test_rates_zero_at_intercept_and_max_at_one() {
        let mut nl = Nonlinearity::lif_rate(3, LIFParameters::default());
        let max_rates = [80.0, 90.0, 100.0];
        let intercepts = [-0.5, 0.0, 0.5];
        nl.set_gain_bias(&max_rates, &intercepts).unwrap();

        let at_intercepts = nl.rates(&intercepts).unwrap();
        assert!(at_intercepts.iter().all(|&r| r.abs() < 1e-9));

        let at_one = nl.rates_for(1.0).unwrap();
        for (r, m) in at_one.iter().zip(max_rates) {
            assert!((r - m).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rates_monotonic_in_input() {
        let nl = calibrated_lif(20, 3);
        let mut previous = nl.rates_for(-2.0).unwrap();
        for i in 1..400 {
            let x = -2.0 + i as f64 * 0.01;
            let current = nl.rates_for(x).unwrap();
            for (now, before) in current.iter().zip(&previous) {
                assert!(now >= before);
            }
            previous = current;
        }
    }

    #[test]
    fn test_uncalibrated_use_is_rejected() {
        let nl = Nonlinearity::lif_rate(2, LIFParameters::default());
        assert!(matches!(nl.rates(&[0.0, 0.0]), Err(NeuralError::GainBiasUnset { .. })));

        let mut out = [0.0; 2];
        let result = nl.step_math(0.001, &[2.0, 2.0], &mut out, NeuronState::default(), false);
        assert!(matches!(result, Err(NeuralError::GainBiasUnset { .. })));
    }

    #[test]
    fn test_set_gain_bias_length_mismatch() {
        let mut nl = Nonlinearity::lif(3, LIFParameters::default());
        let err = nl.set_gain_bias(&[100.0, 100.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, NeuralError::ArraySizeMismatch { what: "max_rates", .. }));
        assert!(!nl.is_calibrated());
    }

    #[test]
    fn test_lif_step_requires_state() {
        let nl = calibrated_lif(2, 0);
        let mut out = [0.0; 2];
        let mut voltage = [0.0; 2];
        let state = NeuronState {
            voltage: Some(&mut voltage[..]),
            refractory_time: None,
        };
        let err = nl.step_math(0.001, &[2.0, 2.0], &mut out, state, false).unwrap_err();
        assert_eq!(
            err,
            NeuralError::MissingState {
                model: "Leaky Integrate-and-Fire (LIF)",
                state: "refractory_time"
            }
        );
    }

    #[test]
    fn test_spike_counts_converge_to_rates() {
        let n = 10;
        let nl = calibrated_lif(n, 42);
        let dt = 0.001;
        let steps = 1000;

        for k in 0..40 {
            let x = -2.0 + 0.1 * k as f64;
            let drive = nl.drive(&vec![x; n]).unwrap();
            let expected = nl.rates_from_current(&drive);

            let mut voltage = vec![0.0; n];
            let mut refractory = vec![0.0; n];
            let mut out = vec![0.0; n];
            let mut counts = vec![0.0; n];
            for _ in 0..steps {
                let state = NeuronState {
                    voltage: Some(&mut voltage[..]),
                    refractory_time: Some(&mut refractory[..]),
                };
                nl.step_math(dt, &drive, &mut out, state, false).unwrap();
                for (c, o) in counts.iter_mut().zip(&out) {
                    *c += o;
                }
            }

            for (count, rate) in counts.iter().zip(&expected) {
                let observed = count / (steps as f64 * dt);
                assert!(
                    (observed - rate).abs() <= 1.0 + 0.02 * rate,
                    "x={}: observed {} expected {}",
                    x,
                    observed,
                    rate
                );
            }
        }
    }

    #[test]
    fn test_direct_step_copies_drive() {
        let nl = Nonlinearity::direct(2).with_gain_bias(vec![1.0, 1.0], vec![0.0, 0.0]).unwrap();
        let mut out = [0.0; 2];
        nl.step_math(0.001, &[0.25, -4.0], &mut out, NeuronState::default(), false)
            .unwrap();
        assert_eq!(out, [0.25, -4.0]);
    }
}
