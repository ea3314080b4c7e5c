// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for nonlinearity operations

/// Errors raised while configuring or stepping a nonlinearity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NeuralError {
    /// A calibration target is outside the model's valid domain
    #[error("invalid parameter {name}[{index}] = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        index: usize,
        value: f64,
        reason: String,
    },

    /// A model constant (time constant, range bound, ...) is unusable
    #[error("invalid model parameters: {0}")]
    InvalidModelParameters(String),

    #[error("array size mismatch for {what}: expected {expected}, got {actual}")]
    ArraySizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("gain and bias must be set before using {model}")]
    GainBiasUnset { model: &'static str },

    #[error("{model} requires the '{state}' state array")]
    MissingState {
        model: &'static str,
        state: &'static str,
    },
}

pub type Result<T> = core::result::Result<T, NeuralError>;

/// Check that `actual` matches `expected`, naming the offending array on failure
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(NeuralError::ArraySizeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
