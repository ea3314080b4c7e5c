// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for building and running simulations

use neurosim_config::ConfigError;
use neurosim_neural::NeuralError;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Operand shapes an operator cannot combine, or a write of the wrong shape
    #[error("shape mismatch in {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        context: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// A connection transform that does not fit its endpoints
    #[error("dimension mismatch for connection {source_label} -> {target_label}: {reason}")]
    DimensionMismatch {
        source_label: String,
        target_label: String,
        reason: String,
    },

    #[error("view '{name}' [{offset}..{end}] exceeds base '{base}' of size {base_size}")]
    ViewOutOfBounds {
        name: String,
        base: String,
        offset: usize,
        end: usize,
        base_size: usize,
    },

    #[error("unknown signal {0}")]
    UnknownSignal(String),

    #[error("unknown probe {0}")]
    UnknownProbe(usize),

    /// A connection or probe names a population/node that was never built
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("label '{0}' is already used by another population or node")]
    DuplicateLabel(String),

    #[error("operator graph has a cycle through: {operators:?}")]
    CyclicDependency { operators: Vec<String> },

    #[error(
        "operator #{later} ({later_kind}) must run before #{earlier} ({earlier_kind}) on signal '{signal}'"
    )]
    ScheduleViolation {
        signal: String,
        earlier: usize,
        earlier_kind: &'static str,
        later: usize,
        later_kind: &'static str,
    },

    /// Two mutable operands of one operator share storage
    #[error("{operator}: operands '{first}' and '{second}' share storage")]
    AliasedOperands {
        operator: &'static str,
        first: String,
        second: String,
    },

    #[error("invalid simulator state: cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    /// A node function returned the wrong number of values
    #[error("function output for '{signal}' has {actual} values, expected {expected}")]
    FunctionOutput {
        signal: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Neural(#[from] NeuralError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn shape_mismatch(context: impl Into<String>, left: &[usize], right: &[usize]) -> Self {
        SimError::ShapeMismatch {
            context: context.into(),
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}
