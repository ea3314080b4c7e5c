// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Plain-data model description consumed by the builder
//!
//! Populations, nodes, connections and probes are referenced by label.

use ndarray::Array2;
use neurosim_neural::{CalibrationTargets, Nonlinearity};

use crate::operator::NodeFunction;
use crate::signal::SignalId;

/// A group of units sharing one nonlinearity
#[derive(Debug, Clone)]
pub struct PopulationSpec {
    pub label: String,
    pub nonlinearity: Nonlinearity,
    /// Used only when `nonlinearity` has no gain/bias yet
    pub calibration: CalibrationTargets,
}

impl PopulationSpec {
    pub fn new(label: impl Into<String>, nonlinearity: Nonlinearity) -> Self {
        Self {
            label: label.into(),
            nonlinearity,
            calibration: CalibrationTargets::default(),
        }
    }

    pub fn with_calibration(mut self, calibration: CalibrationTargets) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn n_neurons(&self) -> usize {
        self.nonlinearity.n_neurons()
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Fixed output, no operator
    Constant(Vec<f64>),
    /// `output = func(t, input)` each step
    Function {
        n_in: usize,
        n_out: usize,
        func: NodeFunction,
    },
}

/// A non-neural source or custom function unit
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub label: String,
    pub kind: NodeKind,
}

impl NodeSpec {
    pub fn constant(label: impl Into<String>, value: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            kind: NodeKind::Constant(value),
        }
    }

    pub fn function<F>(label: impl Into<String>, n_in: usize, n_out: usize, func: F) -> Self
    where
        F: Fn(f64, &[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            kind: NodeKind::Function {
                n_in,
                n_out,
                func: NodeFunction::new(func),
            },
        }
    }

    pub fn size_in(&self) -> usize {
        match &self.kind {
            NodeKind::Constant(_) => 0,
            NodeKind::Function { n_in, .. } => *n_in,
        }
    }

    pub fn size_out(&self) -> usize {
        match &self.kind {
            NodeKind::Constant(value) => value.len(),
            NodeKind::Function { n_out, .. } => *n_out,
        }
    }
}

/// Linear map applied along a connection
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Same-size endpoints, every element scaled
    Scalar(f64),
    /// `[target size, source size]`
    Matrix(Array2<f64>),
}

impl Default for Transform {
    fn default() -> Self {
        Transform::Scalar(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub source: String,
    pub target: String,
    pub transform: Transform,
    /// Low-pass synapse time constant in seconds; `None` connects directly
    pub synapse: Option<f64>,
}

impl ConnectionSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            transform: Transform::default(),
            synapse: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_synapse(mut self, tau: f64) -> Self {
        self.synapse = Some(tau);
        self
    }
}

/// What a probe records
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeTarget {
    /// Output of a population or node
    Output(String),
    /// Input of a population or function node
    Input(String),
    /// Population state array (`voltage`, `refractory_time`) or drive (`J`)
    State { label: String, state: String },
    /// Any signal, for hand-assembled models
    Signal(SignalId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    pub target: ProbeTarget,
    /// `None` takes `[probes] sample_every` from configuration
    pub sample_every: Option<usize>,
}

impl ProbeSpec {
    pub fn new(target: ProbeTarget) -> Self {
        Self {
            target,
            sample_every: None,
        }
    }

    pub fn output(label: impl Into<String>) -> Self {
        Self::new(ProbeTarget::Output(label.into()))
    }

    pub fn every(mut self, steps: usize) -> Self {
        self.sample_every = Some(steps);
        self
    }
}

/// Everything the builder needs to produce a runnable model
#[derive(Debug, Clone, Default)]
pub struct ModelDescription {
    pub populations: Vec<PopulationSpec>,
    pub nodes: Vec<NodeSpec>,
    pub connections: Vec<ConnectionSpec>,
    pub probes: Vec<ProbeSpec>,
}

impl ModelDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_population(&mut self, population: PopulationSpec) -> &mut Self {
        self.populations.push(population);
        self
    }

    pub fn add_node(&mut self, node: NodeSpec) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(&mut self, connection: ConnectionSpec) -> &mut Self {
        self.connections.push(connection);
        self
    }

    /// Register a probe; its id is its position in `probes`
    pub fn add_probe(&mut self, probe: ProbeSpec) -> crate::probe::ProbeId {
        self.probes.push(probe);
        crate::probe::ProbeId(self.probes.len() - 1)
    }
}
