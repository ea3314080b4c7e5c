// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compilation strategy: model description in, runnable model out

use neurosim_config::{NeurosimConfig, SimulationConfig};

use crate::builder::ModelBuilder;
use crate::error::Result;
use crate::model::ModelDescription;
use crate::operator::Operator;
use crate::probe::Probe;
use crate::signal::SignalRegistry;

/// Flat, ordered form of a model that a simulator can initialize from
#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub signals: SignalRegistry,
    /// Execution order; every step runs each operator once in this order
    pub operators: Vec<Operator>,
    /// Indexed by [`crate::ProbeId`]
    pub probes: Vec<Probe>,
    pub dt: f64,
    pub seed: u64,
}

/// Turns a [`ModelDescription`] into a [`PreparedModel`]
///
/// Test doubles and alternative lowerings implement this and are passed to
/// [`crate::Simulator::with_compiler`].
pub trait Compiler {
    fn compile(&self, description: &ModelDescription, config: &SimulationConfig) -> Result<PreparedModel>;
}

/// Lowers through [`ModelBuilder`]: nodes, then populations, then connections, then probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCompiler {
    pub default_sample_every: usize,
}

impl Default for DefaultCompiler {
    fn default() -> Self {
        Self {
            default_sample_every: 1,
        }
    }
}

impl DefaultCompiler {
    /// Take probe defaults from the `[probes]` section
    pub fn from_config(config: &NeurosimConfig) -> Self {
        Self {
            default_sample_every: config.probes.sample_every,
        }
    }
}

impl Compiler for DefaultCompiler {
    fn compile(&self, description: &ModelDescription, config: &SimulationConfig) -> Result<PreparedModel> {
        let mut builder = ModelBuilder::new(config)?.with_default_sample_every(self.default_sample_every)?;

        for node in &description.nodes {
            builder.build_node(node)?;
        }
        for population in &description.populations {
            builder.build_population(population)?;
        }
        for connection in &description.connections {
            builder.connect(connection)?;
        }
        for probe in &description.probes {
            builder.probe(probe)?;
        }

        builder.finish()
    }
}
