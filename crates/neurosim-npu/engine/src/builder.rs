// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Model Builder
//!
//! Lowers populations, nodes, connections and probes into signals and
//! operators.
//!
//! ```text
//! population (n units):
//!     input ← 0                               Reset
//!     J     ← bias                            Copy
//!     J    += gain ⊙ input                    ElementwiseInc
//!     output, voltage, refractory_time ← step SimNeurons
//!
//! connection A → B, transform T:
//!     B.input += T · A.output                 DotInc
//!
//! connection with synapse τ (d = exp(−dt/τ)):
//!     scratch ← 0; scratch += T · A.output    Reset, DotInc
//!     filtered ← (1 − d) · scratch + d ⊙ filtered   ProdUpdate
//!     B.input += filtered                     DotInc
//!
//! function node:
//!     input ← 0 (if any)                      Reset
//!     output ← f(t, input)                    SimPyFunc
//! ```
//!
//! `finish()` sorts everything (hand-pushed operators included) into an
//! order where setters precede incrementers, readers and updaters of each
//! signal.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array1;
use neurosim_config::{ConfigError, SimulationConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::compiler::PreparedModel;
use crate::error::{Result, SimError};
use crate::model::{ConnectionSpec, NodeKind, NodeSpec, PopulationSpec, ProbeSpec, ProbeTarget, Transform};
use crate::operator::Operator;
use crate::probe::{Probe, ProbeId};
use crate::schedule;
use crate::signal::{shape_size, SignalId, SignalRegistry};

/// Signals allocated for one population
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationSignals {
    pub n_neurons: usize,
    pub input: SignalId,
    pub gain: SignalId,
    pub bias: SignalId,
    pub j: SignalId,
    pub output: SignalId,
    pub voltage: Option<SignalId>,
    pub refractory_time: Option<SignalId>,
}

/// Signals allocated for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSignals {
    pub input: Option<SignalId>,
    pub output: SignalId,
}

#[derive(Debug, Clone)]
enum Endpoint {
    Population(PopulationSignals),
    Node(NodeSignals),
}

impl Endpoint {
    fn output(&self) -> SignalId {
        match self {
            Endpoint::Population(p) => p.output,
            Endpoint::Node(n) => n.output,
        }
    }

    fn input(&self) -> Option<SignalId> {
        match self {
            Endpoint::Population(p) => Some(p.input),
            Endpoint::Node(n) => n.input,
        }
    }
}

/// One-shot compiler from model parts to a [`PreparedModel`]
pub struct ModelBuilder {
    dt: f64,
    seed: u64,
    rng: StdRng,
    registry: SignalRegistry,
    operators: Vec<Operator>,
    probes: Vec<Probe>,
    endpoints: HashMap<String, Endpoint>,
    step: SignalId,
    time: SignalId,
    default_sample_every: usize,
}

impl ModelBuilder {
    /// Start a model with `config.dt` and an RNG seeded from `config.seed`
    ///
    /// The `step`/`time` signals and their `TimeUpdate` are created here, so
    /// `TimeUpdate` is always the first operator.
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        if !config.dt.is_finite() || config.dt <= 0.0 {
            return Err(ConfigError::InvalidValue(format!("dt must be finite and > 0, got {}", config.dt)).into());
        }

        let mut registry = SignalRegistry::new();
        let step = registry.scalar("step", 0.0);
        let time = registry.scalar("time", 0.0);

        Ok(Self {
            dt: config.dt,
            seed: config.seed,
            rng: StdRng::seed_from_u64(config.seed),
            registry,
            operators: vec![Operator::TimeUpdate { step, time }],
            probes: Vec::new(),
            endpoints: HashMap::new(),
            step,
            time,
            default_sample_every: 1,
        })
    }

    /// Sampling period for probes that do not set their own
    pub fn with_default_sample_every(mut self, steps: usize) -> Result<Self> {
        if steps == 0 {
            return Err(ConfigError::InvalidValue("sample_every must be >= 1".to_string()).into());
        }
        self.default_sample_every = steps;
        Ok(self)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time_signal(&self) -> SignalId {
        self.time
    }

    pub fn step_signal(&self) -> SignalId {
        self.step
    }

    pub fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    /// For signals of hand-assembled operators
    pub fn registry_mut(&mut self) -> &mut SignalRegistry {
        &mut self.registry
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn population(&self, label: &str) -> Option<&PopulationSignals> {
        match self.endpoints.get(label) {
            Some(Endpoint::Population(p)) => Some(p),
            _ => None,
        }
    }

    pub fn node(&self, label: &str) -> Option<&NodeSignals> {
        match self.endpoints.get(label) {
            Some(Endpoint::Node(n)) => Some(n),
            _ => None,
        }
    }

    /// Append a hand-built operator after checking its operands
    pub fn push(&mut self, op: Operator) -> Result<()> {
        op.validate(&self.registry)?;
        self.operators.push(op);
        Ok(())
    }

    fn claim_label(&self, label: &str) -> Result<()> {
        if self.endpoints.contains_key(label) {
            return Err(SimError::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    fn vector(&mut self, name: String, values: Vec<f64>) -> SignalId {
        self.registry.allocate_with(name, Array1::from(values).into_dyn())
    }

    /// Lower a population; uncalibrated nonlinearities draw their targets from the seeded RNG
    pub fn build_population(&mut self, spec: &PopulationSpec) -> Result<PopulationSignals> {
        self.claim_label(&spec.label)?;
        let label = &spec.label;
        let mut nonlinearity = spec.nonlinearity.clone();
        let n = nonlinearity.n_neurons();

        if !nonlinearity.is_calibrated() {
            let (max_rates, intercepts) = spec.calibration.draw(n, &mut self.rng)?;
            nonlinearity.set_gain_bias(&max_rates, &intercepts)?;
        }
        let gain_values = nonlinearity.gain()?.to_vec();
        let bias_values = nonlinearity.bias()?.to_vec();

        let input = self.registry.allocate(format!("{}.input", label), &[n]);
        let gain = self.vector(format!("{}.gain", label), gain_values);
        let bias = self.vector(format!("{}.bias", label), bias_values);
        let j = self.registry.allocate(format!("{}.J", label), &[n]);
        let output = self.registry.allocate(format!("{}.output", label), &[n]);

        let mut state = Vec::new();
        for name in nonlinearity.state_names() {
            state.push((*name, self.registry.allocate(format!("{}.{}", label, name), &[n])));
        }
        let state_signal = |key: &str| state.iter().find(|(name, _)| *name == key).map(|(_, id)| *id);
        let (voltage, refractory_time) = (state_signal("voltage"), state_signal("refractory_time"));

        self.push(Operator::Reset { dst: input, value: 0.0 })?;
        self.push(Operator::Copy { src: bias, dst: j })?;
        self.push(Operator::ElementwiseInc {
            a: gain,
            x: input,
            y: j,
        })?;
        self.push(Operator::SimNeurons {
            nonlinearity: Arc::new(nonlinearity),
            j,
            output,
            voltage,
            refractory_time,
        })?;

        debug!(
            population = %label,
            n_neurons = n,
            spiking = voltage.is_some(),
            "Built population"
        );

        let signals = PopulationSignals {
            n_neurons: n,
            input,
            gain,
            bias,
            j,
            output,
            voltage,
            refractory_time,
        };
        self.endpoints
            .insert(label.clone(), Endpoint::Population(signals.clone()));
        Ok(signals)
    }

    /// Lower a constant or function node
    pub fn build_node(&mut self, spec: &NodeSpec) -> Result<NodeSignals> {
        self.claim_label(&spec.label)?;
        let label = &spec.label;

        let signals = match &spec.kind {
            NodeKind::Constant(value) => NodeSignals {
                input: None,
                output: self.vector(format!("{}.output", label), value.clone()),
            },
            NodeKind::Function { n_in, n_out, func } => {
                let input = if *n_in > 0 {
                    let input = self.registry.allocate(format!("{}.input", label), &[*n_in]);
                    self.push(Operator::Reset { dst: input, value: 0.0 })?;
                    Some(input)
                } else {
                    None
                };
                let output = self.registry.allocate(format!("{}.output", label), &[*n_out]);
                self.push(Operator::SimPyFunc {
                    time: self.time,
                    input,
                    output,
                    func: func.clone(),
                })?;
                NodeSignals { input, output }
            }
        };

        debug!(node = %label, size_in = spec.size_in(), size_out = spec.size_out(), "Built node");
        self.endpoints.insert(label.clone(), Endpoint::Node(signals.clone()));
        Ok(signals)
    }

    fn endpoint(&self, label: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(label)
            .ok_or_else(|| SimError::UnknownEndpoint(label.to_string()))
    }

    /// Lower a connection between two already-built endpoints
    pub fn connect(&mut self, spec: &ConnectionSpec) -> Result<()> {
        let dimension_error = |reason: String| SimError::DimensionMismatch {
            source_label: spec.source.clone(),
            target_label: spec.target.clone(),
            reason,
        };

        let src = self.endpoint(&spec.source)?.output();
        let dst = self
            .endpoint(&spec.target)?
            .input()
            .ok_or_else(|| dimension_error("target has no input".to_string()))?;
        let size_out = shape_size(self.registry.shape(src)?);
        let size_in = shape_size(self.registry.shape(dst)?);

        let name = format!("{}->{}", spec.source, spec.target);
        let transform = match &spec.transform {
            Transform::Scalar(value) => {
                if size_out != size_in {
                    return Err(dimension_error(format!(
                        "scalar transform needs equal sizes, got {} -> {}",
                        size_out, size_in
                    )));
                }
                self.registry.scalar(format!("{}.transform", name), *value)
            }
            Transform::Matrix(matrix) => {
                if matrix.dim() != (size_in, size_out) {
                    return Err(dimension_error(format!(
                        "transform is {:?}, expected ({}, {})",
                        matrix.dim(),
                        size_in,
                        size_out
                    )));
                }
                self.registry
                    .allocate_with(format!("{}.transform", name), matrix.clone().into_dyn())
            }
        };

        match spec.synapse {
            None => self.push(Operator::DotInc {
                a: transform,
                x: src,
                y: dst,
            })?,
            Some(tau) => {
                if !tau.is_finite() || tau <= 0.0 {
                    return Err(dimension_error(format!("synapse tau must be > 0, got {}", tau)));
                }
                let decay = (-self.dt / tau).exp();
                let scratch = self.registry.allocate(format!("{}.scratch", name), &[size_in]);
                let filtered = self.registry.allocate(format!("{}.filtered", name), &[size_in]);
                let input_gain = self.registry.scalar(format!("{}.input_gain", name), 1.0 - decay);
                let decay_signal = self.registry.scalar(format!("{}.decay", name), decay);
                let one = self.registry.scalar(format!("{}.one", name), 1.0);

                self.push(Operator::Reset {
                    dst: scratch,
                    value: 0.0,
                })?;
                self.push(Operator::DotInc {
                    a: transform,
                    x: src,
                    y: scratch,
                })?;
                self.push(Operator::ProdUpdate {
                    a: input_gain,
                    x: scratch,
                    b: decay_signal,
                    y: filtered,
                })?;
                self.push(Operator::DotInc {
                    a: one,
                    x: filtered,
                    y: dst,
                })?;
            }
        }

        debug!(connection = %name, size_in, size_out, synapse = ?spec.synapse, "Built connection");
        Ok(())
    }

    /// Register a probe; ids are assigned in call order starting at 0
    pub fn probe(&mut self, spec: &ProbeSpec) -> Result<ProbeId> {
        let (signal, label) = match &spec.target {
            ProbeTarget::Output(label) => (self.endpoint(label)?.output(), format!("{}.output", label)),
            ProbeTarget::Input(label) => {
                let input = self
                    .endpoint(label)?
                    .input()
                    .ok_or_else(|| SimError::UnknownEndpoint(format!("{}.input", label)))?;
                (input, format!("{}.input", label))
            }
            ProbeTarget::State { label, state } => {
                let population = self
                    .population(label)
                    .ok_or_else(|| SimError::UnknownEndpoint(label.clone()))?;
                let signal = match state.as_str() {
                    "J" => Some(population.j),
                    "voltage" => population.voltage,
                    "refractory_time" => population.refractory_time,
                    _ => None,
                }
                .ok_or_else(|| SimError::UnknownEndpoint(format!("{}.{}", label, state)))?;
                (signal, format!("{}.{}", label, state))
            }
            ProbeTarget::Signal(id) => (*id, self.registry.name(*id)?.to_string()),
        };

        let sample_every = spec.sample_every.unwrap_or(self.default_sample_every);
        if sample_every == 0 {
            return Err(ConfigError::InvalidValue(format!("probe '{}': sample_every must be >= 1", label)).into());
        }

        self.probes.push(Probe {
            signal,
            sample_every,
            label,
        });
        Ok(ProbeId(self.probes.len() - 1))
    }

    /// Order the operators and hand over the model
    pub fn finish(self) -> Result<PreparedModel> {
        let order = schedule::order(&self.operators, &self.registry)?;
        let mut slots: Vec<Option<Operator>> = self.operators.into_iter().map(Some).collect();
        let operators: Vec<Operator> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        debug!(
            signals = self.registry.len(),
            operators = operators.len(),
            probes = self.probes.len(),
            "Model build complete"
        );

        Ok(PreparedModel {
            signals: self.registry,
            operators,
            probes: self.probes,
            dt: self.dt,
            seed: self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use neurosim_neural::{LIFParameters, Nonlinearity};

    fn builder() -> ModelBuilder {
        ModelBuilder::new(&SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_population_signals_and_operators() {
        let mut b = builder();
        let pop = b
            .build_population(&PopulationSpec::new("ens", Nonlinearity::lif(4, LIFParameters::default())))
            .unwrap();

        assert_eq!(pop.n_neurons, 4);
        let state_name = |id: Option<SignalId>| b.registry().name(id.unwrap()).unwrap().to_string();
        assert_eq!(state_name(pop.voltage), "ens.voltage");
        assert_eq!(state_name(pop.refractory_time), "ens.refractory_time");
        let kinds: Vec<_> = b.operators().iter().map(Operator::kind_name).collect();
        assert_eq!(
            kinds,
            vec!["TimeUpdate", "Reset", "Copy", "ElementwiseInc", "SimNeurons"]
        );
    }

    #[test]
    fn test_rate_population_has_no_state() {
        let mut b = builder();
        let pop = b
            .build_population(&PopulationSpec::new("ens", Nonlinearity::lif_rate(3, LIFParameters::default())))
            .unwrap();
        assert_eq!(pop.voltage, None);
        assert_eq!(pop.refractory_time, None);
    }

    #[test]
    fn test_same_seed_same_calibration() {
        let spec = PopulationSpec::new("ens", Nonlinearity::lif(8, LIFParameters::default()));
        let mut a = builder();
        let mut b = builder();
        let pa = a.build_population(&spec).unwrap();
        let pb = b.build_population(&spec).unwrap();
        assert_eq!(
            a.registry().initial_value(pa.gain).unwrap(),
            b.registry().initial_value(pb.gain).unwrap()
        );
    }

    #[test]
    fn test_connection_dimension_mismatch() {
        let mut b = builder();
        b.build_node(&NodeSpec::constant("stim", vec![0.5, 0.5])).unwrap();
        b.build_population(&PopulationSpec::new("ens", Nonlinearity::lif(3, LIFParameters::default())))
            .unwrap();

        let scalar = ConnectionSpec::new("stim", "ens");
        assert!(matches!(b.connect(&scalar), Err(SimError::DimensionMismatch { .. })));

        let wrong = ConnectionSpec::new("stim", "ens").with_transform(Transform::Matrix(arr2(&[[1.0, 0.0]])));
        assert!(matches!(b.connect(&wrong), Err(SimError::DimensionMismatch { .. })));

        let right = ConnectionSpec::new("stim", "ens")
            .with_transform(Transform::Matrix(arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])));
        assert!(b.connect(&right).is_ok());
    }

    #[test]
    fn test_constant_node_cannot_be_a_target() {
        let mut b = builder();
        b.build_node(&NodeSpec::constant("a", vec![1.0])).unwrap();
        b.build_node(&NodeSpec::constant("b", vec![1.0])).unwrap();
        assert!(matches!(
            b.connect(&ConnectionSpec::new("a", "b")),
            Err(SimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_endpoint_and_duplicate_label() {
        let mut b = builder();
        b.build_node(&NodeSpec::constant("a", vec![1.0])).unwrap();
        assert!(matches!(
            b.connect(&ConnectionSpec::new("a", "missing")),
            Err(SimError::UnknownEndpoint(_))
        ));
        assert!(matches!(
            b.build_node(&NodeSpec::constant("a", vec![2.0])),
            Err(SimError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_finish_orders_hand_pushed_operators() {
        let mut b = builder();
        let x = b.registry_mut().allocate("x", &[2]);
        let y = b.registry_mut().allocate("y", &[2]);
        let one = b.registry_mut().scalar("one", 1.0);

        b.push(Operator::DotInc { a: one, x, y }).unwrap();
        b.push(Operator::Reset { dst: y, value: 0.0 }).unwrap();
        let model = b.finish().unwrap();

        let kinds: Vec<_> = model.operators.iter().map(Operator::kind_name).collect();
        assert_eq!(kinds, vec!["TimeUpdate", "Reset", "DotInc"]);
    }

    #[test]
    fn test_push_rejects_bad_shapes() {
        let mut b = builder();
        let x = b.registry_mut().allocate("x", &[2]);
        let y = b.registry_mut().allocate("y", &[3]);
        assert!(matches!(
            b.push(Operator::Copy { src: x, dst: y }),
            Err(SimError::ShapeMismatch { .. })
        ));
    }
}
