// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator dataflow tests
//!
//! Hand-assembled operator graphs run through the simulator, checking
//! per-step values against direct arithmetic.
//!
//! # Coverage
//! - Function feedback loop (SimPyFunc + DotInc + ProdUpdate)
//! - Matrix connections (DotInc)
//! - Low-pass synapses (Reset + DotInc + ProdUpdate)
//! - Schedule validation and unknown operands at initialize
//! - Sequential vs rayon neuron updates
//! - Non-finite values flowing through populations

use ndarray::{arr1, arr2, Array2, ArrayD};
use neurosim_config::SimulationConfig;
use neurosim_engine::{
    Compiler, ConnectionSpec, DefaultCompiler, ModelBuilder, ModelDescription, NodeFunction, NodeSpec, Operator,
    PopulationSpec, PreparedModel, ProbeSpec, ProbeTarget, SimError, Simulator, Transform,
};
use neurosim_neural::{CalibrationTargets, LIFParameters, Nonlinearity};

// ============================================================================
// Helper Functions
// ============================================================================

fn config() -> SimulationConfig {
    SimulationConfig::default()
}

fn initialized(model: PreparedModel, config: &SimulationConfig) -> Simulator {
    let mut sim = Simulator::new(config).unwrap();
    sim.initialize(model).unwrap();
    sim
}

fn square_plus_one(_t: f64, x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| v * v + 1.0).collect()
}

// ============================================================================
// Function feedback loop
// ============================================================================

#[test]
fn test_function_feedback_sequence() {
    let x = [0.5, -2.0];
    let mut b = ModelBuilder::new(&config()).unwrap();
    let time = b.time_signal();

    let reg = b.registry_mut();
    let input = reg.allocate("input", &[2]);
    let output = reg.allocate("output", &[2]);
    let ins = reg.allocate_with("ins", arr1(&x).into_dyn());
    let eye = reg.allocate_with("eye", Array2::<f64>::eye(2).into_dyn());
    let zero = reg.scalar("zero", 0.0);

    b.push(Operator::Reset { dst: input, value: 0.0 }).unwrap();
    b.push(Operator::SimPyFunc {
        time,
        input: Some(input),
        output,
        func: NodeFunction::new(square_plus_one),
    })
    .unwrap();
    b.push(Operator::DotInc { a: eye, x: ins, y: input }).unwrap();
    b.push(Operator::ProdUpdate {
        a: eye,
        x: output,
        b: zero,
        y: ins,
    })
    .unwrap();
    let model = b.finish().unwrap();

    let kinds: Vec<_> = model.operators.iter().map(Operator::kind_name).collect();
    assert_eq!(kinds, vec!["TimeUpdate", "Reset", "DotInc", "ProdUpdate", "SimPyFunc"]);

    let mut sim = initialized(model, &config());
    let fx = square_plus_one(0.0, &x);
    let f0 = square_plus_one(0.0, &[0.0, 0.0]);

    sim.step().unwrap();
    assert_eq!(sim.signal(ins).unwrap().iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0]);
    assert_eq!(sim.signal(output).unwrap().iter().copied().collect::<Vec<_>>(), fx);

    sim.step().unwrap();
    assert_eq!(sim.signal(ins).unwrap().iter().copied().collect::<Vec<_>>(), fx);
    assert_eq!(sim.signal(output).unwrap().iter().copied().collect::<Vec<_>>(), f0);
}

#[test]
fn test_function_output_length_checked() {
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::function("bad", 0, 2, |_, _| vec![1.0]));
    let mut sim = Simulator::build(&model, &config()).unwrap();
    assert!(matches!(sim.step(), Err(SimError::FunctionOutput { expected: 2, actual: 1, .. })));
}

#[test]
fn test_function_node_sees_step_time() {
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::function("clock", 0, 1, |t, _| vec![t]));
    let probe = model.add_probe(ProbeSpec::output("clock"));

    let mut sim = Simulator::build(&model, &SimulationConfig::with_dt(0.01)).unwrap();
    sim.run_steps(3).unwrap();

    let data = sim.data(probe).unwrap();
    for (k, expected) in [0.01, 0.02, 0.03].iter().enumerate() {
        assert!((data[[k, 0]] - expected).abs() < 1e-12);
    }
}

// ============================================================================
// Connections
// ============================================================================

#[test]
fn test_matrix_connection_matches_product() {
    let transform = arr2(&[[1.0, 0.0], [0.5, -1.0], [2.0, 3.0]]);
    let x = [1.0, 2.0];

    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::constant("stim", x.to_vec()));
    model.add_node(NodeSpec::function("sink", 3, 3, |_, v| v.to_vec()));
    model.connect(ConnectionSpec::new("stim", "sink").with_transform(Transform::Matrix(transform.clone())));
    let probe = model.add_probe(ProbeSpec::new(ProbeTarget::Input("sink".to_string())));

    let mut sim = Simulator::build(&model, &config()).unwrap();
    sim.run_steps(2).unwrap();

    let expected = transform.dot(&arr1(&x));
    let data = sim.data(probe).unwrap();
    for step in 0..2 {
        for i in 0..3 {
            assert!((data[[step, i]] - expected[i]).abs() < 1e-12);
        }
    }
}

#[test]
fn test_connections_sum_into_target() {
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::constant("a", vec![1.0, 2.0]));
    model.add_node(NodeSpec::constant("b", vec![10.0, 20.0]));
    model.add_node(NodeSpec::function("sink", 2, 2, |_, v| v.to_vec()));
    model.connect(ConnectionSpec::new("a", "sink"));
    model.connect(ConnectionSpec::new("b", "sink").with_transform(Transform::Scalar(-0.5)));
    let probe = model.add_probe(ProbeSpec::output("sink"));

    let mut sim = Simulator::build(&model, &config()).unwrap();
    sim.step().unwrap();
    sim.step().unwrap();

    let data = sim.data(probe).unwrap();
    assert_eq!(data[[1, 0]], -4.0);
    assert_eq!(data[[1, 1]], -8.0);
}

#[test]
fn test_synapse_low_pass() {
    let tau = 0.01;
    let cfg = config();
    let decay = (-cfg.dt / tau).exp();

    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::constant("stim", vec![1.0]));
    model.add_node(NodeSpec::function("sink", 1, 1, |_, v| v.to_vec()));
    model.connect(ConnectionSpec::new("stim", "sink").with_synapse(tau));
    let probe = model.add_probe(ProbeSpec::new(ProbeTarget::Input("sink".to_string())));

    let mut sim = Simulator::build(&model, &cfg).unwrap();
    sim.run(0.1).unwrap();
    let data = sim.data(probe).unwrap();

    // The target sees the filter state of the previous step
    assert_eq!(data[[0, 0]], 0.0);
    assert!((data[[1, 0]] - (1.0 - decay)).abs() < 1e-12);
    assert!((data[[2, 0]] - (1.0 - decay * decay)).abs() < 1e-12);

    let last = data[[99, 0]];
    assert!(last > 0.9999 && last < 1.0, "filter did not settle: {}", last);
    for k in 1..100 {
        assert!(data[[k, 0]] >= data[[k - 1, 0]]);
    }
}

#[test]
fn test_rejects_non_positive_synapse() {
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::constant("stim", vec![1.0]));
    model.add_node(NodeSpec::function("sink", 1, 1, |_, v| v.to_vec()));
    model.connect(ConnectionSpec::new("stim", "sink").with_synapse(0.0));
    assert!(matches!(
        Simulator::build(&model, &config()),
        Err(SimError::DimensionMismatch { .. })
    ));
}

// ============================================================================
// Initialization checks
// ============================================================================

/// Lowers normally, then moves the first DotInc ahead of the Reset it depends on
struct Misordered;

impl Compiler for Misordered {
    fn compile(&self, description: &ModelDescription, config: &SimulationConfig) -> neurosim_engine::Result<PreparedModel> {
        let mut model = DefaultCompiler::default().compile(description, config)?;
        let reset = model.operators.iter().position(|op| op.kind_name() == "Reset");
        let dot = model.operators.iter().position(|op| op.kind_name() == "DotInc");
        if let (Some(reset), Some(dot)) = (reset, dot) {
            model.operators.swap(reset, dot);
        }
        Ok(model)
    }
}

fn passthrough_model() -> ModelDescription {
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::constant("stim", vec![1.0]));
    model.add_node(NodeSpec::function("sink", 1, 1, |_, v| v.to_vec()));
    model.connect(ConnectionSpec::new("stim", "sink"));
    model
}

#[test]
fn test_schedule_violation_detected() {
    let result = Simulator::with_compiler(&passthrough_model(), &config(), &Misordered);
    assert!(matches!(result, Err(SimError::ScheduleViolation { .. })));

    let unchecked = SimulationConfig {
        validate_schedule: false,
        ..config()
    };
    assert!(Simulator::with_compiler(&passthrough_model(), &unchecked, &Misordered).is_ok());
}

#[test]
fn test_unknown_signal_rejected_at_initialize() {
    let mut other = ModelBuilder::new(&config()).unwrap();
    for i in 0..8 {
        other.registry_mut().allocate(format!("pad{}", i), &[1]);
    }
    let foreign = other.registry_mut().allocate("foreign", &[1]);

    let mut model = ModelBuilder::new(&config()).unwrap().finish().unwrap();
    model.operators.push(Operator::Reset {
        dst: foreign,
        value: 1.0,
    });

    let mut sim = Simulator::new(&config()).unwrap();
    assert!(matches!(sim.initialize(model), Err(SimError::UnknownSignal(_))));
}

#[test]
fn test_zero_steps_keeps_initial_values() {
    let mut model = passthrough_model();
    model.add_population(PopulationSpec::new("ens", Nonlinearity::lif(5, LIFParameters::default())));
    model.connect(ConnectionSpec::new("stim", "ens").with_transform(Transform::Matrix(Array2::ones((5, 1)))));

    let mut sim = Simulator::build(&model, &config()).unwrap();
    assert_eq!(sim.run(0.0).unwrap(), 0);

    let prepared = sim.model().unwrap();
    for id in prepared.signals.ids() {
        let initial: ArrayD<f64> = prepared.signals.initial_value(id).unwrap();
        assert_eq!(sim.signal(id).unwrap(), initial.view(), "signal {}", id);
    }
}

// ============================================================================
// Neuron update paths
// ============================================================================

#[test]
fn test_parallel_and_sequential_neurons_agree() {
    let n = 64;
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::function("drive", 0, 1, |t, _| vec![(20.0 * t).sin()]));
    model.add_population(
        PopulationSpec::new("ens", Nonlinearity::lif(n, LIFParameters::default()))
            .with_calibration(CalibrationTargets::uniform((10.0, 200.0), (-1.0, 1.0))),
    );
    model.connect(ConnectionSpec::new("drive", "ens").with_transform(Transform::Matrix(Array2::ones((n, 1)))));
    let spikes = model.add_probe(ProbeSpec::output("ens"));
    let voltage = model.add_probe(ProbeSpec::new(ProbeTarget::State {
        label: "ens".to_string(),
        state: "voltage".to_string(),
    }));

    let run = |threshold: usize| {
        let cfg = SimulationConfig {
            seed: 3,
            parallel_threshold: threshold,
            ..config()
        };
        let mut sim = Simulator::build(&model, &cfg).unwrap();
        sim.run(0.2).unwrap();
        (sim.data(spikes).unwrap(), sim.data(voltage).unwrap())
    };

    let (seq_spikes, seq_voltage) = run(usize::MAX);
    let (par_spikes, par_voltage) = run(1);
    assert_eq!(seq_spikes, par_spikes);
    assert_eq!(seq_voltage, par_voltage);
    assert!(seq_spikes.iter().any(|&s| s > 0.0));
    assert_eq!(seq_spikes.shape(), &[200, n]);
}

// ============================================================================
// Numeric divergence
// ============================================================================

#[test]
fn test_non_finite_drive_reaches_probes() {
    let n = 3;
    let mut model = ModelDescription::new();
    model.add_node(NodeSpec::function("blowup", 0, 1, |t, _| {
        if t > 0.0015 {
            vec![f64::NAN]
        } else {
            vec![0.5]
        }
    }));
    model.add_node(NodeSpec::function("inf", 0, 1, |_, _| vec![f64::INFINITY]));
    model.add_population(PopulationSpec::new("spiking", Nonlinearity::lif(n, LIFParameters::default())));
    model.add_population(PopulationSpec::new("rate", Nonlinearity::lif_rate(n, LIFParameters::default())));
    model.add_population(PopulationSpec::new("direct", Nonlinearity::direct(n)));
    let fan_out = || Transform::Matrix(Array2::ones((n, 1)));
    model.connect(ConnectionSpec::new("blowup", "spiking").with_transform(fan_out()));
    model.connect(ConnectionSpec::new("blowup", "rate").with_transform(fan_out()));
    model.connect(ConnectionSpec::new("inf", "direct").with_transform(fan_out()));

    let state = |label: &str, state: &str| {
        ProbeSpec::new(ProbeTarget::State {
            label: label.to_string(),
            state: state.to_string(),
        })
    };
    let j = model.add_probe(state("spiking", "J"));
    let voltage = model.add_probe(state("spiking", "voltage"));
    let spikes = model.add_probe(ProbeSpec::output("spiking"));
    let rate = model.add_probe(ProbeSpec::output("rate"));
    let direct = model.add_probe(ProbeSpec::output("direct"));

    let mut sim = Simulator::build(&model, &config()).unwrap();
    sim.run_steps(5).unwrap();

    let (j, voltage, spikes) = (sim.data(j).unwrap(), sim.data(voltage).unwrap(), sim.data(spikes).unwrap());
    let (rate, direct) = (sim.data(rate).unwrap(), sim.data(direct).unwrap());

    // Connections read the node output of the previous step: the node turns
    // NaN at step 2, so populations see it from step 3 on.
    for i in 0..n {
        assert!(j[[1, i]].is_finite() && voltage[[1, i]].is_finite());
        assert!(rate[[1, i]].is_finite());
        for step in 2..5 {
            assert!(j[[step, i]].is_nan(), "J[{}, {}]", step, i);
            assert!(voltage[[step, i]].is_nan(), "voltage[{}, {}]", step, i);
            assert!(rate[[step, i]].is_nan(), "rate[{}, {}]", step, i);
            // A NaN voltage never crosses threshold
            assert_eq!(spikes[[step, i]], 0.0);
        }
        assert_eq!(direct[[0, i]], 0.0);
        for step in 1..5 {
            assert_eq!(direct[[step, i]], f64::INFINITY);
        }
    }
}
