// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neurosim - Signal/Operator Dataflow Neural Simulator
//!
//! Models are described as populations, nodes, connections and probes,
//! compiled into fixed-shape signals plus an ordered list of operators, and
//! stepped at a fixed `dt`.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! neurosim = "0.0.1-beta.1"  # Default: engine + observability
//! ```
//!
//! ## Feature Flags
//!
//! - **`engine`** (default): builder, scheduler, simulator, probes
//! - **`observability`** (default): logging initialization and debug flags
//! - **`file-logging`**: rotating log files under a timestamped run directory
//!
//! Configuration and the nonlinearity engine are always available.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use neurosim::prelude::*;
//! use ndarray::Array2;
//!
//! let config = load_config(None, None)?;
//! let _logging = neurosim::observability::init_logging(
//!     &neurosim::observability::parse_debug_flags(),
//!     &config.logging,
//! )?;
//!
//! let n = 100;
//! let mut model = ModelDescription::new();
//! model.add_node(NodeSpec::constant("stim", vec![0.5]));
//! model.add_population(PopulationSpec::new(
//!     "ens",
//!     Nonlinearity::lif(n, LIFParameters::from(&config.neurons.lif)),
//! ));
//! model.connect(ConnectionSpec::new("stim", "ens").with_transform(Transform::Matrix(Array2::ones((n, 1)))));
//! let spikes = model.add_probe(ProbeSpec::output("ens"));
//!
//! let mut sim = Simulator::from_config(&model, &config)?;
//! sim.run(1.0)?;
//! let counts = sim.data(spikes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export foundation
pub use neurosim_config as config;
pub use neurosim_neural as neural;

// Re-export runtime
#[cfg(feature = "engine")]
pub use neurosim_engine as engine;

// Re-export infrastructure
#[cfg(feature = "observability")]
pub use neurosim_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config, NeurosimConfig, SimulationConfig};
    pub use crate::neural::{CalibrationTargets, LIFParameters, NeuralError, NeuronModel, Nonlinearity};

    #[cfg(feature = "engine")]
    pub use crate::engine::{
        Compiler, ConnectionSpec, ModelDescription, NodeSpec, PopulationSpec, ProbeId, ProbeSpec, ProbeTarget,
        SimError, Simulator, SimulatorState, Transform,
    };
}
