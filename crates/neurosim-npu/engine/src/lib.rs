// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # neurosim Engine
//!
//! Signal/operator dataflow runtime.
//!
//! ## Architecture
//! - **Signals**: fixed-shape f64 buffers, views aliasing base storage
//! - **Operators**: closed enum of update rules with declared capability sets
//! - **Builder / Compiler**: model description → ordered operator list
//! - **Simulator**: owns storage, runs every operator once per step, samples probes
//!
//! Single-threaded step loop; rayon is used only inside neuron updates of
//! large populations.
//!
//! ## Example
//! ```rust
//! use neurosim_config::SimulationConfig;
//! use neurosim_engine::{ModelDescription, NodeSpec, ProbeSpec, Simulator};
//!
//! let mut model = ModelDescription::new();
//! model.add_node(NodeSpec::function("clock", 0, 1, |t, _| vec![t]));
//! let probe = model.add_probe(ProbeSpec::output("clock"));
//!
//! let mut sim = Simulator::build(&model, &SimulationConfig::default()).unwrap();
//! sim.run(0.01).unwrap();
//! assert_eq!(sim.data(probe).unwrap().shape(), &[10, 1]);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builder;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod model;
pub mod operator;
pub mod probe;
pub mod schedule;
pub mod signal;
pub mod simulator;
pub mod storage;

pub use builder::{ModelBuilder, NodeSignals, PopulationSignals};
pub use compiler::{Compiler, DefaultCompiler, PreparedModel};
pub use error::{Result, SimError};
pub use model::{
    ConnectionSpec, ModelDescription, NodeKind, NodeSpec, PopulationSpec, ProbeSpec, ProbeTarget,
    Transform,
};
pub use operator::{Capabilities, NodeFunction, Operator};
pub use probe::{Probe, ProbeId};
pub use signal::{SignalId, SignalRegistry};
pub use simulator::{RunControl, Simulator, SimulatorState};
pub use storage::SignalStore;
