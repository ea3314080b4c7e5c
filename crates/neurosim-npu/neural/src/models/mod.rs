// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Neuron Model Architecture
//!
//! Every model implements [`NeuronModel`]: a steady-state rate curve and a
//! closed-form gain/bias solve. Stepping is model specific (spiking models
//! carry state arrays) and is dispatched by [`crate::Nonlinearity`].
//!
//! ## Adding a New Neuron Model
//!
//! 1. Create `src/models/your_model.rs`
//! 2. Implement `NeuronModel` trait
//! 3. Add a variant to `NeuronKind`
//! 4. Export in `mod.rs`

pub mod direct;
pub mod lif;
pub mod lif_rate;
pub mod traits;

// Re-export core types
pub use direct::DirectModel;
pub use lif::{LIFModel, LIFParameters, DEFAULT_PARALLEL_THRESHOLD};
pub use lif_rate::LIFRateModel;
pub use traits::{check_calibration_targets, ModelParameters, NeuronModel};
