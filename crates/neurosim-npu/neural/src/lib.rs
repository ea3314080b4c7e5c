// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # neurosim Nonlinearity Engine
//!
//! Per-unit neural dynamics, independent of the signal/operator runtime:
//! - **Models**: Direct, LIF rate and spiking LIF (`models`)
//! - **Calibration**: closed-form gain/bias from max rates and intercepts
//! - **Rates**: steady-state response curves
//! - **Step math**: one time step of population dynamics, sequential or rayon
//!
//! ## Example
//! ```rust
//! use neurosim_neural::{LIFParameters, Nonlinearity};
//!
//! let mut lif = Nonlinearity::lif(2, LIFParameters::default());
//! lif.set_gain_bias(&[100.0, 200.0], &[0.0, -0.5]).unwrap();
//! let rates = lif.rates(&[0.0, 1.0]).unwrap();
//! assert_eq!(rates[0], 0.0);
//! assert!((rates[1] - 200.0).abs() < 1e-6);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod calibration;
pub mod error;
pub mod models;
pub mod nonlinearity;

pub use calibration::CalibrationTargets;
pub use error::{NeuralError, Result};
pub use models::{
    DirectModel, LIFModel, LIFParameters, LIFRateModel, ModelParameters, NeuronModel,
};
pub use nonlinearity::{NeuronKind, NeuronState, NeuronType, Nonlinearity};
