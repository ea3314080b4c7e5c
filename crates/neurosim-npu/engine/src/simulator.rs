// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Simulator
//!
//! Owns signal storage and executes a [`PreparedModel`] one step at a time.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Built ──step/run──▶ Running ──pause──▶ Paused
//!                                 ▲                    │  ▲            │
//!                                 │                    │  └──resume────┘
//!                               reset                stop
//!                                 │                    ▼
//!                                 └─────────────── Stopped
//! ```
//!
//! A step advances `time` by `dt`, runs every operator once in list order,
//! then samples the probes that are due.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::{ArrayD, ArrayViewD};
use neurosim_config::{ConfigError, NeurosimConfig, SimulationConfig};
use tracing::{debug, info};

use crate::compiler::{Compiler, DefaultCompiler, PreparedModel};
use crate::error::{Result, SimError};
use crate::executor::{self, StepContext};
use crate::model::ModelDescription;
use crate::probe::{ProbeId, ProbeRecorder};
use crate::schedule;
use crate::signal::SignalId;
use crate::storage::SignalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Uninitialized,
    Built,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for SimulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulatorState::Uninitialized => "uninitialized",
            SimulatorState::Built => "built",
            SimulatorState::Running => "running",
            SimulatorState::Paused => "paused",
            SimulatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cross-thread pause/stop requests, honored between steps of a run
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pause: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl RunControl {
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }
}

/// Number of steps `run(duration)` takes: `ceil(duration / dt)`, with ratios
/// within 1e-9 of an integer rounded to it
pub fn steps_for_duration(duration: f64, dt: f64) -> Result<u64> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(ConfigError::InvalidValue(format!("run duration must be finite and >= 0, got {}", duration)).into());
    }
    let ratio = duration / dt;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() < 1e-9 { nearest } else { ratio.ceil() };
    Ok(steps as u64)
}

pub struct Simulator {
    config: SimulationConfig,
    state: SimulatorState,
    model: Option<PreparedModel>,
    store: Option<SignalStore>,
    recorders: Vec<ProbeRecorder>,
    n_steps: u64,
    control: RunControl,
}

impl Simulator {
    /// Create an uninitialized simulator
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        if !config.dt.is_finite() || config.dt <= 0.0 {
            return Err(ConfigError::InvalidValue(format!("dt must be finite and > 0, got {}", config.dt)).into());
        }
        if config.parallel_threshold == 0 {
            return Err(ConfigError::InvalidValue("parallel_threshold must be >= 1".to_string()).into());
        }
        Ok(Self {
            config: config.clone(),
            state: SimulatorState::Uninitialized,
            model: None,
            store: None,
            recorders: Vec::new(),
            n_steps: 0,
            control: RunControl::default(),
        })
    }

    /// Compile `description` with [`DefaultCompiler`] and initialize
    pub fn build(description: &ModelDescription, config: &SimulationConfig) -> Result<Self> {
        Self::with_compiler(description, config, &DefaultCompiler::default())
    }

    /// Build with the `[simulation]` and `[probes]` sections of a loaded configuration
    pub fn from_config(description: &ModelDescription, config: &NeurosimConfig) -> Result<Self> {
        Self::with_compiler(description, &config.simulation, &DefaultCompiler::from_config(config))
    }

    /// Compile `description` with any [`Compiler`] and initialize
    pub fn with_compiler(
        description: &ModelDescription,
        config: &SimulationConfig,
        compiler: &dyn Compiler,
    ) -> Result<Self> {
        let mut simulator = Self::new(config)?;
        let prepared = compiler.compile(description, config)?;
        simulator.initialize(prepared)?;
        Ok(simulator)
    }

    /// Allocate storage for `prepared` and move to `Built`
    ///
    /// Every operator is re-validated against the registry; with
    /// `validate_schedule` the list order is checked as well.
    pub fn initialize(&mut self, prepared: PreparedModel) -> Result<()> {
        if self.state == SimulatorState::Running {
            return Err(self.invalid_state("initialize"));
        }
        if !prepared.dt.is_finite() || prepared.dt <= 0.0 {
            return Err(ConfigError::InvalidValue(format!("model dt must be finite and > 0, got {}", prepared.dt)).into());
        }

        for op in &prepared.operators {
            op.validate(&prepared.signals)?;
        }
        let mut recorders = Vec::with_capacity(prepared.probes.len());
        for probe in &prepared.probes {
            let shape = prepared.signals.shape(probe.signal)?.to_vec();
            if probe.sample_every == 0 {
                return Err(ConfigError::InvalidValue(format!("probe '{}': sample_every must be >= 1", probe.label)).into());
            }
            recorders.push(ProbeRecorder::new(probe.clone(), shape));
        }
        if self.config.validate_schedule {
            schedule::validate_order(&prepared.operators, &prepared.signals)?;
        }

        let store = SignalStore::from_registry(&prepared.signals)?;

        info!(
            signals = prepared.signals.len(),
            operators = prepared.operators.len(),
            probes = prepared.probes.len(),
            dt = prepared.dt,
            seed = prepared.seed,
            "Simulator initialized"
        );

        self.store = Some(store);
        self.model = Some(prepared);
        self.recorders = recorders;
        self.n_steps = 0;
        self.control.clear();
        self.state = SimulatorState::Built;
        Ok(())
    }

    fn invalid_state(&self, action: &'static str) -> SimError {
        SimError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }

    fn ensure_steppable(&self, action: &'static str) -> Result<()> {
        match self.state {
            SimulatorState::Built | SimulatorState::Running => Ok(()),
            _ => Err(self.invalid_state(action)),
        }
    }

    /// Advance one step
    pub fn step(&mut self) -> Result<()> {
        self.ensure_steppable("step")?;
        self.state = SimulatorState::Running;
        self.step_once()
    }

    fn step_once(&mut self) -> Result<()> {
        let (Some(model), Some(store)) = (self.model.as_ref(), self.store.as_mut()) else {
            return Err(SimError::InvalidState {
                action: "step",
                state: SimulatorState::Uninitialized.to_string(),
            });
        };

        let ctx = StepContext {
            dt: model.dt,
            step: self.n_steps + 1,
            parallel_threshold: self.config.parallel_threshold,
        };
        for op in &model.operators {
            executor::execute(op, store, &ctx)?;
        }
        self.n_steps += 1;

        let time = self.n_steps as f64 * model.dt;
        for recorder in self.recorders.iter_mut() {
            if recorder.is_due(self.n_steps) {
                recorder.record(time, store.slice(recorder.probe().signal)?);
            }
        }
        Ok(())
    }

    /// Run for `duration` simulated seconds; returns the steps executed
    pub fn run(&mut self, duration: f64) -> Result<u64> {
        let steps = steps_for_duration(duration, self.dt()?)?;
        self.run_steps(steps)
    }

    /// Run `n` steps, stopping early on a pause or stop request
    ///
    /// Returns the number of steps actually executed.
    pub fn run_steps(&mut self, n: u64) -> Result<u64> {
        self.ensure_steppable("run")?;
        self.state = SimulatorState::Running;
        let started = Instant::now();

        for executed in 0..n {
            if self.control.stop.load(Ordering::SeqCst) {
                self.state = SimulatorState::Stopped;
                info!(steps = executed, time = self.time(), "Run stopped on request");
                return Ok(executed);
            }
            if self.control.pause.swap(false, Ordering::SeqCst) {
                self.state = SimulatorState::Paused;
                info!(steps = executed, time = self.time(), "Run paused on request");
                return Ok(executed);
            }
            self.step_once()?;
        }

        debug!(
            "Run complete: {} steps in {:.2}ms (t={:.6}s)",
            n,
            started.elapsed().as_secs_f64() * 1000.0,
            self.time()
        );
        Ok(n)
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            SimulatorState::Built | SimulatorState::Running => {
                self.state = SimulatorState::Paused;
                Ok(())
            }
            _ => Err(self.invalid_state("pause")),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            SimulatorState::Paused => {
                self.state = SimulatorState::Running;
                Ok(())
            }
            _ => Err(self.invalid_state("resume")),
        }
    }

    /// Terminal until [`Simulator::reset`]
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SimulatorState::Uninitialized {
            return Err(self.invalid_state("stop"));
        }
        self.state = SimulatorState::Stopped;
        info!(steps = self.n_steps, "Simulator stopped");
        Ok(())
    }

    /// Restore initial signal values, clear probe histories and return to `Built`
    pub fn reset(&mut self) -> Result<()> {
        match (self.model.as_ref(), self.store.as_mut()) {
            (Some(model), Some(store)) => store.reset(&model.signals)?,
            _ => return Err(SimError::InvalidState {
                action: "reset",
                state: SimulatorState::Uninitialized.to_string(),
            }),
        }
        for recorder in self.recorders.iter_mut() {
            recorder.clear();
        }
        self.n_steps = 0;
        self.control.clear();
        self.state = SimulatorState::Built;
        debug!("Simulator reset");
        Ok(())
    }

    /// Handle for requesting pause/stop from other threads or node functions
    pub fn control_handle(&self) -> RunControl {
        self.control.clone()
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn n_steps(&self) -> u64 {
        self.n_steps
    }

    /// Simulated time in seconds (0 before the first step)
    pub fn time(&self) -> f64 {
        self.model
            .as_ref()
            .map_or(0.0, |model| self.n_steps as f64 * model.dt)
    }

    pub fn dt(&self) -> Result<f64> {
        self.model
            .as_ref()
            .map(|model| model.dt)
            .ok_or_else(|| self.invalid_state("read dt"))
    }

    pub fn model(&self) -> Option<&PreparedModel> {
        self.model.as_ref()
    }

    /// Current value of a signal
    pub fn signal(&self, id: SignalId) -> Result<ArrayViewD<'_, f64>> {
        self.store
            .as_ref()
            .ok_or_else(|| self.invalid_state("read signals"))?
            .read(id)
    }

    fn recorder(&self, probe: ProbeId) -> Result<&ProbeRecorder> {
        self.recorders
            .get(probe.0)
            .ok_or(SimError::UnknownProbe(probe.0))
    }

    /// Probe history shaped `[samples, ...signal shape]`
    pub fn data(&self, probe: ProbeId) -> Result<ArrayD<f64>> {
        self.recorder(probe)?.data()
    }

    /// Probe samples taken with `t_start <= time <= t_end`
    pub fn data_between(&self, probe: ProbeId, t_start: f64, t_end: f64) -> Result<ArrayD<f64>> {
        self.recorder(probe)?.data_between(t_start, t_end)
    }

    /// Simulated time of every sample of `probe`
    pub fn probe_times(&self, probe: ProbeId) -> Result<&[f64]> {
        Ok(self.recorder(probe)?.times())
    }
}
