// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Probes: time-stamped sample histories of single signals

use ndarray::{ArrayD, IxDyn};
use tracing::warn;

use crate::error::{Result, SimError};
use crate::signal::SignalId;

/// Handle to a probe of a prepared model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub usize);

/// A signal sampled every `sample_every` steps
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub signal: SignalId,
    pub sample_every: usize,
    pub label: String,
}

/// Append-only history of one probe
#[derive(Debug, Clone)]
pub struct ProbeRecorder {
    probe: Probe,
    shape: Vec<usize>,
    samples: Vec<f64>,
    times: Vec<f64>,
    warned_non_finite: bool,
}

impl ProbeRecorder {
    pub fn new(probe: Probe, shape: Vec<usize>) -> Self {
        Self {
            probe,
            shape,
            samples: Vec::new(),
            times: Vec::new(),
            warned_non_finite: false,
        }
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Whether step number `step` (1-based after the first step) is sampled
    pub fn is_due(&self, step: u64) -> bool {
        step % self.probe.sample_every as u64 == 0
    }

    /// Append one sample taken at simulated time `time`
    pub fn record(&mut self, time: f64, values: &[f64]) {
        if !self.warned_non_finite && values.iter().any(|v| !v.is_finite()) {
            self.warned_non_finite = true;
            warn!(
                probe = %self.probe.label,
                time,
                "Non-finite value in probed signal; further occurrences are not reported"
            );
        }
        self.samples.extend_from_slice(values);
        self.times.push(time);
    }

    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// History shaped `[samples, ...signal shape]`
    pub fn data(&self) -> Result<ArrayD<f64>> {
        self.rows(0..self.times.len())
    }

    /// Samples with `t_start <= time <= t_end`
    pub fn data_between(&self, t_start: f64, t_end: f64) -> Result<ArrayD<f64>> {
        // Sample times are multiples of dt, so allow for rounding at the bounds.
        let eps = 1e-9;
        let first = self.times.partition_point(|&t| t < t_start - eps);
        let last = self.times.partition_point(|&t| t <= t_end + eps);
        self.rows(first..last.max(first))
    }

    fn rows(&self, range: std::ops::Range<usize>) -> Result<ArrayD<f64>> {
        let width: usize = self.shape.iter().product();
        let mut shape = Vec::with_capacity(self.shape.len() + 1);
        shape.push(range.len());
        shape.extend_from_slice(&self.shape);

        let values = self.samples[range.start * width..range.end * width].to_vec();
        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|_| SimError::shape_mismatch(format!("probe '{}'", self.probe.label), &shape, &[]))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.times.clear();
        self.warned_non_finite = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(every: usize) -> ProbeRecorder {
        ProbeRecorder::new(
            Probe {
                signal: SignalId(0),
                sample_every: every,
                label: "p".to_string(),
            },
            vec![2],
        )
    }

    #[test]
    fn test_data_shape_and_time_slicing() {
        let mut rec = recorder(1);
        for step in 1..=5 {
            let t = step as f64 * 0.001;
            rec.record(t, &[t, -t]);
        }

        let data = rec.data().unwrap();
        assert_eq!(data.shape(), &[5, 2]);

        let window = rec.data_between(0.002, 0.004).unwrap();
        assert_eq!(window.shape(), &[3, 2]);
        assert!((window[[0, 0]] - 0.002).abs() < 1e-15);

        assert_eq!(rec.data_between(1.0, 2.0).unwrap().shape(), &[0, 2]);
    }

    #[test]
    fn test_sample_every() {
        let rec = recorder(10);
        assert!(!rec.is_due(5));
        assert!(rec.is_due(10));
        assert!(rec.is_due(20));
    }

    #[test]
    fn test_non_finite_values_kept() {
        let mut rec = recorder(1);
        rec.record(0.001, &[f64::NAN, 1.0]);
        rec.record(0.002, &[f64::INFINITY, 1.0]);
        let data = rec.data().unwrap();
        assert!(data[[0, 0]].is_nan());
        assert!(data[[1, 0]].is_infinite());
    }
}
