// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Operators
//!
//! The closed set of atomic update rules a simulator executes. Each operator
//! declares how it touches its signals:
//!
//! ```text
//! sets     written from scratch, before anything else touches the signal
//! incs     accumulated into, after the setters
//! reads    read, after all setters and incrementers
//! updates  written for the next step, after every reader
//! ```
//!
//! The scheduler orders operators by these roles; executors never need to
//! look at other operators.

use std::fmt;
use std::sync::Arc;

use neurosim_neural::Nonlinearity;

use crate::error::{Result, SimError};
use crate::signal::{shape_size, SignalId, SignalRegistry};

/// User function evaluated by [`Operator::SimPyFunc`]: `(time, input) -> output`
#[derive(Clone)]
pub struct NodeFunction(Arc<dyn Fn(f64, &[f64]) -> Vec<f64> + Send + Sync>);

impl NodeFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(f64, &[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, t: f64, x: &[f64]) -> Vec<f64> {
        (self.0)(t, x)
    }
}

impl fmt::Debug for NodeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeFunction(..)")
    }
}

#[derive(Debug, Clone)]
pub enum Operator {
    /// `step += 1; time = step × dt`
    TimeUpdate { step: SignalId, time: SignalId },

    /// `dst ← value`
    Reset { dst: SignalId, value: f64 },

    /// `dst ← src`
    Copy { src: SignalId, dst: SignalId },

    /// `y += a · x`
    DotInc { a: SignalId, x: SignalId, y: SignalId },

    /// `y += a ⊙ x` with scalar broadcast
    ElementwiseInc { a: SignalId, x: SignalId, y: SignalId },

    /// `y ← a · x + b ⊙ y`
    ProdUpdate {
        a: SignalId,
        x: SignalId,
        b: SignalId,
        y: SignalId,
    },

    /// `output ← f(time, input)`
    SimPyFunc {
        time: SignalId,
        input: Option<SignalId>,
        output: SignalId,
        func: NodeFunction,
    },

    /// One nonlinearity step on drive `j`
    SimNeurons {
        nonlinearity: Arc<Nonlinearity>,
        j: SignalId,
        output: SignalId,
        voltage: Option<SignalId>,
        refractory_time: Option<SignalId>,
    },
}

/// How an operator touches each of its signals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub sets: Vec<SignalId>,
    pub incs: Vec<SignalId>,
    pub reads: Vec<SignalId>,
    pub updates: Vec<SignalId>,
}

impl Capabilities {
    /// Signals the operator writes, in any role
    pub fn writes(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.sets
            .iter()
            .chain(&self.incs)
            .chain(&self.updates)
            .copied()
    }

    pub fn all(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.writes().chain(self.reads.iter().copied())
    }
}

impl Operator {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operator::TimeUpdate { .. } => "TimeUpdate",
            Operator::Reset { .. } => "Reset",
            Operator::Copy { .. } => "Copy",
            Operator::DotInc { .. } => "DotInc",
            Operator::ElementwiseInc { .. } => "ElementwiseInc",
            Operator::ProdUpdate { .. } => "ProdUpdate",
            Operator::SimPyFunc { .. } => "SimPyFunc",
            Operator::SimNeurons { .. } => "SimNeurons",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Operator::TimeUpdate { step, time } => Capabilities {
                sets: vec![*step, *time],
                ..Default::default()
            },
            Operator::Reset { dst, .. } => Capabilities {
                sets: vec![*dst],
                ..Default::default()
            },
            Operator::Copy { src, dst } => Capabilities {
                sets: vec![*dst],
                reads: vec![*src],
                ..Default::default()
            },
            Operator::DotInc { a, x, y } | Operator::ElementwiseInc { a, x, y } => Capabilities {
                incs: vec![*y],
                reads: vec![*a, *x],
                ..Default::default()
            },
            Operator::ProdUpdate { a, x, b, y } => Capabilities {
                reads: vec![*a, *x, *b],
                updates: vec![*y],
                ..Default::default()
            },
            Operator::SimPyFunc {
                time,
                input,
                output,
                ..
            } => Capabilities {
                reads: std::iter::once(*time).chain(*input).collect(),
                updates: vec![*output],
                ..Default::default()
            },
            Operator::SimNeurons {
                j,
                output,
                voltage,
                refractory_time,
                ..
            } => Capabilities {
                reads: vec![*j],
                updates: std::iter::once(*output)
                    .chain(*voltage)
                    .chain(*refractory_time)
                    .collect(),
                ..Default::default()
            },
        }
    }

    /// Check that every operand exists and that operand shapes combine
    pub fn validate(&self, registry: &SignalRegistry) -> Result<()> {
        for id in self.capabilities().all() {
            registry.get(id)?;
        }

        let shape = move |id: SignalId| registry.shape(id);
        let size = move |id: SignalId| -> Result<usize> { Ok(shape_size(registry.shape(id)?)) };

        match self {
            Operator::TimeUpdate { step, time } => {
                for id in [*step, *time] {
                    if size(id)? != 1 {
                        return Err(SimError::shape_mismatch("TimeUpdate", shape(id)?, &[]));
                    }
                }
            }
            Operator::Reset { .. } => {}
            Operator::Copy { src, dst } => {
                if shape(*src)? != shape(*dst)? {
                    return Err(SimError::shape_mismatch("Copy", shape(*src)?, shape(*dst)?));
                }
            }
            Operator::DotInc { a, x, y } => {
                let product = product_shape(shape(*a)?, shape(*x)?)?;
                expect_shape("DotInc output", &product, shape(*y)?)?;
            }
            Operator::ElementwiseInc { a, x, y } => {
                let product = broadcast_shape(shape(*a)?, shape(*x)?)?;
                expect_shape("ElementwiseInc output", &product, shape(*y)?)?;
            }
            Operator::ProdUpdate { a, x, b, y } => {
                let product = product_shape(shape(*a)?, shape(*x)?)?;
                expect_shape("ProdUpdate output", &product, shape(*y)?)?;
                if size(*b)? != 1 && shape(*b)? != shape(*y)? {
                    return Err(SimError::shape_mismatch("ProdUpdate decay", shape(*b)?, shape(*y)?));
                }
            }
            Operator::SimPyFunc { time, .. } => {
                if size(*time)? != 1 {
                    return Err(SimError::shape_mismatch("SimPyFunc time", shape(*time)?, &[]));
                }
            }
            Operator::SimNeurons {
                nonlinearity,
                j,
                output,
                voltage,
                refractory_time,
            } => {
                let n = [nonlinearity.n_neurons()];
                expect_shape("SimNeurons J", &n, shape(*j)?)?;
                expect_shape("SimNeurons output", &n, shape(*output)?)?;
                for id in voltage.iter().chain(refractory_time) {
                    expect_shape("SimNeurons state", &n, shape(*id)?)?;
                }
                if nonlinearity.kind().is_spiking() && (voltage.is_none() || refractory_time.is_none()) {
                    return Err(neurosim_neural::NeuralError::MissingState {
                        model: nonlinearity.model_name(),
                        state: if voltage.is_none() { "voltage" } else { "refractory_time" },
                    }
                    .into());
                }

                // Output and state are written in one pass; J is read alongside.
                let operands: Vec<SignalId> = std::iter::once(*j)
                    .chain(std::iter::once(*output))
                    .chain(*voltage)
                    .chain(*refractory_time)
                    .collect();
                for (i, &first) in operands.iter().enumerate() {
                    for &second in &operands[i + 1..] {
                        if registry.root(first)?.0 == registry.root(second)?.0 {
                            return Err(SimError::AliasedOperands {
                                operator: "SimNeurons",
                                first: registry.name(first)?.to_string(),
                                second: registry.name(second)?.to_string(),
                            });
                        }
                    }
                }
            }
        }

        // Every operator with several outputs writes them in one pass.
        let writes: Vec<SignalId> = self.capabilities().writes().collect();
        for (i, &first) in writes.iter().enumerate() {
            for &second in &writes[i + 1..] {
                if registry.root(first)?.0 == registry.root(second)?.0 {
                    return Err(SimError::AliasedOperands {
                        operator: self.kind_name(),
                        first: registry.name(first)?.to_string(),
                        second: registry.name(second)?.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn expect_shape(context: &str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(SimError::shape_mismatch(context, expected, actual));
    }
    Ok(())
}

/// How `a · x` combines two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    /// `a` is `[m, k]`, `x` is `[k]`
    MatVec { rows: usize, cols: usize },
    /// `a` is `[m, k]`, `x` is `[k, n]`
    MatMat { rows: usize, inner: usize, cols: usize },
    /// `a` holds one element
    ScaleByA,
    /// `x` holds one element
    ScaleByX,
    /// Same shape, element by element
    Elementwise,
}

/// Classify `a · x`; any pairing outside [`ProductKind`] is a shape mismatch
pub fn product_kind(a: &[usize], x: &[usize]) -> Result<ProductKind> {
    if let [rows, cols] = *a {
        match *x {
            [k] if k == cols => return Ok(ProductKind::MatVec { rows, cols }),
            [k, n] if k == cols => {
                return Ok(ProductKind::MatMat {
                    rows,
                    inner: cols,
                    cols: n,
                })
            }
            _ => {}
        }
    }
    if shape_size(a) == 1 {
        Ok(ProductKind::ScaleByA)
    } else if shape_size(x) == 1 {
        Ok(ProductKind::ScaleByX)
    } else if a == x {
        Ok(ProductKind::Elementwise)
    } else {
        Err(SimError::shape_mismatch("product", a, x))
    }
}

/// Shape of `a · x`
pub fn product_shape(a: &[usize], x: &[usize]) -> Result<Vec<usize>> {
    Ok(match product_kind(a, x)? {
        ProductKind::MatVec { rows, .. } => vec![rows],
        ProductKind::MatMat { rows, cols, .. } => vec![rows, cols],
        ProductKind::ScaleByA => x.to_vec(),
        ProductKind::ScaleByX | ProductKind::Elementwise => a.to_vec(),
    })
}

/// Shape of `a ⊙ x`: equal shapes, or one side a single element
fn broadcast_shape(a: &[usize], x: &[usize]) -> Result<Vec<usize>> {
    if a == x || shape_size(a) == 1 {
        Ok(x.to_vec())
    } else if shape_size(x) == 1 {
        Ok(a.to_vec())
    } else {
        Err(SimError::shape_mismatch("ElementwiseInc", a, x))
    }
}
