// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator execution against a [`SignalStore`]

use std::sync::OnceLock;

use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use neurosim_neural::NeuronState;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::operator::{product_kind, Operator, ProductKind};
use crate::storage::{Operand, OperandMut, SignalStore};

/// Runtime-gated tracing config for operator execution.
/// Events are `debug` level under this module's target, so they also need
/// `--debug-neurosim-engine` (or `NEUROSIM_DEBUG=neurosim-engine`).
/// Enable with:
/// - NEUROSIM_TRACE_OPERATORS=1
/// Optional filters:
/// - NEUROSIM_TRACE_OPERATOR=<kind> (e.g. SimNeurons)
struct OperatorTraceCfg {
    enabled: bool,
    kind_filter: Option<String>,
}

fn operator_trace_cfg() -> &'static OperatorTraceCfg {
    static CFG: OnceLock<OperatorTraceCfg> = OnceLock::new();
    CFG.get_or_init(|| {
        let enabled = std::env::var("NEUROSIM_TRACE_OPERATORS")
            .ok()
            .as_deref()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let kind_filter = std::env::var("NEUROSIM_TRACE_OPERATOR").ok();

        OperatorTraceCfg {
            enabled,
            kind_filter,
        }
    })
}

/// Per-step constants every operator may need
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub dt: f64,
    pub step: u64,
    pub parallel_threshold: usize,
}

/// Execute one operator
pub fn execute(op: &Operator, store: &mut SignalStore, ctx: &StepContext) -> Result<()> {
    let cfg = operator_trace_cfg();
    if cfg.enabled && cfg.kind_filter.as_deref().map_or(true, |k| k == op.kind_name()) {
        debug!(
            "[OP] step={} {} {:?}",
            ctx.step,
            op.kind_name(),
            op.capabilities()
        );
    }

    match op {
        Operator::TimeUpdate { step, time } => {
            let dt = ctx.dt;
            store.update("TimeUpdate", &[*step, *time], &[], |outs, _| {
                let next = outs[0].data[0] + 1.0;
                outs[0].data[0] = next;
                outs[1].data[0] = next * dt;
                Ok(())
            })
        }

        Operator::Reset { dst, value } => {
            store.slice_mut(*dst)?.fill(*value);
            Ok(())
        }

        Operator::Copy { src, dst } => store.update("Copy", &[*dst], &[*src], |outs, ins| {
            outs[0].data.copy_from_slice(&ins[0].data);
            Ok(())
        }),

        Operator::DotInc { a, x, y } => store.update("DotInc", &[*y], &[*a, *x], |outs, ins| {
            accumulate_product(&ins[0], &ins[1], &mut outs[0])
        }),

        Operator::ElementwiseInc { a, x, y } => {
            store.update("ElementwiseInc", &[*y], &[*a, *x], |outs, ins| {
                let (a, x) = (&ins[0].data, &ins[1].data);
                for (i, y) in outs[0].data.iter_mut().enumerate() {
                    *y += broadcast(a, i) * broadcast(x, i);
                }
                Ok(())
            })
        }

        Operator::ProdUpdate { a, x, b, y } => {
            store.update("ProdUpdate", &[*y], &[*a, *x, *b], |outs, ins| {
                let decay = &ins[2].data;
                for (i, y) in outs[0].data.iter_mut().enumerate() {
                    *y *= broadcast(decay, i);
                }
                accumulate_product(&ins[0], &ins[1], &mut outs[0])
            })
        }

        Operator::SimPyFunc {
            time,
            input,
            output,
            func,
        } => {
            let t = store.slice(*time)?[0];
            let x: &[f64] = match input {
                Some(id) => store.slice(*id)?,
                None => &[],
            };
            let value = func.call(t, x);

            let expected = store.slice(*output)?.len();
            if value.len() != expected {
                return Err(SimError::FunctionOutput {
                    signal: store.name(*output)?.to_string(),
                    expected,
                    actual: value.len(),
                });
            }
            store.slice_mut(*output)?.copy_from_slice(&value);
            Ok(())
        }

        Operator::SimNeurons {
            nonlinearity,
            j,
            output,
            voltage,
            refractory_time,
        } => {
            let outputs: Vec<_> = std::iter::once(*output)
                .chain(*voltage)
                .chain(*refractory_time)
                .collect();
            let parallel = nonlinearity.n_neurons() >= ctx.parallel_threshold;
            let dt = ctx.dt;

            store.update("SimNeurons", &outputs, &[*j], |outs, ins| {
                let Some((out, state)) = outs.split_first_mut() else {
                    return Ok(());
                };
                let mut state = state.iter_mut();
                let voltage = match voltage {
                    Some(_) => state.next().map(|s| &mut *s.data),
                    None => None,
                };
                let refractory_time = match refractory_time {
                    Some(_) => state.next().map(|s| &mut *s.data),
                    None => None,
                };
                nonlinearity.step_math(
                    dt,
                    &ins[0].data,
                    out.data,
                    NeuronState {
                        voltage,
                        refractory_time,
                    },
                    parallel,
                )?;
                Ok(())
            })
        }
    }
}

#[inline(always)]
fn broadcast(values: &[f64], i: usize) -> f64 {
    if values.len() == 1 {
        values[0]
    } else {
        values[i]
    }
}

/// `y += a · x` under the product rule of [`product_kind`]
fn accumulate_product(a: &Operand<'_>, x: &Operand<'_>, out: &mut OperandMut<'_>) -> Result<()> {
    let mismatch = || SimError::shape_mismatch("product", a.shape, x.shape);
    let y_shape = out.shape;
    let y = &mut *out.data;

    match product_kind(a.shape, x.shape)? {
        ProductKind::MatVec { rows, cols } => {
            let a2 = ArrayView2::from_shape((rows, cols), &a.data[..]).map_err(|_| mismatch())?;
            let x1 = ArrayView1::from(&x.data[..]);
            if y.len() != rows {
                return Err(SimError::shape_mismatch("product output", &[rows], y_shape));
            }
            let mut y1 = ArrayViewMut1::from(y);
            general_mat_vec_mul(1.0, &a2, &x1, 1.0, &mut y1);
        }
        ProductKind::MatMat { rows, inner, cols } => {
            let a2 = ArrayView2::from_shape((rows, inner), &a.data[..]).map_err(|_| mismatch())?;
            let x2 = ArrayView2::from_shape((inner, cols), &x.data[..]).map_err(|_| mismatch())?;
            let mut y2 = ArrayViewMut2::from_shape((rows, cols), y)
                .map_err(|_| SimError::shape_mismatch("product output", &[rows, cols], y_shape))?;
            general_mat_mul(1.0, &a2, &x2, 1.0, &mut y2);
        }
        ProductKind::ScaleByA => {
            let scale = a.data[0];
            for (y, &x) in y.iter_mut().zip(x.data.iter()) {
                *y += scale * x;
            }
        }
        ProductKind::ScaleByX => {
            let scale = x.data[0];
            for (y, &a) in y.iter_mut().zip(a.data.iter()) {
                *y += a * scale;
            }
        }
        ProductKind::Elementwise => {
            for ((y, &a), &x) in y.iter_mut().zip(a.data.iter()).zip(x.data.iter()) {
                *y += a * x;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::NodeFunction;
    use crate::signal::SignalRegistry;
    use ndarray::{arr1, arr2};

    fn ctx() -> StepContext {
        StepContext {
            dt: 0.001,
            step: 0,
            parallel_threshold: usize::MAX,
        }
    }

    #[test]
    fn test_dot_inc_matrix_vector() {
        let mut reg = SignalRegistry::new();
        let a = reg.allocate_with("a", arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn());
        let x = reg.allocate_with("x", arr1(&[1.0, -1.0]).into_dyn());
        let y = reg.allocate_with("y", arr1(&[10.0, 10.0, 10.0]).into_dyn());
        let mut store = SignalStore::from_registry(&reg).unwrap();

        execute(&Operator::DotInc { a, x, y }, &mut store, &ctx()).unwrap();
        assert_eq!(store.slice(y).unwrap(), &[9.0, 9.0, 9.0]);
    }

    #[test]
    fn test_dot_inc_scalar_transform() {
        let mut reg = SignalRegistry::new();
        let a = reg.scalar("a", 2.0);
        let x = reg.allocate_with("x", arr1(&[1.0, 2.0]).into_dyn());
        let y = reg.allocate("y", &[2]);
        let mut store = SignalStore::from_registry(&reg).unwrap();

        execute(&Operator::DotInc { a, x, y }, &mut store, &ctx()).unwrap();
        execute(&Operator::DotInc { a, x, y }, &mut store, &ctx()).unwrap();
        assert_eq!(store.slice(y).unwrap(), &[4.0, 8.0]);
    }

    #[test]
    fn test_prod_update_uses_old_value() {
        let mut reg = SignalRegistry::new();
        let a = reg.scalar("a", 0.5);
        let x = reg.allocate_with("x", arr1(&[2.0, 4.0]).into_dyn());
        let b = reg.scalar("b", 0.9);
        let y = reg.allocate_with("y", arr1(&[1.0, 1.0]).into_dyn());
        let mut store = SignalStore::from_registry(&reg).unwrap();

        execute(&Operator::ProdUpdate { a, x, b, y }, &mut store, &ctx()).unwrap();
        let out = store.slice(y).unwrap();
        assert!((out[0] - (0.9 + 1.0)).abs() < 1e-12);
        assert!((out[1] - (0.9 + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_time_update_counts_steps() {
        let mut reg = SignalRegistry::new();
        let step = reg.scalar("step", 0.0);
        let time = reg.scalar("time", 0.0);
        let mut store = SignalStore::from_registry(&reg).unwrap();

        for _ in 0..3 {
            execute(&Operator::TimeUpdate { step, time }, &mut store, &ctx()).unwrap();
        }
        assert_eq!(store.slice(step).unwrap(), &[3.0]);
        assert!((store.slice(time).unwrap()[0] - 0.003).abs() < 1e-15);
    }

    #[test]
    fn test_sim_pyfunc_output_length_checked() {
        let mut reg = SignalRegistry::new();
        let time = reg.scalar("time", 0.0);
        let output = reg.allocate("out", &[2]);
        let mut store = SignalStore::from_registry(&reg).unwrap();

        let op = Operator::SimPyFunc {
            time,
            input: None,
            output,
            func: NodeFunction::new(|_, _| vec![1.0, 2.0, 3.0]),
        };
        assert!(matches!(
            execute(&op, &mut store, &ctx()),
            Err(SimError::FunctionOutput {
                expected: 2,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_elementwise_inc_broadcasts_scalar() {
        let mut reg = SignalRegistry::new();
        let a = reg.allocate_with("gain", arr1(&[1.0, 2.0, 3.0]).into_dyn());
        let x = reg.scalar("x", 2.0);
        let y = reg.allocate_with("J", arr1(&[0.5, 0.5, 0.5]).into_dyn());
        let mut store = SignalStore::from_registry(&reg).unwrap();

        execute(&Operator::ElementwiseInc { a, x, y }, &mut store, &ctx()).unwrap();
        assert_eq!(store.slice(y).unwrap(), &[2.5, 4.5, 6.5]);
    }
}
