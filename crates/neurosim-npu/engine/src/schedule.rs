// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator ordering
//!
//! For every storage element, operators that touch it must run in role
//! order: setters, incrementers, readers, updaters. Signals that overlap
//! in storage (views and their bases) constrain each other too.
//!
//! [`order`] computes a stable topological order (Kahn's algorithm, ties
//! broken by insertion index); [`validate_order`] checks an existing list.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::ops::Range;

use crate::error::{Result, SimError};
use crate::operator::Operator;
use crate::signal::{SignalId, SignalRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Set = 0,
    Inc = 1,
    Read = 2,
    Update = 3,
}

#[derive(Debug, Clone)]
struct Access {
    op: usize,
    role: Role,
    signal: SignalId,
    range: Range<usize>,
}

/// A "must run before" constraint between two operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub before: usize,
    pub after: usize,
    pub signal: SignalId,
}

/// All ordering constraints implied by the operators' capability sets
pub fn dependencies(operators: &[Operator], registry: &SignalRegistry) -> Result<Vec<Dependency>> {
    // Accesses grouped by root base signal
    let mut by_root: BTreeMap<SignalId, Vec<Access>> = BTreeMap::new();
    for (op, operator) in operators.iter().enumerate() {
        let caps = operator.capabilities();
        let roles = [
            (Role::Set, &caps.sets),
            (Role::Inc, &caps.incs),
            (Role::Read, &caps.reads),
            (Role::Update, &caps.updates),
        ];
        for (role, signals) in roles {
            for &signal in signals {
                let (root, range) = registry.extent(signal)?;
                by_root.entry(root).or_default().push(Access {
                    op,
                    role,
                    signal,
                    range,
                });
            }
        }
    }

    let mut deps = Vec::new();
    for accesses in by_root.values() {
        for first in accesses {
            for second in accesses {
                let overlap =
                    first.range.start < second.range.end && second.range.start < first.range.end;
                if first.op != second.op && overlap && first.role < second.role {
                    deps.push(Dependency {
                        before: first.op,
                        after: second.op,
                        signal: second.signal,
                    });
                }
            }
        }
    }
    Ok(deps)
}

/// Stable topological order of `operators`
///
/// Returns indices into `operators`. Unconstrained operators keep their
/// relative insertion order.
pub fn order(operators: &[Operator], registry: &SignalRegistry) -> Result<Vec<usize>> {
    let n = operators.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    for dep in dependencies(operators, registry)? {
        successors[dep.before].push(dep.after);
        in_degree[dep.after] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(i);
        for &next in &successors[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if sorted.len() != n {
        let operators = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| format!("#{} {}", i, operators[i].kind_name()))
            .collect();
        return Err(SimError::CyclicDependency { operators });
    }
    Ok(sorted)
}

/// Check that list order already satisfies every constraint
pub fn validate_order(operators: &[Operator], registry: &SignalRegistry) -> Result<()> {
    for dep in dependencies(operators, registry)? {
        if dep.before > dep.after {
            return Err(SimError::ScheduleViolation {
                signal: registry.name(dep.signal)?.to_string(),
                earlier: dep.after,
                earlier_kind: operators[dep.after].kind_name(),
                later: dep.before,
                later_kind: operators[dep.before].kind_name(),
            });
        }
    }
    Ok(())
}
