// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runtime signal storage
//!
//! One flat `Vec<f64>` per base signal plus a slot descriptor per signal
//! (buffer index, element offset, length, shape). Views are slots into their
//! root's buffer, so writes through a view are visible through the base.

use std::borrow::Cow;
use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::error::{Result, SimError};
use crate::signal::{SignalId, SignalKind, SignalRegistry};

#[derive(Debug, Clone)]
struct Slot {
    buffer: usize,
    offset: usize,
    len: usize,
    shape: Vec<usize>,
    name: String,
}

impl Slot {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Read-only operand handed to an update closure
#[derive(Debug)]
pub struct Operand<'a> {
    pub data: Cow<'a, [f64]>,
    pub shape: &'a [usize],
}

/// Mutable operand handed to an update closure
#[derive(Debug)]
pub struct OperandMut<'a> {
    pub data: &'a mut [f64],
    pub shape: &'a [usize],
}

/// Allocated values of every signal in a registry
#[derive(Debug, Clone)]
pub struct SignalStore {
    buffers: Vec<Vec<f64>>,
    slots: Vec<Slot>,
}

impl SignalStore {
    /// Allocate storage for every signal and fill in initial values
    pub fn from_registry(registry: &SignalRegistry) -> Result<Self> {
        let mut buffers = Vec::new();
        let mut base_buffer = vec![usize::MAX; registry.len()];

        for (id, info) in registry.iter() {
            if let SignalKind::Base { initial } = &info.kind {
                base_buffer[id.index()] = buffers.len();
                buffers.push(initial.iter().copied().collect());
            }
        }

        let mut slots = Vec::with_capacity(registry.len());
        for (id, info) in registry.iter() {
            let (root, offset) = registry.root(id)?;
            let buffer = base_buffer[root.index()];
            if buffer == usize::MAX {
                return Err(SimError::UnknownSignal(root.to_string()));
            }
            slots.push(Slot {
                buffer,
                offset,
                len: info.size(),
                shape: info.shape.clone(),
                name: info.name.clone(),
            });
        }

        Ok(Self { buffers, slots })
    }

    /// Restore every base signal to its registry initial value
    pub fn reset(&mut self, registry: &SignalRegistry) -> Result<()> {
        *self = Self::from_registry(registry)?;
        Ok(())
    }

    fn slot(&self, id: SignalId) -> Result<&Slot> {
        self.slots
            .get(id.index())
            .ok_or_else(|| SimError::UnknownSignal(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn shape(&self, id: SignalId) -> Result<&[usize]> {
        Ok(self.slot(id)?.shape.as_slice())
    }

    pub fn name(&self, id: SignalId) -> Result<&str> {
        Ok(self.slot(id)?.name.as_str())
    }

    /// Index of the flat buffer `id` lives in; signals with equal indices alias
    pub fn buffer_of(&self, id: SignalId) -> Result<usize> {
        Ok(self.slot(id)?.buffer)
    }

    /// Flat, row-major contents of `id`
    pub fn slice(&self, id: SignalId) -> Result<&[f64]> {
        let slot = self.slot(id)?;
        Ok(&self.buffers[slot.buffer][slot.range()])
    }

    pub fn slice_mut(&mut self, id: SignalId) -> Result<&mut [f64]> {
        let slot = self.slot(id)?;
        let (buffer, range) = (slot.buffer, slot.range());
        Ok(&mut self.buffers[buffer][range])
    }

    /// Shaped read-only view of `id`
    pub fn read(&self, id: SignalId) -> Result<ArrayViewD<'_, f64>> {
        let slot = self.slot(id)?;
        ArrayViewD::from_shape(IxDyn(&slot.shape), &self.buffers[slot.buffer][slot.range()])
            .map_err(|_| SimError::shape_mismatch(slot.name.clone(), &slot.shape, &[slot.len]))
    }

    /// Overwrite `id` with `value`; shapes must match exactly
    pub fn write(&mut self, id: SignalId, value: &ArrayD<f64>) -> Result<()> {
        let slot = self.slot(id)?;
        if slot.shape.as_slice() != value.shape() {
            return Err(SimError::shape_mismatch(
                format!("write to '{}'", slot.name),
                &slot.shape,
                value.shape(),
            ));
        }
        let range = slot.range();
        let buffer = slot.buffer;
        for (dst, &src) in self.buffers[buffer][range].iter_mut().zip(value.iter()) {
            *dst = src;
        }
        Ok(())
    }

    /// Run `f` with mutable access to `outputs` and shared access to `inputs`
    ///
    /// Output buffers are moved out of the arena for the duration of the
    /// call; an input that lives in one of them is handed over as a copy
    /// taken before `f` runs. Outputs must not share a buffer.
    pub fn update<F>(&mut self, operator: &'static str, outputs: &[SignalId], inputs: &[SignalId], f: F) -> Result<()>
    where
        F: FnOnce(&mut [OperandMut<'_>], &[Operand<'_>]) -> Result<()>,
    {
        let mut out_slots = Vec::with_capacity(outputs.len());
        for (i, &id) in outputs.iter().enumerate() {
            let slot = self.slot(id)?;
            for &earlier in &outputs[..i] {
                if self.slot(earlier)?.buffer == slot.buffer {
                    return Err(SimError::AliasedOperands {
                        operator,
                        first: self.slot(earlier)?.name.clone(),
                        second: slot.name.clone(),
                    });
                }
            }
            out_slots.push(id.index());
        }

        let mut taken: Vec<Vec<f64>> = out_slots
            .iter()
            .map(|&s| std::mem::take(&mut self.buffers[self.slots[s].buffer]))
            .collect();

        let result = self.apply(&out_slots, &mut taken, inputs, f);

        for (&s, buffer) in out_slots.iter().zip(taken) {
            let index = self.slots[s].buffer;
            self.buffers[index] = buffer;
        }
        result
    }

    fn apply<F>(&self, out_slots: &[usize], taken: &mut [Vec<f64>], inputs: &[SignalId], f: F) -> Result<()>
    where
        F: FnOnce(&mut [OperandMut<'_>], &[Operand<'_>]) -> Result<()>,
    {
        let mut operands = Vec::with_capacity(inputs.len());
        for &id in inputs {
            let slot = self.slot(id)?;
            let aliased = out_slots
                .iter()
                .position(|&s| self.slots[s].buffer == slot.buffer);
            let data = match aliased {
                Some(k) => Cow::Owned(taken[k][slot.range()].to_vec()),
                None => Cow::Borrowed(&self.buffers[slot.buffer][slot.range()]),
            };
            operands.push(Operand {
                data,
                shape: &slot.shape,
            });
        }

        let mut outs: Vec<OperandMut<'_>> = out_slots
            .iter()
            .zip(taken.iter_mut())
            .map(|(&s, buffer)| {
                let slot = &self.slots[s];
                OperandMut {
                    data: &mut buffer[slot.range()],
                    shape: &slot.shape,
                }
            })
            .collect();

        f(&mut outs, &operands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn registry() -> (SignalRegistry, SignalId, SignalId, SignalId) {
        let mut reg = SignalRegistry::new();
        let base = reg.allocate_with("base", arr1(&[1.0, 2.0, 3.0, 4.0]).into_dyn());
        let head = reg.view(base, "head", &[2], 0).unwrap();
        let tail = reg.view(base, "tail", &[2], 2).unwrap();
        (reg, base, head, tail)
    }

    #[test]
    fn test_views_share_base_storage() {
        let (reg, base, _head, tail) = registry();
        let mut store = SignalStore::from_registry(&reg).unwrap();

        store.write(tail, &arr1(&[9.0, 8.0]).into_dyn()).unwrap();
        assert_eq!(store.slice(base).unwrap(), &[1.0, 2.0, 9.0, 8.0]);
        assert_eq!(store.buffer_of(base).unwrap(), store.buffer_of(tail).unwrap());
    }

    #[test]
    fn test_write_requires_exact_shape() {
        let mut reg = SignalRegistry::new();
        let m = reg.allocate_with("m", arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn());
        let mut store = SignalStore::from_registry(&reg).unwrap();

        let err = store.write(m, &arr1(&[1.0, 2.0, 3.0, 4.0]).into_dyn()).unwrap_err();
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
        assert_eq!(store.read(m).unwrap(), arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn());
    }

    #[test]
    fn test_update_snapshots_inputs_in_output_buffer() {
        let (reg, base, head, tail) = registry();
        let mut store = SignalStore::from_registry(&reg).unwrap();

        // tail <- head, both inside `base`
        store
            .update("Copy", &[tail], &[head], |outs, ins| {
                outs[0].data.copy_from_slice(&ins[0].data);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.slice(base).unwrap(), &[1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_update_rejects_aliased_outputs() {
        let (reg, _base, head, tail) = registry();
        let mut store = SignalStore::from_registry(&reg).unwrap();
        let err = store.update("Test", &[head, tail], &[], |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, SimError::AliasedOperands { .. }));
    }

    #[test]
    fn test_reset_restores_initial_values() {
        let (reg, base, head, _tail) = registry();
        let mut store = SignalStore::from_registry(&reg).unwrap();
        store.slice_mut(head).unwrap().fill(0.0);
        store.reset(&reg).unwrap();
        assert_eq!(store.slice(base).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_slice_mut_writes_through_view() {
        let (reg, base, head, tail) = registry();
        let mut store = SignalStore::from_registry(&reg).unwrap();
        store.slice_mut(tail).unwrap().copy_from_slice(&[7.0, 6.0]);
        assert_eq!(store.slice(base).unwrap(), &[1.0, 2.0, 7.0, 6.0]);
        assert_eq!(store.slice(head).unwrap(), &[1.0, 2.0]);
    }
}
