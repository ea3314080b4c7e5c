// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Signals
//!
//! A signal is a named, fixed-shape f64 buffer. Base signals own an initial
//! value; views alias a contiguous row-major region of a base signal.
//!
//! The registry is the construction-time description only. Storage is
//! allocated from it by [`crate::storage::SignalStore`] when a simulator is
//! initialized.

use std::fmt;

use ndarray::{ArrayD, IxDyn};

use crate::error::{Result, SimError};

/// Handle to a signal in a [`SignalRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of elements a shape holds (1 for the scalar shape `[]`)
pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[derive(Debug, Clone)]
pub enum SignalKind {
    Base { initial: ArrayD<f64> },
    /// Always refers to a root base signal; views of views are flattened
    View { base: SignalId, offset: usize },
}

#[derive(Debug, Clone)]
pub struct SignalInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub kind: SignalKind,
}

impl SignalInfo {
    pub fn size(&self) -> usize {
        shape_size(&self.shape)
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, SignalKind::View { .. })
    }
}

/// All signals of a model with their initial values
#[derive(Debug, Clone, Default)]
pub struct SignalRegistry {
    signals: Vec<SignalInfo>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zero-initialized base signal
    pub fn allocate(&mut self, name: impl Into<String>, shape: &[usize]) -> SignalId {
        self.allocate_with(name, ArrayD::zeros(IxDyn(shape)))
    }

    /// Register a base signal with an explicit initial value
    pub fn allocate_with(&mut self, name: impl Into<String>, initial: ArrayD<f64>) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(SignalInfo {
            name: name.into(),
            shape: initial.shape().to_vec(),
            kind: SignalKind::Base { initial },
        });
        id
    }

    /// Register a constant scalar signal
    pub fn scalar(&mut self, name: impl Into<String>, value: f64) -> SignalId {
        self.allocate_with(name, ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Register a view of `shape` starting `offset` elements into `base`
    ///
    /// `base` may itself be a view; offsets accumulate onto its root.
    pub fn view(
        &mut self,
        base: SignalId,
        name: impl Into<String>,
        shape: &[usize],
        offset: usize,
    ) -> Result<SignalId> {
        let name = name.into();
        let (root, base_offset) = self.root(base)?;
        let parent_size = self.get(base)?.size();
        let end = offset + shape_size(shape);
        if end > parent_size {
            return Err(SimError::ViewOutOfBounds {
                name,
                base: self.get(base)?.name.clone(),
                offset,
                end,
                base_size: parent_size,
            });
        }

        let id = SignalId(self.signals.len());
        self.signals.push(SignalInfo {
            name,
            shape: shape.to_vec(),
            kind: SignalKind::View {
                base: root,
                offset: base_offset + offset,
            },
        });
        Ok(id)
    }

    pub fn get(&self, id: SignalId) -> Result<&SignalInfo> {
        self.signals
            .get(id.0)
            .ok_or_else(|| SimError::UnknownSignal(id.to_string()))
    }

    pub fn contains(&self, id: SignalId) -> bool {
        id.0 < self.signals.len()
    }

    pub fn name(&self, id: SignalId) -> Result<&str> {
        Ok(self.get(id)?.name.as_str())
    }

    pub fn shape(&self, id: SignalId) -> Result<&[usize]> {
        Ok(self.get(id)?.shape.as_slice())
    }

    /// Root base signal and element offset of `id` (itself and 0 for a base)
    pub fn root(&self, id: SignalId) -> Result<(SignalId, usize)> {
        match self.get(id)?.kind {
            SignalKind::Base { .. } => Ok((id, 0)),
            SignalKind::View { base, offset } => Ok((base, offset)),
        }
    }

    /// Flat element range `id` covers within its root's storage
    pub fn extent(&self, id: SignalId) -> Result<(SignalId, std::ops::Range<usize>)> {
        let (root, offset) = self.root(id)?;
        Ok((root, offset..offset + self.get(id)?.size()))
    }

    /// Whether two signals share at least one storage element
    pub fn overlaps(&self, a: SignalId, b: SignalId) -> Result<bool> {
        let (root_a, range_a) = self.extent(a)?;
        let (root_b, range_b) = self.extent(b)?;
        Ok(root_a == root_b && range_a.start < range_b.end && range_b.start < range_a.end)
    }

    /// Initial value of any signal; views read their region of the base
    pub fn initial_value(&self, id: SignalId) -> Result<ArrayD<f64>> {
        let info = self.get(id)?;
        match &info.kind {
            SignalKind::Base { initial } => Ok(initial.clone()),
            SignalKind::View { base, offset } => {
                let base_values: Vec<f64> = match &self.get(*base)?.kind {
                    SignalKind::Base { initial } => initial.iter().copied().collect(),
                    SignalKind::View { .. } => {
                        return Err(SimError::UnknownSignal(base.to_string()));
                    }
                };
                let region = base_values[*offset..*offset + info.size()].to_vec();
                ArrayD::from_shape_vec(IxDyn(&info.shape), region)
                    .map_err(|_| SimError::shape_mismatch(info.name.clone(), &info.shape, &[info.size()]))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SignalId> {
        (0..self.signals.len()).map(SignalId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &SignalInfo)> {
        self.signals.iter().enumerate().map(|(i, s)| (SignalId(i), s))
    }
}
