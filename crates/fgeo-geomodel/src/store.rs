//! Alignment override store.
//!
//! When a store is supplied to the tree's transform queries, alignable
//! deltas are read from the store instead of the tree, and computed
//! absolute positions are memoised per volume. This lets several alignment
//! states coexist over one shared tree.

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::transform::Transform3D;
use crate::tree::{AlignableId, VolumeId};

#[derive(Debug, Default)]
pub struct AlignmentStore {
    deltas: HashMap<AlignableId, Transform3D>,
    absolute: RwLock<HashMap<VolumeId, Transform3D>>,
    default_absolute: RwLock<HashMap<VolumeId, Transform3D>>,
}

impl AlignmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delta of `alignable`; drops memoised aligned positions.
    pub fn set_delta(&mut self, alignable: AlignableId, delta: Transform3D) {
        self.deltas.insert(alignable, delta);
        self.absolute.get_mut().clear();
    }

    pub fn clear_delta(&mut self, alignable: AlignableId) {
        if self.deltas.remove(&alignable).is_some() {
            self.absolute.get_mut().clear();
        }
    }

    pub fn delta(&self, alignable: AlignableId) -> Option<Transform3D> {
        self.deltas.get(&alignable).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub(crate) fn absolute(&self, volume: VolumeId) -> Option<Transform3D> {
        self.absolute.read().get(&volume).copied()
    }

    pub(crate) fn remember_absolute(&self, volume: VolumeId, transform: Transform3D) {
        self.absolute.write().insert(volume, transform);
    }

    pub(crate) fn default_absolute(&self, volume: VolumeId) -> Option<Transform3D> {
        self.default_absolute.read().get(&volume).copied()
    }

    pub(crate) fn remember_default_absolute(&self, volume: VolumeId, transform: Transform3D) {
        self.default_absolute.write().insert(volume, transform);
    }

    /// Number of memoised aligned positions.
    pub fn cached_positions(&self) -> usize {
        self.absolute.read().len()
    }
}
