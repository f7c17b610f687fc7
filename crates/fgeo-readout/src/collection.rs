//! Dense hash-indexed storage of detector elements.

use std::sync::Arc;

use fgeo_error::{GeoError, Result};
use fgeo_types::IdentifierHash;

use crate::element::DetectorElement;

#[derive(Debug, Default)]
pub struct DetectorElementCollection {
    slots: Vec<Option<Arc<DetectorElement>>>,
    count: usize,
}

impl DetectorElementCollection {
    /// Collection with one slot per element hash.
    pub fn with_hash_max(hash_max: u32) -> Self {
        Self {
            slots: vec![None; hash_max as usize],
            count: 0,
        }
    }

    /// Store `element` at its hash. Each hash may be filled once.
    pub fn insert(&mut self, element: Arc<DetectorElement>) -> Result<()> {
        let index = element.identify_hash().index();
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        let slot = &mut self.slots[index];
        if slot.is_some() {
            return Err(GeoError::DuplicateIdentifier {
                level: "element",
                id: element.identify().raw(),
            });
        }
        *slot = Some(element);
        self.count += 1;
        Ok(())
    }

    pub fn get(&self, hash: IdentifierHash) -> Option<&Arc<DetectorElement>> {
        self.slots.get(hash.index()).and_then(Option::as_ref)
    }

    /// Number of slots, i.e. the element hash range.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of filled slots.
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Filled slots in hash order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DetectorElement>> {
        self.slots.iter().flatten()
    }

    pub fn invalidate_all(&self) {
        for element in self.iter() {
            element.invalidate();
        }
    }
}
