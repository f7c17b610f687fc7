//! Alignment conditions as delivered to the detector managers.

use std::collections::BTreeMap;
use std::sync::Arc;

use fgeo_error::Result;
use fgeo_geomodel::Transform3D;
use fgeo_geomodel::transform::from_alignment_parameters;
use fgeo_types::Identifier;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Ordered `(identifier, delta)` pairs for one folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignableTransformContainer {
    pub tag: String,
    entries: Vec<(Identifier, Transform3D)>,
}

impl AlignableTransformContainer {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, id: Identifier, delta: Transform3D) {
        self.entries.push((id, delta));
    }

    #[must_use]
    pub fn with(mut self, id: Identifier, delta: Transform3D) -> Self {
        self.push(id, delta);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Identifier, Transform3D)> {
        self.entries.iter()
    }
}

/// Per-channel rigid-body constants `(tx, ty, tz, rx, ry, rz)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalAlignmentContainer {
    channels: BTreeMap<u32, [f64; 6]>,
}

impl GlobalAlignmentContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: u32, parameters: [f64; 6]) {
        self.channels.insert(channel, parameters);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in ascending order with their constants as transforms.
    pub fn deltas(&self) -> impl Iterator<Item = (u32, Transform3D)> + '_ {
        self.channels
            .iter()
            .map(|(channel, parameters)| (*channel, from_alignment_parameters(*parameters)))
    }
}

/// Raw alignment objects keyed by folder, as handed over outside the
/// conditions service.
pub type RawAlignmentObjects = BTreeMap<String, Arc<AlignableTransformContainer>>;

/// Source of alignment conditions for the current interval of validity.
pub trait ConditionsStore {
    fn transforms(&self, key: &str) -> Option<Arc<AlignableTransformContainer>>;

    fn global_alignment(&self, key: &str) -> Option<Arc<GlobalAlignmentContainer>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InMemoryConditions {
    #[serde(default)]
    transforms: HashMap<String, Arc<AlignableTransformContainer>>,
    #[serde(default)]
    global: HashMap<String, Arc<GlobalAlignmentContainer>>,
}

impl InMemoryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transforms(&mut self, key: impl Into<String>, container: AlignableTransformContainer) {
        self.transforms.insert(key.into(), Arc::new(container));
    }

    pub fn insert_global(&mut self, key: impl Into<String>, container: GlobalAlignmentContainer) {
        self.global.insert(key.into(), Arc::new(container));
    }

    pub fn remove(&mut self, key: &str) {
        self.transforms.remove(key);
        self.global.remove(key);
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// All per-identifier containers, for the direct processing path.
    pub fn raw_objects(&self) -> RawAlignmentObjects {
        self.transforms
            .iter()
            .map(|(key, container)| (key.clone(), Arc::clone(container)))
            .collect()
    }
}

impl ConditionsStore for InMemoryConditions {
    fn transforms(&self, key: &str) -> Option<Arc<AlignableTransformContainer>> {
        self.transforms.get(key).cloned()
    }

    fn global_alignment(&self, key: &str) -> Option<Arc<GlobalAlignmentContainer>> {
        self.global.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use fgeo_geomodel::transform;

    use super::*;

    #[test]
    fn containers_keep_insertion_and_channel_order() {
        let container = AlignableTransformContainer::new("/Tracker/Align")
            .with(Identifier::from_raw(9), transform::translation(1.0, 0.0, 0.0))
            .with(Identifier::from_raw(3), transform::identity());
        let ids: Vec<u64> = container.iter().map(|(id, _)| id.raw()).collect();
        assert_eq!(ids, vec![9, 3]);

        let mut global = GlobalAlignmentContainer::new();
        global.insert(2, [0.0; 6]);
        global.insert(0, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let channels: Vec<u32> = global.deltas().map(|(c, _)| c).collect();
        assert_eq!(channels, vec![0, 2]);
    }

    #[test]
    fn json_round_trip_of_conditions() {
        let mut conditions = InMemoryConditions::new();
        conditions.insert_transforms(
            "/Neutrino/Align",
            AlignableTransformContainer::new("t").with(
                Identifier::from_raw(0x10),
                transform::translation(0.0, 0.0, 0.5),
            ),
        );
        let text = serde_json::to_string(&conditions).expect("encode");
        let back = InMemoryConditions::from_json_str(&text).expect("decode");
        let container = back.transforms("/Neutrino/Align").expect("container");
        assert_eq!(container.len(), 1);
        assert!(back.global_alignment("/Neutrino/Align").is_none());
        assert_eq!(back.raw_objects().len(), 1);
    }
}
