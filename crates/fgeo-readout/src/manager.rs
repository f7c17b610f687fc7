//! Detector manager: element registry and alignment composition.
//!
//! Alignable transforms are registered per hierarchy level under the
//! identifier of the element they move (level 0 is the sensor). Conditions
//! folders are registered with the level and frame their deltas refer to.
//! Applying a delta rewrites the alignable's node-local delta so that the
//! requested correction holds in the requested frame, then invalidates
//! every element cache.
//!
//! Alignment runs "stop the world": registration takes `&mut self`, the
//! `align*` entry points take `&self` and must not overlap with each other.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fgeo_error::{GeoError, Result};
use fgeo_geomodel::{AlignableId, AlignmentStore, GeoTree, Transform3D, VolumeId};
use fgeo_types::{Identifier, IdentifierHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::collection::DetectorElementCollection;
use crate::conditions::{AlignableTransformContainer, ConditionsStore, RawAlignmentObjects};
use crate::element::{CommonItems, DetectorElement, ElementIdHelper};

/// Frame an alignment delta is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// World coordinates: the new absolute transform is `delta * T`.
    Global,
    /// Reconstruction-local frame of the element (level 0) or of the
    /// alignable itself (higher levels).
    Local,
    /// Already the alignable's node-local delta.
    Other,
}

/// Node-local delta `c = T⁻¹ · g · T` for a world-frame delta `g`, where
/// `T` is the default absolute transform down to the alignable node.
pub fn global_delta(default_absolute: &Transform3D, delta: &Transform3D) -> Transform3D {
    default_absolute.inverse() * *delta * *default_absolute
}

/// Node-local delta `c = T⁻¹ · L · l · L⁻¹ · T` for a delta `l` expressed
/// in the frame whose local-to-global transform is `L`.
pub fn local_delta(
    default_absolute: &Transform3D,
    local_to_global: &Transform3D,
    delta: &Transform3D,
) -> Transform3D {
    default_absolute.inverse() * *local_to_global * *delta * local_to_global.inverse()
        * *default_absolute
}

/// An alignable transform and the full physical volume it places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtendedAlignableTransform {
    pub alignable: AlignableId,
    pub child: VolumeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSpec {
    pub level: usize,
    pub frame: Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AlignmentMetricsSnapshot {
    pub align_calls: u64,
    pub entries_applied: u64,
    pub entries_skipped: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
pub struct AlignmentMetrics {
    align_calls: AtomicU64,
    entries_applied: AtomicU64,
    entries_skipped: AtomicU64,
    invalidations: AtomicU64,
}

impl AlignmentMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> AlignmentMetricsSnapshot {
        AlignmentMetricsSnapshot {
            align_calls: self.align_calls.load(Ordering::Relaxed),
            entries_applied: self.entries_applied.load(Ordering::Relaxed),
            entries_skipped: self.entries_skipped.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct DetectorManager {
    name: String,
    tree: Arc<GeoTree>,
    common: Arc<CommonItems>,
    elements: DetectorElementCollection,
    levels: Vec<BTreeMap<Identifier, ExtendedAlignableTransform>>,
    folders: BTreeMap<String, FolderSpec>,
    global_folders: BTreeMap<String, Frame>,
    special_folders: BTreeMap<String, FolderSpec>,
    metrics: AlignmentMetrics,
    warned_missing: AtomicBool,
}

impl DetectorManager {
    pub fn new(name: impl Into<String>, helper: ElementIdHelper, tree: Arc<GeoTree>) -> Self {
        let elements = DetectorElementCollection::with_hash_max(helper.element_hash_max());
        Self {
            name: name.into(),
            tree,
            common: CommonItems::new(helper),
            elements,
            levels: Vec::new(),
            folders: BTreeMap::new(),
            global_folders: BTreeMap::new(),
            special_folders: BTreeMap::new(),
            metrics: AlignmentMetrics::default(),
            warned_missing: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn helper(&self) -> &ElementIdHelper {
        self.common.helper()
    }

    pub fn tree(&self) -> &Arc<GeoTree> {
        &self.tree
    }

    /// Items every element of this manager must share.
    pub fn common(&self) -> &Arc<CommonItems> {
        &self.common
    }

    pub fn metrics(&self) -> AlignmentMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Level that global-folder channels address: emulsion modules, SCT
    /// stations.
    pub fn top_level(&self) -> usize {
        match self.common.helper() {
            ElementIdHelper::Emulsion(_) => 2,
            ElementIdHelper::Sct(_) => 3,
        }
    }

    fn global_channel_id(&self, channel: u32) -> Identifier {
        let Ok(channel) = i32::try_from(channel) else {
            return Identifier::INVALID;
        };
        match self.common.helper() {
            ElementIdHelper::Emulsion(helper) => helper.module_id(channel),
            ElementIdHelper::Sct(helper) => helper.station_id(channel),
        }
    }

    // === Elements ===

    pub fn add_element(&mut self, element: DetectorElement) -> Result<Arc<DetectorElement>> {
        if !Arc::ptr_eq(element.common(), &self.common) {
            return Err(GeoError::InvalidElement {
                id: element.identify().raw(),
                detail: format!("element does not share the {} manager's common items", self.name),
            });
        }
        let element = Arc::new(element);
        self.elements.insert(Arc::clone(&element))?;
        Ok(element)
    }

    pub fn elements(&self) -> &DetectorElementCollection {
        &self.elements
    }

    pub fn element_by_hash(&self, hash: IdentifierHash) -> Option<&Arc<DetectorElement>> {
        self.elements.get(hash)
    }

    pub fn element_by_id(&self, id: Identifier) -> Option<&Arc<DetectorElement>> {
        self.helper()
            .element_hash(id)
            .and_then(|hash| self.elements.get(hash))
    }

    pub fn invalidate_all(&self) {
        self.elements.invalidate_all();
        AlignmentMetrics::bump(&self.metrics.invalidations);
    }

    /// Redirect element transforms through `store` (or back to the tree).
    pub fn set_alignment_store(&self, store: Option<Arc<AlignmentStore>>) {
        self.common.set_alignment_store(store);
        self.invalidate_all();
    }

    // === Registration ===

    /// Register `alignable` (placing `child`) at `level` under `id`.
    pub fn add_alignable_transform(
        &mut self,
        level: usize,
        id: Identifier,
        alignable: AlignableId,
        child: VolumeId,
    ) -> Result<()> {
        if self.tree.alignable_volume(alignable)? != Some(child) {
            return Err(GeoError::internal(format!(
                "alignable transform {} does not place volume {}",
                alignable.0, child.0
            )));
        }
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, BTreeMap::new);
        }
        let map = &mut self.levels[level];
        if map.contains_key(&id) {
            return Err(GeoError::DuplicateIdentifier {
                level: "alignable",
                id: id.raw(),
            });
        }
        map.insert(id, ExtendedAlignableTransform { alignable, child });
        Ok(())
    }

    pub fn alignable_transform(&self, level: usize, id: Identifier) -> Option<ExtendedAlignableTransform> {
        self.levels.get(level).and_then(|map| map.get(&id)).copied()
    }

    pub fn num_alignable_transforms(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, BTreeMap::len)
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn check_unregistered(&self, key: &str) -> Result<()> {
        if self.folders.contains_key(key)
            || self.global_folders.contains_key(key)
            || self.special_folders.contains_key(key)
        {
            return Err(GeoError::config(format!(
                "alignment folder {key} registered twice with {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Regular per-identifier folder; its data is required.
    pub fn add_folder(&mut self, key: impl Into<String>, level: usize, frame: Frame) -> Result<()> {
        let key = key.into();
        self.check_unregistered(&key)?;
        self.folders.insert(key, FolderSpec { level, frame });
        Ok(())
    }

    /// Per-channel rigid-body folder applied at [`top_level`](Self::top_level).
    pub fn add_global_folder(&mut self, key: impl Into<String>, frame: Frame) -> Result<()> {
        let key = key.into();
        self.check_unregistered(&key)?;
        self.global_folders.insert(key, frame);
        Ok(())
    }

    /// Detector-optional per-identifier folder; absent data is tolerated.
    pub fn add_special_folder(&mut self, key: impl Into<String>, level: usize, frame: Frame) -> Result<()> {
        let key = key.into();
        self.check_unregistered(&key)?;
        self.special_folders.insert(key, FolderSpec { level, frame });
        Ok(())
    }

    /// Every registered folder key: global, regular, then special.
    pub fn folder_keys(&self) -> Vec<String> {
        self.global_folders
            .keys()
            .chain(self.folders.keys())
            .chain(self.special_folders.keys())
            .cloned()
            .collect()
    }

    // === Delta application ===

    /// Apply `delta` to the alignable registered at `(level, id)`.
    ///
    /// With a store the resulting node-local delta is written there and the
    /// tree is left untouched. An unregistered identifier is
    /// [`GeoError::NoAlignableTransform`], which callers treat as a skip.
    pub fn set_alignable_transform_delta(
        &self,
        level: usize,
        id: Identifier,
        delta: &Transform3D,
        frame: Frame,
        store: Option<&mut AlignmentStore>,
    ) -> Result<()> {
        let Some(ext) = self.alignable_transform(level, id) else {
            self.report_missing(level, id);
            return Err(GeoError::NoAlignableTransform { level, id: id.raw() });
        };
        let node_delta = match frame {
            Frame::Other => *delta,
            Frame::Global => {
                let default = self.tree.default_absolute_transform(ext.child, store.as_deref())?;
                global_delta(&default, delta)
            }
            Frame::Local => {
                let default = self.tree.default_absolute_transform(ext.child, store.as_deref())?;
                let local_to_global = match (level, self.element_by_id(id)) {
                    (0, Some(element)) => element.def_transform()?,
                    _ => default,
                };
                local_delta(&default, &local_to_global, delta)
            }
        };
        match store {
            Some(store) => store.set_delta(ext.alignable, node_delta),
            None => self.tree.set_delta(ext.alignable, node_delta)?,
        }
        trace!(
            target: "fgeo.readout::align",
            manager = %self.name,
            level,
            id = %id,
            ?frame,
            "alignable delta applied"
        );
        Ok(())
    }

    fn report_missing(&self, level: usize, id: Identifier) {
        if !self.helper().owns(id) {
            debug!(
                target: "fgeo.readout::align",
                manager = %self.name,
                id = %id,
                "identifier does not belong to this detector"
            );
        } else if !self.warned_missing.swap(true, Ordering::Relaxed) {
            warn!(
                target: "fgeo.readout::align",
                manager = %self.name,
                level,
                id = %id,
                element = %self.helper().describe(id),
                "no alignable transform registered; entry skipped"
            );
        } else {
            debug!(
                target: "fgeo.readout::align",
                manager = %self.name,
                level,
                id = %id,
                "no alignable transform registered; entry skipped"
            );
        }
    }

    fn apply_entry(
        &self,
        level: usize,
        id: Identifier,
        delta: &Transform3D,
        frame: Frame,
        store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        match self.set_alignable_transform_delta(level, id, delta, frame, store) {
            Ok(()) => {
                AlignmentMetrics::bump(&self.metrics.entries_applied);
                Ok(true)
            }
            Err(err) if !err.is_fatal() => {
                AlignmentMetrics::bump(&self.metrics.entries_skipped);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn apply_container(
        &self,
        spec: FolderSpec,
        container: &AlignableTransformContainer,
        mut store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        let mut changed = false;
        for (id, delta) in container.iter() {
            changed |= self.apply_entry(spec.level, *id, delta, spec.frame, store.as_deref_mut())?;
        }
        Ok(changed)
    }

    fn fail(&self, err: GeoError) -> GeoError {
        error!(target: "fgeo.readout::align", manager = %self.name, error = %err, "alignment failed");
        err
    }

    // === Dispatch ===

    /// Re-read every registered folder.
    pub fn align(
        &self,
        conditions: &dyn ConditionsStore,
        store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        let keys = self.folder_keys();
        self.align_keys(&keys, conditions, store)
    }

    /// Process only the folders named in `keys`.
    pub fn align_keys<S: AsRef<str>>(
        &self,
        keys: &[S],
        conditions: &dyn ConditionsStore,
        mut store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        AlignmentMetrics::bump(&self.metrics.align_calls);
        let mut changed = false;
        for key in keys {
            changed |= self.process_key(key.as_ref(), conditions, store.as_deref_mut())?;
        }
        if changed {
            self.invalidate_all();
        }
        debug!(target: "fgeo.readout::align", manager = %self.name, keys = keys.len(), changed, "alignment processed");
        Ok(changed)
    }

    /// Classify `key` and apply its data. Does not invalidate elements.
    pub fn process_key(
        &self,
        key: &str,
        conditions: &dyn ConditionsStore,
        store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        if self.global_folders.contains_key(key) {
            return self.process_global_alignment(key, conditions, store);
        }
        if let Some(spec) = self.folders.get(key) {
            let container = conditions
                .transforms(key)
                .filter(|container| !container.is_empty())
                .ok_or_else(|| {
                    self.fail(GeoError::MissingAlignment {
                        key: key.to_owned(),
                    })
                })?;
            return self.apply_container(*spec, &container, store);
        }
        if let Some(spec) = self.special_folders.get(key) {
            return match conditions.transforms(key).filter(|c| !c.is_empty()) {
                Some(container) => self.apply_container(*spec, &container, store),
                None => {
                    info!(
                        target: "fgeo.readout::align",
                        manager = %self.name,
                        key,
                        "optional alignment folder absent; not applied"
                    );
                    Ok(false)
                }
            };
        }
        Err(self.fail(GeoError::UnknownFolder {
            key: key.to_owned(),
        }))
    }

    /// Apply a per-channel rigid-body folder at the top level.
    pub fn process_global_alignment(
        &self,
        key: &str,
        conditions: &dyn ConditionsStore,
        mut store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        let frame = *self.global_folders.get(key).ok_or_else(|| {
            self.fail(GeoError::UnknownFolder {
                key: key.to_owned(),
            })
        })?;
        let container = conditions
            .global_alignment(key)
            .filter(|container| !container.is_empty())
            .ok_or_else(|| {
                self.fail(GeoError::MissingAlignment {
                    key: key.to_owned(),
                })
            })?;
        let level = self.top_level();
        let mut changed = false;
        for (channel, delta) in container.deltas() {
            let id = self.global_channel_id(channel);
            changed |= self.apply_entry(level, id, &delta, frame, store.as_deref_mut())?;
        }
        Ok(changed)
    }

    /// Apply raw containers directly, bypassing the conditions service.
    ///
    /// Every regular folder must be present and non-empty; special folders
    /// are applied when present. Invalidates elements when anything changed.
    pub fn process_alignment_container(
        &self,
        raw: &RawAlignmentObjects,
        mut store: Option<&mut AlignmentStore>,
    ) -> Result<bool> {
        AlignmentMetrics::bump(&self.metrics.align_calls);
        let mut changed = false;
        for (key, spec) in &self.folders {
            let container = raw
                .get(key)
                .filter(|container| !container.is_empty())
                .ok_or_else(|| self.fail(GeoError::MissingAlignment { key: key.clone() }))?;
            changed |= self.apply_container(*spec, container, store.as_deref_mut())?;
        }
        for (key, spec) in &self.special_folders {
            match raw.get(key).filter(|container| !container.is_empty()) {
                Some(container) => {
                    changed |= self.apply_container(*spec, container, store.as_deref_mut())?;
                }
                None => info!(
                    target: "fgeo.readout::align",
                    manager = %self.name,
                    key = %key,
                    "optional alignment folder absent; not applied"
                ),
            }
        }
        if changed {
            self.invalidate_all();
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_4;

    use fgeo_geomodel::transform::{self, from_alignment_parameters};

    use super::*;

    fn nominal() -> Transform3D {
        from_alignment_parameters([10.0, -4.0, 250.0, 0.1, -0.2, FRAC_PI_4])
    }

    #[test]
    fn identity_delta_gives_identity_in_every_frame() {
        let t = nominal();
        let id = transform::identity();
        assert!(transform::is_identity(&global_delta(&t, &id), 1e-12));
        assert!(transform::is_identity(&local_delta(&t, &t, &id), 1e-12));
        let l = from_alignment_parameters([1.0, 2.0, 3.0, 0.0, 0.3, 0.0]);
        assert!(transform::is_identity(&local_delta(&t, &l, &id), 1e-12));
    }

    #[test]
    fn world_frame_local_delta_is_the_global_delta() {
        let t = nominal();
        let d = from_alignment_parameters([0.1, 0.2, -0.05, 0.001, 0.0, -0.002]);
        let global = global_delta(&t, &d);
        let local = local_delta(&t, &transform::identity(), &d);
        assert_eq!(global, local, "case=identity_frame_bit_identical");
    }

    #[test]
    fn own_frame_local_delta_matches_conjugated_global_delta() {
        let t = nominal();
        let l = from_alignment_parameters([0.1, 0.2, -0.05, 0.001, 0.0, -0.002]);
        // The same physical correction expressed in world coordinates.
        let g = t * l * t.inverse();
        let via_local = local_delta(&t, &t, &l);
        let via_global = global_delta(&t, &g);
        assert!(transform::approx_eq(&via_local, &l, 1e-9));
        assert!(transform::approx_eq(&via_local, &via_global, 1e-9), "case=own_frame");
    }

    #[test]
    fn global_delta_moves_absolute_transform_by_delta() {
        let t = nominal();
        let g = transform::translation(0.0, 0.0, 1.0);
        let c = global_delta(&t, &g);
        assert!(transform::approx_eq(&(t * c), &(g * t), 1e-9));
    }
}
