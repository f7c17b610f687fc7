//! Physical-volume tree.
//!
//! The tree is built single-threaded by the detector factories and then
//! shared behind an `Arc`. Afterwards only alignable deltas change; readers
//! and the alignment writer synchronise through the tree's locks.

use std::sync::Arc;

use fgeo_error::{GeoError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::store::AlignmentStore;
use crate::transform::Transform3D;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlignableId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned box given by its half lengths.
    Box { half_x: f64, half_y: f64, half_z: f64 },
}

impl Shape {
    pub const fn cuboid(half_x: f64, half_y: f64, half_z: f64) -> Self {
        Self::Box {
            half_x,
            half_y,
            half_z,
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Self::Box {
                half_x,
                half_y,
                half_z,
            } => 8.0 * half_x * half_y * half_z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub name: String,
    pub shape: Shape,
    pub material: String,
}

impl LogicalVolume {
    pub fn new(name: impl Into<String>, shape: Shape, material: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            shape,
            material: material.into(),
        })
    }
}

/// How a child sits inside its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Fixed(Transform3D),
    /// Default transform times the alignable's current delta.
    Alignable(AlignableId),
}

/// Description of a volume to add under a parent.
#[derive(Debug, Clone)]
pub struct Child {
    pub logical: Arc<LogicalVolume>,
    pub name: String,
    pub id_tag: Option<i32>,
    pub full: bool,
    pub placement: Placement,
}

impl Child {
    pub fn new(logical: Arc<LogicalVolume>, name: impl Into<String>, placement: Placement) -> Self {
        Self {
            logical,
            name: name.into(),
            id_tag: None,
            full: false,
            placement,
        }
    }

    /// Name `"<label>#<index>"` with `index` as the numeric tag.
    pub fn indexed(logical: Arc<LogicalVolume>, label: &str, index: i32, placement: Placement) -> Self {
        Self::new(logical, format!("{label}#{index}"), placement).with_id_tag(index)
    }

    #[must_use]
    pub fn with_id_tag(mut self, tag: i32) -> Self {
        self.id_tag = Some(tag);
        self
    }

    /// Mark as a full physical volume (one that tracks its absolute position).
    #[must_use]
    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    id_tag: Option<i32>,
    full: bool,
    logical: Arc<LogicalVolume>,
    parent: Option<VolumeId>,
    placement: Placement,
    children: Vec<VolumeId>,
}

#[derive(Debug, Clone)]
struct Alignable {
    default: Transform3D,
    delta: Option<Transform3D>,
    volume: Option<VolumeId>,
}

#[derive(Debug, Default)]
pub struct GeoTree {
    nodes: RwLock<Vec<Node>>,
    alignables: RwLock<Vec<Alignable>>,
}

impl GeoTree {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the root volume. Only one world is allowed.
    pub fn add_world(&self, logical: Arc<LogicalVolume>) -> Result<VolumeId> {
        let mut nodes = self.nodes.write();
        if !nodes.is_empty() {
            return Err(GeoError::internal("world volume already exists"));
        }
        nodes.push(Node {
            name: logical.name.clone(),
            id_tag: None,
            full: true,
            logical,
            parent: None,
            placement: Placement::Fixed(Transform3D::identity()),
            children: Vec::new(),
        });
        Ok(VolumeId(0))
    }

    pub fn world(&self) -> Option<VolumeId> {
        (!self.nodes.read().is_empty()).then_some(VolumeId(0))
    }

    /// Register an alignable transform not yet attached to a volume.
    pub fn add_alignable_transform(&self, default: Transform3D) -> AlignableId {
        let mut alignables = self.alignables.write();
        alignables.push(Alignable {
            default,
            delta: None,
            volume: None,
        });
        AlignableId(alignables.len() - 1)
    }

    pub fn add_child(&self, parent: VolumeId, child: Child) -> Result<VolumeId> {
        let mut nodes = self.nodes.write();
        if parent.0 >= nodes.len() {
            return Err(GeoError::NoSuchVolume { index: parent.0 });
        }
        let id = VolumeId(nodes.len());
        if let Placement::Alignable(alignable) = child.placement {
            let mut alignables = self.alignables.write();
            let entry = alignables
                .get_mut(alignable.0)
                .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })?;
            if entry.volume.is_some() {
                return Err(GeoError::internal(format!(
                    "alignable transform {} already places a volume",
                    alignable.0
                )));
            }
            entry.volume = Some(id);
        }
        trace!(target: "fgeo.geomodel::tree", name = %child.name, parent = parent.0, "add volume");
        nodes.push(Node {
            name: child.name,
            id_tag: child.id_tag,
            full: child.full,
            logical: child.logical,
            parent: Some(parent),
            placement: child.placement,
            children: Vec::new(),
        });
        nodes[parent.0].children.push(id);
        Ok(id)
    }

    fn with_node<T>(&self, volume: VolumeId, f: impl FnOnce(&Node) -> T) -> Result<T> {
        self.nodes
            .read()
            .get(volume.0)
            .map(f)
            .ok_or(GeoError::NoSuchVolume { index: volume.0 })
    }

    pub fn name(&self, volume: VolumeId) -> Result<String> {
        self.with_node(volume, |node| node.name.clone())
    }

    pub fn id_tag(&self, volume: VolumeId) -> Result<Option<i32>> {
        self.with_node(volume, |node| node.id_tag)
    }

    pub fn is_full(&self, volume: VolumeId) -> Result<bool> {
        self.with_node(volume, |node| node.full)
    }

    pub fn logical(&self, volume: VolumeId) -> Result<Arc<LogicalVolume>> {
        self.with_node(volume, |node| Arc::clone(&node.logical))
    }

    pub fn parent(&self, volume: VolumeId) -> Result<Option<VolumeId>> {
        self.with_node(volume, |node| node.parent)
    }

    pub fn children(&self, volume: VolumeId) -> Result<Vec<VolumeId>> {
        self.with_node(volume, |node| node.children.clone())
    }

    pub fn placement(&self, volume: VolumeId) -> Result<Placement> {
        self.with_node(volume, |node| node.placement)
    }

    /// The alignable transform placing `volume`, if any.
    pub fn alignable_of(&self, volume: VolumeId) -> Result<Option<AlignableId>> {
        self.with_node(volume, |node| match node.placement {
            Placement::Alignable(alignable) => Some(alignable),
            Placement::Fixed(_) => None,
        })
    }

    pub fn volume_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn alignable_count(&self) -> usize {
        self.alignables.read().len()
    }

    /// First volume (in creation order) named `name`.
    pub fn find_by_name(&self, name: &str) -> Option<VolumeId> {
        self.nodes
            .read()
            .iter()
            .position(|node| node.name == name)
            .map(VolumeId)
    }

    /// Slash-separated names from the world down to `volume`.
    pub fn path(&self, volume: VolumeId) -> Result<String> {
        let names: Vec<String> = self
            .lineage(volume)?
            .into_iter()
            .map(|v| self.name(v))
            .collect::<Result<_>>()?;
        Ok(names.join("/"))
    }

    /// Volumes from the world down to and including `volume`.
    fn lineage(&self, volume: VolumeId) -> Result<Vec<VolumeId>> {
        let nodes = self.nodes.read();
        let mut chain = Vec::new();
        let mut cursor = Some(volume);
        while let Some(current) = cursor {
            let node = nodes
                .get(current.0)
                .ok_or(GeoError::NoSuchVolume { index: current.0 })?;
            chain.push(current);
            cursor = node.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn default_transform(&self, alignable: AlignableId) -> Result<Transform3D> {
        self.alignables
            .read()
            .get(alignable.0)
            .map(|entry| entry.default)
            .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })
    }

    /// Delta held by the tree itself.
    pub fn delta(&self, alignable: AlignableId) -> Result<Option<Transform3D>> {
        self.alignables
            .read()
            .get(alignable.0)
            .map(|entry| entry.delta)
            .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })
    }

    pub fn set_delta(&self, alignable: AlignableId, delta: Transform3D) -> Result<()> {
        let mut alignables = self.alignables.write();
        let entry = alignables
            .get_mut(alignable.0)
            .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })?;
        entry.delta = Some(delta);
        debug!(target: "fgeo.geomodel::tree", alignable = alignable.0, "alignable delta set");
        Ok(())
    }

    pub fn clear_delta(&self, alignable: AlignableId) -> Result<()> {
        let mut alignables = self.alignables.write();
        let entry = alignables
            .get_mut(alignable.0)
            .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })?;
        entry.delta = None;
        Ok(())
    }

    /// Volume placed by `alignable`, once attached.
    pub fn alignable_volume(&self, alignable: AlignableId) -> Result<Option<VolumeId>> {
        self.alignables
            .read()
            .get(alignable.0)
            .map(|entry| entry.volume)
            .ok_or(GeoError::NoSuchAlignable { index: alignable.0 })
    }

    fn placement_transform(
        &self,
        placement: Placement,
        aligned: bool,
        store: Option<&AlignmentStore>,
    ) -> Result<Transform3D> {
        match placement {
            Placement::Fixed(transform) => Ok(transform),
            Placement::Alignable(alignable) => {
                let default = self.default_transform(alignable)?;
                if !aligned {
                    return Ok(default);
                }
                let delta = match store {
                    Some(store) => store.delta(alignable),
                    None => self.delta(alignable)?,
                };
                Ok(delta.map_or(default, |delta| default * delta))
            }
        }
    }

    /// Transform of `volume` relative to its parent, alignment included.
    pub fn local_transform(
        &self,
        volume: VolumeId,
        store: Option<&AlignmentStore>,
    ) -> Result<Transform3D> {
        let placement = self.placement(volume)?;
        self.placement_transform(placement, true, store)
    }

    fn compose(
        &self,
        volume: VolumeId,
        aligned: bool,
        store: Option<&AlignmentStore>,
    ) -> Result<Transform3D> {
        let mut out = Transform3D::identity();
        for step in self.lineage(volume)? {
            out *= self.placement_transform(self.placement(step)?, aligned, store)?;
        }
        Ok(out)
    }

    /// World transform of `volume` with every alignment delta along the path.
    ///
    /// With a store, deltas come from the store and the result is memoised
    /// there.
    pub fn absolute_transform(
        &self,
        volume: VolumeId,
        store: Option<&AlignmentStore>,
    ) -> Result<Transform3D> {
        if let Some(cached) = store.and_then(|s| s.absolute(volume)) {
            return Ok(cached);
        }
        let transform = self.compose(volume, true, store)?;
        if let Some(store) = store {
            store.remember_absolute(volume, transform);
        }
        Ok(transform)
    }

    /// World transform of `volume` ignoring every alignment delta.
    pub fn default_absolute_transform(
        &self,
        volume: VolumeId,
        store: Option<&AlignmentStore>,
    ) -> Result<Transform3D> {
        if let Some(cached) = store.and_then(|s| s.default_absolute(volume)) {
            return Ok(cached);
        }
        let transform = self.compose(volume, false, store)?;
        if let Some(store) = store {
            store.remember_default_absolute(volume, transform);
        }
        Ok(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{self, Point3};

    fn cube(name: &str) -> Arc<LogicalVolume> {
        LogicalVolume::new(name, Shape::cuboid(1.0, 1.0, 1.0), "Air")
    }

    #[test]
    fn names_tags_and_paths() {
        let tree = GeoTree::new();
        let world = tree.add_world(cube("World")).expect("world");
        let station = tree
            .add_child(
                world,
                Child::indexed(cube("Station"), "Station", 2, Placement::Fixed(transform::identity())),
            )
            .expect("child");
        assert_eq!(tree.name(station).expect("name"), "Station#2");
        assert_eq!(tree.id_tag(station).expect("tag"), Some(2));
        assert_eq!(tree.path(station).expect("path"), "World/Station#2");
        assert_eq!(tree.find_by_name("Station#2"), Some(station));
        assert_eq!(tree.children(world).expect("children"), vec![station]);
        assert!(tree.add_world(cube("World")).is_err());
        assert!(matches!(
            tree.name(VolumeId(99)),
            Err(GeoError::NoSuchVolume { index: 99 })
        ));
    }

    #[test]
    fn absolute_transform_composes_defaults_and_deltas() {
        let tree = GeoTree::new();
        let world = tree.add_world(cube("World")).expect("world");
        let outer = tree.add_alignable_transform(transform::translation(0.0, 0.0, 100.0));
        let station = tree
            .add_child(world, Child::new(cube("Station"), "Station#0", Placement::Alignable(outer)))
            .expect("station");
        let inner = tree.add_alignable_transform(transform::translation(10.0, 0.0, 0.0));
        let module = tree
            .add_child(
                station,
                Child::new(cube("Module"), "Module#0", Placement::Alignable(inner)).full(),
            )
            .expect("module");

        let origin = Point3::origin();
        let nominal = tree.absolute_transform(module, None).expect("transform") * origin;
        assert!((nominal - Point3::new(10.0, 0.0, 100.0)).norm() < 1e-12);

        tree.set_delta(outer, transform::translation(0.0, 1.0, 0.0)).expect("delta");
        tree.set_delta(inner, transform::translation(0.0, 0.0, 2.0)).expect("delta");
        let aligned = tree.absolute_transform(module, None).expect("transform") * origin;
        assert!((aligned - Point3::new(10.0, 1.0, 102.0)).norm() < 1e-12);

        let default = tree.default_absolute_transform(module, None).expect("transform") * origin;
        assert!((default - nominal).norm() < 1e-12, "case=default_ignores_deltas");

        tree.clear_delta(outer).expect("clear");
        let partly = tree.absolute_transform(module, None).expect("transform") * origin;
        assert!((partly - Point3::new(10.0, 0.0, 102.0)).norm() < 1e-12);
    }

    #[test]
    fn store_overrides_tree_deltas() {
        let tree = GeoTree::new();
        let world = tree.add_world(cube("World")).expect("world");
        let alignable = tree.add_alignable_transform(transform::identity());
        let volume = tree
            .add_child(world, Child::new(cube("Film"), "Film#0", Placement::Alignable(alignable)))
            .expect("child");
        tree.set_delta(alignable, transform::translation(5.0, 0.0, 0.0)).expect("delta");

        let mut store = AlignmentStore::new();
        let empty = tree.absolute_transform(volume, Some(&store)).expect("transform");
        assert!(transform::is_identity(&empty, 1e-12), "case=store_replaces_tree_delta");
        assert_eq!(store.cached_positions(), 1);

        store.set_delta(alignable, transform::translation(0.0, 3.0, 0.0));
        assert_eq!(store.cached_positions(), 0);
        let moved = tree.absolute_transform(volume, Some(&store)).expect("transform");
        assert!((moved * Point3::origin() - Point3::new(0.0, 3.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn alignable_attaches_once() {
        let tree = GeoTree::new();
        let world = tree.add_world(cube("World")).expect("world");
        let alignable = tree.add_alignable_transform(transform::identity());
        tree.add_child(world, Child::new(cube("A"), "A#0", Placement::Alignable(alignable)))
            .expect("first");
        assert!(
            tree.add_child(world, Child::new(cube("B"), "B#0", Placement::Alignable(alignable)))
                .is_err()
        );
        assert!(matches!(
            tree.add_child(
                world,
                Child::new(cube("C"), "C#0", Placement::Alignable(AlignableId(7)))
            ),
            Err(GeoError::NoSuchAlignable { index: 7 })
        ));
    }
}
