//! Component factories: the closed set of volume kinds the detector
//! factories place.

use std::sync::Arc;

use fgeo_error::Result;
use fgeo_geomodel::transform::Transform3D;
use fgeo_geomodel::{AlignableId, Child, GeoTree, LogicalVolume, Placement, Shape, VolumeId};
use hashbrown::HashMap;
use tracing::trace;

use crate::parameters::{SlabSpec, SupportSpec};

/// Whether placements of a component share one logical volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// One logical volume, built on first use.
    Shared,
    /// A fresh logical volume per placement.
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentFactory {
    /// Top-level container of one detector.
    Envelope { label: &'static str, half: [f64; 3] },
    /// Air container grouping an alignable level.
    Assembly { label: &'static str, half: [f64; 3] },
    /// Flat layer of the emulsion stack.
    Slab {
        label: &'static str,
        spec: SlabSpec,
        sensitive: bool,
    },
    Support(SupportSpec),
    /// Silicon wafer, described in its hit frame (depth along x).
    Wafer { half: [f64; 3], material: String },
}

impl ComponentFactory {
    pub fn label(&self) -> &str {
        match self {
            Self::Envelope { label, .. } | Self::Assembly { label, .. } | Self::Slab { label, .. } => *label,
            Self::Support(spec) => spec.name.as_str(),
            Self::Wafer { .. } => "Wafer",
        }
    }

    pub const fn sharing(&self) -> Sharing {
        match self {
            Self::Envelope { .. } | Self::Support(_) => Sharing::Unique,
            Self::Assembly { .. } | Self::Slab { .. } | Self::Wafer { .. } => Sharing::Shared,
        }
    }

    /// Sensitive components become full volumes backing detector elements.
    pub const fn is_sensitive(&self) -> bool {
        match self {
            Self::Slab { sensitive, .. } => *sensitive,
            Self::Wafer { .. } => true,
            _ => false,
        }
    }

    pub fn material(&self) -> &str {
        match self {
            Self::Envelope { .. } | Self::Assembly { .. } => "Air",
            Self::Slab { spec, .. } => spec.material.as_str(),
            Self::Support(spec) => spec.material.as_str(),
            Self::Wafer { material, .. } => material.as_str(),
        }
    }

    pub fn pre_build(&self) -> Shape {
        match self {
            Self::Envelope { half, .. } | Self::Assembly { half, .. } | Self::Wafer { half, .. } => {
                Shape::cuboid(half[0], half[1], half[2])
            }
            Self::Slab { spec, .. } => Shape::cuboid(spec.half_x, spec.half_y, spec.thickness / 2.0),
            Self::Support(spec) => Shape::cuboid(spec.half[0], spec.half[1], spec.half[2]),
        }
    }

    /// Place one instance under `parent`.
    ///
    /// Alignable placements and sensitive components are full volumes.
    pub fn build(
        &self,
        builder: &mut ComponentBuilder,
        parent: VolumeId,
        index: Option<i32>,
        placement: Placement,
    ) -> Result<VolumeId> {
        let logical = builder.logical(self);
        let child = match index {
            Some(index) => Child::indexed(logical, self.label(), index, placement),
            None => Child::new(logical, self.label(), placement),
        };
        let child = if self.is_sensitive() || matches!(placement, Placement::Alignable(_)) {
            child.full()
        } else {
            child
        };
        let volume = builder.tree.add_child(parent, child)?;
        trace!(target: "fgeo.geometry::component", label = self.label(), ?index, volume = volume.0, "placed");
        Ok(volume)
    }

    /// Place one instance behind a new alignable transform.
    pub fn build_alignable(
        &self,
        builder: &mut ComponentBuilder,
        parent: VolumeId,
        index: i32,
        default: Transform3D,
    ) -> Result<(VolumeId, AlignableId)> {
        let alignable = builder.tree.add_alignable_transform(default);
        let volume = self.build(builder, parent, Some(index), Placement::Alignable(alignable))?;
        Ok((volume, alignable))
    }
}

/// Places components into one tree, reusing shared logical volumes.
#[derive(Debug)]
pub struct ComponentBuilder {
    tree: Arc<GeoTree>,
    shared: HashMap<String, Arc<LogicalVolume>>,
    logical_volumes: usize,
}

impl ComponentBuilder {
    pub fn new(tree: Arc<GeoTree>) -> Self {
        Self {
            tree,
            shared: HashMap::new(),
            logical_volumes: 0,
        }
    }

    pub fn tree(&self) -> &Arc<GeoTree> {
        &self.tree
    }

    /// Distinct logical volumes created so far.
    pub const fn logical_volumes(&self) -> usize {
        self.logical_volumes
    }

    fn logical(&mut self, component: &ComponentFactory) -> Arc<LogicalVolume> {
        let make = || LogicalVolume::new(component.label(), component.pre_build(), component.material());
        match component.sharing() {
            Sharing::Unique => {
                self.logical_volumes += 1;
                make()
            }
            Sharing::Shared => {
                if let Some(existing) = self.shared.get(component.label()) {
                    return Arc::clone(existing);
                }
                let logical = make();
                self.shared.insert(component.label().to_owned(), Arc::clone(&logical));
                self.logical_volumes += 1;
                logical
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fgeo_geomodel::transform;

    use super::*;

    fn film() -> ComponentFactory {
        ComponentFactory::Slab {
            label: "Film",
            spec: SlabSpec {
                half_x: 125.0,
                half_y: 150.0,
                thickness: 0.07,
                material: "Emulsion".to_owned(),
            },
            sensitive: true,
        }
    }

    #[test]
    fn shared_components_reuse_their_logical_volume() {
        let tree = GeoTree::new();
        let world = tree
            .add_world(LogicalVolume::new("World", Shape::cuboid(1e3, 1e3, 1e3), "Air"))
            .expect("world");
        let mut builder = ComponentBuilder::new(Arc::clone(&tree));
        let a = film()
            .build(&mut builder, world, Some(0), Placement::Fixed(transform::identity()))
            .expect("a");
        let b = film()
            .build(&mut builder, world, Some(1), Placement::Fixed(transform::translation(0.0, 0.0, 1.0)))
            .expect("b");
        assert!(Arc::ptr_eq(
            &tree.logical(a).expect("logical"),
            &tree.logical(b).expect("logical")
        ));
        assert_eq!(builder.logical_volumes(), 1, "case=shared");
        assert_eq!(tree.name(b).expect("name"), "Film#1");
        assert!(tree.is_full(a).expect("full"), "case=sensitive_is_full");

        let envelope = ComponentFactory::Envelope {
            label: "Emulsion",
            half: [1.0, 1.0, 1.0],
        };
        envelope
            .build(&mut builder, world, None, Placement::Fixed(transform::identity()))
            .expect("envelope");
        envelope
            .build(&mut builder, world, None, Placement::Fixed(transform::identity()))
            .expect("envelope");
        assert_eq!(builder.logical_volumes(), 3, "case=unique");
    }

    #[test]
    fn alignable_placements_are_full() {
        let tree = GeoTree::new();
        let world = tree
            .add_world(LogicalVolume::new("World", Shape::cuboid(1e3, 1e3, 1e3), "Air"))
            .expect("world");
        let mut builder = ComponentBuilder::new(Arc::clone(&tree));
        let assembly = ComponentFactory::Assembly {
            label: "Module",
            half: [10.0, 10.0, 1.0],
        };
        let (volume, alignable) = assembly
            .build_alignable(&mut builder, world, 4, transform::translation(0.0, 0.0, 5.0))
            .expect("module");
        assert!(tree.is_full(volume).expect("full"));
        assert_eq!(tree.alignable_volume(alignable).expect("alignable"), Some(volume));
        assert_eq!(tree.id_tag(volume).expect("tag"), Some(4));
        assert_eq!(assembly.pre_build().volume(), 800.0);
    }
}
