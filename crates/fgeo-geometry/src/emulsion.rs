//! Emulsion detector factory: modules of bases, each base a pair of films
//! around a plastic sheet, with a tungsten plate after every base.

use std::sync::Arc;

use fgeo_error::Result;
use fgeo_geomodel::transform;
use fgeo_geomodel::{GeoTree, Placement, VolumeId};
use fgeo_idhelpers::{EmulsionId, EmulsionIdentifier};
use fgeo_readout::{DetectorDesign, DetectorElement, DetectorManager, ElementIdHelper};
use tracing::{debug, info};

use crate::component::{ComponentBuilder, ComponentFactory};
use crate::folders::{EMULSION_DYNAMIC, EMULSION_STATIC};
use crate::parameters::EmulsionGeoParameters;

/// Alignable levels of the emulsion hierarchy.
pub const FILM_LEVEL: usize = 0;
pub const BASE_LEVEL: usize = 1;
pub const MODULE_LEVEL: usize = 2;

/// Switches shared by both detector factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FactoryOptions {
    /// Place levels behind alignable transforms and register them.
    pub alignable: bool,
    /// Register the per-channel global folder layout.
    pub dynamic_folders: bool,
}

#[derive(Debug)]
pub struct EmulsionDetectorFactory {
    parameters: EmulsionGeoParameters,
    helper: Arc<EmulsionId>,
    options: FactoryOptions,
}

impl EmulsionDetectorFactory {
    pub fn new(parameters: EmulsionGeoParameters, helper: Arc<EmulsionId>, options: FactoryOptions) -> Self {
        Self {
            parameters,
            helper,
            options,
        }
    }

    pub fn parameters(&self) -> &EmulsionGeoParameters {
        &self.parameters
    }

    fn envelope_half(&self) -> [f64; 3] {
        let p = &self.parameters;
        let mut half = [
            p.film.half_x.max(p.plate.half_x),
            p.film.half_y.max(p.plate.half_y),
            f64::from(p.modules) * p.module_thickness() / 2.0,
        ];
        for support in &p.supports {
            for (axis, extent) in half.iter_mut().enumerate() {
                *extent = extent.max(support.position[axis].abs() + support.half[axis]);
            }
        }
        half
    }

    /// Build the detector under `world` and return its manager.
    pub fn create(&self, tree: &Arc<GeoTree>, world: VolumeId) -> Result<DetectorManager> {
        let p = &self.parameters;
        let mut builder = ComponentBuilder::new(Arc::clone(tree));
        let mut manager = DetectorManager::new(
            "Emulsion",
            ElementIdHelper::Emulsion(Arc::clone(&self.helper)),
            Arc::clone(tree),
        );
        let design = Arc::new(DetectorDesign::new(
            "EmulsionFilm",
            p.film.half_x,
            p.film.half_y,
            p.film.thickness,
        )?);

        let envelope = ComponentFactory::Envelope {
            label: "Emulsion",
            half: self.envelope_half(),
        }
        .build(&mut builder, world, None, Placement::Fixed(p.placement()))?;
        for support in &p.supports {
            let [x, y, z] = support.position;
            ComponentFactory::Support(support.clone()).build(
                &mut builder,
                envelope,
                None,
                Placement::Fixed(transform::translation(x, y, z)),
            )?;
        }

        let module_kind = ComponentFactory::Assembly {
            label: "Module",
            half: [p.film.half_x, p.film.half_y, p.module_thickness() / 2.0],
        };
        let base_kind = ComponentFactory::Assembly {
            label: "Base",
            half: [p.film.half_x, p.film.half_y, p.base_thickness() / 2.0],
        };
        let film_kind = ComponentFactory::Slab {
            label: "Film",
            spec: p.film.clone(),
            sensitive: true,
        };
        let plastic_kind = ComponentFactory::Slab {
            label: "Plastic",
            spec: p.base.clone(),
            sensitive: false,
        };
        let plate_kind = ComponentFactory::Slab {
            label: "Plate",
            spec: p.plate.clone(),
            sensitive: false,
        };

        let mut cursor = EmulsionIdentifier::new(Arc::clone(&self.helper));
        for module in 0..p.modules {
            cursor.set_module(module);
            let placed = transform::translation(0.0, 0.0, p.module_z(module));
            let module_volume = if self.options.alignable {
                let (volume, alignable) = module_kind.build_alignable(&mut builder, envelope, module, placed)?;
                manager.add_alignable_transform(MODULE_LEVEL, cursor.module_id(), alignable, volume)?;
                volume
            } else {
                module_kind.build(&mut builder, envelope, Some(module), Placement::Fixed(placed))?
            };

            for base in 0..p.bases_per_module {
                cursor.set_base(base);
                let z = p.base_z(base);
                let placed = transform::translation(0.0, 0.0, z);
                let base_volume = if self.options.alignable {
                    let (volume, alignable) = base_kind.build_alignable(&mut builder, module_volume, base, placed)?;
                    manager.add_alignable_transform(BASE_LEVEL, cursor.base_id(), alignable, volume)?;
                    volume
                } else {
                    base_kind.build(&mut builder, module_volume, Some(base), Placement::Fixed(placed))?
                };
                let plate_z = z + (p.base_thickness() + p.plate.thickness) / 2.0;
                plate_kind.build(
                    &mut builder,
                    module_volume,
                    Some(base),
                    Placement::Fixed(transform::translation(0.0, 0.0, plate_z)),
                )?;
                plastic_kind.build(
                    &mut builder,
                    base_volume,
                    None,
                    Placement::Fixed(transform::identity()),
                )?;

                for film in 0..2 {
                    cursor.set_film(film);
                    let id = cursor.film_id();
                    let placed = transform::translation(0.0, 0.0, p.film_z(film));
                    let film_volume = if self.options.alignable {
                        let (volume, alignable) =
                            film_kind.build_alignable(&mut builder, base_volume, film, placed)?;
                        manager.add_alignable_transform(FILM_LEVEL, id, alignable, volume)?;
                        volume
                    } else {
                        film_kind.build(&mut builder, base_volume, Some(film), Placement::Fixed(placed))?
                    };
                    let element = DetectorElement::new(
                        id,
                        Arc::clone(&design),
                        film_volume,
                        Arc::clone(tree),
                        Arc::clone(manager.common()),
                    )?;
                    manager.add_element(element)?;
                }
            }
            debug!(target: "fgeo.geometry::emulsion", module, "module built");
        }

        if self.options.alignable {
            let layout = if self.options.dynamic_folders {
                EMULSION_DYNAMIC
            } else {
                EMULSION_STATIC
            };
            layout.register(&mut manager)?;
        }
        info!(
            target: "fgeo.geometry::emulsion",
            version = %p.switches.version_name,
            elements = manager.elements().count(),
            logical_volumes = builder.logical_volumes(),
            alignable = self.options.alignable,
            "emulsion detector built"
        );
        Ok(manager)
    }
}
