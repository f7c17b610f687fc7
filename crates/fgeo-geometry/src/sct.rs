//! SCT detector factory: stations of layers, each layer a grid of
//! double-sided modules.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use fgeo_error::Result;
use fgeo_geomodel::transform::{self, Transform3D};
use fgeo_geomodel::{GeoTree, Placement, VolumeId};
use fgeo_idhelpers::{FaserSctId, SctIdentifier};
use fgeo_readout::{DetectorDesign, DetectorElement, DetectorManager, ElementIdHelper, HitAxis};
use tracing::{debug, info};

use crate::component::{ComponentBuilder, ComponentFactory};
use crate::emulsion::FactoryOptions;
use crate::folders::{SCT_DYNAMIC, SCT_STATIC};
use crate::parameters::SctGeoParameters;

pub const WAFER_LEVEL: usize = 0;
pub const MODULE_LEVEL: usize = 1;
pub const LAYER_LEVEL: usize = 2;
pub const STATION_LEVEL: usize = 3;

#[derive(Debug)]
pub struct SctDetectorFactory {
    parameters: SctGeoParameters,
    helper: Arc<FaserSctId>,
    options: FactoryOptions,
}

impl SctDetectorFactory {
    pub fn new(parameters: SctGeoParameters, helper: Arc<FaserSctId>, options: FactoryOptions) -> Self {
        Self {
            parameters,
            helper,
            options,
        }
    }

    pub fn parameters(&self) -> &SctGeoParameters {
        &self.parameters
    }

    /// Wafer design: strips measure phi, the hit frame has depth along x.
    pub fn design(&self) -> Result<DetectorDesign> {
        let p = &self.parameters;
        DetectorDesign::new("SctWafer", p.wafer_width / 2.0, p.wafer_length / 2.0, p.wafer_thickness)?
            .with_hit_axes(HitAxis::Y, HitAxis::Z, HitAxis::X)?
            .with_strips(p.strip_pitch, p.strips)
    }

    /// Module placement in its layer. Module x (phi) runs along global y.
    fn module_placement(&self, phi: i32, eta: i32) -> Transform3D {
        let p = &self.parameters;
        transform::translation(p.eta_x(eta), p.phi_y(phi), 0.0) * transform::rotation_xyz(0.0, 0.0, FRAC_PI_2)
    }

    pub fn create(&self, tree: &Arc<GeoTree>, world: VolumeId) -> Result<DetectorManager> {
        let p = &self.parameters;
        let mut builder = ComponentBuilder::new(Arc::clone(tree));
        let mut manager = DetectorManager::new(
            "SCT",
            ElementIdHelper::Sct(Arc::clone(&self.helper)),
            Arc::clone(tree),
        );
        let design = Arc::new(self.design()?);
        let hit_to_reco = design.reco_to_hit_transform().inverse();

        let half_x = f64::from(p.eta_modules) * p.eta_pitch / 2.0;
        let half_y = f64::from(p.phi_modules) * p.phi_pitch / 2.0;
        let layer_half_z = p.module_half_thickness() + 0.1;
        let station_half_z = f64::from(p.layers - 1).mul_add(p.layer_pitch / 2.0, layer_half_z);
        let tracker_half_z = f64::from(p.stations).mul_add(p.station_pitch, 2.0 * station_half_z) / 2.0;

        let envelope = ComponentFactory::Envelope {
            label: "Tracker",
            half: [half_x, half_y, tracker_half_z],
        }
        .build(&mut builder, world, None, Placement::Fixed(transform::identity()))?;
        let station_kind = ComponentFactory::Assembly {
            label: "Station",
            half: [half_x, half_y, station_half_z],
        };
        let layer_kind = ComponentFactory::Assembly {
            label: "Layer",
            half: [half_x, half_y, layer_half_z],
        };
        let module_kind = ComponentFactory::Assembly {
            label: "Module",
            half: [p.wafer_width / 2.0, p.wafer_length / 2.0, p.module_half_thickness()],
        };
        let wafer_kind = ComponentFactory::Wafer {
            half: [p.wafer_thickness / 2.0, p.wafer_width / 2.0, p.wafer_length / 2.0],
            material: p.material.clone(),
        };

        let mut cursor = SctIdentifier::new(Arc::clone(&self.helper));
        for station in 0..p.stations {
            cursor.set_station(station);
            let station_volume = self.place(
                &mut builder,
                &mut manager,
                &station_kind,
                (envelope, station),
                transform::translation(0.0, 0.0, p.station_z(station)),
                STATION_LEVEL,
                cursor.station_id(),
            )?;
            for layer in 0..p.layers {
                cursor.set_layer(layer);
                let layer_volume = self.place(
                    &mut builder,
                    &mut manager,
                    &layer_kind,
                    (station_volume, layer),
                    transform::translation(0.0, 0.0, p.layer_z(layer)),
                    LAYER_LEVEL,
                    cursor.layer_id(),
                )?;
                for phi in 0..p.phi_modules {
                    cursor.set_phi_module(phi);
                    for eta in p.eta_values() {
                        cursor.set_eta_module(eta);
                        let module_volume = self.place(
                            &mut builder,
                            &mut manager,
                            &module_kind,
                            (layer_volume, phi * p.eta_modules + eta.max(0)),
                            self.module_placement(phi, eta),
                            MODULE_LEVEL,
                            cursor.module_id(),
                        )?;
                        for side in 0..2 {
                            cursor.set_side(side);
                            let id = cursor.wafer_id();
                            let placed = transform::translation(0.0, 0.0, p.side_z(side))
                                * transform::rotation_xyz(0.0, 0.0, p.side_stereo(side))
                                * hit_to_reco;
                            let wafer_volume = self.place(
                                &mut builder,
                                &mut manager,
                                &wafer_kind,
                                (module_volume, side),
                                placed,
                                WAFER_LEVEL,
                                id,
                            )?;
                            let element = DetectorElement::new(
                                id,
                                Arc::clone(&design),
                                wafer_volume,
                                Arc::clone(tree),
                                Arc::clone(manager.common()),
                            )?;
                            manager.add_element(element)?;
                        }
                    }
                }
            }
            debug!(target: "fgeo.geometry::sct", station, "station built");
        }

        if self.options.alignable {
            let layout = if self.options.dynamic_folders {
                SCT_DYNAMIC
            } else {
                SCT_STATIC
            };
            layout.register(&mut manager)?;
        }
        info!(
            target: "fgeo.geometry::sct",
            version = %p.switches.version_name,
            elements = manager.elements().count(),
            logical_volumes = builder.logical_volumes(),
            alignable = self.options.alignable,
            "sct detector built"
        );
        Ok(manager)
    }

    /// Place `kind` as child `index` of `parent`, behind a registered
    /// alignable transform when the build is alignable.
    #[allow(clippy::too_many_arguments)]
    fn place(
        &self,
        builder: &mut ComponentBuilder,
        manager: &mut DetectorManager,
        kind: &ComponentFactory,
        (parent, index): (VolumeId, i32),
        default: Transform3D,
        level: usize,
        id: fgeo_types::Identifier,
    ) -> Result<VolumeId> {
        if self.options.alignable {
            let (volume, alignable) = kind.build_alignable(builder, parent, index, default)?;
            manager.add_alignable_transform(level, id, alignable, volume)?;
            Ok(volume)
        } else {
            kind.build(builder, parent, Some(index), Placement::Fixed(default))
        }
    }
}
