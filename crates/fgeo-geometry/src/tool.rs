//! Detector tool: wires dictionaries, parameter tables, identifier helpers
//! and detector factories into one geometry context.

use std::sync::Arc;

use fgeo_error::Result;
use fgeo_geomodel::{GeoTree, InMemoryRdb, LogicalVolume, RdbAccess, Shape, VolumeId};
use fgeo_idhelpers::{EmulsionId, FaserSctId};
use fgeo_readout::{ConditionsStore, DetectorManager};
use fgeo_types::IdDictManager;
use tracing::{info, warn};

use crate::config::{DetectorToolConfig, GeoConfig};
use crate::emulsion::{EmulsionDetectorFactory, FactoryOptions};
use crate::parameters::{EmulsionGeoParameters, SctGeoParameters};
use crate::sct::SctDetectorFactory;

const WORLD_HALF: [f64; 3] = [5.0e3, 5.0e3, 1.0e4];

/// Everything one geometry build produced.
#[derive(Debug)]
pub struct GeoModelContext {
    pub tree: Arc<GeoTree>,
    pub world: VolumeId,
    pub dictionaries: Arc<IdDictManager>,
    pub emulsion_helper: Option<Arc<EmulsionId>>,
    pub sct_helper: Option<Arc<FaserSctId>>,
    pub emulsion: Option<DetectorManager>,
    pub sct: Option<DetectorManager>,
}

impl GeoModelContext {
    pub fn managers(&self) -> impl Iterator<Item = &DetectorManager> {
        self.emulsion.iter().chain(self.sct.iter())
    }

    /// Align every manager from `conditions`; true when anything moved.
    pub fn align(&self, conditions: &dyn ConditionsStore) -> Result<bool> {
        let mut changed = false;
        for manager in self.managers() {
            changed |= manager.align(conditions, None)?;
        }
        Ok(changed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectorTool {
    config: GeoConfig,
}

impl DetectorTool {
    pub fn new(config: GeoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    /// Load the configured data and build every enabled detector.
    pub fn create(&self) -> Result<GeoModelContext> {
        let dictionaries = match &self.config.dictionary_path {
            Some(path) => IdDictManager::load(path)?,
            None => IdDictManager::faser_default()?,
        };
        let rdb = match &self.config.parameters_path {
            Some(path) => InMemoryRdb::load(path)?,
            None => InMemoryRdb::faser_default()?,
        };
        self.create_with(dictionaries, &rdb)
    }

    /// Build from already loaded dictionaries and tables.
    pub fn create_with(&self, dictionaries: IdDictManager, rdb: &dyn RdbAccess) -> Result<GeoModelContext> {
        let config = &self.config;
        let tree = GeoTree::new();
        let [x, y, z] = WORLD_HALF;
        let world = tree.add_world(LogicalVolume::new("World", Shape::cuboid(x, y, z), "Air"))?;

        let mut context = GeoModelContext {
            tree: Arc::clone(&tree),
            world,
            dictionaries: Arc::new(dictionaries),
            emulsion_helper: None,
            sct_helper: None,
            emulsion: None,
            sct: None,
        };

        if config.emulsion.enabled {
            let helper = Arc::new(EmulsionId::from_dictionary(config.id_helper, &context.dictionaries)?);
            let tag = version_tag(&config.emulsion, helper.dictionary_version());
            let parameters = EmulsionGeoParameters::read(rdb, &tag)?;
            check_versions("Emulsion", &parameters.switches.version_name, helper.dictionary_version());
            let factory = EmulsionDetectorFactory::new(
                parameters,
                Arc::clone(&helper),
                self.options(&config.emulsion),
            );
            context.emulsion = Some(factory.create(&tree, world)?);
            context.emulsion_helper = Some(helper);
        }

        if config.sct.enabled {
            let helper = Arc::new(FaserSctId::from_dictionary(config.id_helper, &context.dictionaries)?);
            let tag = version_tag(&config.sct, helper.dictionary_version());
            let parameters = SctGeoParameters::read(rdb, &tag)?;
            check_versions("SCT", &parameters.switches.version_name, helper.dictionary_version());
            let factory = SctDetectorFactory::new(parameters, Arc::clone(&helper), self.options(&config.sct));
            context.sct = Some(factory.create(&tree, world)?);
            context.sct_helper = Some(helper);
        }

        info!(
            target: "fgeo.geometry::tool",
            volumes = tree.volume_count(),
            alignables = tree.alignable_count(),
            detectors = context.managers().count(),
            "geometry built"
        );
        Ok(context)
    }

    fn options(&self, detector: &DetectorToolConfig) -> FactoryOptions {
        FactoryOptions {
            alignable: detector.alignable,
            dynamic_folders: self.config.alignment.use_dynamic_alignment_folders,
        }
    }
}

fn version_tag(detector: &DetectorToolConfig, dictionary_version: &str) -> String {
    detector
        .version_tag
        .clone()
        .unwrap_or_else(|| dictionary_version.to_owned())
}

fn check_versions(detector: &str, geometry: &str, dictionary: &str) {
    if geometry != dictionary {
        warn!(
            target: "fgeo.geometry::tool",
            detector,
            geometry,
            dictionary,
            "geometry and identifier dictionary versions differ"
        );
    }
}
