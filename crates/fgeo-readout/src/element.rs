//! Detector elements: one per sensitive sensor.
//!
//! An element owns no geometry of its own. Its frame is the absolute
//! transform of a full physical volume in the shared tree, optionally
//! redirected through the alignment store installed in [`CommonItems`].
//! Derived quantities are cached in one [`CacheCell`] and recomputed lazily
//! by the first reader after [`DetectorElement::invalidate`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use fgeo_error::{GeoError, Result};
use fgeo_geomodel::{AlignmentStore, GeoTree, Point3, Transform3D, Vector3, VolumeId};
use fgeo_idhelpers::{EmulsionId, FaserSctId};
use fgeo_types::{Identifier, IdentifierHash};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use crate::cache::CacheCell;
use crate::design::DetectorDesign;

/// The identifier helper of the subdetector an element belongs to.
#[derive(Debug, Clone)]
pub enum ElementIdHelper {
    Emulsion(Arc<EmulsionId>),
    Sct(Arc<FaserSctId>),
}

impl ElementIdHelper {
    pub const fn detector_name(&self) -> &'static str {
        match self {
            Self::Emulsion(_) => "Emulsion",
            Self::Sct(_) => "SCT",
        }
    }

    /// Hash of an element-level identifier (film or wafer).
    pub fn element_hash(&self, id: Identifier) -> Option<IdentifierHash> {
        match self {
            Self::Emulsion(helper) => helper.film_hash(id),
            Self::Sct(helper) => helper.wafer_hash(id),
        }
    }

    pub fn element_id(&self, hash: IdentifierHash) -> Option<Identifier> {
        let max = self.element_hash_max();
        if hash.get() >= max {
            return None;
        }
        Some(match self {
            Self::Emulsion(helper) => helper.film_id_from_hash(hash),
            Self::Sct(helper) => helper.wafer_id_from_hash(hash),
        })
    }

    pub fn element_hash_max(&self) -> u32 {
        match self {
            Self::Emulsion(helper) => helper.film_hash_max(),
            Self::Sct(helper) => helper.wafer_hash_max(),
        }
    }

    /// Whether `id` carries this subdetector's `subdet`/`part` prefix.
    pub fn owns(&self, id: Identifier) -> bool {
        match self {
            Self::Emulsion(helper) => helper.is_emulsion(id),
            Self::Sct(helper) => helper.is_sct(id),
        }
    }

    /// Coordinates of `id` for logs and dumps.
    pub fn describe(&self, id: Identifier) -> String {
        if !id.is_valid() {
            return id.to_string();
        }
        match self {
            Self::Emulsion(helper) => format!(
                "module {} base {} film {}",
                helper.module(id),
                helper.base(id),
                helper.film(id)
            ),
            Self::Sct(helper) => format!(
                "station {} layer {} phi {} eta {} side {}",
                helper.station(id),
                helper.layer(id),
                helper.phi_module(id),
                helper.eta_module(id),
                helper.side(id)
            ),
        }
    }
}

/// State shared by every element of one detector manager.
#[derive(Debug)]
pub struct CommonItems {
    helper: ElementIdHelper,
    store: RwLock<Option<Arc<AlignmentStore>>>,
}

impl CommonItems {
    pub fn new(helper: ElementIdHelper) -> Arc<Self> {
        Arc::new(Self {
            helper,
            store: RwLock::new(None),
        })
    }

    pub fn helper(&self) -> &ElementIdHelper {
        &self.helper
    }

    /// Alignment store element transforms are redirected through, if any.
    pub fn alignment_store(&self) -> Option<Arc<AlignmentStore>> {
        self.store.read().clone()
    }

    /// Install or remove the alignment store. Callers invalidate elements.
    pub fn set_alignment_store(&self, store: Option<Arc<AlignmentStore>>) {
        *self.store.write() = store;
    }
}

/// Axis-aligned bounding box in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    fn around(points: impl IntoIterator<Item = Point3>) -> Self {
        let mut bounds = Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        };
        for point in points {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(point[axis]);
                bounds.max[axis] = bounds.max[axis].max(point[axis]);
            }
        }
        bounds
    }
}

/// Rough orientation of the element's local axes in the global frame,
/// determined on the first cache fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Orientation {
    /// The depth axis points along global +z rather than -z.
    pub depth_along_z: bool,
    /// Phi, eta or depth directions would need swapping to match the
    /// global convention. Always false for FASER sensors.
    pub swap_phi: bool,
    pub swap_eta: bool,
    pub swap_depth: bool,
}

#[derive(Debug, Clone, Copy)]
struct ElementGeometry {
    transform_hit: Transform3D,
    transform: Transform3D,
    center: Point3,
    normal: Vector3,
    phi_axis: Vector3,
    eta_axis: Vector3,
    bounds: Bounds,
}

pub struct DetectorElement {
    id: Identifier,
    hash: IdentifierHash,
    design: Arc<DetectorDesign>,
    common: Arc<CommonItems>,
    tree: Arc<GeoTree>,
    volume: VolumeId,
    reco_to_hit: Transform3D,
    orientation: OnceLock<Orientation>,
    cache: CacheCell<ElementGeometry>,
}

impl fmt::Debug for DetectorElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorElement")
            .field("id", &self.id)
            .field("hash", &self.hash)
            .field("design", &self.design.name())
            .field("volume", &self.volume)
            .field("cache_valid", &self.cache.is_valid())
            .finish_non_exhaustive()
    }
}

impl DetectorElement {
    /// Create the element for `id`, placed by full physical `volume`.
    pub fn new(
        id: Identifier,
        design: Arc<DetectorDesign>,
        volume: VolumeId,
        tree: Arc<GeoTree>,
        common: Arc<CommonItems>,
    ) -> Result<Self> {
        if !id.is_valid() {
            return Err(GeoError::InvalidElement {
                id: id.raw(),
                detail: "invalid identifier".to_owned(),
            });
        }
        let hash = common.helper().element_hash(id).ok_or_else(|| GeoError::InvalidElement {
            id: id.raw(),
            detail: format!(
                "no {} element hash for {}",
                common.helper().detector_name(),
                common.helper().describe(id)
            ),
        })?;
        if !tree.is_full(volume)? {
            return Err(GeoError::InvalidElement {
                id: id.raw(),
                detail: format!("volume {} is not a full physical volume", volume.0),
            });
        }
        trace!(target: "fgeo.readout::element", %id, hash = hash.get(), "element created");
        Ok(Self {
            id,
            hash,
            reco_to_hit: design.reco_to_hit_transform(),
            design,
            common,
            tree,
            volume,
            orientation: OnceLock::new(),
            cache: CacheCell::new(),
        })
    }

    pub const fn identify(&self) -> Identifier {
        self.id
    }

    pub const fn identify_hash(&self) -> IdentifierHash {
        self.hash
    }

    pub fn design(&self) -> &Arc<DetectorDesign> {
        &self.design
    }

    pub fn common(&self) -> &Arc<CommonItems> {
        &self.common
    }

    pub const fn volume(&self) -> VolumeId {
        self.volume
    }

    /// Mark cached geometry stale. Recomputation happens on the next read.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn is_cache_valid(&self) -> bool {
        self.cache.is_valid()
    }

    /// Completed cache fills since creation.
    pub fn recompute_count(&self) -> u64 {
        self.cache.recompute_count()
    }

    /// Fill the cache now if stale.
    pub fn update_cache(&self) -> Result<()> {
        self.geometry().map(|_| ())
    }

    fn geometry(&self) -> Result<ElementGeometry> {
        self.cache.get_or_compute(|| self.compute_geometry())
    }

    fn compute_geometry(&self) -> Result<ElementGeometry> {
        let store = self.common.alignment_store();
        let transform_hit = self.tree.absolute_transform(self.volume, store.as_deref())?;
        let transform = transform_hit * self.reco_to_hit;

        let center = transform * Point3::origin();
        let phi_axis = transform * Vector3::x();
        let eta_axis = transform * Vector3::y();
        let normal = transform * Vector3::z();

        self.orientation.get_or_init(|| {
            let orientation = Orientation {
                depth_along_z: normal.z >= 0.0,
                swap_phi: false,
                swap_eta: false,
                swap_depth: false,
            };
            debug!(target: "fgeo.readout::element", id = %self.id, ?orientation, "element orientation");
            orientation
        });

        let bounds = Bounds::around(self.design.corners().iter().map(|c| transform * c));
        Ok(ElementGeometry {
            transform_hit,
            transform,
            center,
            normal,
            phi_axis,
            eta_axis,
            bounds,
        })
    }

    /// Orientation recorded on the first cache fill.
    pub fn orientation(&self) -> Result<Orientation> {
        self.update_cache()?;
        self.orientation
            .get()
            .copied()
            .ok_or_else(|| GeoError::internal("orientation missing after cache fill"))
    }

    /// Local (hit frame) to global, alignment included.
    pub fn transform_hit(&self) -> Result<Transform3D> {
        Ok(self.geometry()?.transform_hit)
    }

    /// Local (reconstruction frame) to global, alignment included.
    pub fn transform(&self) -> Result<Transform3D> {
        Ok(self.geometry()?.transform)
    }

    /// Nominal hit-frame transform, ignoring alignment.
    pub fn def_transform_hit(&self) -> Result<Transform3D> {
        let store = self.common.alignment_store();
        self.tree
            .default_absolute_transform(self.volume, store.as_deref())
    }

    pub fn def_transform(&self) -> Result<Transform3D> {
        Ok(self.def_transform_hit()? * self.reco_to_hit)
    }

    pub const fn reco_to_hit_transform(&self) -> Transform3D {
        self.reco_to_hit
    }

    pub fn center(&self) -> Result<Point3> {
        Ok(self.geometry()?.center)
    }

    /// Unit depth axis in the global frame.
    pub fn normal(&self) -> Result<Vector3> {
        Ok(self.geometry()?.normal)
    }

    pub fn phi_axis(&self) -> Result<Vector3> {
        Ok(self.geometry()?.phi_axis)
    }

    pub fn eta_axis(&self) -> Result<Vector3> {
        Ok(self.geometry()?.eta_axis)
    }

    pub fn bounds(&self) -> Result<Bounds> {
        Ok(self.geometry()?.bounds)
    }

    pub fn x_min(&self) -> Result<f64> {
        Ok(self.bounds()?.min[0])
    }

    pub fn x_max(&self) -> Result<f64> {
        Ok(self.bounds()?.max[0])
    }

    pub fn y_min(&self) -> Result<f64> {
        Ok(self.bounds()?.min[1])
    }

    pub fn y_max(&self) -> Result<f64> {
        Ok(self.bounds()?.max[1])
    }

    pub fn z_min(&self) -> Result<f64> {
        Ok(self.bounds()?.min[2])
    }

    pub fn z_max(&self) -> Result<f64> {
        Ok(self.bounds()?.max[2])
    }

    /// Reconstruction-local point to global.
    pub fn global_position(&self, local: &Point3) -> Result<Point3> {
        Ok(self.transform()? * local)
    }

    /// Hit-local point to global.
    pub fn global_position_hit(&self, hit: &Point3) -> Result<Point3> {
        Ok(self.transform_hit()? * hit)
    }

    /// Global point to reconstruction-local.
    pub fn local_position(&self, global: &Point3) -> Result<Point3> {
        Ok(self.transform()?.inverse_transform_point(global))
    }

    /// Hit-local point to reconstruction-local.
    pub fn hit_local_to_local(&self, hit: &Point3) -> Point3 {
        self.reco_to_hit.inverse_transform_point(hit)
    }

    /// Readout identifier for a reconstruction-local position on the face.
    ///
    /// Strip identifiers for SCT wafers; the film itself for emulsion.
    /// `None` off the sensor or outside the active strip region.
    pub fn identifier_of_position(&self, local: &Point3) -> Option<Identifier> {
        if !self.design.contains(local) {
            return None;
        }
        match self.common.helper() {
            ElementIdHelper::Emulsion(_) => Some(self.id),
            ElementIdHelper::Sct(helper) => {
                let strip = self.design.strip_of(local.x)?;
                let id = helper.strip_id_from_wafer(self.id, i32::try_from(strip).ok()?);
                id.is_valid().then_some(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fgeo_geomodel::transform;
    use fgeo_geomodel::{Child, LogicalVolume, Placement, Shape};
    use fgeo_idhelpers::IdHelperConfig;
    use fgeo_types::IdDictManager;

    use super::*;
    use crate::design::HitAxis;

    struct Fixture {
        tree: Arc<GeoTree>,
        helper: Arc<FaserSctId>,
        common: Arc<CommonItems>,
        volume: VolumeId,
        alignable: fgeo_geomodel::AlignableId,
        design: Arc<DetectorDesign>,
    }

    fn fixture() -> Fixture {
        let manager = IdDictManager::faser_default().expect("dictionaries");
        let helper =
            Arc::new(FaserSctId::from_dictionary(IdHelperConfig::default(), &manager).expect("sct"));
        let common = CommonItems::new(ElementIdHelper::Sct(Arc::clone(&helper)));
        let tree = GeoTree::new();
        let world = tree
            .add_world(LogicalVolume::new("World", Shape::cuboid(1e3, 1e3, 1e4), "Air"))
            .expect("world");
        let alignable = tree.add_alignable_transform(transform::translation(0.0, 0.0, 500.0));
        let volume = tree
            .add_child(
                world,
                Child::new(
                    LogicalVolume::new("Wafer", Shape::cuboid(0.15, 32.0, 64.0), "Silicon"),
                    "Wafer#0",
                    Placement::Alignable(alignable),
                )
                .full(),
            )
            .expect("wafer");
        let design = Arc::new(
            DetectorDesign::new("wafer", 32.0, 64.0, 0.285)
                .and_then(|d| d.with_hit_axes(HitAxis::Y, HitAxis::Z, HitAxis::X))
                .and_then(|d| d.with_strips(0.08, 768))
                .expect("design"),
        );
        Fixture {
            tree,
            helper,
            common,
            volume,
            alignable,
            design,
        }
    }

    #[test]
    fn rejects_invalid_identifiers() {
        let f = fixture();
        assert!(matches!(
            DetectorElement::new(
                Identifier::INVALID,
                Arc::clone(&f.design),
                f.volume,
                Arc::clone(&f.tree),
                Arc::clone(&f.common)
            ),
            Err(GeoError::InvalidElement { .. })
        ));
        // Layer 3 fits in the layer field but is not declared.
        let undeclared = f.helper.wafer_id(0, 3, 0, 1, 0);
        assert!(undeclared.is_valid());
        assert!(
            DetectorElement::new(undeclared, f.design, f.volume, f.tree, f.common).is_err(),
            "case=undeclared_wafer_has_no_hash"
        );
    }

    #[test]
    fn cache_tracks_alignment_changes() {
        let f = fixture();
        let id = f.helper.wafer_id(0, 0, 0, 1, 0);
        let element = DetectorElement::new(
            id,
            Arc::clone(&f.design),
            f.volume,
            Arc::clone(&f.tree),
            Arc::clone(&f.common),
        )
        .expect("element");

        let before = element.center().expect("center");
        assert!((before - Point3::new(0.0, 0.0, 500.0)).norm() < 1e-12);
        assert_eq!(element.recompute_count(), 1);

        element.invalidate();
        f.tree
            .set_delta(f.alignable, transform::translation(0.0, 0.0, 1.5))
            .expect("delta");
        let after = element.center().expect("center");
        assert!((after - Point3::new(0.0, 0.0, 501.5)).norm() < 1e-12, "case=fresh_after_invalidate");
        let again = element.center().expect("center");
        assert_eq!(after, again);
        assert_eq!(element.recompute_count(), 2, "case=second_read_cached");

        let def = element.def_transform().expect("default") * Point3::origin();
        assert!((def - Point3::new(0.0, 0.0, 500.0)).norm() < 1e-12);
    }

    #[test]
    fn frames_and_strip_identifiers() {
        let f = fixture();
        let id = f.helper.wafer_id(1, 2, 3, -1, 1);
        let element =
            DetectorElement::new(id, Arc::clone(&f.design), f.volume, f.tree, f.common)
                .expect("element");
        // Hit axes (y, z, x) carry (phi, eta, depth).
        let normal = element.normal().expect("normal");
        assert!((normal - Vector3::x()).norm() < 1e-12);
        let phi = element.phi_axis().expect("phi");
        assert!((phi - Vector3::y()).norm() < 1e-12);

        let local = Point3::new(1.0, 2.0, 0.0);
        let global = element.global_position(&local).expect("global");
        let back = element.local_position(&global).expect("local");
        assert!((back - local).norm() < 1e-12);

        let hit = element.reco_to_hit_transform() * local;
        assert!((element.hit_local_to_local(&hit) - local).norm() < 1e-12);
        let via_hit = element.global_position_hit(&hit).expect("hit global");
        assert!((via_hit - global).norm() < 1e-12);

        let strip_id = element
            .identifier_of_position(&Point3::new(0.04, 0.0, 0.0))
            .expect("on sensor");
        assert_eq!(f.helper.strip(strip_id), 384);
        assert_eq!(f.helper.wafer_id_from_strip(strip_id), id);
        assert!(element.identifier_of_position(&Point3::new(40.0, 0.0, 0.0)).is_none());

        let bounds = element.bounds().expect("bounds");
        assert!((bounds.max[1] - 32.0).abs() < 1e-9);
        assert!((bounds.min[2] - 436.0).abs() < 1e-9);
        assert!(element.x_max().expect("x") - element.x_min().expect("x") < 1e-9);
        assert!(element.orientation().expect("orientation").depth_along_z);
    }
}
