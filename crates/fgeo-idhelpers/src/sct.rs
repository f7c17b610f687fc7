//! Identifier helper for the silicon strip tracker.
//!
//! Hierarchy: `subdet / part / station / layer / phi_module / eta_module /
//! side / strip`. Modules (side stripped) and wafers (one side of a module,
//! the sensitive element) are hashed. Strips are addressed through their
//! position in the strip range.

use fgeo_error::{GeoError, Result};
use fgeo_types::faser::{self, DetectorTechnology};
use fgeo_types::{
    ExpandedIdentifier, FieldCodec, IdContext, IdDictManager, IdDictionary, Identifier,
    IdentifierHash, MultiRange,
};
use tracing::{debug, error, info};

use crate::metrics::IdHelperMetrics;
use crate::table::{HashTable, cardinality_position, expanded_at_position};
use crate::{CheckedId, IdHelperConfig};

const HELPER: &str = "FaserSctId";

const FIELDS: [&str; 6] = ["station", "layer", "phi_module", "eta_module", "side", "strip"];
const STATION: usize = 0;
const LAYER: usize = 1;
const PHI: usize = 2;
const ETA: usize = 3;
const SIDE: usize = 4;
const STRIP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Phi,
    Eta,
}

#[derive(Debug, Clone, Default)]
struct Neighbours {
    prev_phi: Vec<IdentifierHash>,
    next_phi: Vec<IdentifierHash>,
    prev_eta: Vec<IdentifierHash>,
    next_eta: Vec<IdentifierHash>,
}

#[derive(Debug, Clone)]
struct Layout {
    tag: String,
    version: String,
    codecs: Vec<FieldCodec>,
    technology: DetectorTechnology,
    prefix: [usize; 2],
    /// Dictionary index of each hierarchy level, station first.
    levels: [usize; 6],
    /// Range truncated after each hierarchy level.
    ranges: Vec<MultiRange>,
    modules: HashTable,
    wafers: HashTable,
    neighbours: Neighbours,
}

impl Layout {
    fn codec(&self, level: usize) -> &FieldCodec {
        &self.codecs[self.levels[level]]
    }

    fn pack(&self, values: &[i32]) -> Identifier {
        let mut id = Identifier::ZERO;
        let prefix = [
            (self.prefix[0], self.technology.subdet),
            (self.prefix[1], self.technology.part),
        ];
        let fields = prefix
            .into_iter()
            .chain(self.levels.into_iter().zip(values.iter().copied()));
        for (index, value) in fields {
            if !self.codecs[index].pack(value, &mut id) {
                return Identifier::INVALID;
            }
        }
        id
    }

    fn expanded(&self, values: &[i32]) -> ExpandedIdentifier {
        let depth = self.levels[values.len() - 1];
        let mut expanded = ExpandedIdentifier::from_slice(&vec![0; depth + 1]);
        expanded.set(self.prefix[0], self.technology.subdet);
        expanded.set(self.prefix[1], self.technology.part);
        for (level, value) in values.iter().enumerate() {
            expanded.set(self.levels[level], *value);
        }
        expanded
    }

    fn values(&self, id: Identifier, depth: usize) -> Vec<i32> {
        (0..=depth).map(|level| self.codec(level).unpack(id)).collect()
    }

    /// Hierarchy level whose dictionary index is `index`.
    fn level_of(&self, index: usize) -> Option<usize> {
        self.levels.iter().position(|candidate| *candidate == index)
    }
}

/// Packing, hashing and in-layer navigation for SCT identifiers.
#[derive(Debug, Default)]
pub struct FaserSctId {
    config: IdHelperConfig,
    layout: Option<Layout>,
    metrics: IdHelperMetrics,
}

impl FaserSctId {
    pub fn new(config: IdHelperConfig) -> Self {
        Self {
            config,
            layout: None,
            metrics: IdHelperMetrics::default(),
        }
    }

    pub fn from_dictionary(config: IdHelperConfig, manager: &IdDictManager) -> Result<Self> {
        let mut helper = Self::new(config);
        helper.initialize_from_dictionary(manager)?;
        Ok(helper)
    }

    pub const fn do_checks(&self) -> bool {
        self.config.do_checks
    }

    pub fn set_do_checks(&mut self, on: bool) {
        self.config.do_checks = on;
    }

    pub fn metrics(&self) -> &IdHelperMetrics {
        &self.metrics
    }

    pub fn range_check_failures(&self) -> u64 {
        self.metrics.range_check_failures()
    }

    pub fn dictionary_version(&self) -> &str {
        self.layout.as_ref().map_or("", |layout| layout.version.as_str())
    }

    pub fn initialize_from_dictionary(&mut self, manager: &IdDictManager) -> Result<()> {
        if self
            .layout
            .as_ref()
            .is_some_and(|layout| layout.tag == manager.tag())
        {
            debug!(target: "fgeo.idhelpers::sct", tag = manager.tag(), "dictionary unchanged");
            return Ok(());
        }
        let layout = manager
            .dictionary(faser::TRACKER_DICTIONARY)
            .and_then(|dictionary| self.build_layout(manager.tag(), dictionary))
            .inspect_err(|err| {
                error!(
                    target: "fgeo.idhelpers::sct",
                    error = %err,
                    "SCT identifier helper initialisation failed"
                );
            })?;
        info!(
            target: "fgeo.idhelpers::sct",
            version = %layout.version,
            modules = layout.modules.len(),
            wafers = layout.wafers.len(),
            "initialised SCT identifier helper"
        );
        self.layout = Some(layout);
        self.metrics.record_initialization();
        Ok(())
    }

    fn build_layout(&self, tag: &str, dictionary: &IdDictionary) -> Result<Layout> {
        let prefix = [
            dictionary.require_field("subdet")?,
            dictionary.require_field("part")?,
        ];
        let mut levels = [0_usize; 6];
        for (slot, name) in levels.iter_mut().zip(FIELDS) {
            *slot = dictionary.require_field(name)?;
        }
        let technology = DetectorTechnology::new(
            dictionary
                .label_value("subdet", "Tracker")
                .unwrap_or(faser::TRACKER),
            dictionary.label_value("part", "SCT").unwrap_or(faser::SCT),
        );

        let region = ExpandedIdentifier::from_slice(&[technology.subdet, technology.part]);
        let ranges: Vec<MultiRange> = levels
            .iter()
            .map(|index| dictionary.build_multi_range(&region, *index))
            .collect();
        if ranges[SIDE].is_empty() {
            return Err(GeoError::NoMatchingRegion {
                dictionary: dictionary.name().to_owned(),
                prefix: region.to_string(),
            });
        }

        let mut layout = Layout {
            tag: tag.to_owned(),
            version: dictionary.version().to_owned(),
            codecs: dictionary.codecs().to_vec(),
            technology,
            prefix,
            levels,
            ranges,
            modules: HashTable::default(),
            wafers: HashTable::default(),
            neighbours: Neighbours::default(),
        };
        let modules = HashTable::build("module", &layout.ranges[ETA], |e| {
            layout.pack(&levels[..=ETA].iter().map(|i| e[*i]).collect::<Vec<_>>())
        })?;
        let wafers = HashTable::build("wafer", &layout.ranges[SIDE], |e| {
            layout.pack(&levels[..=SIDE].iter().map(|i| e[*i]).collect::<Vec<_>>())
        })?;
        layout.modules = modules;
        layout.wafers = wafers;
        if self.config.do_neighbours {
            layout.neighbours = build_neighbours(&layout)?;
        }
        Ok(layout)
    }

    fn layout(&self) -> Result<&Layout> {
        self.layout
            .as_ref()
            .ok_or(GeoError::NotInitialized { helper: HELPER })
    }

    fn build(&self, values: &[i32], checks: bool) -> CheckedId {
        let Some(layout) = &self.layout else {
            return CheckedId {
                id: Identifier::INVALID,
                in_range: false,
            };
        };
        let id = layout.pack(values);
        if !checks {
            return CheckedId { id, in_range: true };
        }
        let expanded = layout.expanded(values);
        let in_range = id.is_valid() && layout.ranges[values.len() - 1].contains_exact(&expanded);
        if !in_range {
            self.metrics.record_range_check_failure();
            error!(
                target: "fgeo.idhelpers::sct",
                expanded = %expanded,
                id = %id,
                "SCT identifier outside the dictionary ranges"
            );
        }
        CheckedId { id, in_range }
    }

    pub fn station_id(&self, station: i32) -> Identifier {
        self.build(&[station], self.do_checks()).id
    }

    pub fn station_id_checked(&self, station: i32) -> CheckedId {
        self.build(&[station], true)
    }

    pub fn layer_id(&self, station: i32, layer: i32) -> Identifier {
        self.build(&[station, layer], self.do_checks()).id
    }

    pub fn layer_id_checked(&self, station: i32, layer: i32) -> CheckedId {
        self.build(&[station, layer], true)
    }

    pub fn module_id(&self, station: i32, layer: i32, phi: i32, eta: i32) -> Identifier {
        self.build(&[station, layer, phi, eta], self.do_checks()).id
    }

    pub fn module_id_checked(&self, station: i32, layer: i32, phi: i32, eta: i32) -> CheckedId {
        self.build(&[station, layer, phi, eta], true)
    }

    pub fn wafer_id(&self, station: i32, layer: i32, phi: i32, eta: i32, side: i32) -> Identifier {
        self.build(&[station, layer, phi, eta, side], self.do_checks()).id
    }

    pub fn wafer_id_checked(
        &self,
        station: i32,
        layer: i32,
        phi: i32,
        eta: i32,
        side: i32,
    ) -> CheckedId {
        self.build(&[station, layer, phi, eta, side], true)
    }

    pub fn strip_id(
        &self,
        station: i32,
        layer: i32,
        phi: i32,
        eta: i32,
        side: i32,
        strip: i32,
    ) -> Identifier {
        self.build(&[station, layer, phi, eta, side, strip], self.do_checks())
            .id
    }

    pub fn strip_id_checked(
        &self,
        station: i32,
        layer: i32,
        phi: i32,
        eta: i32,
        side: i32,
        strip: i32,
    ) -> CheckedId {
        self.build(&[station, layer, phi, eta, side, strip], true)
    }

    /// Strip identifier from a wafer identifier and a strip number.
    pub fn strip_id_from_wafer(&self, wafer_id: Identifier, strip: i32) -> Identifier {
        let Some(layout) = &self.layout else {
            return Identifier::INVALID;
        };
        let mut id = self.strip_below(wafer_id, SIDE);
        if id.is_valid() && layout.codec(STRIP).pack(strip, &mut id) {
            id
        } else {
            Identifier::INVALID
        }
    }

    pub fn wafer_id_from_strip(&self, strip_id: Identifier) -> Identifier {
        self.strip_below(strip_id, SIDE)
    }

    pub fn module_id_from_wafer(&self, wafer_id: Identifier) -> Identifier {
        self.strip_below(wafer_id, ETA)
    }

    fn strip_below(&self, id: Identifier, level: usize) -> Identifier {
        let Some(layout) = &self.layout else {
            return Identifier::INVALID;
        };
        if !id.is_valid() {
            return id;
        }
        let mask = u64::MAX.checked_shl(layout.codec(level).shift()).unwrap_or(0);
        Identifier::from_raw(id.raw() & mask)
    }

    fn field(&self, id: Identifier, level: usize) -> i32 {
        self.layout
            .as_ref()
            .map_or(-1, |layout| layout.codec(level).unpack(id))
    }

    pub fn station(&self, id: Identifier) -> i32 {
        self.field(id, STATION)
    }

    pub fn layer(&self, id: Identifier) -> i32 {
        self.field(id, LAYER)
    }

    pub fn phi_module(&self, id: Identifier) -> i32 {
        self.field(id, PHI)
    }

    pub fn eta_module(&self, id: Identifier) -> i32 {
        self.field(id, ETA)
    }

    pub fn side(&self, id: Identifier) -> i32 {
        self.field(id, SIDE)
    }

    pub fn strip(&self, id: Identifier) -> i32 {
        self.field(id, STRIP)
    }

    pub fn is_sct(&self, id: Identifier) -> bool {
        let Some(layout) = &self.layout else {
            return false;
        };
        id.is_valid()
            && layout.codecs[layout.prefix[0]].unpack(id) == layout.technology.subdet
            && layout.codecs[layout.prefix[1]].unpack(id) == layout.technology.part
    }

    pub fn wafer_hash(&self, wafer_id: Identifier) -> Option<IdentifierHash> {
        let hash = self
            .layout
            .as_ref()
            .and_then(|layout| layout.wafers.hash(wafer_id));
        if hash.is_none() {
            self.metrics.record_hash_miss();
        }
        hash
    }

    pub fn module_hash(&self, module_id: Identifier) -> Option<IdentifierHash> {
        let hash = self
            .layout
            .as_ref()
            .and_then(|layout| layout.modules.hash(module_id));
        if hash.is_none() {
            self.metrics.record_hash_miss();
        }
        hash
    }

    pub fn wafer_id_from_hash(&self, hash: IdentifierHash) -> Identifier {
        self.layout
            .as_ref()
            .map_or(Identifier::INVALID, |layout| layout.wafers.id(hash))
    }

    pub fn module_id_from_hash(&self, hash: IdentifierHash) -> Identifier {
        self.layout
            .as_ref()
            .map_or(Identifier::INVALID, |layout| layout.modules.id(hash))
    }

    pub fn wafer_hash_max(&self) -> u32 {
        self.layout.as_ref().map_or(0, |layout| layout.wafers.max())
    }

    pub fn module_hash_max(&self) -> u32 {
        self.layout.as_ref().map_or(0, |layout| layout.modules.max())
    }

    pub fn strip_hash_max(&self) -> u64 {
        self.layout
            .as_ref()
            .map_or(0, |layout| layout.ranges[STRIP].cardinality())
    }

    pub fn wafer_ids(&self) -> &[Identifier] {
        self.layout
            .as_ref()
            .map(|layout| layout.wafers.ids())
            .unwrap_or_default()
    }

    pub fn wafer_context(&self) -> IdContext {
        IdContext::new(0, self.layout.as_ref().map_or(6, |layout| layout.levels[SIDE]))
    }

    pub fn module_context(&self) -> IdContext {
        IdContext::new(0, self.layout.as_ref().map_or(5, |layout| layout.levels[ETA]))
    }

    pub fn strip_context(&self) -> IdContext {
        IdContext::new(0, self.layout.as_ref().map_or(7, |layout| layout.levels[STRIP]))
    }

    fn context_level(&self, context: &IdContext) -> Result<(&Layout, usize)> {
        let layout = self.layout()?;
        if context.begin != 0 {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        }
        let level = layout
            .level_of(context.end)
            .ok_or(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            })?;
        Ok((layout, level))
    }

    pub fn get_id(&self, hash: IdentifierHash, context: &IdContext) -> Result<Identifier> {
        let (layout, level) = self.context_level(context)?;
        match level {
            SIDE => layout.wafers.get_id(hash),
            ETA => layout.modules.get_id(hash),
            _ => {
                let range = &layout.ranges[level];
                let expanded = expanded_at_position(range, u64::from(hash.get())).ok_or(
                    GeoError::HashOutOfRange {
                        hash: hash.get(),
                        max: u32::try_from(range.cardinality()).unwrap_or(u32::MAX),
                    },
                )?;
                let values: Vec<i32> = layout.levels[..=level]
                    .iter()
                    .map(|index| expanded[*index])
                    .collect();
                Ok(layout.pack(&values))
            }
        }
    }

    pub fn get_hash(&self, id: Identifier, context: &IdContext) -> Result<IdentifierHash> {
        let (layout, level) = self.context_level(context)?;
        let found = match level {
            SIDE => self.wafer_hash(id),
            ETA => self.module_hash(id),
            _ => {
                let expanded = layout.expanded(&layout.values(id, level));
                cardinality_position(&layout.ranges[level], &expanded)
                    .and_then(|position| u32::try_from(position).ok())
                    .map(IdentifierHash::new)
                    .and_then(IdentifierHash::valid)
            }
        };
        found.ok_or_else(|| GeoError::invalid_id(id.raw(), "not a valid SCT identifier at this level"))
    }

    pub fn get_expanded_id(&self, id: Identifier, context: &IdContext) -> Result<ExpandedIdentifier> {
        let layout = self.layout()?;
        if context.is_empty() || context.end >= layout.codecs.len() {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        }
        Ok(layout.codecs[context.begin..=context.end]
            .iter()
            .map(|codec| codec.unpack(id))
            .collect())
    }

    fn neighbour(
        &self,
        hash: IdentifierHash,
        table: impl Fn(&Neighbours) -> &[IdentifierHash],
    ) -> Option<IdentifierHash> {
        self.layout
            .as_ref()
            .and_then(|layout| table(&layout.neighbours).get(hash.index()))
            .and_then(|hash| hash.valid())
    }

    pub fn prev_in_phi(&self, wafer_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.neighbour(wafer_hash, |n| n.prev_phi.as_slice())
    }

    pub fn next_in_phi(&self, wafer_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.neighbour(wafer_hash, |n| n.next_phi.as_slice())
    }

    pub fn prev_in_eta(&self, wafer_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.neighbour(wafer_hash, |n| n.prev_eta.as_slice())
    }

    pub fn next_in_eta(&self, wafer_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.neighbour(wafer_hash, |n| n.next_eta.as_slice())
    }

    /// Wafer on the other side of the same module.
    pub fn get_other_side(&self, wafer_hash: IdentifierHash) -> Option<IdentifierHash> {
        let layout = self.layout.as_ref()?;
        let id = layout.wafers.id(wafer_hash);
        if !id.is_valid() {
            return None;
        }
        let codec = layout.codec(SIDE);
        let mut flipped = id;
        codec.reset(&mut flipped);
        let other = if codec.unpack(id) == 0 { 1 } else { 0 };
        if !codec.pack(other, &mut flipped) {
            return None;
        }
        layout.wafers.hash(flipped)
    }

    /// Round-trip every wafer and module hash through unpack and repack.
    pub fn test_wafer_packing(&self) -> Result<()> {
        let layout = self.layout()?;
        layout.wafers.verify(|id| {
            let v = layout.values(id, SIDE);
            Ok(self.wafer_id(v[STATION], v[LAYER], v[PHI], v[ETA], v[SIDE]))
        })?;
        layout.modules.verify(|id| {
            let v = layout.values(id, ETA);
            Ok(self.module_id(v[STATION], v[LAYER], v[PHI], v[ETA]))
        })?;
        Ok(())
    }
}

fn build_neighbours(layout: &Layout) -> Result<Neighbours> {
    let size = layout.wafers.len();
    let mut out = Neighbours {
        prev_phi: vec![IdentifierHash::INVALID; size],
        next_phi: vec![IdentifierHash::INVALID; size],
        prev_eta: vec![IdentifierHash::INVALID; size],
        next_eta: vec![IdentifierHash::INVALID; size],
    };
    for (hash, id) in layout.wafers.iter() {
        let values = layout.values(id, SIDE);
        let expanded = layout.expanded(&values);
        let range = layout.ranges[SIDE].find(&expanded).ok_or_else(|| {
            GeoError::NeighbourResolution {
                direction: "any",
                id: expanded.to_string(),
                detail: "wafer not covered by any range".to_owned(),
            }
        })?;
        let slot = hash.index();
        for axis in [Axis::Phi, Axis::Eta] {
            let level = if axis == Axis::Phi { PHI } else { ETA };
            let field = range.field(layout.levels[level]).ok_or_else(|| {
                GeoError::internal(format!("range for {expanded} lacks level {level}"))
            })?;
            let prev = field
                .get_previous(values[level])
                .map(|value| step(layout, &values, level, value))
                .transpose()?;
            let next = field
                .get_next(values[level])
                .map(|value| step(layout, &values, level, value))
                .transpose()?;
            let (prev_table, next_table) = match axis {
                Axis::Phi => (&mut out.prev_phi, &mut out.next_phi),
                Axis::Eta => (&mut out.prev_eta, &mut out.next_eta),
            };
            prev_table[slot] = prev.unwrap_or(IdentifierHash::INVALID);
            next_table[slot] = next.unwrap_or(IdentifierHash::INVALID);
        }
    }
    Ok(out)
}

fn step(layout: &Layout, values: &[i32], level: usize, value: i32) -> Result<IdentifierHash> {
    let mut moved = values.to_vec();
    moved[level] = value;
    let id = layout.pack(&moved);
    layout
        .wafers
        .hash(id)
        .ok_or_else(|| GeoError::NeighbourResolution {
            direction: if level == PHI { "phi" } else { "eta" },
            id: layout.expanded(values).to_string(),
            detail: format!("neighbour {} has no wafer hash", layout.expanded(&moved)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> FaserSctId {
        let manager = IdDictManager::faser_default().expect("built-in dictionaries parse");
        FaserSctId::from_dictionary(IdHelperConfig::default(), &manager)
            .expect("helper initialises")
    }

    #[test]
    fn cardinalities() {
        let helper = helper();
        assert_eq!(helper.module_hash_max(), 4 * 3 * 4 * 2);
        assert_eq!(helper.wafer_hash_max(), 4 * 3 * 4 * 2 * 2);
        assert_eq!(helper.strip_hash_max(), 4 * 3 * 4 * 2 * 2 * 768);
    }

    #[test]
    fn decoding_and_stripping() {
        let helper = helper();
        let strip = helper.strip_id(2, 1, 3, -1, 1, 700);
        assert_eq!(
            (
                helper.station(strip),
                helper.layer(strip),
                helper.phi_module(strip),
                helper.eta_module(strip),
                helper.side(strip),
                helper.strip(strip)
            ),
            (2, 1, 3, -1, 1, 700)
        );
        let wafer = helper.wafer_id_from_strip(strip);
        assert_eq!(wafer, helper.wafer_id(2, 1, 3, -1, 1));
        assert_eq!(helper.module_id_from_wafer(wafer), helper.module_id(2, 1, 3, -1));
        assert_eq!(helper.strip_id_from_wafer(wafer, 700), strip);
        assert!(helper.is_sct(wafer));
    }

    #[test]
    fn eta_zero_is_not_encodable() {
        let helper = helper();
        let checked = helper.wafer_id_checked(0, 0, 0, 0, 0);
        assert_eq!(checked.id, Identifier::INVALID);
        assert!(!checked.in_range);
        assert_eq!(helper.range_check_failures(), 1);
    }

    #[test]
    fn strip_hash_fallback_round_trips() {
        let helper = helper();
        let context = helper.strip_context();
        let strip = helper.strip_id(1, 2, 0, 1, 0, 17);
        let hash = helper.get_hash(strip, &context).expect("valid strip");
        assert_eq!(helper.get_id(hash, &context).expect("in range"), strip);
    }

    #[test]
    fn phi_and_eta_neighbours_stay_in_layer() {
        let helper = helper();
        let hash = |phi, eta| {
            helper
                .wafer_hash(helper.wafer_id(1, 1, phi, eta, 0))
                .expect("valid wafer")
        };
        assert_eq!(helper.next_in_phi(hash(0, -1)), Some(hash(1, -1)));
        assert_eq!(helper.prev_in_phi(hash(1, -1)), Some(hash(0, -1)));
        assert_eq!(helper.prev_in_phi(hash(0, -1)), None);
        assert_eq!(helper.next_in_phi(hash(3, 1)), None);
        assert_eq!(helper.next_in_eta(hash(2, -1)), Some(hash(2, 1)));
        assert_eq!(helper.prev_in_eta(hash(2, -1)), None);
    }

    #[test]
    fn other_side_and_self_test() {
        let helper = helper();
        for raw in 0..helper.wafer_hash_max() {
            let hash = IdentifierHash::new(raw);
            let other = helper.get_other_side(hash).expect("paired wafer");
            assert_eq!(helper.get_other_side(other), Some(hash));
        }
        helper.test_wafer_packing().expect("packing self-test");
    }
}
