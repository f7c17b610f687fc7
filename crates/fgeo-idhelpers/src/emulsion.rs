//! Identifier helper for the emulsion detector.
//!
//! Hierarchy: `subdet / part / module / base / film`. Two levels are hashed:
//! bases (the z-ordered plates) and films (the sensitive elements, two per
//! base). Bases also carry previous/next neighbour tables along z that cross
//! module boundaries.

use std::collections::BTreeMap;

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

const HELPER: &str = "EmulsionId";

#[derive(Debug, Clone)]
struct Layout {
    tag: String,
    version: String,
    codecs: Vec<FieldCodec>,
    technology: DetectorTechnology,
    subdet_index: usize,
    part_index: usize,
    module_index: usize,
    base_index: usize,
    film_index: usize,
    module_range: MultiRange,
    base_range: MultiRange,
    film_range: MultiRange,
    bases: HashTable,
    films: HashTable,
    prev_z: Vec<IdentifierHash>,
    next_z: Vec<IdentifierHash>,
}

impl Layout {
    fn codec(&self, index: usize) -> &FieldCodec {
        &self.codecs[index]
    }

    fn expanded(&self, depth: usize, values: &[i32]) -> ExpandedIdentifier {
        let mut expanded = ExpandedIdentifier::from_slice(&vec![0; depth + 1]);
        expanded.set(self.subdet_index, self.technology.subdet);
        expanded.set(self.part_index, self.technology.part);
        for (index, value) in [self.module_index, self.base_index, self.film_index]
            .into_iter()
            .zip(values)
        {
            expanded.set(index, *value);
        }
        expanded
    }

    fn pack(&self, values: &[i32]) -> Identifier {
        let mut id = Identifier::ZERO;
        let prefix = [
            (self.subdet_index, self.technology.subdet),
            (self.part_index, self.technology.part),
        ];
        let levels = [self.module_index, self.base_index, self.film_index];
        let fields = prefix
            .into_iter()
            .chain(levels.into_iter().zip(values.iter().copied()));
        for (index, value) in fields {
            if !self.codec(index).pack(value, &mut id) {
                return Identifier::INVALID;
            }
        }
        id
    }
}

/// Packing, hashing and z-navigation for emulsion identifiers.
#[derive(Debug, Default)]
pub struct EmulsionId {
    config: IdHelperConfig,
    layout: Option<Layout>,
    metrics: IdHelperMetrics,
}

impl EmulsionId {
    pub fn new(config: IdHelperConfig) -> Self {
        Self {
            config,
            layout: None,
            metrics: IdHelperMetrics::default(),
        }
    }

    /// Build a helper and initialise it from `manager` in one step.
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

    pub const fn do_neighbours(&self) -> bool {
        self.config.do_neighbours
    }

    pub fn metrics(&self) -> &IdHelperMetrics {
        &self.metrics
    }

    pub fn range_check_failures(&self) -> u64 {
        self.metrics.range_check_failures()
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.is_some()
    }

    /// Version string of the dictionary the helper was built from.
    pub fn dictionary_version(&self) -> &str {
        self.layout.as_ref().map_or("", |layout| layout.version.as_str())
    }

    /// Resolve the field layout, build hash and neighbour tables.
    ///
    /// Does nothing when already initialised from a manager with the same tag.
    pub fn initialize_from_dictionary(&mut self, manager: &IdDictManager) -> Result<()> {
        if self
            .layout
            .as_ref()
            .is_some_and(|layout| layout.tag == manager.tag())
        {
            debug!(
                target: "fgeo.idhelpers::emulsion",
                tag = manager.tag(),
                "dictionary unchanged, skipping re-initialisation"
            );
            return Ok(());
        }

        let dictionary = manager
            .dictionary(faser::NEUTRINO_DICTIONARY)
            .inspect_err(|err| {
                error!(target: "fgeo.idhelpers::emulsion", error = %err, "no neutrino dictionary");
            })?;
        let layout = self.build_layout(manager.tag(), dictionary).inspect_err(|err| {
            error!(
                target: "fgeo.idhelpers::emulsion",
                error = %err,
                "emulsion identifier helper initialisation failed"
            );
        })?;

        info!(
            target: "fgeo.idhelpers::emulsion",
            version = %layout.version,
            bases = layout.bases.len(),
            films = layout.films.len(),
            neighbours = !layout.next_z.is_empty(),
            "initialised emulsion identifier helper"
        );
        self.layout = Some(layout);
        self.metrics.record_initialization();
        Ok(())
    }

    fn build_layout(&self, tag: &str, dictionary: &IdDictionary) -> Result<Layout> {
        let subdet_index = dictionary.require_field("subdet")?;
        let part_index = dictionary.require_field("part")?;
        let module_index = dictionary.require_field("module")?;
        let base_index = dictionary.require_field("base")?;
        let film_index = dictionary.require_field("film")?;

        let subdet = dictionary
            .label_value("subdet", "Neutrino")
            .unwrap_or(faser::NEUTRINO);
        let part = dictionary
            .label_value("part", "Emulsion")
            .unwrap_or(faser::EMULSION);
        let technology = DetectorTechnology::new(subdet, part);

        let mut prefix = ExpandedIdentifier::new();
        prefix.push(subdet);
        prefix.push(part);
        let module_range = dictionary.build_multi_range(&prefix, module_index);
        let base_range = dictionary.build_multi_range(&prefix, base_index);
        let film_range = dictionary.build_multi_range(&prefix, film_index);
        if film_range.is_empty() {
            return Err(GeoError::NoMatchingRegion {
                dictionary: dictionary.name().to_owned(),
                prefix: prefix.to_string(),
            });
        }
        debug!(
            target: "fgeo.idhelpers::emulsion",
            base_range = base_range.len(),
            film_range = film_range.len(),
            "built emulsion ranges"
        );

        let mut layout = Layout {
            tag: tag.to_owned(),
            version: dictionary.version().to_owned(),
            codecs: dictionary.codecs().to_vec(),
            technology,
            subdet_index,
            part_index,
            module_index,
            base_index,
            film_index,
            module_range,
            base_range,
            film_range,
            bases: HashTable::default(),
            films: HashTable::default(),
            prev_z: Vec::new(),
            next_z: Vec::new(),
        };

        let bases = HashTable::build("base", &layout.base_range, |e| {
            layout.pack(&[e[module_index], e[base_index]])
        })?;
        let films = HashTable::build("film", &layout.film_range, |e| {
            layout.pack(&[e[module_index], e[base_index], e[film_index]])
        })?;
        layout.bases = bases;
        layout.films = films;

        if self.config.do_neighbours {
            let (prev_z, next_z) = build_z_neighbours(&layout)?;
            layout.prev_z = prev_z;
            layout.next_z = next_z;
        }
        Ok(layout)
    }

    fn layout(&self) -> Result<&Layout> {
        self.layout
            .as_ref()
            .ok_or(GeoError::NotInitialized { helper: HELPER })
    }

    fn checked(&self, layout: &Layout, values: &[i32], checks: bool) -> CheckedId {
        let id = layout.pack(values);
        if !checks {
            return CheckedId { id, in_range: true };
        }
        let depth = match values.len() {
            1 => layout.module_index,
            2 => layout.base_index,
            _ => layout.film_index,
        };
        let range = match values.len() {
            1 => &layout.module_range,
            2 => &layout.base_range,
            _ => &layout.film_range,
        };
        let expanded = layout.expanded(depth, values);
        let in_range = id.is_valid() && range.contains_exact(&expanded);
        if !in_range {
            self.metrics.record_range_check_failure();
            error!(
                target: "fgeo.idhelpers::emulsion",
                expanded = %expanded,
                id = %id,
                "emulsion identifier outside the dictionary ranges"
            );
        }
        CheckedId { id, in_range }
    }

    fn build(&self, values: &[i32], checks: bool) -> CheckedId {
        match &self.layout {
            Some(layout) => self.checked(layout, values, checks),
            None => CheckedId {
                id: Identifier::INVALID,
                in_range: false,
            },
        }
    }

    pub fn module_id(&self, module: i32) -> Identifier {
        self.build(&[module], self.do_checks()).id
    }

    pub fn module_id_checked(&self, module: i32) -> CheckedId {
        self.build(&[module], true)
    }

    pub fn base_id(&self, module: i32, base: i32) -> Identifier {
        self.build(&[module, base], self.do_checks()).id
    }

    pub fn base_id_checked(&self, module: i32, base: i32) -> CheckedId {
        self.build(&[module, base], true)
    }

    /// Leaf identifier. With checks enabled an out-of-range triple is logged
    /// and counted but still packed; a value that does not fit its field's
    /// bit width yields `Identifier::INVALID`.
    pub fn film_id(&self, module: i32, base: i32, film: i32) -> Identifier {
        self.build(&[module, base, film], self.do_checks()).id
    }

    pub fn film_id_checked(&self, module: i32, base: i32, film: i32) -> CheckedId {
        self.build(&[module, base, film], true)
    }

    /// Clear every field below `base`.
    pub fn base_id_from_film(&self, film_id: Identifier) -> Identifier {
        self.strip_below(film_id, |layout| layout.base_index)
    }

    /// Clear every field below `module`.
    pub fn module_id_from_base(&self, base_id: Identifier) -> Identifier {
        self.strip_below(base_id, |layout| layout.module_index)
    }

    fn strip_below(&self, id: Identifier, level: impl Fn(&Layout) -> usize) -> Identifier {
        let Some(layout) = &self.layout else {
            return Identifier::INVALID;
        };
        if !id.is_valid() {
            return id;
        }
        let lowest = layout.codec(level(layout)).shift();
        let mask = u64::MAX.checked_shl(lowest).unwrap_or(0);
        Identifier::from_raw(id.raw() & mask)
    }

    /// Lowest bit of the `base` field.
    pub fn base_bit(&self) -> Option<u32> {
        self.layout
            .as_ref()
            .map(|layout| layout.codec(layout.base_index).shift())
    }

    fn field(&self, id: Identifier, level: impl Fn(&Layout) -> usize) -> i32 {
        self.layout
            .as_ref()
            .map_or(-1, |layout| layout.codec(level(layout)).unpack(id))
    }

    pub fn module(&self, id: Identifier) -> i32 {
        self.field(id, |layout| layout.module_index)
    }

    pub fn base(&self, id: Identifier) -> i32 {
        self.field(id, |layout| layout.base_index)
    }

    pub fn film(&self, id: Identifier) -> i32 {
        self.field(id, |layout| layout.film_index)
    }

    pub fn is_emulsion(&self, id: Identifier) -> bool {
        let Some(layout) = &self.layout else {
            return false;
        };
        id.is_valid()
            && layout.codec(layout.subdet_index).unpack(id) == layout.technology.subdet
            && layout.codec(layout.part_index).unpack(id) == layout.technology.part
    }

    fn lookup(&self, table: impl Fn(&Layout) -> &HashTable, id: Identifier) -> Option<IdentifierHash> {
        let hash = self.layout.as_ref().and_then(|layout| table(layout).hash(id));
        if hash.is_none() {
            self.metrics.record_hash_miss();
        }
        hash
    }

    pub fn base_hash(&self, base_id: Identifier) -> Option<IdentifierHash> {
        self.lookup(|layout| &layout.bases, base_id)
    }

    pub fn film_hash(&self, film_id: Identifier) -> Option<IdentifierHash> {
        self.lookup(|layout| &layout.films, film_id)
    }

    /// Unchecked table access; [`Identifier::INVALID`] past the end.
    pub fn base_id_from_hash(&self, hash: IdentifierHash) -> Identifier {
        self.layout
            .as_ref()
            .map_or(Identifier::INVALID, |layout| layout.bases.id(hash))
    }

    pub fn film_id_from_hash(&self, hash: IdentifierHash) -> Identifier {
        self.layout
            .as_ref()
            .map_or(Identifier::INVALID, |layout| layout.films.id(hash))
    }

    pub fn base_hash_max(&self) -> u32 {
        self.layout.as_ref().map_or(0, |layout| layout.bases.max())
    }

    pub fn film_hash_max(&self) -> u32 {
        self.layout.as_ref().map_or(0, |layout| layout.films.max())
    }

    pub fn base_ids(&self) -> &[Identifier] {
        self.layout
            .as_ref()
            .map(|layout| layout.bases.ids())
            .unwrap_or_default()
    }

    pub fn film_ids(&self) -> &[Identifier] {
        self.layout
            .as_ref()
            .map(|layout| layout.films.ids())
            .unwrap_or_default()
    }

    pub fn base_context(&self) -> IdContext {
        IdContext::new(0, self.layout.as_ref().map_or(3, |layout| layout.base_index))
    }

    pub fn film_context(&self) -> IdContext {
        IdContext::new(0, self.layout.as_ref().map_or(4, |layout| layout.film_index))
    }

    /// Identifier for `hash` at the level where `context` ends.
    ///
    /// Hashed levels index their table; the module level falls back to the
    /// position in its range's enumeration order.
    pub fn get_id(&self, hash: IdentifierHash, context: &IdContext) -> Result<Identifier> {
        let layout = self.layout()?;
        if context.begin != 0 {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        }
        if context.end == layout.base_index {
            layout.bases.get_id(hash)
        } else if context.end == layout.film_index {
            layout.films.get_id(hash)
        } else if context.end == layout.module_index {
            let expanded = expanded_at_position(&layout.module_range, u64::from(hash.get()))
                .ok_or(GeoError::HashOutOfRange {
                    hash: hash.get(),
                    max: layout.module_range.cardinality() as u32,
                })?;
            Ok(layout.pack(&[expanded[layout.module_index]]))
        } else {
            Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            })
        }
    }

    /// Hash of `id` at the level where `context` ends.
    pub fn get_hash(&self, id: Identifier, context: &IdContext) -> Result<IdentifierHash> {
        let layout = self.layout()?;
        if context.begin != 0 {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        }
        let found = if context.end == layout.base_index {
            self.base_hash(id)
        } else if context.end == layout.film_index {
            self.film_hash(id)
        } else if context.end == layout.module_index {
            let expanded = layout.expanded(layout.module_index, &[self.module(id)]);
            cardinality_position(&layout.module_range, &expanded)
                .and_then(|position| IdentifierHash::from_index(position as usize))
        } else {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        };
        found.ok_or_else(|| {
            GeoError::invalid_id(id.raw(), "not a valid emulsion identifier at this level")
        })
    }

    /// Field values of `id` from `context.begin` to `context.end`.
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

    /// Preceding base along z, crossing module boundaries.
    pub fn prev_in_z(&self, base_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.layout
            .as_ref()
            .and_then(|layout| layout.prev_z.get(base_hash.index()))
            .and_then(|hash| hash.valid())
    }

    /// Following base along z, crossing module boundaries.
    pub fn next_in_z(&self, base_hash: IdentifierHash) -> Option<IdentifierHash> {
        self.layout
            .as_ref()
            .and_then(|layout| layout.next_z.get(base_hash.index()))
            .and_then(|hash| hash.valid())
    }

    /// Film on the other side of the same base.
    pub fn get_other_side(&self, film_hash: IdentifierHash) -> Option<IdentifierHash> {
        let layout = self.layout.as_ref()?;
        let id = layout.films.id(film_hash);
        if !id.is_valid() {
            return None;
        }
        let codec = layout.codec(layout.film_index);
        let other = if codec.unpack(id) == 0 { 1 } else { 0 };
        let mut flipped = id;
        codec.reset(&mut flipped);
        if !codec.pack(other, &mut flipped) {
            return None;
        }
        layout.films.hash(flipped)
    }

    /// Round-trip every base and film hash through unpack and repack.
    pub fn test_base_packing(&self) -> Result<()> {
        let layout = self.layout()?;
        let base_context = self.base_context();
        layout.bases.verify(|id| {
            let expanded = self.get_expanded_id(id, &base_context)?;
            Ok(self.base_id(expanded[layout.module_index], expanded[layout.base_index]))
        })?;
        let film_context = self.film_context();
        layout.films.verify(|id| {
            let expanded = self.get_expanded_id(id, &film_context)?;
            Ok(self.film_id(
                expanded[layout.module_index],
                expanded[layout.base_index],
                expanded[layout.film_index],
            ))
        })?;
        debug!(
            target: "fgeo.idhelpers::emulsion",
            bases = layout.bases.len(),
            films = layout.films.len(),
            "emulsion packing self-test passed"
        );
        Ok(())
    }
}

/// Previous/next base along z for every base hash.
///
/// Within a module the step goes to the adjacent declared base of that
/// module, across every region declaring it. At a module edge the link goes
/// to the last (first) base of the adjacent declared module. The first and
/// last bases overall get the invalid sentinel.
fn build_z_neighbours(layout: &Layout) -> Result<(Vec<IdentifierHash>, Vec<IdentifierHash>)> {
    let size = layout.bases.len();
    let mut prev_z = vec![IdentifierHash::INVALID; size];
    let mut next_z = vec![IdentifierHash::INVALID; size];
    let modules = layout.base_range.field_values(layout.module_index);
    let bases_of: BTreeMap<i32, Vec<i32>> = modules
        .iter()
        .map(|&module| (module, module_bases(layout, module)))
        .collect();

    for (hash, id) in layout.bases.iter() {
        let module = layout.codec(layout.module_index).unpack(id);
        let base = layout.codec(layout.base_index).unpack(id);
        let expanded = layout.expanded(layout.base_index, &[module, base]);
        let (Some(position), Some(bases)) = (modules.binary_search(&module).ok(), bases_of.get(&module))
        else {
            return Err(GeoError::NeighbourResolution {
                direction: "any",
                id: expanded.to_string(),
                detail: "base not covered by any range".to_owned(),
            });
        };
        let Ok(slot) = bases.binary_search(&base) else {
            return Err(GeoError::NeighbourResolution {
                direction: "any",
                id: expanded.to_string(),
                detail: format!("base {base} is not declared for module {module}"),
            });
        };

        let prev = match slot.checked_sub(1) {
            Some(s) => Some((module, bases[s])),
            None => match position.checked_sub(1) {
                Some(p) => {
                    let adjacent = modules[p];
                    let last = boundary_base(&bases_of, adjacent, "previous", &expanded, true)?;
                    Some((adjacent, last))
                }
                None => None,
            },
        };
        let next = match bases.get(slot + 1) {
            Some(&following) => Some((module, following)),
            None => match modules.get(position + 1) {
                Some(&adjacent) => {
                    let first = boundary_base(&bases_of, adjacent, "next", &expanded, false)?;
                    Some((adjacent, first))
                }
                None => None,
            },
        };

        prev_z[hash.index()] = resolve(layout, prev, "previous", &expanded)?;
        next_z[hash.index()] = resolve(layout, next, "next", &expanded)?;
    }
    Ok((prev_z, next_z))
}

/// Sorted base values declared for `module` over all regions.
fn module_bases(layout: &Layout, module: i32) -> Vec<i32> {
    let scope = layout.expanded(layout.module_index, &[module]);
    layout
        .base_range
        .restricted_to(&scope)
        .field_values(layout.base_index)
}

fn boundary_base(
    bases_of: &BTreeMap<i32, Vec<i32>>,
    module: i32,
    direction: &'static str,
    from: &ExpandedIdentifier,
    maximum: bool,
) -> Result<i32> {
    let bases = bases_of.get(&module).map(Vec::as_slice).unwrap_or_default();
    let value = if maximum { bases.last() } else { bases.first() };
    value.copied().ok_or_else(|| {
        error!(
            target: "fgeo.idhelpers::emulsion",
            from = %from,
            module,
            direction,
            "adjacent module declares no base boundary"
        );
        GeoError::NeighbourResolution {
            direction,
            id: from.to_string(),
            detail: format!("module {module} declares no boundary base"),
        }
    })
}

fn resolve(
    layout: &Layout,
    target: Option<(i32, i32)>,
    direction: &'static str,
    from: &ExpandedIdentifier,
) -> Result<IdentifierHash> {
    let Some((module, base)) = target else {
        return Ok(IdentifierHash::INVALID);
    };
    let id = layout.pack(&[module, base]);
    layout
        .bases
        .hash(id)
        .ok_or_else(|| GeoError::NeighbourResolution {
            direction,
            id: from.to_string(),
            detail: format!("neighbour ({module}, {base}) has no base hash"),
        })
}
