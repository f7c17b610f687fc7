//! Identifier dictionaries.
//!
//! A dictionary declares the ordered fields of one subsystem's identifiers
//! and the regions (ranges of legal values) that make up its identifier
//! space. Building a dictionary validates the regions and fixes the bit
//! layout: fields are packed most-significant-first in declaration order,
//! each with the narrowest width able to hold every declared value unless
//! the field pins an explicit width. Pinned fields use offset zero so that
//! their encoding does not depend on which regions a dictionary declares.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use fgeo_error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{FieldCodec, bits_for};
use crate::range::{MultiRange, Range, RangeField};
use crate::{ExpandedIdentifier, IdContext, Identifier};

/// Widest layout a dictionary may use; the low bit stays clear so that
/// [`Identifier::INVALID`] never collides with a packed value.
pub const MAX_LAYOUT_BITS: u32 = 63;

/// Declaration of one identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Pinned width for fields shared between dictionaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
    /// Symbolic names for values, e.g. `Neutrino = 1`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, i32>,
}

/// Legal values of one field within a region entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrySpec {
    Value { value: i32 },
    Span { min: i32, max: i32 },
    Values { values: Vec<i32> },
    Label { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub field: String,
    #[serde(flatten)]
    pub spec: EntrySpec,
}

/// One region: entries for a leading run of the dictionary's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDef {
    #[serde(default)]
    pub group: String,
    pub entries: Vec<RegionEntry>,
}

/// Unvalidated dictionary as read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryDef {
    pub name: String,
    pub version: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub regions: Vec<RegionDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct DictionarySet {
    #[serde(default)]
    tag: Option<String>,
    dictionaries: Vec<DictionaryDef>,
}

/// Validated dictionary with its bit layout.
#[derive(Debug, Clone)]
pub struct IdDictionary {
    name: String,
    version: String,
    fields: Vec<FieldDef>,
    regions: Vec<(String, Range)>,
    codecs: Vec<FieldCodec>,
}

impl IdDictionary {
    /// Validate `def` and compute the field codecs.
    pub fn build(def: DictionaryDef) -> Result<Self> {
        let DictionaryDef {
            name,
            version,
            fields,
            regions: region_defs,
        } = def;

        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(GeoError::dictionary(
                    &name,
                    format!("field '{}' declared twice", field.name),
                ));
            }
        }

        let mut regions = Vec::with_capacity(region_defs.len());
        for (region_index, region) in region_defs.iter().enumerate() {
            let range = resolve_region(&name, &fields, region_index, region)?;
            regions.push((region.group.clone(), range));
        }

        let codecs = compute_codecs(&name, &fields, &regions)?;

        debug!(
            target: "fgeo.types::dictionary",
            dictionary = %name,
            version = %version,
            fields = fields.len(),
            regions = regions.len(),
            "built identifier dictionary"
        );

        Ok(Self {
            name,
            version,
            fields,
            regions,
            codecs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn codecs(&self) -> &[FieldCodec] {
        &self.codecs
    }

    pub fn codec(&self, index: usize) -> Option<&FieldCodec> {
        self.codecs.get(index)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Like [`field_index`](Self::field_index) but reports the missing field.
    pub fn require_field(&self, name: &str) -> Result<usize> {
        self.field_index(name)
            .ok_or_else(|| GeoError::FieldNotFound {
                dictionary: self.name.clone(),
                field: name.to_owned(),
            })
    }

    /// Value of a symbolic label of `field`.
    pub fn label_value(&self, field: &str, label: &str) -> Option<i32> {
        let index = self.field_index(field)?;
        self.fields[index].labels.get(label).copied()
    }

    /// Regions with their group names.
    pub fn regions(&self) -> impl Iterator<Item = (&str, &Range)> {
        self.regions
            .iter()
            .map(|(group, range)| (group.as_str(), range))
    }

    /// Total number of bits used by the layout.
    pub fn total_bits(&self) -> u32 {
        self.codecs.iter().map(FieldCodec::bits).sum()
    }

    /// Union of the regions that match `prefix`, truncated after `last_field`.
    ///
    /// The prefix fields are pinned to the prefix values. Regions that stop
    /// before `last_field` are skipped.
    pub fn build_multi_range(&self, prefix: &ExpandedIdentifier, last_field: usize) -> MultiRange {
        let mut out = MultiRange::new();
        for (_, range) in &self.regions {
            if range.len() <= last_field || range.len() < prefix.len() || (!prefix.is_empty() && !range.contains(prefix)) {
                continue;
            }
            let mut truncated = range.truncated(last_field + 1);
            for (i, value) in prefix.as_slice().iter().enumerate() {
                truncated = truncated.with_field(i, RangeField::single(*value));
            }
            out.add(truncated);
        }
        out
    }

    /// Pack an expanded identifier starting at field 0.
    ///
    /// Returns [`Identifier::INVALID`] when any value is not encodable or
    /// `expanded` has more fields than the dictionary.
    pub fn pack(&self, expanded: &ExpandedIdentifier) -> Identifier {
        if expanded.len() > self.codecs.len() {
            return Identifier::INVALID;
        }
        let mut id = Identifier::ZERO;
        for (codec, value) in self.codecs.iter().zip(expanded.as_slice()) {
            if !codec.pack(*value, &mut id) {
                return Identifier::INVALID;
            }
        }
        id
    }

    /// Unpack the fields `context.begin..=context.end` of `id`.
    pub fn unpack(&self, id: Identifier, context: IdContext) -> Result<ExpandedIdentifier> {
        if context.end >= self.codecs.len() || context.is_empty() {
            return Err(GeoError::UnsupportedContext {
                begin: context.begin,
                end: context.end,
            });
        }
        Ok(self.codecs[context.begin..=context.end]
            .iter()
            .map(|codec| codec.unpack(id))
            .collect())
    }
}

fn resolve_region(
    dictionary: &str,
    fields: &[FieldDef],
    region_index: usize,
    region: &RegionDef,
) -> Result<Range> {
    if region.entries.len() > fields.len() {
        return Err(GeoError::dictionary(
            dictionary,
            format!("region {region_index} has more entries than fields"),
        ));
    }
    let mut range = Range::default();
    for (position, entry) in region.entries.iter().enumerate() {
        let field = &fields[position];
        if entry.field != field.name {
            return Err(GeoError::dictionary(
                dictionary,
                format!(
                    "region {region_index} entry {position} is '{}', expected '{}'",
                    entry.field, field.name
                ),
            ));
        }
        let resolved = match &entry.spec {
            EntrySpec::Value { value } => RangeField::single(*value),
            EntrySpec::Span { min, max } => {
                if min > max {
                    return Err(GeoError::dictionary(
                        dictionary,
                        format!("region {region_index} field '{}' has min > max", field.name),
                    ));
                }
                RangeField::bounded(*min, *max)
            }
            EntrySpec::Values { values } => {
                if values.is_empty() {
                    return Err(GeoError::dictionary(
                        dictionary,
                        format!("region {region_index} field '{}' lists no values", field.name),
                    ));
                }
                RangeField::enumerated(values.iter().copied())
            }
            EntrySpec::Label { label } => {
                let value = field.labels.get(label).copied().ok_or_else(|| {
                    GeoError::dictionary(
                        dictionary,
                        format!("unknown label '{label}' for field '{}'", field.name),
                    )
                })?;
                RangeField::single(value)
            }
        };
        range.add_field(resolved);
    }
    Ok(range)
}

fn compute_codecs(
    dictionary: &str,
    fields: &[FieldDef],
    regions: &[(String, Range)],
) -> Result<Vec<FieldCodec>> {
    let mut codecs = Vec::with_capacity(fields.len());
    let mut used = 0_u32;

    for (index, field) in fields.iter().enumerate() {
        let declared: BTreeSet<i32> = regions
            .iter()
            .filter_map(|(_, range)| range.field(index))
            .flat_map(RangeField::values)
            .chain(field.labels.values().copied())
            .collect();
        let min = declared.first().copied();
        let max = declared.last().copied();

        let (bits, enumerated) = if let Some(pinned) = field.bits {
            if let (Some(min), Some(max)) = (min, max) {
                let fits = min >= 0 && u64::try_from(max).is_ok_and(|m| m < 1_u64 << pinned);
                if !fits {
                    return Err(GeoError::dictionary(
                        dictionary,
                        format!(
                            "field '{}' values [{min}, {max}] do not fit {pinned} pinned bits",
                            field.name
                        ),
                    ));
                }
            }
            (pinned, None)
        } else {
            match (min, max) {
                (Some(min), Some(max)) => {
                    let span = (i64::from(max) - i64::from(min) + 1) as u64;
                    if span == declared.len() as u64 {
                        (bits_for(span), None)
                    } else {
                        let values: Vec<i32> = declared.iter().copied().collect();
                        (bits_for(values.len() as u64), Some(values))
                    }
                }
                _ => (0, None),
            }
        };

        used += bits;
        if used > MAX_LAYOUT_BITS {
            return Err(GeoError::dictionary(
                dictionary,
                format!("layout needs {used} bits, at most {MAX_LAYOUT_BITS} are available"),
            ));
        }
        let shift = 64 - used;
        let codec = match enumerated {
            Some(values) => FieldCodec::enumerated(&field.name, index, bits, shift, values),
            None => {
                let offset = if field.bits.is_some() {
                    0
                } else {
                    min.unwrap_or(0)
                };
                FieldCodec::bounded(&field.name, index, bits, shift, offset)
            }
        };
        codecs.push(codec);
    }
    Ok(codecs)
}

/// Owns the loaded dictionaries, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct IdDictManager {
    tag: String,
    dictionaries: BTreeMap<String, IdDictionary>,
}

impl IdDictManager {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            dictionaries: BTreeMap::new(),
        }
    }

    /// Register a dictionary, replacing one with the same name.
    pub fn add(&mut self, dictionary: IdDictionary) {
        self.dictionaries
            .insert(dictionary.name().to_owned(), dictionary);
    }

    /// Parse a dictionary set from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let set: DictionarySet = toml::from_str(input)?;
        Self::from_set(set)
    }

    /// Load a dictionary set from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| GeoError::CannotOpen {
            path: path.to_path_buf(),
        })?;
        let manager = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_set(serde_json::from_str(&text)?)?
        } else {
            Self::from_toml_str(&text)?
        };
        info!(
            target: "fgeo.types::dictionary",
            path = %path.display(),
            tag = %manager.tag,
            dictionaries = manager.dictionaries.len(),
            "loaded identifier dictionaries"
        );
        Ok(manager)
    }

    /// The built-in FASER dictionaries.
    pub fn faser_default() -> Result<Self> {
        Self::from_toml_str(crate::faser::FASER_DICTIONARIES)
    }

    fn from_set(set: DictionarySet) -> Result<Self> {
        let mut versions = Vec::with_capacity(set.dictionaries.len());
        let mut manager = Self::default();
        for def in set.dictionaries {
            versions.push(format!("{}:{}", def.name, def.version));
            manager.add(IdDictionary::build(def)?);
        }
        manager.tag = set.tag.unwrap_or_else(|| versions.join(","));
        Ok(manager)
    }

    /// Content tag; helpers skip re-initialisation when it is unchanged.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn dictionary(&self, name: &str) -> Result<&IdDictionary> {
        self.dictionaries
            .get(name)
            .ok_or_else(|| GeoError::NoSuchDictionary {
                name: name.to_owned(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dictionaries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
tag = "small-test"

[[dictionaries]]
name = "Neutrino"
version = "TEST-01"

[[dictionaries.fields]]
name = "subdet"
bits = 4
labels = { Neutrino = 1 }

[[dictionaries.fields]]
name = "part"
bits = 4
labels = { Emulsion = 1 }

[[dictionaries.fields]]
name = "module"

[[dictionaries.fields]]
name = "base"

[[dictionaries.fields]]
name = "film"

[[dictionaries.regions]]
group = "emulsion"
entries = [
    { field = "subdet", label = "Neutrino" },
    { field = "part", label = "Emulsion" },
    { field = "module", min = 0, max = 1 },
    { field = "base", min = 0, max = 2 },
    { field = "film", values = [0, 1] },
]
"#;

    fn small() -> IdDictManager {
        IdDictManager::from_toml_str(SMALL).expect("small dictionary should parse")
    }

    #[test]
    fn layout_is_msb_first() {
        let manager = small();
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        let bits: Vec<u32> = dict.codecs().iter().map(FieldCodec::bits).collect();
        assert_eq!(bits, vec![4, 4, 1, 2, 1], "case=field_widths");
        let shifts: Vec<u32> = dict.codecs().iter().map(FieldCodec::shift).collect();
        assert_eq!(shifts, vec![60, 56, 55, 53, 52], "case=field_shifts");
        assert_eq!(dict.total_bits(), 12);
        assert_eq!(manager.tag(), "small-test");
    }

    #[test]
    fn pack_unpack_round_trip() {
        let manager = small();
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        let expanded = ExpandedIdentifier::from_slice(&[1, 1, 1, 2, 1]);
        let id = dict.pack(&expanded);
        assert!(id.is_valid());
        let back = dict.unpack(id, IdContext::new(0, 4)).expect("context fits");
        assert_eq!(back, expanded);
        let tail = dict.unpack(id, IdContext::new(2, 3)).expect("context fits");
        assert_eq!(tail.as_slice(), &[1, 2]);
        assert!(dict.unpack(id, IdContext::new(0, 5)).is_err());
    }

    #[test]
    fn pack_rejects_unencodable_values() {
        let manager = small();
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        let id = dict.pack(&ExpandedIdentifier::from_slice(&[1, 1, -1, 0, 0]));
        assert_eq!(id, Identifier::INVALID);
    }

    #[test]
    fn multi_range_truncates_and_pins_prefix() {
        let manager = small();
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        let prefix = ExpandedIdentifier::from_slice(&[1, 1]);
        let base = dict.build_multi_range(&prefix, 3);
        assert_eq!(base.cardinality(), 6);
        let film = dict.build_multi_range(&prefix, 4);
        assert_eq!(film.cardinality(), 12);
        let other = dict.build_multi_range(&ExpandedIdentifier::from_slice(&[2, 1]), 3);
        assert!(other.is_empty());
    }

    #[test]
    fn labels_resolve() {
        let manager = small();
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        assert_eq!(dict.label_value("subdet", "Neutrino"), Some(1));
        assert_eq!(dict.label_value("subdet", "Tracker"), None);
        assert!(dict.require_field("station").is_err());
        assert!(manager.dictionary("Tracker").is_err());
    }

    #[test]
    fn out_of_order_region_is_rejected() {
        let bad = SMALL.replace(
            "{ field = \"module\", min = 0, max = 1 },\n    { field = \"base\", min = 0, max = 2 },",
            "{ field = \"base\", min = 0, max = 2 },\n    { field = \"module\", min = 0, max = 1 },",
        );
        let err = IdDictManager::from_toml_str(&bad).expect_err("region out of order");
        assert!(matches!(err, GeoError::InvalidDictionary { .. }));
    }

    #[test]
    fn pinned_width_overflow_is_rejected() {
        let bad = SMALL.replace("labels = { Neutrino = 1 }", "labels = { Neutrino = 17 }");
        let err = IdDictManager::from_toml_str(&bad).expect_err("value exceeds pinned width");
        assert!(matches!(err, GeoError::InvalidDictionary { .. }));
    }

    #[test]
    fn non_contiguous_values_use_enumerated_codec() {
        let text = SMALL.replace("{ field = \"film\", values = [0, 1] }", "{ field = \"film\", values = [-1, 1] }");
        let manager = IdDictManager::from_toml_str(&text).expect("dictionary should parse");
        let dict = manager.dictionary("Neutrino").expect("dictionary present");
        let film = dict.codec(4).expect("film codec");
        assert!(film.is_enumerated());
        assert_eq!(film.bits(), 1);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("dict.toml");
        std::fs::write(&path, SMALL).expect("write dictionary");
        let manager = IdDictManager::load(&path).expect("dictionary loads");
        assert_eq!(manager.names().collect::<Vec<_>>(), vec!["Neutrino"]);
        assert!(matches!(
            IdDictManager::load(&dir.path().join("missing.toml")),
            Err(GeoError::CannotOpen { .. })
        ));
    }
}
