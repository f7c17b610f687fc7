//! Relational parameter tables.
//!
//! Detector factories read their dimensions and layout switches through
//! [`RdbAccess`]. The in-memory backend is loaded from TOML or JSON with
//! this shape:
//!
//! ```toml
//! [[tables]]
//! name = "SctGeneral"
//! tag = "FASER-01"      # optional; untagged tables match any tag
//! rows = [ { NSTATIONS = 4, ZPITCH = 1.2 } ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use fgeo_error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

const BUILTIN_PARAMETERS: &str = include_str!("../data/faser_parameters.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
}

impl Value {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }
}

/// One row. Absent columns read as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    columns: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(columns: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    fn column(&self, table: &str, column: &str) -> Result<&Value> {
        self.columns.get(column).ok_or_else(|| GeoError::NoSuchColumn {
            table: table.to_owned(),
            column: column.to_owned(),
        })
    }

    fn mismatch(table: &str, column: &str, expected: &'static str, found: &Value) -> GeoError {
        trace!(target: "fgeo.geomodel::rdb", table, column, found = found.kind(), "column type mismatch");
        GeoError::TypeMismatch {
            table: table.to_owned(),
            column: column.to_owned(),
            expected,
        }
    }

    /// Numeric column as `f64`; integers widen.
    pub fn get_double(&self, table: &str, column: &str) -> Result<f64> {
        match self.column(table, column)? {
            Value::Double(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(Self::mismatch(table, column, "double", other)),
        }
    }

    pub fn get_int(&self, table: &str, column: &str) -> Result<i64> {
        match self.column(table, column)? {
            Value::Int(v) => Ok(*v),
            other => Err(Self::mismatch(table, column, "int", other)),
        }
    }

    pub fn get_string(&self, table: &str, column: &str) -> Result<&str> {
        match self.column(table, column)? {
            Value::String(v) => Ok(v),
            other => Err(Self::mismatch(table, column, "string", other)),
        }
    }

    pub fn is_field_null(&self, column: &str) -> bool {
        !self.columns.contains_key(column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(rename = "name")]
    pub table: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub rows: Vec<Record>,
}

impl RecordSet {
    pub fn get(&self, row: usize) -> Result<&Record> {
        self.rows.get(row).ok_or_else(|| GeoError::RowOutOfRange {
            table: self.table.clone(),
            row,
            len: self.rows.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter()
    }

    pub fn double(&self, row: usize, column: &str) -> Result<f64> {
        self.get(row)?.get_double(&self.table, column)
    }

    pub fn int(&self, row: usize, column: &str) -> Result<i64> {
        self.get(row)?.get_int(&self.table, column)
    }

    pub fn string(&self, row: usize, column: &str) -> Result<&str> {
        self.get(row)?.get_string(&self.table, column)
    }
}

/// Source of parameter tables.
pub trait RdbAccess: Send + Sync {
    /// The record set for `table` under `tag`.
    fn recordset(&self, table: &str, tag: &str) -> Result<Arc<RecordSet>>;
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    tables: Vec<RecordSet>,
}

#[derive(Debug, Default)]
pub struct InMemoryRdb {
    tables: Vec<Arc<RecordSet>>,
}

impl InMemoryRdb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, set: RecordSet) {
        self.tables
            .retain(|existing| !(existing.table == set.table && existing.tag == set.tag));
        self.tables.push(Arc::new(set));
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(text)?;
        Ok(Self::from_tables(file.tables))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: TableFile = serde_json::from_str(text)?;
        Ok(Self::from_tables(file.tables))
    }

    fn from_tables(tables: Vec<RecordSet>) -> Self {
        let mut rdb = Self::new();
        for set in tables {
            rdb.insert(set);
        }
        debug!(target: "fgeo.geomodel::rdb", tables = rdb.tables.len(), "parameter tables loaded");
        rdb
    }

    /// Load tables from a file; `.json` selects JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| GeoError::CannotOpen {
            path: path.to_path_buf(),
        })?;
        let rdb = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&text)?
        } else {
            Self::from_toml_str(&text)?
        };
        info!(target: "fgeo.geomodel::rdb", path = %path.display(), tables = rdb.tables.len(), "parameter file loaded");
        Ok(rdb)
    }

    /// The bundled FASER parameter set.
    pub fn faser_default() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PARAMETERS)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.iter().map(|t| t.table.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl RdbAccess for InMemoryRdb {
    fn recordset(&self, table: &str, tag: &str) -> Result<Arc<RecordSet>> {
        let named = || self.tables.iter().filter(|t| t.table == table);
        named()
            .find(|t| t.tag.as_deref() == Some(tag))
            .or_else(|| named().find(|t| t.tag.is_none()))
            .cloned()
            .ok_or_else(|| GeoError::NoSuchTable {
                table: table.to_owned(),
                tag: tag.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLES: &str = r#"
        [[tables]]
        name = "Widths"
        rows = [ { WIDTH = 2.5, COUNT = 3, MAT = "Silicon" }, { WIDTH = 4 } ]

        [[tables]]
        name = "Widths"
        tag = "SPECIAL"
        rows = [ { WIDTH = 9.0 } ]
    "#;

    #[test]
    fn typed_accessors() {
        let rdb = InMemoryRdb::from_toml_str(TABLES).expect("parse");
        let set = rdb.recordset("Widths", "ANY").expect("untagged fallback");
        assert_eq!(set.len(), 2);
        assert_eq!(set.double(0, "WIDTH").expect("double"), 2.5);
        assert_eq!(set.double(1, "WIDTH").expect("int widens"), 4.0);
        assert_eq!(set.int(0, "COUNT").expect("int"), 3);
        assert_eq!(set.string(0, "MAT").expect("string"), "Silicon");
        assert!(set.get(1).expect("row").is_field_null("MAT"));
        assert!(matches!(set.int(0, "WIDTH"), Err(GeoError::TypeMismatch { .. })));
        assert!(matches!(set.int(0, "NOPE"), Err(GeoError::NoSuchColumn { .. })));
        assert!(matches!(
            set.get(5),
            Err(GeoError::RowOutOfRange { row: 5, len: 2, .. })
        ));
    }

    #[test]
    fn tag_lookup_prefers_exact_match() {
        let rdb = InMemoryRdb::from_toml_str(TABLES).expect("parse");
        let special = rdb.recordset("Widths", "SPECIAL").expect("tagged");
        assert_eq!(special.double(0, "WIDTH").expect("double"), 9.0);
        assert!(matches!(
            rdb.recordset("Lengths", "SPECIAL"),
            Err(GeoError::NoSuchTable { .. })
        ));
        assert_eq!(rdb.table_names(), vec!["Widths"]);
    }

    #[test]
    fn builtin_parameters_parse() {
        let rdb = InMemoryRdb::faser_default().expect("builtin");
        let general = rdb.recordset("SctGeneral", "FASER-01").expect("table");
        assert_eq!(general.int(0, "NSTATIONS").expect("int"), 4);
    }
}
