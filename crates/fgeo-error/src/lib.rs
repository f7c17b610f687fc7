use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the geometry, identifier and alignment layer.
///
/// Variants are grouped by the subsystem that raises them. Construction-time
/// failures (dictionary, hash tables, required alignment data) are fatal and
/// abort initialisation; see [`GeoError::is_fatal`].
#[derive(Error, Debug)]
pub enum GeoError {
    // === Dictionary Errors ===
    /// A dictionary requested by name is not loaded.
    #[error("no such identifier dictionary: {name}")]
    NoSuchDictionary { name: String },

    /// A field required by an identifier helper is not declared.
    #[error("field '{field}' not found in dictionary {dictionary}")]
    FieldNotFound { dictionary: String, field: String },

    /// The dictionary definition itself is inconsistent.
    #[error("invalid dictionary {dictionary}: {detail}")]
    InvalidDictionary { dictionary: String, detail: String },

    /// No region matches the identifier prefix a helper needs.
    #[error("no region in dictionary {dictionary} matches prefix {prefix}")]
    NoMatchingRegion { dictionary: String, prefix: String },

    // === Identifier Errors ===
    /// An identifier helper was used before `initialize_from_dictionary`.
    #[error("identifier helper {helper} is not initialized")]
    NotInitialized { helper: &'static str },

    /// Identifier is the invalid sentinel or decodes outside the declared ranges.
    #[error("invalid identifier {id:#018x}: {detail}")]
    InvalidIdentifier { id: u64, detail: String },

    /// Hash outside `[0, hash_max)`.
    #[error("identifier hash {hash} out of range (max {max})")]
    HashOutOfRange { hash: u32, max: u32 },

    /// Context window does not fit the helper's field layout.
    #[error("unsupported identifier context [{begin}, {end}]")]
    UnsupportedContext { begin: usize, end: usize },

    // === Hash-table Construction Errors ===
    /// Two coordinate tuples packed to the same identifier.
    #[error("duplicate identifier {id:#018x} while building {level} hash table")]
    DuplicateIdentifier { level: &'static str, id: u64 },

    /// Number of unique identifiers differs from the range cardinality.
    #[error("{level} hash table has {actual} entries, range cardinality is {expected}")]
    CardinalityMismatch {
        level: &'static str,
        expected: u64,
        actual: u64,
    },

    /// A neighbour boundary could not be resolved.
    #[error("cannot resolve {direction} neighbour for {id}: {detail}")]
    NeighbourResolution {
        direction: &'static str,
        id: String,
        detail: String,
    },

    /// Pack/unpack round trip changed the identifier.
    #[error("packing round trip failed for {level} hash {hash}: {detail}")]
    PackingMismatch {
        level: &'static str,
        hash: u32,
        detail: String,
    },

    // === Geometry Errors ===
    /// Volume handle does not exist in the tree.
    #[error("no such volume: {index}")]
    NoSuchVolume { index: usize },

    /// Alignable transform handle does not exist in the tree.
    #[error("no such alignable transform: {index}")]
    NoSuchAlignable { index: usize },

    /// Detector element could not be constructed.
    #[error("invalid detector element {id:#018x}: {detail}")]
    InvalidElement { id: u64, detail: String },

    // === Alignment Errors ===
    /// A regular alignment folder delivered no data.
    #[error("alignment container missing or empty for folder {key}")]
    MissingAlignment { key: String },

    /// No alignable transform registered for `(level, id)`.
    #[error("no alignable transform at level {level} for {id:#018x}")]
    NoAlignableTransform { level: usize, id: u64 },

    /// Folder key not registered with the manager.
    #[error("alignment folder {key} is not registered")]
    UnknownFolder { key: String },

    // === Parameter Table Errors ===
    /// Table/tag combination not found.
    #[error("no such parameter table: {table} (tag {tag})")]
    NoSuchTable { table: String, tag: String },

    /// Column missing from a record.
    #[error("no such column {column} in table {table}")]
    NoSuchColumn { table: String, column: String },

    /// Column present with an unexpected type.
    #[error("type mismatch for {table}.{column}: expected {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
    },

    /// Row index past the end of a record set.
    #[error("row {row} out of range for table {table} ({len} rows)")]
    RowOutOfRange { table: String, row: usize, len: usize },

    // === Configuration / I/O Errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML input.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON input or JSON encoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file cannot be read.
    #[error("unable to open configuration: '{path}'")]
    CannotOpen { path: PathBuf },

    /// Semantically invalid configuration value.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable numeric classification, used for CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Dictionary missing or inconsistent.
    Dictionary = 3,
    /// Identifier or hash not valid.
    Identifier = 4,
    /// Hash or neighbour table construction failed.
    HashTable = 5,
    /// Geometry tree or detector element failure.
    Geometry = 6,
    /// Alignment data missing or unusable.
    Alignment = 7,
    /// Parameter table lookup failed.
    Parameters = 8,
    /// Configuration or file-format problem.
    Config = 9,
    /// Disk I/O error.
    IoErr = 10,
}

impl GeoError {
    /// Map this error to its classification code.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoSuchDictionary { .. }
            | Self::FieldNotFound { .. }
            | Self::InvalidDictionary { .. }
            | Self::NoMatchingRegion { .. } => ErrorCode::Dictionary,
            Self::NotInitialized { .. }
            | Self::InvalidIdentifier { .. }
            | Self::HashOutOfRange { .. }
            | Self::UnsupportedContext { .. } => ErrorCode::Identifier,
            Self::DuplicateIdentifier { .. }
            | Self::CardinalityMismatch { .. }
            | Self::NeighbourResolution { .. }
            | Self::PackingMismatch { .. } => ErrorCode::HashTable,
            Self::NoSuchVolume { .. }
            | Self::NoSuchAlignable { .. }
            | Self::InvalidElement { .. } => ErrorCode::Geometry,
            Self::MissingAlignment { .. }
            | Self::NoAlignableTransform { .. }
            | Self::UnknownFolder { .. } => ErrorCode::Alignment,
            Self::NoSuchTable { .. }
            | Self::NoSuchColumn { .. }
            | Self::TypeMismatch { .. }
            | Self::RowOutOfRange { .. } => ErrorCode::Parameters,
            Self::Toml(_)
            | Self::Json(_)
            | Self::CannotOpen { .. }
            | Self::InvalidConfig { .. } => ErrorCode::Config,
            Self::Io(_) => ErrorCode::IoErr,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error aborts initialisation rather than one entry.
    ///
    /// A missing alignable transform for one delta entry is a per-entry
    /// failure; everything raised while building dictionaries, hash tables,
    /// neighbour tables or loading required alignment is fatal.
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NoAlignableTransform { .. }
                | Self::InvalidIdentifier { .. }
                | Self::HashOutOfRange { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::FieldNotFound { .. } | Self::NoMatchingRegion { .. } => {
                Some("Check that the dictionary version matches the geometry version")
            }
            Self::DuplicateIdentifier { .. } | Self::CardinalityMismatch { .. } => {
                Some("Two regions overlap or a field is too narrow; fix the dictionary")
            }
            Self::MissingAlignment { .. } => {
                Some("Provide the alignment folder or remove it from the registered folders")
            }
            Self::NotInitialized { .. } => Some("Call initialize_from_dictionary first"),
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        self.error_code() as i32
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid-dictionary error.
    pub fn dictionary(dictionary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidDictionary {
            dictionary: dictionary.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid-identifier error.
    pub fn invalid_id(id: u64, detail: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            id,
            detail: detail.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `GeoError`.
pub type Result<T> = std::result::Result<T, GeoError>;
