//! Geometry build configuration, read from TOML.

use std::path::{Path, PathBuf};

use fgeo_error::{GeoError, Result};
use fgeo_idhelpers::IdHelperConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-detector switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorToolConfig {
    pub enabled: bool,
    /// Place hierarchy levels behind alignable transforms.
    pub alignable: bool,
    /// Parameter table tag; the dictionary version when absent.
    pub version_tag: Option<String>,
}

impl Default for DetectorToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alignable: true,
            version_tag: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Register the per-channel global folder layout instead of the
    /// static per-level one.
    pub use_dynamic_alignment_folders: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Identifier dictionaries; the bundled FASER set when absent.
    pub dictionary_path: Option<PathBuf>,
    /// Parameter tables; the bundled FASER defaults when absent.
    pub parameters_path: Option<PathBuf>,
    pub id_helper: IdHelperConfig,
    pub emulsion: DetectorToolConfig,
    pub sct: DetectorToolConfig,
    pub alignment: AlignmentConfig,
    /// `tracing` filter directive, e.g. `fgeo=debug`.
    pub log_filter: Option<String>,
}

impl GeoConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`. Relative data paths resolve against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| GeoError::CannotOpen {
            path: path.to_path_buf(),
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            for data in [&mut config.dictionary_path, &mut config.parameters_path]
                .into_iter()
                .flatten()
            {
                if data.is_relative() {
                    *data = base.join(&*data);
                }
            }
        }
        info!(target: "fgeo.geometry::config", path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_builds_everything_with_builtin_data() {
        let config = GeoConfig::from_toml_str("").expect("parse");
        assert_eq!(config, GeoConfig::default());
        assert!(config.emulsion.enabled && config.emulsion.alignable);
        assert!(config.sct.enabled);
        assert!(config.dictionary_path.is_none());
        assert!(!config.alignment.use_dynamic_alignment_folders);
        assert!(config.id_helper.do_neighbours);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = GeoConfig::from_toml_str(
            r#"
log_filter = "fgeo=debug"

[sct]
alignable = false
version_tag = "FASER-02"

[id_helper]
do_checks = true

[alignment]
use_dynamic_alignment_folders = true
"#,
        )
        .expect("parse");
        assert!(config.sct.enabled, "case=enabled_default");
        assert!(!config.sct.alignable);
        assert_eq!(config.sct.version_tag.as_deref(), Some("FASER-02"));
        assert!(config.id_helper.do_checks);
        assert!(config.id_helper.do_neighbours, "case=nested_default");
        assert!(config.alignment.use_dynamic_alignment_folders);
        assert_eq!(config.log_filter.as_deref(), Some("fgeo=debug"));
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            GeoConfig::from_toml_str("[emulsion]\nenabled = \"yes\"\n"),
            Err(GeoError::Toml(_))
        ));
    }
}
