//! `fgeo`: build the FASER geometry from a configuration and dump it as
//! JSON.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fgeo_error::{GeoError, Result};
use fgeo_geometry::{DetectorTool, GeoConfig, GeoModelContext};
use fgeo_readout::{Bounds, DetectorManager, ElementIdHelper};
use fgeo_types::Identifier;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for malformed command lines.
pub const USAGE_EXIT: i32 = 64;

const HELP: &str = "\
fgeo - FASER identifier and detector geometry dump

USAGE:
    fgeo [OPTIONS]

OPTIONS:
    --config <PATH>          Geometry configuration (TOML); built-in defaults when absent
    --ids <emulsion|sct>     List every element identifier of one subdetector
    --elements               Dump position, normal and bounds of every detector element
    -h, --help               Show this help

Without --ids or --elements a summary of the built geometry is printed.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdetector {
    Emulsion,
    Sct,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub ids: Option<Subdetector>,
    pub elements: bool,
    pub help: bool,
}

pub fn parse_args(args: &[String]) -> std::result::Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--config" => {
                index += 1;
                let path = args.get(index).ok_or("--config requires a value")?;
                options.config = Some(PathBuf::from(path));
            }
            "--ids" => {
                index += 1;
                let which = args.get(index).ok_or("--ids requires a value")?;
                options.ids = Some(match which.to_ascii_lowercase().as_str() {
                    "emulsion" => Subdetector::Emulsion,
                    "sct" => Subdetector::Sct,
                    other => return Err(format!("invalid --ids value: {other} (expected emulsion|sct)")),
                });
            }
            "--elements" => options.elements = true,
            "-h" | "--help" => options.help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
        index += 1;
    }
    Ok(options)
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// The configured filter wins over `RUST_LOG`; `warn` otherwise. A
/// subscriber installed earlier is kept.
pub fn init_logging(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|err| GeoError::config(format!("invalid log filter '{directive}': {err}")))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

#[derive(Debug, Serialize)]
struct DetectorSummary {
    name: String,
    elements: usize,
    element_hash_max: u32,
    alignables_per_level: Vec<usize>,
    folders: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    dictionaries: String,
    volumes: usize,
    alignables: usize,
    detectors: Vec<DetectorSummary>,
}

#[derive(Debug, Serialize)]
struct IdEntry {
    hash: u32,
    id: String,
    fields: String,
}

#[derive(Debug, Serialize)]
struct ElementEntry {
    detector: &'static str,
    hash: u32,
    id: String,
    fields: String,
    center: [f64; 3],
    normal: [f64; 3],
    bounds: Bounds,
}

fn summarize(manager: &DetectorManager) -> DetectorSummary {
    DetectorSummary {
        name: manager.name().to_owned(),
        elements: manager.elements().count(),
        element_hash_max: manager.helper().element_hash_max(),
        alignables_per_level: (0..manager.num_levels())
            .map(|level| manager.num_alignable_transforms(level))
            .collect(),
        folders: manager.folder_keys(),
    }
}

fn list_ids(context: &GeoModelContext, which: Subdetector) -> Result<Vec<IdEntry>> {
    let (helper, ids): (ElementIdHelper, Vec<Identifier>) = match which {
        Subdetector::Emulsion => {
            let helper = context
                .emulsion_helper
                .as_ref()
                .ok_or_else(|| GeoError::config("emulsion is disabled in the configuration"))?;
            (ElementIdHelper::Emulsion(Arc::clone(helper)), helper.film_ids().to_vec())
        }
        Subdetector::Sct => {
            let helper = context
                .sct_helper
                .as_ref()
                .ok_or_else(|| GeoError::config("sct is disabled in the configuration"))?;
            (ElementIdHelper::Sct(Arc::clone(helper)), helper.wafer_ids().to_vec())
        }
    };
    ids.into_iter()
        .map(|id| {
            let hash = helper
                .element_hash(id)
                .ok_or_else(|| GeoError::internal(format!("listed identifier {id} has no hash")))?;
            Ok(IdEntry {
                hash: hash.get(),
                id: id.to_string(),
                fields: helper.describe(id),
            })
        })
        .collect()
}

fn dump_elements(context: &GeoModelContext) -> Result<Vec<ElementEntry>> {
    let mut entries = Vec::new();
    for manager in context.managers() {
        let helper = manager.helper();
        for element in manager.elements().iter() {
            let center = element.center()?;
            let normal = element.normal()?;
            entries.push(ElementEntry {
                detector: helper.detector_name(),
                hash: element.identify_hash().get(),
                id: element.identify().to_string(),
                fields: helper.describe(element.identify()),
                center: [center.x, center.y, center.z],
                normal: [normal.x, normal.y, normal.z],
                bounds: element.bounds()?,
            });
        }
    }
    Ok(entries)
}

fn execute(options: &CliOptions, out: &mut dyn Write) -> Result<()> {
    let config = match &options.config {
        Some(path) => GeoConfig::load(path)?,
        None => GeoConfig::default(),
    };
    init_logging(config.log_filter.as_deref())?;
    let context = DetectorTool::new(config).create()?;
    debug!(target: "fgeo.cli", ?options, "geometry ready");

    let json = if let Some(which) = options.ids {
        serde_json::to_string_pretty(&list_ids(&context, which)?)?
    } else if options.elements {
        serde_json::to_string_pretty(&dump_elements(&context)?)?
    } else {
        let summary = Summary {
            dictionaries: context.dictionaries.tag().to_owned(),
            volumes: context.tree.volume_count(),
            alignables: context.tree.alignable_count(),
            detectors: context.managers().map(summarize).collect(),
        };
        serde_json::to_string_pretty(&summary)?
    };
    writeln!(out, "{json}")?;
    Ok(())
}

/// Run the command line `args` (program name excluded) and return the
/// process exit status.
pub fn run(args: &[String], out: &mut dyn Write, err: &mut dyn Write) -> i32 {
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}\n\n{HELP}");
            return USAGE_EXIT;
        }
    };
    if options.help {
        let _ = write!(out, "{HELP}");
        return 0;
    }
    match execute(&options, out) {
        Ok(()) => 0,
        Err(error) => {
            let _ = writeln!(err, "error: {error}");
            if let Some(hint) = error.suggestion() {
                let _ = writeln!(err, "hint: {hint}");
            }
            error.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn parses_every_flag() {
        let options = parse_args(&args(&["--config", "geo.toml", "--ids", "SCT", "--elements"])).expect("parse");
        assert_eq!(options.config, Some(PathBuf::from("geo.toml")));
        assert_eq!(options.ids, Some(Subdetector::Sct));
        assert!(options.elements);
        assert!(!options.help);
    }

    #[test]
    fn rejects_bad_command_lines() {
        assert!(parse_args(&args(&["--config"])).is_err(), "case=missing_value");
        assert!(parse_args(&args(&["--ids", "calo"])).is_err(), "case=bad_subdetector");
        assert!(parse_args(&args(&["--verbose"])).is_err(), "case=unknown_flag");
    }

    #[test]
    fn usage_errors_exit_with_usage_status() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        assert_eq!(run(&args(&["--bogus"]), &mut out, &mut err), USAGE_EXIT);
        assert!(out.is_empty());
        assert!(String::from_utf8_lossy(&err).contains("unknown argument"));
    }

    #[test]
    fn help_goes_to_stdout() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        assert_eq!(run(&args(&["--help"]), &mut out, &mut err), 0);
        assert!(String::from_utf8_lossy(&out).contains("USAGE"));
    }
}
