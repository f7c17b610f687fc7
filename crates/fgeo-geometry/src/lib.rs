//! Detector geometry construction: parameters from tables, the component
//! factories, the Emulsion and SCT detector factories, and the detector
//! tool that returns a ready [`GeoModelContext`].

pub mod component;
pub mod config;
pub mod emulsion;
pub mod folders;
pub mod parameters;
pub mod sct;
pub mod tool;

pub use component::{ComponentBuilder, ComponentFactory, Sharing};
pub use config::{AlignmentConfig, DetectorToolConfig, GeoConfig};
pub use emulsion::{EmulsionDetectorFactory, FactoryOptions};
pub use folders::FolderLayout;
pub use parameters::{EmulsionGeoParameters, SctGeoParameters, SlabSpec, SupportSpec, Switches};
pub use sct::SctDetectorFactory;
pub use tool::{DetectorTool, GeoModelContext};
