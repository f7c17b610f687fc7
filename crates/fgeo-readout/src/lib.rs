//! Readout geometry: detector elements with lazily cached frames, and the
//! detector managers that compose alignment deltas into the volume tree.

pub mod cache;
pub mod collection;
pub mod conditions;
pub mod design;
pub mod element;
pub mod manager;

pub use cache::CacheCell;
pub use collection::DetectorElementCollection;
pub use conditions::{
    AlignableTransformContainer, ConditionsStore, GlobalAlignmentContainer, InMemoryConditions,
    RawAlignmentObjects,
};
pub use design::{DetectorDesign, HitAxis, StripReadout};
pub use element::{Bounds, CommonItems, DetectorElement, ElementIdHelper, Orientation};
pub use manager::{
    AlignmentMetricsSnapshot, DetectorManager, ExtendedAlignableTransform, FolderSpec, Frame,
    global_delta, local_delta,
};
