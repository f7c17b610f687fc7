//! Geometry model: rigid transforms, the physical-volume tree with
//! alignable transforms, alignment overrides and relational parameter
//! tables.

pub mod rdb;
pub mod store;
pub mod transform;
pub mod tree;

pub use rdb::{InMemoryRdb, RdbAccess, Record, RecordSet, Value};
pub use store::AlignmentStore;
pub use transform::{Point3, Transform3D, Vector3};
pub use tree::{AlignableId, Child, GeoTree, LogicalVolume, Placement, Shape, VolumeId};
