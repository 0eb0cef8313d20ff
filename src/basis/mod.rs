pub mod layout;
pub mod pod;
pub mod snapshots;

pub use layout::{FlowFields, InteriorLayout, LOADED_VARS, SOLVED_VARS, Variable};
pub use pod::{NormalizationStats, PodBasis, compute_basis, project};
pub use snapshots::{DesignSpace, GridSpec, SnapshotSet};
