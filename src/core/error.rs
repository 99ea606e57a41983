//! Error types for the voxel map

use thiserror::Error;

/// Main error type for the map store.
///
/// Absent data is never an error: unallocated space reads back as init data
/// and invalid cells as `None`. Errors are reserved for caller bugs.
#[derive(Debug, Error)]
pub enum Error {
    /// The coordinate lies outside the octree's configured domain, which is
    /// distinct from lying in a merely unallocated region.
    #[error("voxel coordinate {0:?} is outside the octree bounds")]
    OutOfBounds([i32; 3]),

    #[error("invalid octree configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
