//! Voxfield - sparse, hierarchical storage for volumetric field data
//!
//! An octree-backed voxel map for 3-D reconstruction. Space is allocated
//! lazily: writers call [`map::allocator`] to grow the tree down to the
//! block owning a coordinate, readers resolve coordinates through
//! [`map::fetcher`] and query values through [`map::visitor`] (exact lookup,
//! multi-scale selection, trilinear interpolation, gradients).
//!
//! Two field kinds are supported, truncated signed distance
//! ([`map::TsdfData`]) and occupancy log-odds ([`map::OccupancyData`]), each
//! stored either at a single resolution or as a per-block scale pyramid.

pub mod core;
pub mod map;
