//! Sparse voxel map: octant data model, allocation, fetch and query layers.

pub mod data;
pub mod octant;
pub mod octree;
pub mod allocator;
pub mod fetcher;
pub mod visitor;

pub use data::{FieldKind, MaxVoxelData, OccupancyData, Resolution, TsdfData, VoxelData};
pub use octant::{BLOCK_DIM, Block, MAX_BLOCK_SCALE, Node, Octant, OctantInfo};
pub use octree::{OccupancyOctree, Octree, OctreeConfig, TsdfOctree};
