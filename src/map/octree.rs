//! The octree container: configuration, root ownership, writer clock.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::IVec3;

use crate::core::{Error, Result};
use super::data::{OccupancyData, Resolution, TsdfData, VoxelData};
use super::octant::{BLOCK_DIM, MAX_BLOCK_SCALE, Node, Octant};

/// Construction-time parameters of an octree. Fixed for the map's lifetime.
#[derive(Clone, Copy, Debug)]
pub struct OctreeConfig {
    /// Edge length of the mapped volume in voxels. Must be a power of two
    /// and at least two blocks wide.
    pub size: u32,
    /// Edge length of one voxel in metres.
    pub voxel_size: f32,
    /// Whether blocks store a single scale or the full pyramid.
    pub resolution: Resolution,
}

impl OctreeConfig {
    fn validate(&self) -> Result<()> {
        if !self.size.is_power_of_two() || self.size < 2 * BLOCK_DIM {
            return Err(Error::InvalidConfig(format!(
                "size must be a power of two >= {}, got {}",
                2 * BLOCK_DIM,
                self.size
            )));
        }
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "voxel_size must be positive, got {}",
                self.voxel_size
            )));
        }
        Ok(())
    }
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            size: 256,
            voxel_size: 0.05,
            resolution: Resolution::Multi,
        }
    }
}

/// Sparse voxel octree over the domain `[0, size)³`.
///
/// Owns the whole octant tree through the root; every node exclusively owns
/// its children, so dropping the octree releases the entire structure.
/// Octants are created lazily by [`allocator`](crate::map::allocator) and
/// never destroyed during normal operation.
#[derive(Debug)]
pub struct Octree<D: VoxelData> {
    root: Octant<D>,
    size: u32,
    voxel_size: f32,
    resolution: Resolution,
    /// Monotone writer clock used to stamp touched octants.
    clock: AtomicU64,
}

/// Signed-distance octree.
pub type TsdfOctree = Octree<TsdfData>;
/// Occupancy octree.
pub type OccupancyOctree = Octree<OccupancyData>;

impl<D: VoxelData> Octree<D> {
    pub fn new(config: OctreeConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "octree created: {}^3 voxels at {} m/voxel, {:?} resolution",
            config.size,
            config.voxel_size,
            config.resolution
        );
        Ok(Self {
            root: Octant::Node(Node::new(IVec3::ZERO, config.size)),
            size: config.size,
            voxel_size: config.voxel_size,
            resolution: config.resolution,
            clock: AtomicU64::new(0),
        })
    }

    /// Edge length of the mapped volume in voxels.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Edge length of one voxel in metres.
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Coarsest scale stored inside blocks (0 for single-resolution maps).
    #[inline]
    pub fn max_block_scale(&self) -> u8 {
        match self.resolution {
            Resolution::Single => 0,
            Resolution::Multi => MAX_BLOCK_SCALE,
        }
    }

    /// Number of octant levels on a full root-to-block path.
    pub fn depth(&self) -> u32 {
        (self.size / BLOCK_DIM).trailing_zeros() + 1
    }

    /// Whether `coord` lies inside the mapped domain.
    #[inline]
    pub fn contains(&self, coord: IVec3) -> bool {
        coord.cmpge(IVec3::ZERO).all() && coord.cmplt(IVec3::splat(self.size as i32)).all()
    }

    /// The root octant.
    #[inline]
    pub fn root(&self) -> &Octant<D> {
        &self.root
    }

    /// The root as a node. The config guarantees the root routes at least
    /// one level, so it is always a node.
    pub(crate) fn root_node(&self) -> &Node<D> {
        match &self.root {
            Octant::Node(n) => n,
            Octant::Block(_) => unreachable!("root is always a node"),
        }
    }

    /// Current writer clock value.
    #[inline]
    pub fn time(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Advance the writer clock and return the new stamp. Called by
    /// integration pipelines once per fused measurement batch.
    pub fn advance_time(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}
