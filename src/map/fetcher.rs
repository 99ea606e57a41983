//! Read-only resolution of coordinates to allocated octants.
//!
//! Same coordinate bit tests as the allocator, but nothing is ever created:
//! the first missing child on the path means the region is unallocated.
//! Safe for unbounded concurrent callers.

use glam::IVec3;

use super::data::VoxelData;
use super::octant::{Block, Octant};
use super::octree::Octree;

/// The deepest allocated octant on the path to `coord`, the root at minimum.
///
/// Multi-resolution queries use this to find the coarse ancestor standing in
/// for unallocated or under-observed fine data.
pub fn lowest<'a, D: VoxelData>(octree: &'a Octree<D>, coord: IVec3) -> &'a Octant<D> {
    debug_assert!(octree.contains(coord));
    let mut cur = octree.root();
    while let Octant::Node(n) = cur {
        match n.child(n.child_index(coord)) {
            Some(child) => cur = child,
            None => break,
        }
    }
    cur
}

/// The block owning `coord`, or `None` if that region was never allocated
/// or `coord` is outside the octree.
pub fn block<'a, D: VoxelData>(octree: &'a Octree<D>, coord: IVec3) -> Option<&'a Block<D>> {
    if !octree.contains(coord) {
        return None;
    }
    lowest(octree, coord).as_block()
}

/// Hinted variant of [`block`]: O(1) when `coord` falls inside the hint.
///
/// Spatially coherent query sequences (ray marching, interpolation stencils)
/// pass the previously returned block to skip the root descent. Whenever
/// both forms return a block it is the same block.
pub fn block_with_hint<'a, D: VoxelData>(
    octree: &'a Octree<D>,
    hint: Option<&'a Block<D>>,
    coord: IVec3,
) -> Option<&'a Block<D>> {
    if let Some(b) = hint {
        if b.contains(coord) {
            return Some(b);
        }
    }
    block(octree, coord)
}
