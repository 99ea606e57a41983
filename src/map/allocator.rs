//! Write-path tree growth: create the octant path owning a coordinate.

use glam::IVec3;
use rayon::prelude::*;

use crate::core::{Error, Result};
use super::data::VoxelData;
use super::octant::{BLOCK_DIM, Block, Node, Octant};
use super::octree::Octree;

/// Ensure the block owning `coord` exists, creating missing octants along
/// the root-to-leaf path, and return it.
///
/// Out-of-bounds coordinates are a caller error and reported as
/// [`Error::OutOfBounds`]; they are never silently clamped.
///
/// Safe under concurrency: each missing child is installed
/// construct-then-publish through its parent's slot, so racing allocators
/// for the same octant serialize on that slot, exactly one creation wins,
/// and concurrent readers see either no child or a fully built one.
/// Allocations in disjoint subtrees do not contend. Touched octants have
/// their time stamp raised to the octree's current writer clock.
pub fn block<'a, D: VoxelData>(octree: &'a Octree<D>, coord: IVec3) -> Result<&'a Block<D>> {
    if !octree.contains(coord) {
        return Err(Error::OutOfBounds(coord.to_array()));
    }
    let stamp = octree.time();
    let mut node = octree.root_node();
    node.info().touch(stamp);
    loop {
        let idx = node.child_index(coord);
        let child = node.child_or_insert(idx, || {
            let child_coord = node.child_coord(idx);
            let child_size = node.size() / 2;
            if child_size == BLOCK_DIM {
                log::trace!("allocating block at {:?}", child_coord);
                Octant::Block(Block::new(child_coord, octree.resolution()))
            } else {
                Octant::Node(Node::new(child_coord, child_size))
            }
        });
        child.info().touch(stamp);
        match child {
            Octant::Node(n) => node = n,
            Octant::Block(b) => return Ok(b),
        }
    }
}

/// Allocate the blocks owning every coordinate in `coords`, in parallel.
///
/// The returned blocks correspond to `coords` element-wise; duplicate and
/// already-allocated coordinates resolve to the existing blocks. Fails on
/// the first out-of-bounds coordinate.
pub fn blocks<'a, D: VoxelData>(
    octree: &'a Octree<D>,
    coords: &[IVec3],
) -> Result<Vec<&'a Block<D>>> {
    let blocks: Result<Vec<_>> = coords.par_iter().map(|&c| block(octree, c)).collect();
    if blocks.is_ok() {
        log::debug!("allocated path for {} coordinates", coords.len());
    }
    blocks
}
