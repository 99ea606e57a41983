//! Read-only octree queries: exact lookup, multi-scale data selection,
//! trilinear interpolation and gradient estimation.
//!
//! All functions leave the tree untouched and are safe under unbounded
//! concurrency. "No value" (`None`) means the data is absent or below the
//! field's validity threshold; unallocated space reads back as init data.
//! Stencil queries (interpolation, gradients) hold no locks across their
//! corner fetches, so a concurrent writer may update individual cells
//! mid-stencil; the result is then merely slightly stale, never torn.

use std::ops::{Add, Mul};

use glam::{IVec3, Vec3};

use super::data::{MaxVoxelData, VoxelData};
use super::fetcher;
use super::octant::{Block, Octant};
use super::octree::Octree;

/// The voxel data at `coord`, or init data if that region was never
/// allocated. Scale 0, the authoritative per-voxel value.
pub fn data<D: VoxelData>(octree: &Octree<D>, coord: IVec3) -> D {
    data_with_hint(octree, None, coord)
}

/// Hinted variant of [`data`]: checks the hint block's extent before
/// descending from the root.
pub fn data_with_hint<D: VoxelData>(
    octree: &Octree<D>,
    hint: Option<&Block<D>>,
    coord: IVec3,
) -> D {
    match fetcher::block_with_hint(octree, hint, coord) {
        Some(block) => block.data(coord, 0),
        None => D::default(),
    }
}

/// The voxel data at `coord` no finer than `scale_desired`, plus the scale
/// actually used (always `>= scale_desired`).
///
/// Walks the block's scales from `scale_desired` coarser until a valid
/// value is found. If the block stores nothing valid, falls back to the
/// deepest allocated ancestor with a valid aggregate; for an octant of edge
/// length `2^s` voxels the reported scale is `s`. With nothing valid
/// anywhere, returns init data.
pub fn data_at_scale<D: VoxelData>(
    octree: &Octree<D>,
    coord: IVec3,
    scale_desired: u8,
) -> (D, u8) {
    data_at_scale_with_hint(octree, None, coord, scale_desired)
}

/// Hinted variant of [`data_at_scale`].
pub fn data_at_scale_with_hint<D: VoxelData>(
    octree: &Octree<D>,
    hint: Option<&Block<D>>,
    coord: IVec3,
    scale_desired: u8,
) -> (D, u8) {
    if let Some(block) = fetcher::block_with_hint(octree, hint, coord) {
        for scale in scale_desired..=block.max_scale() {
            let data = block.data(coord, scale);
            if data.is_valid() {
                return (data, scale);
            }
        }
    }
    coarse_data(octree, coord, scale_desired)
}

/// Finest valid node aggregate on the path to `coord` that is no finer than
/// `min_scale`. Init data when no ancestor qualifies.
fn coarse_data<D: VoxelData>(octree: &Octree<D>, coord: IVec3, min_scale: u8) -> (D, u8) {
    if !octree.contains(coord) {
        return (D::default(), min_scale);
    }
    let mut best = (D::default(), min_scale);
    let mut node = octree.root_node();
    loop {
        let scale = node.size().trailing_zeros() as u8;
        if scale >= min_scale {
            let data = node.data();
            if data.is_valid() {
                best = (data, scale);
            }
        }
        match node.child(node.child_index(coord)) {
            Some(Octant::Node(n)) => node = n,
            _ => return best,
        }
    }
}

/// The precomputed max-field aggregate covering `coord` at `scale_desired`,
/// taken from the deepest allocated octant on the path. Occupancy only;
/// consumers use it for conservative raycast termination. Does not search
/// neighbouring octants.
pub fn max_data<D: MaxVoxelData>(octree: &Octree<D>, coord: IVec3, scale_desired: u8) -> D {
    if !octree.contains(coord) {
        return D::default();
    }
    match fetcher::lowest(octree, coord) {
        Octant::Block(block) => block.max_data(coord, scale_desired.min(block.max_scale())),
        Octant::Node(node) => node.max_data(),
    }
}

/// The scalar field value at `coord`, or `None` if the data there is absent
/// or below the validity threshold. "Empty space" and "measured as zero"
/// stay distinguishable.
pub fn field<D: VoxelData>(octree: &Octree<D>, coord: IVec3) -> Option<f32> {
    field_with_hint(octree, None, coord)
}

/// Hinted variant of [`field`].
pub fn field_with_hint<D: VoxelData>(
    octree: &Octree<D>,
    hint: Option<&Block<D>>,
    coord: IVec3,
) -> Option<f32> {
    let data = data_with_hint(octree, hint, coord);
    data.is_valid().then_some(data.field())
}

/// The scalar field value at `coord` no finer than `scale_desired`, plus
/// the scale used. `None` when nothing valid exists on the path.
pub fn field_at_scale<D: VoxelData>(
    octree: &Octree<D>,
    coord: IVec3,
    scale_desired: u8,
) -> Option<(f32, u8)> {
    field_at_scale_with_hint(octree, None, coord, scale_desired)
}

/// Hinted variant of [`field_at_scale`].
pub fn field_at_scale_with_hint<D: VoxelData>(
    octree: &Octree<D>,
    hint: Option<&Block<D>>,
    coord: IVec3,
    scale_desired: u8,
) -> Option<(f32, u8)> {
    let (data, scale) = data_at_scale_with_hint(octree, hint, coord, scale_desired);
    data.is_valid().then_some((data.field(), scale))
}

/// Trilinear blend of `get_value` over the 8 corners bracketing `coord_f`
/// on the scale-`scale` lattice.
///
/// Succeeds only if every corner lies in bounds and holds valid data at
/// exactly this scale; one bad corner poisons the whole stencil so real
/// data is never blended with init values. Corner fetches seed each other
/// as locality hints.
fn interp_at_fixed_scale<D, V, F>(
    octree: &Octree<D>,
    coord_f: Vec3,
    scale: u8,
    get_value: &F,
) -> Option<V>
where
    D: VoxelData,
    V: Copy + Add<Output = V> + Mul<f32, Output = V>,
    F: Fn(&D) -> V,
{
    let stride = 1i32 << scale;
    let lattice = coord_f / stride as f32;
    let base = lattice.floor();
    let t = lattice - base;
    let base_coord = base.as_ivec3() * stride;

    // Per-axis weights, combined multiplicatively per corner.
    let wx = [1.0 - t.x, t.x];
    let wy = [1.0 - t.y, t.y];
    let wz = [1.0 - t.z, t.z];

    let mut hint: Option<&Block<D>> = None;
    let mut acc: Option<V> = None;
    for i in 0..8usize {
        let (cx, cy, cz) = (i & 1, (i >> 1) & 1, (i >> 2) & 1);
        let corner = base_coord + IVec3::new(cx as i32, cy as i32, cz as i32) * stride;
        if !octree.contains(corner) {
            return None;
        }
        let block = fetcher::block_with_hint(octree, hint, corner)?;
        hint = Some(block);
        let data = block.data(corner, scale);
        if !data.is_valid() {
            return None;
        }
        let weight = wx[cx] * wy[cy] * wz[cz];
        let value = get_value(&data) * weight;
        acc = Some(match acc {
            Some(sum) => sum + value,
            None => value,
        });
    }
    acc
}

/// Interpolate a projection of the voxel data at `coord_f`, at the finest
/// scale where all 8 corners are valid. `None` if no scale qualifies.
pub fn interp<D, V, F>(octree: &Octree<D>, coord_f: Vec3, get_value: F) -> Option<V>
where
    D: VoxelData,
    V: Copy + Add<Output = V> + Mul<f32, Output = V>,
    F: Fn(&D) -> V,
{
    interp_at_scale(octree, coord_f, 0, get_value).map(|(value, _)| value)
}

/// Like [`interp`], but never finer than `scale_desired`; reports the scale
/// actually used (the finest at which all 8 corners hold valid data, always
/// `>= scale_desired`).
pub fn interp_at_scale<D, V, F>(
    octree: &Octree<D>,
    coord_f: Vec3,
    scale_desired: u8,
    get_value: F,
) -> Option<(V, u8)>
where
    D: VoxelData,
    V: Copy + Add<Output = V> + Mul<f32, Output = V>,
    F: Fn(&D) -> V,
{
    for scale in scale_desired..=octree.max_block_scale() {
        if let Some(value) = interp_at_fixed_scale(octree, coord_f, scale, &get_value) {
            return Some((value, scale));
        }
    }
    None
}

/// Trilinearly interpolated field value at the fractional coordinate
/// `coord_f`, at the finest scale with data. `None` unless all 8 corners
/// are valid at a common scale.
pub fn field_interp<D: VoxelData>(octree: &Octree<D>, coord_f: Vec3) -> Option<f32> {
    interp(octree, coord_f, |d| d.field())
}

/// Like [`field_interp`], capped to scales no finer than `scale_desired`;
/// reports the scale used.
pub fn field_interp_at_scale<D: VoxelData>(
    octree: &Octree<D>,
    coord_f: Vec3,
    scale_desired: u8,
) -> Option<(f32, u8)> {
    interp_at_scale(octree, coord_f, scale_desired, |d| d.field())
}

/// Central-difference gradient with all six samples interpolated at one
/// fixed scale. Step is one scale-`scale` cell; samples sit half a step to
/// either side per axis.
fn grad_at_fixed_scale<D: VoxelData>(octree: &Octree<D>, coord_f: Vec3, scale: u8) -> Option<Vec3> {
    const AXES: [Vec3; 3] = [Vec3::X, Vec3::Y, Vec3::Z];
    let step = (1i32 << scale) as f32;
    let half_step = 0.5 * step;
    let get_field = |d: &D| d.field();
    let mut grad = [0.0f32; 3];
    for (i, axis) in AXES.iter().enumerate() {
        let offset = *axis * half_step;
        let plus: f32 = interp_at_fixed_scale(octree, coord_f + offset, scale, &get_field)?;
        let minus: f32 = interp_at_fixed_scale(octree, coord_f - offset, scale, &get_field)?;
        grad[i] = (plus - minus) / step;
    }
    Some(Vec3::from_array(grad))
}

/// Central-difference field gradient at `coord_f`, at the finest scale
/// where all six interpolated samples are valid. `None` otherwise: a
/// gradient is only meaningful when every sample comes from one resolution.
pub fn field_grad<D: VoxelData>(octree: &Octree<D>, coord_f: Vec3) -> Option<Vec3> {
    field_grad_at_scale(octree, coord_f, 0).map(|(grad, _)| grad)
}

/// Like [`field_grad`], capped to scales no finer than `scale_desired`;
/// reports the single scale all three axes were computed at (the coarsest
/// any axis needs).
pub fn field_grad_at_scale<D: VoxelData>(
    octree: &Octree<D>,
    coord_f: Vec3,
    scale_desired: u8,
) -> Option<(Vec3, u8)> {
    for scale in scale_desired..=octree.max_block_scale() {
        if let Some(grad) = grad_at_fixed_scale(octree, coord_f, scale) {
            return Some((grad, scale));
        }
    }
    None
}
