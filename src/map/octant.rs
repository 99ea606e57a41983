//! Octree octants: routing nodes and data-bearing leaf blocks.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use glam::IVec3;

use super::data::{Resolution, VoxelData};

/// Voxels per block edge at scale 0.
pub const BLOCK_DIM: u32 = 8;

/// Coarsest block scale: the 8³ grid aggregated down to a single cell.
pub const MAX_BLOCK_SCALE: u8 = BLOCK_DIM.trailing_zeros() as u8;

/// State shared by nodes and blocks: identity plus writer bookkeeping.
///
/// `coord` and `size` are fixed at construction; a child's coordinate is a
/// pure function of its parent's coordinate, size and child index.
#[derive(Debug)]
pub struct OctantInfo {
    coord: IVec3,
    size: u32,
    time_stamp: AtomicU64,
    active: AtomicBool,
}

impl OctantInfo {
    fn new(coord: IVec3, size: u32) -> Self {
        Self {
            coord,
            size,
            time_stamp: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Voxel coordinate of the octant's minimal corner.
    #[inline]
    pub fn coord(&self) -> IVec3 {
        self.coord
    }

    /// Edge length in voxels.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether `coord` falls inside this octant's extent.
    #[inline]
    pub fn contains(&self, coord: IVec3) -> bool {
        let rel = coord - self.coord;
        rel.cmpge(IVec3::ZERO).all() && rel.cmplt(IVec3::splat(self.size as i32)).all()
    }

    /// Last-touched stamp written by the allocator and integrators.
    /// Bookkeeping only, never used for read correctness.
    pub fn time_stamp(&self) -> u64 {
        self.time_stamp.load(Ordering::Relaxed)
    }

    /// Raise the last-touched stamp. Monotone: an older stamp never wins.
    pub fn touch(&self, stamp: u64) {
        self.time_stamp.fetch_max(stamp, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Liveness flag for maintenance layers (active-region tracking).
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }
}

/// A tree octant: either a routing [`Node`] or a data-bearing [`Block`].
#[derive(Debug)]
pub enum Octant<D: VoxelData> {
    Node(Node<D>),
    Block(Block<D>),
}

impl<D: VoxelData> Octant<D> {
    pub fn info(&self) -> &OctantInfo {
        match self {
            Octant::Node(n) => n.info(),
            Octant::Block(b) => b.info(),
        }
    }

    /// Whether this octant is a data-bearing leaf.
    pub fn is_block(&self) -> bool {
        matches!(self, Octant::Block(_))
    }

    pub fn as_node(&self) -> Option<&Node<D>> {
        match self {
            Octant::Node(n) => Some(n),
            Octant::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block<D>> {
        match self {
            Octant::Node(_) => None,
            Octant::Block(b) => Some(b),
        }
    }
}

/// Internal octant routing to up to eight children.
///
/// A child slot is a `OnceLock`: installation is construct-then-publish, at
/// most one creator ever wins a slot, and a reader either sees no child or a
/// fully built one. Child presence is implicit in the slot being set, so
/// there is no separate bitmask to fall out of sync.
#[derive(Debug)]
pub struct Node<D: VoxelData> {
    info: OctantInfo,
    children: [OnceLock<Box<Octant<D>>>; 8],
    /// Packed subtree aggregate, the coarse fallback for multi-res queries.
    data: AtomicU64,
    /// Packed max aggregate, maintained for occupancy fields.
    max_data: AtomicU64,
}

impl<D: VoxelData> Node<D> {
    pub(crate) fn new(coord: IVec3, size: u32) -> Self {
        debug_assert!(size.is_power_of_two() && size > BLOCK_DIM);
        let init = D::default().pack();
        Self {
            info: OctantInfo::new(coord, size),
            children: std::array::from_fn(|_| OnceLock::new()),
            data: AtomicU64::new(init),
            max_data: AtomicU64::new(init),
        }
    }

    #[inline]
    pub fn info(&self) -> &OctantInfo {
        &self.info
    }

    #[inline]
    pub fn coord(&self) -> IVec3 {
        self.info.coord
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.info.size
    }

    /// Index of the child half-space owning `coord`, one bit per axis.
    #[inline]
    pub fn child_index(&self, coord: IVec3) -> u8 {
        debug_assert!(self.info.contains(coord));
        let half = (self.info.size / 2) as i32;
        ((coord.x & half != 0) as u8)
            | (((coord.y & half != 0) as u8) << 1)
            | (((coord.z & half != 0) as u8) << 2)
    }

    /// Minimal corner of the child at `idx`.
    #[inline]
    pub fn child_coord(&self, idx: u8) -> IVec3 {
        debug_assert!(idx < 8);
        let half = (self.info.size / 2) as i32;
        self.info.coord
            + IVec3::new(
                (idx & 1) as i32,
                ((idx >> 1) & 1) as i32,
                ((idx >> 2) & 1) as i32,
            ) * half
    }

    /// The child at `idx`, or `None` if it was never allocated.
    #[inline]
    pub fn child(&self, idx: u8) -> Option<&Octant<D>> {
        self.children[idx as usize].get().map(|c| c.as_ref())
    }

    /// The child at `idx`, creating it with `make` if absent.
    ///
    /// Racing creators serialize on this slot only; exactly one `make` runs
    /// and every caller observes the same child.
    pub(crate) fn child_or_insert(&self, idx: u8, make: impl FnOnce() -> Octant<D>) -> &Octant<D> {
        self.children[idx as usize].get_or_init(|| Box::new(make()))
    }

    /// 8-bit presence set, bit i set iff child i exists. Derived from the
    /// child slots on demand.
    pub fn children_mask(&self) -> u8 {
        let mut mask = 0u8;
        for (i, slot) in self.children.iter().enumerate() {
            if slot.get().is_some() {
                mask |= 1 << i;
            }
        }
        mask
    }

    /// Number of existing children.
    pub fn child_count(&self) -> u8 {
        self.children_mask().count_ones() as u8
    }

    /// Representative value for the whole subtree, written by integrators
    /// during up-propagation.
    pub fn data(&self) -> D {
        D::unpack(self.data.load(Ordering::Relaxed))
    }

    pub fn set_data(&self, data: D) {
        self.data.store(data.pack(), Ordering::Relaxed);
    }

    /// Max-field bound for the whole subtree (occupancy maps).
    pub fn max_data(&self) -> D {
        D::unpack(self.max_data.load(Ordering::Relaxed))
    }

    pub fn set_max_data(&self, data: D) {
        self.max_data.store(data.pack(), Ordering::Relaxed);
    }
}

/// Cells for one resolution level of a block.
#[derive(Debug)]
struct ScaleLevel {
    data: Box<[AtomicU64]>,
    /// Max aggregates, allocated for occupancy fields at scales >= 1.
    max: Option<Box<[AtomicU64]>>,
}

/// Leaf octant owning an 8x8x8 voxel grid, optionally with coarser mip
/// scales. Scale 0 is the authoritative per-voxel data; each coarser scale
/// summarizes a 2x2x2 neighbourhood of the level below.
#[derive(Debug)]
pub struct Block<D: VoxelData> {
    info: OctantInfo,
    scales: Vec<ScaleLevel>,
    _marker: std::marker::PhantomData<D>,
}

impl<D: VoxelData> Block<D> {
    pub(crate) fn new(coord: IVec3, resolution: Resolution) -> Self {
        let max_scale = match resolution {
            Resolution::Single => 0,
            Resolution::Multi => MAX_BLOCK_SCALE,
        };
        let init = D::default().pack();
        let scales = (0..=max_scale)
            .map(|s| {
                let dim = (BLOCK_DIM >> s) as usize;
                let len = dim * dim * dim;
                ScaleLevel {
                    data: (0..len).map(|_| AtomicU64::new(init)).collect(),
                    max: (D::STORES_MAX && s > 0)
                        .then(|| (0..len).map(|_| AtomicU64::new(init)).collect()),
                }
            })
            .collect();
        Self {
            info: OctantInfo::new(coord, BLOCK_DIM),
            scales,
            _marker: std::marker::PhantomData,
        }
    }

    #[inline]
    pub fn info(&self) -> &OctantInfo {
        &self.info
    }

    #[inline]
    pub fn coord(&self) -> IVec3 {
        self.info.coord
    }

    /// Coarsest scale this block stores (0 for single-resolution maps).
    #[inline]
    pub fn max_scale(&self) -> u8 {
        (self.scales.len() - 1) as u8
    }

    /// Whether `coord` falls inside this block's extent. The fast-path test
    /// for locality-hinted fetches.
    #[inline]
    pub fn contains(&self, coord: IVec3) -> bool {
        self.info.contains(coord)
    }

    /// Flat cell index of `coord` at `scale`.
    #[inline]
    fn cell_index(&self, coord: IVec3, scale: u8) -> usize {
        debug_assert!(self.info.contains(coord));
        debug_assert!(scale <= self.max_scale());
        let rel = coord - self.info.coord;
        let dim = (BLOCK_DIM >> scale) as usize;
        let x = (rel.x as usize) >> scale;
        let y = (rel.y as usize) >> scale;
        let z = (rel.z as usize) >> scale;
        x + dim * (y + dim * z)
    }

    /// Cell value at `coord` and `scale`. Any voxel coordinate inside the
    /// scale-`scale` cell addresses the same value.
    #[inline]
    pub fn data(&self, coord: IVec3, scale: u8) -> D {
        let idx = self.cell_index(coord, scale);
        D::unpack(self.scales[scale as usize].data[idx].load(Ordering::Relaxed))
    }

    /// Store a cell value. A single atomic store: readers see the old value
    /// or the new one, never a mix.
    #[inline]
    pub fn set_data(&self, coord: IVec3, scale: u8, data: D) {
        let idx = self.cell_index(coord, scale);
        self.scales[scale as usize].data[idx].store(data.pack(), Ordering::Relaxed);
    }

    /// Max-aggregate cell at `coord` and `scale`. At scale 0 the max is the
    /// data itself; fields without max storage read back their mean data.
    #[inline]
    pub fn max_data(&self, coord: IVec3, scale: u8) -> D {
        let idx = self.cell_index(coord, scale);
        match &self.scales[scale as usize].max {
            Some(max) => D::unpack(max[idx].load(Ordering::Relaxed)),
            None => self.data(coord, scale),
        }
    }

    /// Store a max-aggregate cell. No-op unless the field keeps max storage
    /// at this scale.
    #[inline]
    pub fn set_max_data(&self, coord: IVec3, scale: u8, data: D) {
        let idx = self.cell_index(coord, scale);
        if let Some(max) = &self.scales[scale as usize].max {
            max[idx].store(data.pack(), Ordering::Relaxed);
        }
    }

    /// Recompute every coarser scale from the scale below it, applying the
    /// field's mean and max coarsening rules. Called by writers after a
    /// batch of scale-0 updates.
    pub fn update_aggregates(&self) {
        for scale in 1..=self.max_scale() {
            let dim = BLOCK_DIM >> scale;
            let stride = 1i32 << scale;
            let child_stride = stride / 2;
            for z in 0..dim as i32 {
                for y in 0..dim as i32 {
                    for x in 0..dim as i32 {
                        let cell = self.info.coord + IVec3::new(x, y, z) * stride;
                        let mut vals = [D::default(); 8];
                        for (i, v) in vals.iter_mut().enumerate() {
                            let off = IVec3::new(
                                (i & 1) as i32,
                                ((i >> 1) & 1) as i32,
                                ((i >> 2) & 1) as i32,
                            );
                            *v = self.data(cell + off * child_stride, scale - 1);
                        }
                        self.set_data(cell, scale, D::aggregate(&vals));
                        if D::STORES_MAX {
                            let mut maxes = [D::default(); 8];
                            for (i, v) in maxes.iter_mut().enumerate() {
                                let off = IVec3::new(
                                    (i & 1) as i32,
                                    ((i >> 1) & 1) as i32,
                                    ((i >> 2) & 1) as i32,
                                );
                                *v = self.max_data(cell + off * child_stride, scale - 1);
                            }
                            self.set_max_data(cell, scale, D::max_aggregate(&maxes));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::data::{OccupancyData, TsdfData};

    #[test]
    fn test_child_index_and_coord() {
        let node: Node<TsdfData> = Node::new(IVec3::ZERO, 16);
        assert_eq!(node.child_index(IVec3::new(0, 0, 0)), 0);
        assert_eq!(node.child_index(IVec3::new(8, 0, 0)), 1);
        assert_eq!(node.child_index(IVec3::new(0, 8, 0)), 2);
        assert_eq!(node.child_index(IVec3::new(7, 7, 15)), 4);
        assert_eq!(node.child_index(IVec3::new(15, 15, 15)), 7);

        assert_eq!(node.child_coord(0), IVec3::ZERO);
        assert_eq!(node.child_coord(1), IVec3::new(8, 0, 0));
        assert_eq!(node.child_coord(6), IVec3::new(0, 8, 8));
    }

    #[test]
    fn test_child_coord_owns_child_index() {
        let node: Node<TsdfData> = Node::new(IVec3::new(16, 0, 16), 16);
        for idx in 0..8 {
            assert_eq!(node.child_index(node.child_coord(idx)), idx);
        }
    }

    #[test]
    fn test_children_mask_tracks_slots() {
        let node: Node<TsdfData> = Node::new(IVec3::ZERO, 32);
        assert_eq!(node.children_mask(), 0);

        node.child_or_insert(3, || Octant::Node(Node::new(node.child_coord(3), 16)));
        node.child_or_insert(7, || Octant::Node(Node::new(node.child_coord(7), 16)));

        assert_eq!(node.children_mask(), (1 << 3) | (1 << 7));
        assert_eq!(node.child_count(), 2);
        assert!(node.child(3).is_some());
        assert!(node.child(0).is_none());
    }

    #[test]
    fn test_child_or_insert_single_winner() {
        let node: Node<TsdfData> = Node::new(IVec3::ZERO, 16);
        let first = node.child_or_insert(2, || Octant::Block(Block::new(node.child_coord(2), Resolution::Single)));
        let second = node.child_or_insert(2, || panic!("slot already occupied"));
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_touch_is_monotone() {
        let info = OctantInfo::new(IVec3::ZERO, 8);
        info.touch(5);
        info.touch(3);
        assert_eq!(info.time_stamp(), 5);
        info.touch(9);
        assert_eq!(info.time_stamp(), 9);
    }

    #[test]
    fn test_block_cell_roundtrip() {
        let block: Block<TsdfData> = Block::new(IVec3::new(8, 8, 8), Resolution::Multi);
        assert_eq!(block.max_scale(), MAX_BLOCK_SCALE);

        let c = IVec3::new(10, 8, 15);
        assert!(block.contains(c));
        assert!(!block.contains(IVec3::new(16, 8, 8)));

        let v = TsdfData::new(-0.5, 2.0);
        block.set_data(c, 0, v);
        assert_eq!(block.data(c, 0), v);
        // Neighbouring voxel untouched.
        assert_eq!(block.data(IVec3::new(11, 8, 15), 0), TsdfData::default());
    }

    #[test]
    fn test_block_scale_cells_alias_neighbourhoods() {
        let block: Block<TsdfData> = Block::new(IVec3::ZERO, Resolution::Multi);
        let v = TsdfData::new(0.25, 1.0);
        block.set_data(IVec3::new(0, 0, 0), 1, v);
        // All eight voxels of the 2x2x2 cell read the same scale-1 value.
        assert_eq!(block.data(IVec3::new(1, 1, 1), 1), v);
        assert_eq!(block.data(IVec3::new(2, 0, 0), 1), TsdfData::default());
    }

    #[test]
    fn test_single_resolution_block_has_one_scale() {
        let block: Block<TsdfData> = Block::new(IVec3::ZERO, Resolution::Single);
        assert_eq!(block.max_scale(), 0);
    }

    #[test]
    fn test_update_aggregates_mean_and_max() {
        let block: Block<OccupancyData> = Block::new(IVec3::ZERO, Resolution::Multi);
        // Two observed voxels in the first 2x2x2 neighbourhood.
        block.set_data(IVec3::new(0, 0, 0), 0, OccupancyData::new(2.0, 1.0));
        block.set_data(IVec3::new(1, 0, 0), 0, OccupancyData::new(4.0, 1.0));
        block.update_aggregates();

        let mean = block.data(IVec3::new(0, 0, 0), 1);
        assert!((mean.log_odds - 3.0).abs() < 1e-6);

        let max = block.max_data(IVec3::new(0, 0, 0), 1);
        assert!((max.log_odds - 4.0).abs() < 1e-6);

        // The coarsest cell summarizes the whole block.
        let top = block.max_data(IVec3::new(7, 7, 7), MAX_BLOCK_SCALE);
        assert!((top.log_odds - 4.0).abs() < 1e-6);

        // Untouched neighbourhoods stay unobserved.
        assert!(!block.data(IVec3::new(4, 4, 4), 1).is_valid());
    }

    #[test]
    fn test_max_data_at_scale_zero_is_data() {
        let block: Block<OccupancyData> = Block::new(IVec3::ZERO, Resolution::Multi);
        let v = OccupancyData::new(1.5, 1.0);
        block.set_data(IVec3::new(3, 3, 3), 0, v);
        assert_eq!(block.max_data(IVec3::new(3, 3, 3), 0), v);
    }
}
