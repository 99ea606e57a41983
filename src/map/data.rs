//! Per-voxel field data: TSDF and occupancy cells.
//!
//! The storage layer is generic over the field kind. A cell packs into a
//! single `u64` so blocks can keep it in an `AtomicU64` slot: concurrent
//! readers never observe a half-written cell, only an older or newer one.

use bytemuck::{Pod, Zeroable};

/// The physical quantity a map stores per voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Truncated signed distance to the nearest surface.
    Tsdf,
    /// Occupancy probability in log-odds form.
    Occupancy,
}

/// Block storage layout, fixed at octree construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Blocks store scale 0 only.
    Single,
    /// Blocks store the full scale pyramid (8³ down to 1³).
    Multi,
}

/// A per-voxel cell stored by a [`Block`](crate::map::Block).
///
/// `is_valid` distinguishes "measured" from "empty/unknown": a cell whose
/// accumulated weight is below the field's threshold must not be confused
/// with a cell measured as zero.
pub trait VoxelData: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Field kind stored by this cell type.
    const FIELD: FieldKind;

    /// Whether blocks keep a per-scale max aggregate alongside the mean.
    /// Used by occupancy maps for conservative raycast pruning.
    const STORES_MAX: bool;

    /// Pack the cell into one word for atomic storage.
    fn pack(self) -> u64;

    /// Inverse of [`pack`](VoxelData::pack).
    fn unpack(bits: u64) -> Self;

    /// Scalar field projection (signed distance or log-odds).
    fn field(&self) -> f32;

    /// Whether enough observations have accumulated for the value to be used.
    fn is_valid(&self) -> bool;

    /// Coarsening rule: one value summarizing a 2x2x2 child neighbourhood.
    fn aggregate(children: &[Self]) -> Self;

    /// Conservative upper-bound summary of a 2x2x2 child neighbourhood.
    fn max_aggregate(children: &[Self]) -> Self {
        Self::aggregate(children)
    }
}

/// Marker for field kinds that maintain per-scale max aggregates.
pub trait MaxVoxelData: VoxelData {}

/// Signed-distance cell: distance estimate plus accumulated fusion weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TsdfData {
    /// Truncated signed distance estimate, in units of the truncation band.
    pub dist: f32,
    /// Accumulated observation weight; zero means never observed.
    pub weight: f32,
}

impl TsdfData {
    /// Distance assigned to unobserved space (the far end of the band).
    pub const INIT_DIST: f32 = 1.0;

    pub fn new(dist: f32, weight: f32) -> Self {
        Self { dist, weight }
    }
}

impl Default for TsdfData {
    fn default() -> Self {
        Self {
            dist: Self::INIT_DIST,
            weight: 0.0,
        }
    }
}

impl VoxelData for TsdfData {
    const FIELD: FieldKind = FieldKind::Tsdf;
    const STORES_MAX: bool = false;

    #[inline]
    fn pack(self) -> u64 {
        ((self.dist.to_bits() as u64) << 32) | self.weight.to_bits() as u64
    }

    #[inline]
    fn unpack(bits: u64) -> Self {
        Self {
            dist: f32::from_bits((bits >> 32) as u32),
            weight: f32::from_bits(bits as u32),
        }
    }

    #[inline]
    fn field(&self) -> f32 {
        self.dist
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.weight > 0.0
    }

    fn aggregate(children: &[Self]) -> Self {
        let mut dist_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut count = 0u32;
        for c in children {
            if c.is_valid() {
                dist_sum += c.dist;
                weight_sum += c.weight;
                count += 1;
            }
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            dist: dist_sum / count as f32,
            weight: weight_sum / count as f32,
        }
    }
}

/// Occupancy cell: log-odds estimate plus accumulated observation weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct OccupancyData {
    /// Occupancy in log-odds; zero is unknown, positive is occupied.
    pub log_odds: f32,
    /// Accumulated observation weight; zero means never observed.
    pub weight: f32,
}

impl OccupancyData {
    pub fn new(log_odds: f32, weight: f32) -> Self {
        Self { log_odds, weight }
    }
}

impl VoxelData for OccupancyData {
    const FIELD: FieldKind = FieldKind::Occupancy;
    const STORES_MAX: bool = true;

    #[inline]
    fn pack(self) -> u64 {
        ((self.log_odds.to_bits() as u64) << 32) | self.weight.to_bits() as u64
    }

    #[inline]
    fn unpack(bits: u64) -> Self {
        Self {
            log_odds: f32::from_bits((bits >> 32) as u32),
            weight: f32::from_bits(bits as u32),
        }
    }

    #[inline]
    fn field(&self) -> f32 {
        self.log_odds
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.weight > 0.0
    }

    fn aggregate(children: &[Self]) -> Self {
        let mut odds_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut count = 0u32;
        for c in children {
            if c.is_valid() {
                odds_sum += c.log_odds;
                weight_sum += c.weight;
                count += 1;
            }
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            log_odds: odds_sum / count as f32,
            weight: weight_sum / count as f32,
        }
    }

    fn max_aggregate(children: &[Self]) -> Self {
        let mut max: Option<Self> = None;
        for c in children {
            if !c.is_valid() {
                continue;
            }
            match max {
                Some(m) if m.log_odds >= c.log_odds => {}
                _ => max = Some(*c),
            }
        }
        max.unwrap_or_default()
    }
}

impl MaxVoxelData for OccupancyData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsdf_pack_roundtrip() {
        let d = TsdfData::new(-0.25, 3.5);
        assert_eq!(TsdfData::unpack(d.pack()), d);
    }

    #[test]
    fn test_occupancy_pack_roundtrip() {
        let d = OccupancyData::new(2.5, 7.0);
        assert_eq!(OccupancyData::unpack(d.pack()), d);
    }

    #[test]
    fn test_init_data_is_invalid() {
        assert!(!TsdfData::default().is_valid());
        assert!(!OccupancyData::default().is_valid());
        assert_eq!(TsdfData::default().dist, TsdfData::INIT_DIST);
    }

    #[test]
    fn test_tsdf_aggregate_means_valid_children() {
        let mut children = [TsdfData::default(); 8];
        children[0] = TsdfData::new(1.0, 2.0);
        children[1] = TsdfData::new(-1.0, 4.0);
        let agg = TsdfData::aggregate(&children);
        assert!(agg.is_valid());
        assert!((agg.dist - 0.0).abs() < 1e-6);
        assert!((agg.weight - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_of_unobserved_is_init() {
        let children = [TsdfData::default(); 8];
        assert_eq!(TsdfData::aggregate(&children), TsdfData::default());
    }

    #[test]
    fn test_occupancy_max_aggregate() {
        let mut children = [OccupancyData::default(); 8];
        children[2] = OccupancyData::new(-1.0, 1.0);
        children[5] = OccupancyData::new(3.0, 2.0);
        let max = OccupancyData::max_aggregate(&children);
        assert_eq!(max, children[5]);
    }

    #[test]
    fn test_occupancy_max_aggregate_ignores_invalid() {
        let mut children = [OccupancyData::default(); 8];
        // Higher log-odds but zero weight must not win.
        children[0] = OccupancyData::new(10.0, 0.0);
        children[1] = OccupancyData::new(1.0, 1.0);
        let max = OccupancyData::max_aggregate(&children);
        assert_eq!(max, children[1]);
    }
}
