//! Block coordinates and inclusive claim boundaries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits in a chunk column edge (16 blocks)
pub const CHUNK_SHIFT: u32 = 4;

/// Integer block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn chunk(&self) -> ChunkKey {
        ChunkKey::containing(self.x, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A 16x16 chunk column, the bucket unit of the spatial index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    pub const fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x >> CHUNK_SHIFT,
            z: block_z >> CHUNK_SHIFT,
        }
    }
}

/// Inclusive axis-aligned boundary. `lesser <= greater` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBounds")]
pub struct Bounds {
    lesser: BlockPos,
    greater: BlockPos,
}

#[derive(Deserialize)]
struct RawBounds {
    lesser: BlockPos,
    greater: BlockPos,
}

impl TryFrom<RawBounds> for Bounds {
    type Error = String;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        let (l, g) = (raw.lesser, raw.greater);
        if l.x > g.x || l.y > g.y || l.z > g.z {
            return Err(format!("lesser corner {} exceeds greater corner {}", l, g));
        }
        Ok(Self {
            lesser: l,
            greater: g,
        })
    }
}

impl Bounds {
    /// Build bounds from any two opposite corners
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            lesser: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            greater: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Build bounds from per-axis coordinate pairs (order within a pair is irrelevant)
    pub fn from_coords(x1: i32, x2: i32, y1: i32, y2: i32, z1: i32, z2: i32) -> Self {
        Self::new(BlockPos::new(x1, y1, z1), BlockPos::new(x2, y2, z2))
    }

    pub const fn lesser(&self) -> BlockPos {
        self.lesser
    }

    pub const fn greater(&self) -> BlockPos {
        self.greater
    }

    pub fn width_x(&self) -> i64 {
        i64::from(self.greater.x) - i64::from(self.lesser.x) + 1
    }

    pub fn height_y(&self) -> i64 {
        i64::from(self.greater.y) - i64::from(self.lesser.y) + 1
    }

    pub fn length_z(&self) -> i64 {
        i64::from(self.greater.z) - i64::from(self.lesser.z) + 1
    }

    /// Surface area of the column footprint
    pub fn area(&self) -> i64 {
        self.width_x() * self.length_z()
    }

    pub fn volume(&self) -> i64 {
        self.area() * self.height_y()
    }

    /// Check whether a point lies inside. Column (non-cuboid) bounds ignore y.
    pub fn contains_point(&self, pos: BlockPos, cuboid: bool) -> bool {
        let column = pos.x >= self.lesser.x
            && pos.x <= self.greater.x
            && pos.z >= self.lesser.z
            && pos.z <= self.greater.z;
        if !cuboid {
            return column;
        }
        column && pos.y >= self.lesser.y && pos.y <= self.greater.y
    }

    /// Check whether `other` lies entirely within these bounds
    pub fn contains_bounds(&self, other: &Bounds, check_y: bool) -> bool {
        self.contains_point(other.lesser, check_y) && self.contains_point(other.greater, check_y)
    }

    /// Interval overlap test. With `check_y` false only the x/z footprint is compared.
    pub fn intersects(&self, other: &Bounds, check_y: bool) -> bool {
        let column = self.lesser.x <= other.greater.x
            && self.greater.x >= other.lesser.x
            && self.lesser.z <= other.greater.z
            && self.greater.z >= other.lesser.z;
        if !check_y {
            return column;
        }
        column && self.lesser.y <= other.greater.y && self.greater.y >= other.lesser.y
    }

    /// Every chunk column touched by these bounds
    pub fn chunks(&self) -> impl Iterator<Item = ChunkKey> + use<> {
        let (low, high) = self.chunk_span();
        (low.x..=high.x).flat_map(move |x| (low.z..=high.z).map(move |z| ChunkKey { x, z }))
    }

    /// Lowest and highest chunk columns touched by these bounds
    pub const fn chunk_span(&self) -> (ChunkKey, ChunkKey) {
        (
            ChunkKey::containing(self.lesser.x, self.lesser.z),
            ChunkKey::containing(self.greater.x, self.greater.z),
        )
    }

    /// Number of chunk columns [`Bounds::chunks`] yields
    pub fn chunk_count(&self) -> u64 {
        let (low, high) = self.chunk_span();
        let span = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1) as u64;
        span(low.x, high.x) * span(low.z, high.z)
    }

    /// Whether `chunk` is one of the columns these bounds touch
    pub fn touches_chunk(&self, chunk: ChunkKey) -> bool {
        let (low, high) = self.chunk_span();
        (low.x..=high.x).contains(&chunk.x) && (low.z..=high.z).contains(&chunk.z)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lesser, self.greater)
    }
}
