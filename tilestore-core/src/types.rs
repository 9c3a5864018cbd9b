//! Core types for the tile store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zoom level of a tile, valid range 0..=31
pub type ZoomLevel = u8;

/// Lowest representable zoom level
pub const MIN_ZOOM_LEVEL: ZoomLevel = 0;

/// Highest representable zoom level
pub const MAX_ZOOM_LEVEL: ZoomLevel = 31;

/// Number of representable zoom levels
pub const ZOOM_LEVELS_COUNT: usize = 32;

/// Check that a zoom value fits the representable range
pub fn is_valid_zoom(zoom: i64) -> bool {
    (i64::from(MIN_ZOOM_LEVEL)..=i64::from(MAX_ZOOM_LEVEL)).contains(&zoom)
}

/// Tile cell address within one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub x: i32,
    pub y: i32,
}

impl TileId {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

/// Full logical address of a tile payload
///
/// `specification` discriminates multiple payload sets sharing one
/// geographic cell; `0` means "none". It participates in lookups only on
/// stores opened with specification support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
    pub zoom: ZoomLevel,
    pub specification: i64,
}

impl TileKey {
    /// Create a key with no specification
    pub fn new(x: i32, y: i32, zoom: ZoomLevel) -> Self {
        Self {
            x,
            y,
            zoom,
            specification: 0,
        }
    }

    /// Attach a specification discriminator
    pub fn with_specification(mut self, specification: i64) -> Self {
        self.specification = specification;
        self
    }

    pub fn tile_id(&self) -> TileId {
        TileId::new(self.x, self.y)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.specification != 0 {
            write!(f, "{}x{}@{}#{}", self.x, self.y, self.zoom, self.specification)
        } else {
            write!(f, "{}x{}@{}", self.x, self.y, self.zoom)
        }
    }
}

/// A stored tile payload with its optional freshness time
///
/// `time` is milliseconds since the Unix epoch; `None` means the row was
/// written before time support was enabled, which is distinct from 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    pub data: Vec<u8>,
    pub time: Option<i64>,
}

impl TileRecord {
    pub fn new(data: Vec<u8>, time: Option<i64>) -> Self {
        Self { data, time }
    }
}

/// Axis-aligned box in the 31-bit quantized global tile-coordinate space
///
/// `2^31` spans the full map width, so geometry at any zoom can be compared
/// in one shared integer space by shifting tile coordinates left by
/// `31 - zoom`. An empty box is represented as `Option::<BBox31>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox31 {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl BBox31 {
    pub fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Quantize the tile span `[min_x..=max_x] x [min_y..=max_y]` at `zoom`
    /// into the shared 31-bit space.
    pub fn from_tile_span(zoom: ZoomLevel, min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        let shift = u32::from(31 - zoom);
        Self {
            top: (i64::from(min_y) << shift) as i32,
            left: (i64::from(min_x) << shift) as i32,
            bottom: (((i64::from(max_y) + 1) << shift) - 1) as i32,
            right: (((i64::from(max_x) + 1) << shift) - 1) as i32,
        }
    }

    /// Smallest box covering both `self` and `other`
    pub fn enlarged_to_include(&self, other: &BBox31) -> Self {
        Self {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }

    /// Union of two possibly-empty boxes
    pub fn union(a: Option<BBox31>, b: Option<BBox31>) -> Option<BBox31> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.enlarged_to_include(&b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }
}

impl fmt::Display for BBox31 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.top, self.left, self.bottom, self.right
        )
    }
}
