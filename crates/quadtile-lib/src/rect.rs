//! Axis-aligned tile rectangle primitive
//!
//! Rectangles are immutable: subdivision always produces four new rectangles and
//! never mutates an existing one. All tile geometry in the crate is built from
//! this type; conversion to a [`geo::Polygon`] hands tiles off to the exact
//! geometric predicates.

use crate::{Result, TileError};
use geo::{Coord, LineString, Polygon};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rectangle centred at `(cx, cy)` with positive width and height
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect {
    cx: f64,
    cy: f64,
    width: f64,
    height: f64,
}

impl Rect {
    /// Create a rectangle from its center and side lengths
    ///
    /// Returns an error unless `width > 0 && height > 0`.
    pub fn new(cx: f64, cy: f64, width: f64, height: f64) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(TileError::DegenerateExtent(format!(
                "rectangle sides must be positive and finite, got {width} x {height}"
            )));
        }
        Ok(Self {
            cx,
            cy,
            width,
            height,
        })
    }

    /// Create a rectangle from its corner extents
    pub fn from_extents(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let width = max_x - min_x;
        let height = max_y - min_y;
        Self::new(min_x + width / 2.0, min_y + height / 2.0, width, height)
    }

    /// Internal constructor for values already known to be valid
    /// (halves of positive sides, unions of valid rectangles).
    fn from_extents_unchecked(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let width = max_x - min_x;
        let height = max_y - min_y;
        Self {
            cx: min_x + width / 2.0,
            cy: min_y + height / 2.0,
            width,
            height,
        }
    }

    #[inline]
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: self.cx,
            y: self.cy,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.cx - self.width / 2.0
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.cx + self.width / 2.0
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.cy - self.height / 2.0
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.cy + self.height / 2.0
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// The common side length of a square rectangle
    ///
    /// Tiles produced by subdivision of a square root extent are always square;
    /// a non-square rectangle reaching a square-only code path indicates an
    /// upstream extent-computation bug and is surfaced as an error.
    pub fn side(&self) -> Result<f64> {
        if self.width != self.height {
            return Err(TileError::DegenerateExtent(format!(
                "expected a square tile, got {} x {}",
                self.width, self.height
            )));
        }
        Ok(self.width)
    }

    /// Is the point inside this rectangle?
    ///
    /// Half-open on both axes (min inclusive, max exclusive) so that a point on
    /// a shared edge belongs to exactly one of two adjacent tiles.
    #[inline]
    pub fn contains(&self, point: Coord<f64>) -> bool {
        point.x >= self.min_x()
            && point.x < self.max_x()
            && point.y >= self.min_y()
            && point.y < self.max_y()
    }

    /// Do the interiors of the two rectangles overlap?
    ///
    /// Separating-axis test over open intervals: rectangles that merely share
    /// an edge or corner do not intersect. The bounding-box pre-filter of the
    /// decomposition relies on this so that tiles edge-adjacent to the coverage
    /// bounds are discarded instead of recursed into.
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() < other.max_x()
            && self.max_x() > other.min_x()
            && self.min_y() < other.max_y()
            && self.max_y() > other.min_y()
    }

    /// Convert to a closed 4-vertex polygon (NW, NE, SE, SW ring)
    pub fn to_polygon(&self) -> Polygon<f64> {
        let (min_x, min_y, max_x, max_y) = (self.min_x(), self.min_y(), self.max_x(), self.max_y());
        Polygon::new(
            LineString::from(vec![
                (min_x, max_y),
                (max_x, max_y),
                (max_x, min_y),
                (min_x, min_y),
                (min_x, max_y),
            ]),
            vec![],
        )
    }

    /// Subdivide into the four quadrants, in NW, NE, SE, SW order
    ///
    /// The quadrants share the exact midpoint edges, so they tile this
    /// rectangle with no gap or overlap and their areas sum to its area.
    pub fn quadrants(&self) -> [Rect; 4] {
        let (min_x, min_y, max_x, max_y) = (self.min_x(), self.min_y(), self.max_x(), self.max_y());
        let mid_x = min_x + (max_x - min_x) / 2.0;
        let mid_y = min_y + (max_y - min_y) / 2.0;
        [
            Self::from_extents_unchecked(min_x, mid_y, mid_x, max_y), // NW
            Self::from_extents_unchecked(mid_x, mid_y, max_x, max_y), // NE
            Self::from_extents_unchecked(mid_x, min_y, max_x, mid_y), // SE
            Self::from_extents_unchecked(min_x, min_y, mid_x, mid_y), // SW
        ]
    }

    /// Smallest rectangle covering both `self` and `other`
    pub fn expand(&self, other: &Rect) -> Rect {
        Self::from_extents_unchecked(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}, {:.2})",
            self.min_x(),
            self.min_y(),
            self.max_x(),
            self.max_y()
        )
    }
}
