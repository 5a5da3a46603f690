//! Reference coverage geometry and its predicate surface
//!
//! `Coverage` wraps the polygon/multipolygon the decomposition classifies tiles
//! against, with the bounding rectangle cached at construction. Construction
//! enforces validity: an invalid geometry silently corrupts every `within`/
//! `intersects` answer downstream, so it is repaired once (self-union) and
//! rejected if the repair does not converge.

use crate::{Rect, Result, TileError};
use geo::{
    BooleanOps, BoundingRect, Contains, Coord, Intersects, MultiPolygon, Point, Polygon, Validation,
};

/// A validity-checked reference geometry with cached bounds
#[derive(Clone, Debug)]
pub struct Coverage {
    geom: MultiPolygon<f64>,
    bounds: Rect,
}

impl Coverage {
    /// Wrap a multipolygon, repairing it if it is invalid
    ///
    /// A single self-union repair attempt is made (the zero-width-buffer
    /// analogue); if the result is still invalid the coverage is rejected.
    pub fn new(geom: MultiPolygon<f64>) -> Result<Self> {
        if geom.0.is_empty() {
            return Err(TileError::EmptyCoverage);
        }

        let geom = if geom.is_valid() {
            geom
        } else {
            tracing::warn!("coverage geometry is invalid, attempting self-union repair");
            let repaired = geom.union(&geom);
            if !repaired.is_valid() {
                return Err(TileError::InvalidCoverage(
                    "geometry is invalid and self-union repair did not converge".to_string(),
                ));
            }
            repaired
        };

        let bbox = geom.bounding_rect().ok_or(TileError::EmptyCoverage)?;
        let bounds = Rect::from_extents(bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y)
            .map_err(|_| {
                TileError::InvalidCoverage(format!(
                    "coverage bounds are degenerate: ({}, {}) - ({}, {})",
                    bbox.min().x,
                    bbox.min().y,
                    bbox.max().x,
                    bbox.max().y
                ))
            })?;

        Ok(Self { geom, bounds })
    }

    /// Wrap a list of polygons (e.g. one coverage feature per polygon)
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Result<Self> {
        Self::new(MultiPolygon::new(polygons))
    }

    /// Bounding rectangle, cached at construction
    #[inline]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The wrapped geometry
    #[inline]
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geom
    }

    /// Is the tile rectangle fully contained in the coverage?
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        self.geom.contains(&rect.to_polygon())
    }

    /// Does the tile rectangle intersect the coverage (exact predicate)?
    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.geom.intersects(&rect.to_polygon())
    }

    /// Is the point on or inside the coverage?
    ///
    /// Boundary points count: raster masking keeps pixels whose center lands
    /// exactly on the coverage boundary.
    pub fn contains_point(&self, point: Coord<f64>) -> bool {
        self.geom.intersects(&Point::from(point))
    }

    /// Exact intersection of the coverage with a tile rectangle
    ///
    /// May be empty when the rectangle only touches the coverage boundary.
    pub fn clip(&self, rect: &Rect) -> MultiPolygon<f64> {
        self.geom
            .intersection(&MultiPolygon::new(vec![rect.to_polygon()]))
    }
}
