//! Raster materialization: per-tile window extraction and mosaic merge
//!
//! Each terminal tile maps to a pixel-space window of a source raster through
//! the raster's affine geotransform. Windows carry a fixed pixel buffer on
//! every side so floating-point round-off can never open seams between
//! adjacent tiles; the merge step reconciles the resulting overlaps
//! deterministically (last write wins on non-nodata pixels), which makes the
//! merge idempotent.
//!
//! File codecs stay outside this crate: sources implement [`RasterSource`]
//! (boundless single-band reads) and the merge produces an in-memory
//! [`GridRaster`] carrying its own geotransform.

use crate::{Classification, Coverage, Rect, Result, TerminalRecord, TileError};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed buffer added to every side of a tile window, in pixels
pub const WINDOW_BUFFER_PX: i64 = 5;

/// Rasterio-style affine geotransform
///
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`; for north-up rasters
/// `a` is the pixel width, `e` the negative pixel height, `(c, f)` the
/// upper-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform anchored at the upper-left corner
    pub fn from_origin(west: f64, north: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, west, 0.0, -pixel_height, north)
    }

    /// World coordinates of a (fractional) pixel position
    #[inline]
    pub fn xy(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Pixel position containing a world coordinate (floored, rasterio-style)
    pub fn rowcol(&self, x: f64, y: f64) -> Result<(i64, i64)> {
        let (col, row) = self.solve(x, y)?;
        Ok((row.floor() as i64, col.floor() as i64))
    }

    /// Invert the transform for a world coordinate (fractional pixel position)
    fn solve(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 {
            return Err(TileError::DegenerateExtent(
                "raster geotransform is singular".to_string(),
            ));
        }
        let dx = x - self.c;
        let dy = y - self.f;
        let col = (self.e * dx - self.b * dy) / det;
        let row = (-self.d * dx + self.a * dy) / det;
        Ok((col, row))
    }

    /// The transform of a window within this raster
    pub fn window_transform(&self, window: &PixelWindow) -> Affine {
        let (x, y) = self.xy(window.col_off as f64, window.row_off as f64);
        Affine {
            c: x,
            f: y,
            ..*self
        }
    }

    /// Integer pixel shift of another transform's origin within this grid
    ///
    /// Errors when the grids differ in pixel size/rotation or the origins are
    /// not an integer number of pixels apart.
    fn pixel_shift(&self, other: &Affine) -> Result<(i64, i64)> {
        let aligned = self.a == other.a && self.b == other.b && self.d == other.d && self.e == other.e;
        if !aligned {
            return Err(TileError::MergeMismatch {
                reason: "tile pixel grids differ in size or rotation".to_string(),
            });
        }
        let (col, row) = self.solve(other.c, other.f)?;
        let (col_round, row_round) = (col.round(), row.round());
        if (col - col_round).abs() > 1e-6 || (row - row_round).abs() > 1e-6 {
            return Err(TileError::MergeMismatch {
                reason: format!("tile origin is off the mosaic pixel grid by ({col}, {row})"),
            });
        }
        Ok((row_round as i64, col_round as i64))
    }
}

/// A pixel-space read window; offsets may be negative (boundless reads)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub width: usize,
    pub height: usize,
}

/// Derive the buffered pixel window for a square tile extent
///
/// The window spans the tile's corners in pixel space plus
/// [`WINDOW_BUFFER_PX`] on every side. A non-square tile, or a pixel grid on
/// which the tile does not come out square, indicates an upstream
/// extent-computation bug and is rejected rather than coerced.
pub fn window_from_extents(transform: &Affine, rect: &Rect) -> Result<PixelWindow> {
    rect.side()?;

    let (ul_row, ul_col) = transform.rowcol(rect.min_x(), rect.max_y())?;
    let (lr_row, lr_col) = transform.rowcol(rect.max_x(), rect.min_y())?;

    let cols = lr_col - ul_col;
    let rows = lr_row - ul_row;
    if cols <= 0 || rows != cols {
        return Err(TileError::DegenerateExtent(format!(
            "tile window is not a positive square: {cols} x {rows} pixels"
        )));
    }

    let size = (cols + 2 * WINDOW_BUFFER_PX) as usize;
    Ok(PixelWindow {
        col_off: ul_col - WINDOW_BUFFER_PX,
        row_off: ul_row - WINDOW_BUFFER_PX,
        width: size,
        height: size,
    })
}

/// A single-band raster source with boundless window reads
///
/// Pixels requested outside the raster come back as the nodata value, so a
/// buffered tile window at the raster edge reads cleanly.
pub trait RasterSource: Sync {
    fn transform(&self) -> Affine;
    /// (columns, rows)
    fn dimensions(&self) -> (usize, usize);
    fn nodata(&self) -> f64;
    /// Row-major window read of `window.width * window.height` values
    fn read_window(&self, window: &PixelWindow) -> Vec<f64>;
}

/// An in-memory single-band raster; also the mosaic output type
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridRaster {
    width: usize,
    height: usize,
    transform: Affine,
    nodata: f64,
    data: Vec<f64>,
}

impl GridRaster {
    pub fn new(
        width: usize,
        height: usize,
        transform: Affine,
        nodata: f64,
        data: Vec<f64>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(TileError::DegenerateExtent(format!(
                "raster data length {} does not match {width} x {height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            transform,
            nodata,
            data,
        })
    }

    /// A raster filled with the nodata value
    pub fn filled(width: usize, height: usize, transform: Affine, nodata: f64) -> Self {
        Self {
            width,
            height,
            transform,
            nodata,
            data: vec![nodata; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Value at a pixel position, if it is in range
    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(self.data[row * self.width + col])
    }
}

impl RasterSource for GridRaster {
    fn transform(&self) -> Affine {
        self.transform
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn nodata(&self) -> f64 {
        self.nodata
    }

    fn read_window(&self, window: &PixelWindow) -> Vec<f64> {
        let mut out = vec![self.nodata; window.width * window.height];
        for out_row in 0..window.height {
            let src_row = window.row_off + out_row as i64;
            if src_row < 0 || src_row as usize >= self.height {
                continue;
            }
            let src_row = src_row as usize;
            for out_col in 0..window.width {
                let src_col = window.col_off + out_col as i64;
                if src_col < 0 || src_col as usize >= self.width {
                    continue;
                }
                out[out_row * window.width + out_col] =
                    self.data[src_row * self.width + src_col as usize];
            }
        }
        out
    }
}

/// A raster tile extracted for one terminal node
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileRaster {
    pub window: PixelWindow,
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
    pub nodata: f64,
    pub data: Vec<f64>,
    pub classification: Classification,
}

#[inline]
fn is_nodata(value: f64, nodata: f64) -> bool {
    value == nodata || (value.is_nan() && nodata.is_nan())
}

/// Extract the buffered raster window for one terminal tile
///
/// `Intersects` tiles are masked against the coverage (pixels whose center
/// falls outside become nodata) and cropped to the surviving extent;
/// `Inside` tiles pass through unmasked.
pub fn extract_tile(
    source: &dyn RasterSource,
    terminal: &TerminalRecord,
    coverage: &Coverage,
) -> Result<TileRaster> {
    let transform = source.transform();
    let window = window_from_extents(&transform, &terminal.boundary)?;
    let data = source.read_window(&window);

    let mut tile = TileRaster {
        window,
        transform: transform.window_transform(&window),
        width: window.width,
        height: window.height,
        nodata: source.nodata(),
        data,
        classification: terminal.classification,
    };

    if terminal.classification == Classification::Intersects {
        mask_tile(&mut tile, coverage);
        crop_to_data(&mut tile);
    }

    Ok(tile)
}

/// Extract tiles for every covering terminal node in parallel
///
/// `Outside` tiles carry no coverage and are skipped.
pub fn extract_tiles(
    source: &dyn RasterSource,
    terminals: &[TerminalRecord],
    coverage: &Coverage,
) -> Result<Vec<TileRaster>> {
    terminals
        .par_iter()
        .filter(|t| {
            matches!(
                t.classification,
                Classification::Inside | Classification::Intersects
            )
        })
        .map(|t| extract_tile(source, t, coverage))
        .collect()
}

/// Set pixels whose center falls outside the coverage to nodata
fn mask_tile(tile: &mut TileRaster, coverage: &Coverage) {
    for row in 0..tile.height {
        for col in 0..tile.width {
            let center = tile.transform.xy(col as f64 + 0.5, row as f64 + 0.5);
            if !coverage.contains_point(geo::Coord {
                x: center.0,
                y: center.1,
            }) {
                tile.data[row * tile.width + col] = tile.nodata;
            }
        }
    }
}

/// Shrink a masked tile to the extent that still holds data
fn crop_to_data(tile: &mut TileRaster) {
    let mut min_row = usize::MAX;
    let mut max_row = 0usize;
    let mut min_col = usize::MAX;
    let mut max_col = 0usize;
    let mut any = false;

    for row in 0..tile.height {
        for col in 0..tile.width {
            if !is_nodata(tile.data[row * tile.width + col], tile.nodata) {
                any = true;
                min_row = min_row.min(row);
                max_row = max_row.max(row);
                min_col = min_col.min(col);
                max_col = max_col.max(col);
            }
        }
    }

    if !any {
        tracing::warn!(
            window = ?tile.window,
            "intersecting tile is fully masked, keeping it uncropped"
        );
        return;
    }

    let width = max_col - min_col + 1;
    let height = max_row - min_row + 1;
    if width == tile.width && height == tile.height {
        return;
    }

    let mut data = Vec::with_capacity(width * height);
    for row in min_row..=max_row {
        let start = row * tile.width + min_col;
        data.extend_from_slice(&tile.data[start..start + width]);
    }

    let local = PixelWindow {
        col_off: min_col as i64,
        row_off: min_row as i64,
        width,
        height,
    };
    tile.transform = tile.transform.window_transform(&local);
    tile.window = PixelWindow {
        col_off: tile.window.col_off + min_col as i64,
        row_off: tile.window.row_off + min_row as i64,
        width,
        height,
    };
    tile.width = width;
    tile.height = height;
    tile.data = data;
}

/// Merge extracted tiles into one mosaic on a single output transform
///
/// All tiles must share the mosaic pixel grid (same pixel size and rotation,
/// integer origin shifts) and the same nodata value. Overlapping pixels -
/// expected, from the window buffers - resolve deterministically: the last
/// tile in the input order wins on non-nodata pixels. Merging a tile with
/// itself again yields the same mosaic.
pub fn merge_tiles(tiles: &[TileRaster]) -> Result<GridRaster> {
    let first = tiles.first().ok_or_else(|| TileError::MergeMismatch {
        reason: "no tiles to merge".to_string(),
    })?;
    let reference = first.transform;
    let nodata = first.nodata;

    let mut shifts = Vec::with_capacity(tiles.len());
    let mut min_row = i64::MAX;
    let mut min_col = i64::MAX;
    let mut max_row = i64::MIN;
    let mut max_col = i64::MIN;

    for tile in tiles {
        if !is_nodata(tile.nodata, nodata) {
            return Err(TileError::MergeMismatch {
                reason: format!("nodata values differ: {} vs {}", tile.nodata, nodata),
            });
        }
        let (row, col) = reference.pixel_shift(&tile.transform)?;
        min_row = min_row.min(row);
        min_col = min_col.min(col);
        max_row = max_row.max(row + tile.height as i64);
        max_col = max_col.max(col + tile.width as i64);
        shifts.push((row, col));
    }

    let width = (max_col - min_col) as usize;
    let height = (max_row - min_row) as usize;
    let transform = reference.window_transform(&PixelWindow {
        col_off: min_col,
        row_off: min_row,
        width,
        height,
    });

    let mut mosaic = GridRaster::filled(width, height, transform, nodata);
    for (tile, (row_shift, col_shift)) in tiles.iter().zip(shifts) {
        let base_row = (row_shift - min_row) as usize;
        let base_col = (col_shift - min_col) as usize;
        for row in 0..tile.height {
            for col in 0..tile.width {
                let value = tile.data[row * tile.width + col];
                if is_nodata(value, nodata) {
                    continue;
                }
                mosaic.data[(base_row + row) * width + base_col + col] = value;
            }
        }
    }

    Ok(mosaic)
}
