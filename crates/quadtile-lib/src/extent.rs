//! Base-extent builder: power-of-two-aligned root rectangles
//!
//! The decomposition stops on a size threshold, so the root extent must halve
//! exactly down to the tile unit. Arbitrary input bounds are first snapped
//! outward to the unit grid, then widened to the next power-of-two multiple of
//! the unit; the resulting square always covers the input bounds.

use crate::{Rect, Result, TileError};

/// Snap bounds outward to the nearest multiples of `unit`
/// (floor the minimums, ceiling the maximums)
pub fn snap_to_unit(bounds: &Rect, unit: f64) -> Result<Rect> {
    check_unit(unit)?;
    let min_x = (bounds.min_x() / unit).floor() * unit;
    let min_y = (bounds.min_y() / unit).floor() * unit;
    let max_x = (bounds.max_x() / unit).ceil() * unit;
    let max_y = (bounds.max_y() / unit).ceil() * unit;
    Rect::from_extents(min_x, min_y, max_x, max_y)
}

/// Compute the power-of-two-aligned square root extent for the given bounds
///
/// The returned square is anchored at the snapped minimum corner; its side is
/// `next_power_of_two(max(width, height) / unit) * unit`, so it is both an
/// integer multiple and a power-of-two multiple of the unit, and it always
/// covers the input bounds.
pub fn base_extent(bounds: &Rect, unit: f64) -> Result<Rect> {
    let snapped = snap_to_unit(bounds, unit)?;

    // Snapped sides are integer multiples of the unit; round defends against
    // quotients like 3.9999999 from the division.
    let tiles_across = (snapped.width().max(snapped.height()) / unit).round() as u64;
    let side_tiles = tiles_across.max(1).next_power_of_two();
    let side = side_tiles as f64 * unit;

    Rect::from_extents(
        snapped.min_x(),
        snapped.min_y(),
        snapped.min_x() + side,
        snapped.min_y() + side,
    )
}

fn check_unit(unit: f64) -> Result<()> {
    if !(unit > 0.0) || !unit.is_finite() {
        return Err(TileError::DegenerateExtent(format!(
            "tile unit must be positive and finite, got {unit}"
        )));
    }
    Ok(())
}
