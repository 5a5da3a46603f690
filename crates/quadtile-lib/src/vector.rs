//! Vector materialization of decomposed tiles
//!
//! Every tile becomes one boundary record carrying the classification code,
//! depth, centroid, and corner extents, with the boundary rectangle as a
//! closed 4-vertex polygon. Emission order is fixed for reproducible output:
//! flat terminal lists keep their input order, tree traversal emits self,
//! then NE, SE, SW, NW.

use crate::{Classification, Coverage, QuadNode, Rect, TerminalRecord};
use geo::{MultiPolygon, Polygon};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A tile boundary record, the vector output artifact
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileRecord {
    /// Classification code (0 = root/unclassified, 1 = outside, 2 = inside,
    /// 3 = intersects)
    pub tile_type: i32,
    pub depth: u32,
    pub cx: f64,
    pub cy: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    /// The tile boundary as a closed 4-vertex polygon
    pub geometry: Polygon<f64>,
}

impl TileRecord {
    fn from_parts(boundary: &Rect, depth: u32, classification: Classification) -> Self {
        let center = boundary.center();
        Self {
            tile_type: classification.code(),
            depth,
            cx: center.x,
            cy: center.y,
            min_x: boundary.min_x(),
            min_y: boundary.min_y(),
            max_x: boundary.max_x(),
            max_y: boundary.max_y(),
            geometry: boundary.to_polygon(),
        }
    }

    pub fn from_terminal(terminal: &TerminalRecord) -> Self {
        Self::from_parts(&terminal.boundary, terminal.depth, terminal.classification)
    }

    /// Grid reference of the tile in units of `unit`, e.g. `E302N1450`
    pub fn grid_ref(&self, unit: f64) -> String {
        let east = (self.min_x / unit).floor() as i64;
        let north = (self.max_y / unit).floor() as i64;
        format!("E{east}N{north}")
    }
}

/// Records for a flat terminal list, in input order
pub fn records_from_terminals(terminals: &[TerminalRecord]) -> Vec<TileRecord> {
    terminals.iter().map(TileRecord::from_terminal).collect()
}

/// Records for a live tree: every node, internal ones included
///
/// Internal (divided) nodes carry the unclassified sentinel code. Traversal is
/// self, then NE, SE, SW, NW children.
pub fn records_from_tree(root: &QuadNode) -> Vec<TileRecord> {
    let mut records = Vec::new();
    emit_node(root, &mut records);
    records
}

fn emit_node(node: &QuadNode, records: &mut Vec<TileRecord>) {
    records.push(TileRecord::from_parts(
        &node.boundary(),
        node.depth(),
        node.classification(),
    ));
    if let Some(children) = node.children() {
        // Children are stored NW, NE, SE, SW; emission order is NE, SE, SW, NW
        for index in [1, 2, 3, 0] {
            emit_node(&children[index], records);
        }
    }
}

/// Exact per-tile coverage geometries for the covering terminal tiles
///
/// `Inside` tiles keep their full boundary polygon; `Intersects` tiles are
/// clipped against the coverage; `Outside` tiles carry no coverage area and
/// are skipped. A clip that comes back empty (degenerate sliver at the
/// boundary) is dropped, and the resulting count disagreement with the
/// covering-tile count is logged as a warning, not raised: it indicates a
/// geometry edge case rather than a broken decomposition.
pub fn clipped_geometries(
    terminals: &[TerminalRecord],
    coverage: &Coverage,
) -> Vec<MultiPolygon<f64>> {
    let mut expected = 0usize;
    let mut clipped = Vec::new();

    for terminal in terminals {
        match terminal.classification {
            Classification::Inside => {
                expected += 1;
                clipped.push(MultiPolygon::new(vec![terminal.boundary.to_polygon()]));
            }
            Classification::Intersects => {
                expected += 1;
                let intersection = coverage.clip(&terminal.boundary);
                if intersection.0.is_empty() {
                    tracing::warn!(
                        tile = %terminal.boundary,
                        depth = terminal.depth,
                        "intersecting tile produced an empty clip"
                    );
                } else {
                    clipped.push(intersection);
                }
            }
            _ => {}
        }
    }

    if clipped.len() != expected {
        tracing::warn!(
            expected,
            produced = clipped.len(),
            "tile count mismatch between covering tiles and produced clips"
        );
    }

    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose;
    use geo::{Area, LineString};

    fn square_coverage(min_x: f64, min_y: f64, side: f64) -> Coverage {
        Coverage::from_polygons(vec![Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (min_x + side, min_y),
                (min_x + side, min_y + side),
                (min_x, min_y + side),
                (min_x, min_y),
            ]),
            vec![],
        )])
        .unwrap()
    }

    fn root_1024() -> Rect {
        Rect::from_extents(0.0, 0.0, 1024.0, 1024.0).unwrap()
    }

    #[test]
    fn test_record_fields() {
        let terminal = TerminalRecord::new(
            Rect::from_extents(0.0, 0.0, 512.0, 512.0).unwrap(),
            1,
            Classification::Inside,
        );
        let record = TileRecord::from_terminal(&terminal);

        assert_eq!(record.tile_type, 2);
        assert_eq!(record.depth, 1);
        assert_eq!(record.cx, 256.0);
        assert_eq!(record.cy, 256.0);
        assert_eq!(record.min_x, 0.0);
        assert_eq!(record.max_x, 512.0);
        assert_eq!(record.geometry.exterior().0.len(), 5);
    }

    #[test]
    fn test_grid_ref() {
        let terminal = TerminalRecord::new(
            Rect::from_extents(302000.0, 1450000.0, 303024.0, 1451024.0).unwrap(),
            5,
            Classification::Intersects,
        );
        let record = TileRecord::from_terminal(&terminal);
        assert_eq!(record.grid_ref(1000.0), "E302N1451");
    }

    #[test]
    fn test_records_from_terminals_preserves_order() {
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let (_, terminals) = decompose(root_1024(), &coverage, 256.0);
        let records = records_from_terminals(&terminals);

        assert_eq!(records.len(), terminals.len());
        for (record, terminal) in records.iter().zip(&terminals) {
            assert_eq!(record.depth, terminal.depth);
            assert_eq!(record.tile_type, terminal.classification.code());
        }
    }

    #[test]
    fn test_records_from_tree_traversal_order() {
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let (root, _) = decompose(root_1024(), &coverage, 256.0);
        let records = records_from_tree(&root);

        // Root plus its four children
        assert_eq!(records.len(), 5);

        // Self first, with the unclassified sentinel code
        assert_eq!(records[0].depth, 0);
        assert_eq!(records[0].tile_type, 0);

        // Then NE, SE, SW, NW
        assert_eq!(
            (records[1].min_x, records[1].min_y),
            (512.0, 512.0),
            "NE first"
        );
        assert_eq!((records[2].min_x, records[2].min_y), (512.0, 0.0), "SE");
        assert_eq!((records[3].min_x, records[3].min_y), (0.0, 0.0), "SW");
        assert_eq!((records[4].min_x, records[4].min_y), (0.0, 512.0), "NW");
    }

    #[test]
    fn test_clipped_geometries_cover_exact_area() {
        // Coverage aligned to the tile grid: the clips must tile the coverage
        // exactly, so their areas sum to the coverage area.
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let (_, terminals) = decompose(root_1024(), &coverage, 256.0);

        let clips = clipped_geometries(&terminals, &coverage);
        assert_eq!(clips.len(), 1); // single INSIDE tile

        let total: f64 = clips.iter().map(|g| g.unsigned_area()).sum();
        assert!((total - 512.0 * 512.0).abs() < 1e-6);
    }

    #[test]
    fn test_clipped_geometries_skips_outside() {
        let coverage = square_coverage(100.0, 100.0, 600.0);
        let (_, terminals) = decompose(root_1024(), &coverage, 256.0);

        let covering = terminals
            .iter()
            .filter(|t| t.classification != Classification::Outside)
            .count();
        let clips = clipped_geometries(&terminals, &coverage);
        assert_eq!(clips.len(), covering);

        let total: f64 = clips.iter().map(|g| g.unsigned_area()).sum();
        assert!((total - 600.0 * 600.0).abs() < 1e-3);
    }
}
