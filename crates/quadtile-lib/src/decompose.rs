//! Quadtree decomposition against a reference coverage
//!
//! The classification of a single tile is a pure function ([`classify_step`]),
//! shared between the in-process recursive driver ([`decompose`]) and the
//! frontier workers of the distributed protocol ([`process_batch`]). Both paths
//! therefore produce the same terminal set for the same inputs.
//!
//! Decision order (first match wins):
//! 1. tile fully inside the coverage -> `Inside`, terminal;
//! 2. tile at or below the size limit -> `Intersects` or `Outside`, terminal
//!    (the size floor always wins over further refinement);
//! 3. otherwise divide into the NW, NE, SE, SW quadrants. Quadrants that fail
//!    the cheap bounding-rectangle pre-filter close immediately as `Outside`
//!    without any exact predicate call; the rest stay open for recursion.

use crate::{Classification, Coverage, OpenNode, QuadNode, Rect, TerminalRecord};

/// Outcome of classifying one open tile
#[derive(Clone, Debug)]
pub enum Step {
    /// The tile is terminal with the given classification
    Terminal(Classification),
    /// The tile divides; one disposition per quadrant in NW, NE, SE, SW order
    Divide([QuadrantStep; 4]),
}

/// Disposition of a single quadrant after a division
#[derive(Clone, Debug)]
pub enum QuadrantStep {
    /// The quadrant needs further classification
    Open(OpenNode),
    /// The quadrant closed immediately (bounding-rectangle pre-filter miss)
    Closed(TerminalRecord),
}

/// Classify one open tile against the coverage
pub fn classify_step(node: &OpenNode, coverage: &Coverage, tile_size_limit: f64) -> Step {
    if coverage.contains_rect(&node.boundary) {
        return Step::Terminal(Classification::Inside);
    }

    if node.boundary.width() <= tile_size_limit || node.boundary.height() <= tile_size_limit {
        let classification = if coverage.intersects_rect(&node.boundary) {
            Classification::Intersects
        } else {
            Classification::Outside
        };
        return Step::Terminal(classification);
    }

    let coverage_bounds = coverage.bounds();
    let child_depth = node.depth + 1;
    let parts = node.boundary.quadrants().map(|quadrant| {
        if quadrant.intersects(&coverage_bounds) {
            QuadrantStep::Open(OpenNode::new(quadrant, child_depth))
        } else {
            QuadrantStep::Closed(TerminalRecord::new(
                quadrant,
                child_depth,
                Classification::Outside,
            ))
        }
    });
    Step::Divide(parts)
}

/// Opened and closed tiles produced by one worker batch
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Newly spawned tiles still awaiting classification
    pub opened: Vec<OpenNode>,
    /// Tiles that reached a terminal classification
    pub closed: Vec<TerminalRecord>,
}

/// Apply one classification step to every tile in a batch
///
/// Pure over the batch: deterministic order within it, no state retained
/// across calls. This is the whole of a frontier worker's round.
pub fn process_batch(batch: &[OpenNode], coverage: &Coverage, tile_size_limit: f64) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for node in batch {
        match classify_step(node, coverage, tile_size_limit) {
            Step::Terminal(classification) => {
                outcome
                    .closed
                    .push(TerminalRecord::new(node.boundary, node.depth, classification));
            }
            Step::Divide(parts) => {
                for part in parts {
                    match part {
                        QuadrantStep::Open(open) => outcome.opened.push(open),
                        QuadrantStep::Closed(terminal) => outcome.closed.push(terminal),
                    }
                }
            }
        }
    }
    outcome
}

/// Decompose a root extent recursively in-process
///
/// Builds the owned quadtree and threads the terminal accumulator through the
/// traversal; each run owns its own result set. Returns the tree together with
/// the terminal records in traversal order.
pub fn decompose(
    root: Rect,
    coverage: &Coverage,
    tile_size_limit: f64,
) -> (QuadNode, Vec<TerminalRecord>) {
    let mut node = QuadNode::new(root, 0);
    let mut terminals = Vec::new();
    decompose_node(&mut node, coverage, tile_size_limit, &mut terminals);
    (node, terminals)
}

fn decompose_node(
    node: &mut QuadNode,
    coverage: &Coverage,
    tile_size_limit: f64,
    terminals: &mut Vec<TerminalRecord>,
) {
    let open = OpenNode::new(node.boundary(), node.depth());
    match classify_step(&open, coverage, tile_size_limit) {
        Step::Terminal(classification) => {
            node.classify(classification);
            terminals.push(TerminalRecord::new(
                node.boundary(),
                node.depth(),
                classification,
            ));
        }
        Step::Divide(parts) => {
            let children = parts.map(|part| match part {
                QuadrantStep::Open(open) => {
                    let mut child = QuadNode::new(open.boundary, open.depth);
                    decompose_node(&mut child, coverage, tile_size_limit, terminals);
                    child
                }
                QuadrantStep::Closed(terminal) => {
                    terminals.push(terminal);
                    QuadNode::leaf(terminal.boundary, terminal.depth, terminal.classification)
                }
            });
            node.attach_children(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, Polygon};

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

    /// Thin band along the main diagonal of (0,0)-(1024,1024), crossing all
    /// four depth-1 quadrants.
    fn diagonal_coverage() -> Coverage {
        Coverage::from_polygons(vec![Polygon::new(
            LineString::from(vec![
                (0.0, 20.0),
                (20.0, 0.0),
                (1024.0, 1004.0),
                (1004.0, 1024.0),
                (0.0, 20.0),
            ]),
            vec![],
        )])
        .unwrap()
    }

    fn root_1024() -> Rect {
        Rect::from_extents(0.0, 0.0, 1024.0, 1024.0).unwrap()
    }

    #[test]
    fn test_quadrant_square_stops_at_depth_one() {
        // Coverage is the SW depth-1 quadrant of the root. Expected terminal
        // set: SW fully inside at depth 1; the other three quadrants are
        // pre-filter misses and close as OUTSIDE at depth 1.
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let (_, terminals) = decompose(root_1024(), &coverage, 256.0);

        assert_eq!(terminals.len(), 4);
        assert!(terminals.iter().all(|t| t.depth == 1));

        let inside: Vec<_> = terminals
            .iter()
            .filter(|t| t.classification == Classification::Inside)
            .collect();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].boundary.min_x(), 0.0);
        assert_eq!(inside[0].boundary.min_y(), 0.0);
        assert_eq!(inside[0].boundary.max_x(), 512.0);

        let outside = terminals
            .iter()
            .filter(|t| t.classification == Classification::Outside)
            .count();
        assert_eq!(outside, 3);
    }

    #[test]
    fn test_diagonal_band_recurses_everywhere() {
        // None of the depth-1 quadrants is fully inside or trivially outside,
        // so all four recurse; the size floor of 256 stops them at depth 2 with
        // a mix of INTERSECTS and OUTSIDE leaves.
        let coverage = diagonal_coverage();
        let (root, terminals) = decompose(root_1024(), &coverage, 256.0);

        let children = root.children().expect("root must divide");
        for child in children {
            assert!(child.is_divided(), "all depth-1 quadrants must recurse");
        }

        assert!(terminals.iter().all(|t| t.depth == 2));
        assert_eq!(terminals.len(), 16);

        let intersecting = terminals
            .iter()
            .filter(|t| t.classification == Classification::Intersects)
            .count();
        let outside = terminals
            .iter()
            .filter(|t| t.classification == Classification::Outside)
            .count();
        assert!(intersecting > 0);
        assert!(outside > 0);
        assert_eq!(intersecting + outside, 16);
    }

    #[test]
    fn test_size_floor_wins_over_refinement() {
        // With the limit at the root side, the root itself is terminal
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let (root, terminals) = decompose(root_1024(), &coverage, 1024.0);

        assert!(!root.is_divided());
        assert_eq!(terminals.len(), 1);
        assert_eq!(terminals[0].classification, Classification::Intersects);
        assert_eq!(terminals[0].depth, 0);
    }

    #[test]
    fn test_depth_bounded_by_size_ratio() {
        let coverage = diagonal_coverage();
        let (_, terminals) = decompose(root_1024(), &coverage, 64.0);

        // depth <= log2(1024 / 64) = 4
        assert!(terminals.iter().all(|t| t.depth <= 4));
        assert!(terminals.iter().any(|t| t.depth == 4));
    }

    #[test]
    fn test_coverage_points_fall_in_covering_tiles() {
        // Every sampled point of the coverage lands in exactly one terminal
        // tile, and that tile is INSIDE or INTERSECTS.
        let coverage = square_coverage(128.0, 128.0, 512.0);
        let (_, terminals) = decompose(root_1024(), &coverage, 128.0);

        for i in 0..20 {
            for j in 0..20 {
                let point = Coord {
                    x: 130.0 + i as f64 * 25.0,
                    y: 130.0 + j as f64 * 25.0,
                };
                let covering: Vec<_> = terminals
                    .iter()
                    .filter(|t| t.boundary.contains(point))
                    .collect();
                assert_eq!(covering.len(), 1, "point {point:?} covered exactly once");
                assert_ne!(
                    covering[0].classification,
                    Classification::Outside,
                    "coverage point {point:?} must not fall in an OUTSIDE tile"
                );
            }
        }
    }

    #[test]
    fn test_tree_invariants() {
        let coverage = diagonal_coverage();
        let (root, _) = decompose(root_1024(), &coverage, 256.0);

        fn check(node: &QuadNode) {
            match node.children() {
                Some(children) => {
                    // Divided nodes stay unclassified and tile the parent exactly
                    assert_eq!(node.classification(), Classification::Unclassified);
                    let area: f64 = children.iter().map(|c| c.boundary().area()).sum();
                    assert!((area - node.boundary().area()).abs() < 1e-9);
                    for child in children {
                        assert_eq!(child.depth(), node.depth() + 1);
                        check(child);
                    }
                }
                None => {
                    assert!(node.classification().is_terminal());
                }
            }
        }
        check(&root);
    }

    #[test]
    fn test_process_batch_matches_steps() {
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let root_open = OpenNode::new(root_1024(), 0);

        let outcome = process_batch(&[root_open], &coverage, 256.0);

        // The root divides: SW stays open, the other three close as OUTSIDE
        assert_eq!(outcome.opened.len(), 1);
        assert_eq!(outcome.closed.len(), 3);
        assert_eq!(outcome.opened[0].depth, 1);
        assert!(
            outcome
                .closed
                .iter()
                .all(|t| t.classification == Classification::Outside)
        );
    }

    #[test]
    fn test_classify_step_inside_before_size_floor() {
        // A tile below the size limit that is fully inside still classifies
        // INSIDE: containment is checked first.
        let coverage = square_coverage(0.0, 0.0, 512.0);
        let tiny = OpenNode::new(Rect::from_extents(64.0, 64.0, 128.0, 128.0).unwrap(), 3);
        match classify_step(&tiny, &coverage, 256.0) {
            Step::Terminal(c) => assert_eq!(c, Classification::Inside),
            Step::Divide(_) => panic!("tile fully inside must be terminal"),
        }
    }

    #[test]
    fn test_decompose_terminal_count_matches_batch_drain() {
        // Driving the frontier manually with process_batch reproduces the
        // recursive terminal set.
        let coverage = diagonal_coverage();
        let limit = 256.0;

        let (_, recursive) = decompose(root_1024(), &coverage, limit);

        let mut frontier = vec![OpenNode::new(root_1024(), 0)];
        let mut terminals = Vec::new();
        while !frontier.is_empty() {
            let outcome = process_batch(&frontier, &coverage, limit);
            frontier = outcome.opened;
            terminals.extend(outcome.closed);
        }

        let key = |t: &TerminalRecord| {
            (
                t.depth,
                t.boundary.min_x().to_bits(),
                t.boundary.min_y().to_bits(),
            )
        };
        let mut lhs = recursive.clone();
        let mut rhs = terminals.clone();
        lhs.sort_by_key(key);
        rhs.sort_by_key(key);
        assert_eq!(lhs, rhs);
    }
}
