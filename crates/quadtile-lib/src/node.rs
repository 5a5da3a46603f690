//! Quadtree node, classification tags, and the value types that cross
//! worker boundaries
//!
//! The live tree owns its children exclusively (no parent pointers, no shared
//! ownership); depth is passed down at division time, which keeps every node
//! freely movable and serializable. Frontier entries and terminal records are
//! plain values: workers never mutate a coordinator-owned node in place.

use crate::Rect;
use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Classification of a tile against the reference coverage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Classification {
    /// Not yet classified; also the sentinel for the root and divided nodes
    Unclassified,
    /// No overlap with the coverage
    Outside,
    /// Fully contained in the coverage
    Inside,
    /// Partial overlap, boundary-crossing
    Intersects,
}

impl Classification {
    /// Stable integer code used in output records
    /// (0 = root/unclassified sentinel, 1 = outside, 2 = inside, 3 = intersects)
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            Classification::Unclassified => 0,
            Classification::Outside => 1,
            Classification::Inside => 2,
            Classification::Intersects => 3,
        }
    }

    /// Terminal classifications end decomposition for their node
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != Classification::Unclassified
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::Unclassified => "UNCLASSIFIED",
            Classification::Outside => "OUTSIDE",
            Classification::Inside => "INSIDE",
            Classification::Intersects => "INTERSECTS",
        };
        f.write_str(name)
    }
}

/// A frontier entry: a tile still awaiting classification
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpenNode {
    pub boundary: Rect,
    pub depth: u32,
}

impl OpenNode {
    pub fn new(boundary: Rect, depth: u32) -> Self {
        Self { boundary, depth }
    }
}

/// The durable output artifact of decomposition
///
/// Independent of the live tree once produced: materialization needs no
/// back-reference to the node that spawned it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TerminalRecord {
    pub boundary: Rect,
    pub depth: u32,
    pub classification: Classification,
}

impl TerminalRecord {
    pub fn new(boundary: Rect, depth: u32, classification: Classification) -> Self {
        Self {
            boundary,
            depth,
            classification,
        }
    }

    /// Centroid of the tile boundary
    #[inline]
    pub fn centroid(&self) -> Coord<f64> {
        self.boundary.center()
    }
}

/// A single node in the quadtree
///
/// Either undivided (children `None`) or divided with all four children
/// populated; a node carrying a terminal classification is never divided.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadNode {
    boundary: Rect,
    depth: u32,
    classification: Classification,
    /// Child nodes (NW, NE, SE, SW) if divided
    children: Option<Box<[QuadNode; 4]>>,
}

impl QuadNode {
    /// Create an unclassified, undivided node
    pub fn new(boundary: Rect, depth: u32) -> Self {
        Self {
            boundary,
            depth,
            classification: Classification::Unclassified,
            children: None,
        }
    }

    /// Create a terminal leaf
    pub fn leaf(boundary: Rect, depth: u32, classification: Classification) -> Self {
        Self {
            boundary,
            depth,
            classification,
            children: None,
        }
    }

    #[inline]
    pub fn boundary(&self) -> Rect {
        self.boundary
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn classification(&self) -> Classification {
        self.classification
    }

    #[inline]
    pub fn children(&self) -> Option<&[QuadNode; 4]> {
        self.children.as_deref()
    }

    #[inline]
    pub fn is_divided(&self) -> bool {
        self.children.is_some()
    }

    /// Assign a terminal classification
    pub fn classify(&mut self, classification: Classification) {
        debug_assert!(
            !self.is_divided(),
            "a divided node must not be terminally classified"
        );
        self.classification = classification;
    }

    /// Attach the four quadrant children (NW, NE, SE, SW)
    ///
    /// All-or-nothing: a node is divided exactly once, and a terminally
    /// classified node is never divided.
    pub fn attach_children(&mut self, children: [QuadNode; 4]) {
        debug_assert!(self.children.is_none(), "node is already divided");
        debug_assert!(
            !self.classification.is_terminal(),
            "a terminal node must not be divided"
        );
        debug_assert!(
            children.iter().all(|c| c.depth == self.depth + 1),
            "child depth must be parent depth + 1"
        );
        self.children = Some(Box::new(children));
    }

    /// The terminal record for a leaf node, if it carries one
    pub fn terminal_record(&self) -> Option<TerminalRecord> {
        if self.is_divided() || !self.classification.is_terminal() {
            return None;
        }
        Some(TerminalRecord::new(
            self.boundary,
            self.depth,
            self.classification,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rect() -> Rect {
        Rect::from_extents(0.0, 0.0, 1024.0, 1024.0).unwrap()
    }

    #[test]
    fn test_classification_codes() {
        assert_eq!(Classification::Unclassified.code(), 0);
        assert_eq!(Classification::Outside.code(), 1);
        assert_eq!(Classification::Inside.code(), 2);
        assert_eq!(Classification::Intersects.code(), 3);
    }

    #[test]
    fn test_classification_terminality() {
        assert!(!Classification::Unclassified.is_terminal());
        assert!(Classification::Outside.is_terminal());
        assert!(Classification::Inside.is_terminal());
        assert!(Classification::Intersects.is_terminal());
    }

    #[test]
    fn test_new_node_is_unclassified_and_undivided() {
        let node = QuadNode::new(unit_rect(), 0);
        assert_eq!(node.classification(), Classification::Unclassified);
        assert!(!node.is_divided());
        assert!(node.terminal_record().is_none());
    }

    #[test]
    fn test_attach_children() {
        let mut node = QuadNode::new(unit_rect(), 0);
        let children = node
            .boundary()
            .quadrants()
            .map(|q| QuadNode::new(q, node.depth() + 1));
        node.attach_children(children);

        assert!(node.is_divided());
        let children = node.children().unwrap();
        assert_eq!(children.len(), 4);
        for child in children {
            assert_eq!(child.depth(), 1);
        }
    }

    #[test]
    fn test_terminal_record_from_leaf() {
        let rect = Rect::from_extents(0.0, 0.0, 256.0, 256.0).unwrap();
        let leaf = QuadNode::leaf(rect, 2, Classification::Inside);

        let record = leaf.terminal_record().unwrap();
        assert_eq!(record.depth, 2);
        assert_eq!(record.classification, Classification::Inside);
        assert_eq!(record.boundary, rect);
        assert_eq!(record.centroid(), geo::Coord { x: 128.0, y: 128.0 });
    }

    #[test]
    fn test_divided_node_has_no_terminal_record() {
        let mut node = QuadNode::new(unit_rect(), 0);
        let children = node
            .boundary()
            .quadrants()
            .map(|q| QuadNode::new(q, node.depth() + 1));
        node.attach_children(children);
        assert!(node.terminal_record().is_none());
    }
}
