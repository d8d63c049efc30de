//! A quad-tree of placed geometry.
//!
//! Nodes are kept in an arena. A node splits into four quadrants once it holds
//! more items than the configured threshold; an item moves into a quadrant
//! only if its box lies entirely inside it, otherwise it stays in the node.
//! The bounding box of the whole tree is cached and recomputed lazily.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;

use geometry::bbox::BoundingUnion;
use geometry::rect::Rect;

#[derive(Debug, Clone)]
struct Node<T> {
    /// The area split into quadrants, set when the node splits.
    area: Option<Rect>,
    children: Option<[usize; 4]>,
    items: Vec<(T, Rect)>,
}

impl<T> Node<T> {
    fn new(area: Option<Rect>) -> Self {
        Self {
            area,
            children: None,
            items: Vec::new(),
        }
    }
}

/// A spatial index mapping items to the box they were inserted with.
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    nodes: Vec<Node<T>>,
    locations: HashMap<T, usize>,
    threshold: usize,
    bbox: Cell<Option<Option<Rect>>>,
}

impl<T: Copy + Eq + Hash> QuadTree<T> {
    /// Creates an empty tree whose nodes split above `threshold` items.
    pub fn new(threshold: usize) -> Self {
        Self {
            nodes: vec![Node::new(None)],
            locations: HashMap::new(),
            threshold: threshold.max(1),
            bbox: Cell::new(Some(None)),
        }
    }

    /// The number of items in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if the tree holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Returns `true` if `item` is in the tree.
    #[inline]
    pub fn contains(&self, item: T) -> bool {
        self.locations.contains_key(&item)
    }

    /// The box `item` was inserted with.
    pub fn item_box(&self, item: T) -> Option<Rect> {
        let node = *self.locations.get(&item)?;
        self.nodes[node]
            .items
            .iter()
            .find(|(i, _)| *i == item)
            .map(|(_, r)| *r)
    }

    /// Inserts `item` with bounding box `rect`.
    ///
    /// Returns `false` if the item is already present.
    pub fn insert(&mut self, item: T, rect: Rect) -> bool {
        if self.contains(item) {
            return false;
        }
        let mut node = 0;
        while let Some(children) = self.nodes[node].children {
            match children
                .iter()
                .find(|&&c| self.nodes[c].area.is_some_and(|a| a.contains(&rect)))
            {
                Some(&child) => node = child,
                None => break,
            }
        }
        self.nodes[node].items.push((item, rect));
        self.locations.insert(item, node);
        if let Some(bbox) = self.bbox.get() {
            self.bbox.set(Some(Some(bbox.bounding_union(&rect))));
        }
        if self.nodes[node].children.is_none() && self.nodes[node].items.len() > self.threshold {
            self.split(node);
        }
        true
    }

    /// Removes `item`, returning the box it was inserted with.
    pub fn remove(&mut self, item: T) -> Option<Rect> {
        let node = self.locations.remove(&item)?;
        let items = &mut self.nodes[node].items;
        let pos = items.iter().position(|(i, _)| *i == item)?;
        let (_, rect) = items.swap_remove(pos);
        if let Some(Some(bbox)) = self.bbox.get() {
            if bbox.is_constrained_by(&rect) {
                self.bbox.set(None);
            }
        }
        Some(rect)
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::new(None));
        self.locations.clear();
        self.bbox.set(Some(None));
    }

    fn split(&mut self, node: usize) {
        let area = match self.nodes[node].area {
            Some(area) => area,
            None => {
                let mut area = None;
                for (_, rect) in &self.nodes[node].items {
                    area = Some(area.bounding_union(rect));
                }
                match area {
                    Some(area) => area,
                    None => return,
                }
            }
        };
        if area.width() < 2 || area.height() < 2 {
            return;
        }
        let c = area.center();
        let quadrants = [
            Rect::from_sides(area.left(), area.bot(), c.x, c.y),
            Rect::from_sides(c.x, area.bot(), area.right(), c.y),
            Rect::from_sides(area.left(), c.y, c.x, area.top()),
            Rect::from_sides(c.x, c.y, area.right(), area.top()),
        ];
        let first = self.nodes.len();
        self.nodes
            .extend(quadrants.iter().map(|q| Node::new(Some(*q))));
        let children = [first, first + 1, first + 2, first + 3];
        self.nodes[node].area = Some(area);
        self.nodes[node].children = Some(children);

        let items = std::mem::take(&mut self.nodes[node].items);
        for (item, rect) in items {
            let target = children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].area.is_some_and(|a| a.contains(&rect)))
                .unwrap_or(node);
            self.nodes[target].items.push((item, rect));
            self.locations.insert(item, target);
        }
        for child in children {
            if self.nodes[child].items.len() > self.threshold {
                self.split(child);
            }
        }
    }

    /// The union of the boxes of every item, or `None` if the tree is empty.
    pub fn bounding_box(&self) -> Option<Rect> {
        if let Some(bbox) = self.bbox.get() {
            return bbox;
        }
        let mut bbox = None;
        for node in &self.nodes {
            for (_, rect) in &node.items {
                bbox = Some(bbox.bounding_union(rect));
            }
        }
        self.bbox.set(Some(bbox));
        bbox
    }

    /// Every item whose box intersects `area`.
    pub fn items_in(&self, area: Rect) -> Vec<T> {
        let mut found = Vec::new();
        let mut stack = vec![0];
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            found.extend(
                node.items
                    .iter()
                    .filter(|(_, r)| r.intersects(&area))
                    .map(|(i, _)| *i),
            );
            if let Some(children) = node.children {
                stack.extend(children.into_iter().filter(|&c| {
                    self.nodes[c].area.is_some_and(|a| a.intersects(&area))
                }));
            }
        }
        found
    }

    /// Every item in the tree.
    pub fn items(&self) -> impl Iterator<Item = T> + '_ {
        self.locations.keys().copied()
    }

    /// The depth of the deepest node. A tree that never split has depth 1.
    pub fn depth(&self) -> usize {
        fn depth_of<T>(nodes: &[Node<T>], node: usize) -> usize {
            1 + nodes[node]
                .children
                .map(|c| c.iter().map(|&c| depth_of(nodes, c)).max().unwrap_or(0))
                .unwrap_or(0)
        }
        depth_of(&self.nodes, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(tree: &mut QuadTree<u32>, n: u32) {
        for i in 0..n {
            let x = (i % 10) as i64 * 100;
            let y = (i / 10) as i64 * 100;
            tree.insert(i, Rect::from_sides(x, y, x + 10, y + 10));
        }
    }

    #[test]
    fn splits_and_answers_area_queries() {
        let mut tree = QuadTree::new(4);
        grid(&mut tree, 100);
        assert!(tree.depth() > 1);
        assert_eq!(tree.len(), 100);
        let mut hits = tree.items_in(Rect::from_sides(0, 0, 150, 150));
        hits.sort();
        assert_eq!(hits, vec![0, 1, 10, 11]);
        assert_eq!(
            tree.bounding_box(),
            Some(Rect::from_sides(0, 0, 910, 910))
        );
    }

    #[test]
    fn removal_invalidates_constrained_bbox() {
        let mut tree = QuadTree::new(4);
        grid(&mut tree, 100);
        assert_eq!(tree.bounding_box().map(|b| b.right()), Some(910));
        for i in (9..100).step_by(10) {
            assert!(tree.remove(i).is_some());
        }
        assert_eq!(
            tree.bounding_box(),
            Some(Rect::from_sides(0, 0, 810, 910))
        );
        assert_eq!(tree.remove(9), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut tree = QuadTree::new(4);
        assert!(tree.insert(1u32, Rect::from_sides(0, 0, 1, 1)));
        assert!(!tree.insert(1u32, Rect::from_sides(5, 5, 6, 6)));
        assert_eq!(tree.item_box(1), Some(Rect::from_sides(0, 0, 1, 1)));
    }
}
