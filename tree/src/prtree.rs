//! The point-region tree container.
use std::cell::RefCell;

use multipole_traits::tree::{NodeState, NodeView, TraverseOrder, Tree};
use multipole_traits::types::{BoundingBox, Coordinate, Positioned};

/// Subdivision stops here even if a leaf stays over capacity (coincident
/// points would otherwise split forever).
const MAX_DEPTH: usize = 40;

pub(crate) struct Node<V: Coordinate> {
    pub bounds: BoundingBox<V>,
    pub depth: usize,
    pub parent: Option<usize>,
    /// Child arena indices; empty for a leaf.
    pub children: Vec<usize>,
    /// Point indices held by this node (leaves only).
    pub points: Vec<usize>,
    /// Live points in the whole subtree.
    pub subtree_points: usize,
    pub state: NodeState,
}

/// A point-region tree with a fixed bounding box and leaf capacity.
pub struct PrTree<V: Coordinate, P: Positioned<V>> {
    pub(crate) nodes: Vec<Node<V>>,
    points: Vec<RefCell<P>>,
    point_leaf: Vec<usize>,
    removed: Vec<bool>,
    max_box: usize,
    tolerance: f64,
    depth: usize,
    live_points: usize,
}

impl<V: Coordinate, P: Positioned<V>> PrTree<V, P> {
    /// An empty tree over [lower, upper) splitting leaves that exceed
    /// `max_box` points.
    pub fn new(lower: V, upper: V, max_box: usize) -> PrTree<V, P> {
        PrTree {
            nodes: vec![Node {
                bounds: BoundingBox::new(lower, upper),
                depth: 0,
                parent: None,
                children: Vec::new(),
                points: Vec::new(),
                subtree_points: 0,
                state: NodeState::Local,
            }],
            points: Vec::new(),
            point_leaf: Vec::new(),
            removed: Vec::new(),
            max_box: max_box.max(1),
            tolerance: 1.0e-12,
            depth: 0,
            live_points: 0,
        }
    }

    pub fn max_box(&self) -> usize {
        self.max_box
    }

    fn leaf_for(&self, position: &V) -> usize {
        let mut node = 0;
        while !self.nodes[node].children.is_empty() {
            let child = self.nodes[node].bounds.child_index(position);
            node = self.nodes[node].children[child];
        }
        node
    }

    fn split(&mut self, node: usize) {
        let bounds = self.nodes[node].bounds;
        let depth = self.nodes[node].depth;
        let state = self.nodes[node].state;
        let degree = 1 << V::DIM;

        let first_child = self.nodes.len();
        for i in 0..degree {
            self.nodes.push(Node {
                bounds: bounds.child(i),
                depth: depth + 1,
                parent: Some(node),
                children: Vec::new(),
                points: Vec::new(),
                subtree_points: 0,
                state,
            });
        }
        self.nodes[node].children = (first_child..first_child + degree).collect();

        let points = std::mem::take(&mut self.nodes[node].points);
        for idx in points {
            let position = self.points[idx].borrow().position();
            let child = first_child + bounds.child_index(&position);
            self.nodes[child].points.push(idx);
            self.nodes[child].subtree_points += 1;
            self.point_leaf[idx] = child;
        }

        self.depth = self.depth.max(depth + 1);

        for child in first_child..first_child + degree {
            if self.nodes[child].points.len() > self.max_box && depth + 1 < MAX_DEPTH {
                self.split(child);
            }
        }
    }

    pub(crate) fn view(&self, node: usize) -> NodeView<'_, V> {
        let n = &self.nodes[node];
        NodeView {
            handle: node,
            parent: n.parent,
            center: n.bounds.center(),
            bounds: n.bounds,
            depth: n.depth,
            is_leaf: n.children.is_empty(),
            point_count: n.subtree_points,
            points: &n.points,
            state: n.state,
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn traverse_rec(
        &self,
        node: usize,
        order: TraverseOrder,
        f: &mut dyn FnMut(&NodeView<'_, V>),
    ) {
        if order == TraverseOrder::PreOrder {
            f(&self.view(node));
        }

        for i in 0..self.nodes[node].children.len() {
            self.traverse_rec(self.nodes[node].children[i], order, f);
        }

        if order == TraverseOrder::PostOrder {
            f(&self.view(node));
        }
    }
}

impl<V: Coordinate, P: Positioned<V>> Tree<V> for PrTree<V, P> {
    type Point = P;

    fn bounds(&self) -> BoundingBox<V> {
        self.nodes[0].bounds
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn point_count(&self) -> usize {
        self.live_points
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn set_tolerance(&mut self, tolerance: f64) {
        assert!(tolerance >= 0.0);
        self.tolerance = tolerance;
    }

    fn insert(&mut self, point: P) -> usize {
        let position = point.position();
        assert!(
            self.nodes[0].bounds.contains(&position)
                || (0..V::DIM).all(|a| {
                    position.coord(a) >= self.nodes[0].bounds.lower.coord(a)
                        && position.coord(a) <= self.nodes[0].bounds.upper.coord(a)
                }),
            "point outside the tree bounding box"
        );

        let idx = self.points.len();
        self.points.push(RefCell::new(point));
        self.removed.push(false);
        self.point_leaf.push(0);

        let leaf = self.leaf_for(&position);
        self.nodes[leaf].points.push(idx);
        self.point_leaf[idx] = leaf;

        let mut node = Some(leaf);
        while let Some(n) = node {
            self.nodes[n].subtree_points += 1;
            node = self.nodes[n].parent;
        }
        self.live_points += 1;

        if self.nodes[leaf].points.len() > self.max_box && self.nodes[leaf].depth < MAX_DEPTH {
            self.split(leaf);
        }

        idx
    }

    fn remove(&mut self, index: usize) -> bool {
        if index >= self.points.len() || self.removed[index] {
            return false;
        }

        let leaf = self.point_leaf[index];
        self.nodes[leaf].points.retain(|&i| i != index);

        let mut node = Some(leaf);
        while let Some(n) = node {
            self.nodes[n].subtree_points -= 1;
            node = self.nodes[n].parent;
        }

        self.removed[index] = true;
        self.live_points -= 1;
        true
    }

    fn find(&self, position: V) -> Option<usize> {
        let leaf = self.leaf_for(&position);
        self.nodes[leaf]
            .points
            .iter()
            .copied()
            .find(|&i| self.points[i].borrow().position().dist(&position) <= self.tolerance)
    }

    fn point(&self, index: usize) -> &RefCell<P> {
        &self.points[index]
    }

    fn node(&self, handle: usize) -> NodeView<'_, V> {
        self.view(handle)
    }

    fn foreach_point(&self, f: &mut dyn FnMut(usize, &RefCell<P>)) {
        for (i, cell) in self.points.iter().enumerate() {
            if !self.removed[i] {
                f(i, cell);
            }
        }
    }

    fn traverse(&self, order: TraverseOrder, f: &mut dyn FnMut(&NodeView<'_, V>)) {
        self.traverse_rec(0, order, f);
    }

    fn near_far_traversal(
        &self,
        far: &mut dyn FnMut(&NodeView<'_, V>, &NodeView<'_, V>) -> bool,
        near: &mut dyn FnMut(&NodeView<'_, V>, &NodeView<'_, V>),
    ) {
        crate::near_far::dual_traversal(self, far, near);
    }
}

#[cfg(test)]
mod tests {
    use multipole_traits::types::Vector3;

    use super::*;

    #[derive(Clone, Debug)]
    struct Pt(Vector3);

    impl Positioned<Vector3> for Pt {
        fn position(&self) -> Vector3 {
            self.0
        }
    }

    fn cube() -> PrTree<Vector3, Pt> {
        PrTree::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0), 2)
    }

    #[test]
    fn insert_splits_past_capacity() {
        let mut tree = cube();
        for i in 0..16 {
            let t = i as f64 / 16.0;
            tree.insert(Pt(Vector3::new(0.9 - 1.8 * t, 0.8 * t - 0.4, t - 0.5)));
        }

        assert_eq!(tree.point_count(), 16);
        assert!(tree.depth() > 0);

        // every live point sits in exactly one leaf
        let mut seen = vec![0; 16];
        tree.traverse(TraverseOrder::PostOrder, &mut |node| {
            if node.is_leaf {
                assert!(node.points.len() <= tree.max_box());
                for &i in node.points {
                    seen[i] += 1;
                }
            }
        });
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn subtree_counts_are_consistent() {
        let mut tree = cube();
        for i in 0..40 {
            let t = i as f64 / 40.0;
            tree.insert(Pt(Vector3::new(t - 0.5, (1.3 * t).sin() * 0.9, 0.7 - t)));
        }

        tree.traverse(TraverseOrder::PostOrder, &mut |node| {
            if !node.is_leaf {
                assert!(node.points.is_empty());
            }
        });

        let mut root_count = 0;
        tree.traverse(TraverseOrder::PreOrder, &mut |node| {
            if node.depth == 0 {
                root_count = node.point_count;
            }
        });
        assert_eq!(root_count, 40);
    }

    #[test]
    fn find_and_remove() {
        let mut tree = cube();
        let p = Vector3::new(0.25, -0.25, 0.5);
        tree.insert(Pt(Vector3::new(-0.5, 0.5, 0.0)));
        let idx = tree.insert(Pt(p));

        assert_eq!(tree.find(p), Some(idx));
        assert!(tree.remove(idx));
        assert!(!tree.remove(idx));
        assert_eq!(tree.find(p), None);
        assert_eq!(tree.point_count(), 1);
    }

    #[test]
    fn coincident_points_terminate() {
        let mut tree = cube();
        for _ in 0..8 {
            tree.insert(Pt(Vector3::new(0.1, 0.1, 0.1)));
        }
        assert_eq!(tree.point_count(), 8);
        assert!(tree.depth() <= MAX_DEPTH);
    }
}
