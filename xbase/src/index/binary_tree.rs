//! Unbalanced in-memory binary search tree used to order keys before a
//! tag is rebuilt.
//!
//! Nodes live in one arena and refer to each other by index, so the
//! `above` back-links carry no ownership.

use std::cmp::Ordering;

use crate::index::key::{KeyComparison, KeyError, NodeKey};

/// Arena index of a tree node.
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    key: NodeKey,
    payload: T,
    lesser: Option<NodeId>,
    greater: Option<NodeId>,
    above: Option<NodeId>,
}

/// A disposable ordering aid: insert, then walk with `least`/`next`.
#[derive(Debug, Clone)]
pub struct BinaryTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: Option<NodeId>,
    comparison: KeyComparison,
}

impl<T> BinaryTree<T> {
    #[must_use]
    pub const fn new(comparison: KeyComparison) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            comparison,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach a new node. Keys greater than a node go right, everything
    /// else goes left.
    pub fn insert(&mut self, key: NodeKey, payload: T) -> Result<NodeId, KeyError> {
        let id = self.nodes.len();
        let mut above = None;
        let mut side = Ordering::Less;
        let mut cursor = self.root;
        while let Some(current) = cursor {
            let node = &self.nodes[current];
            above = Some(current);
            if key.compare(&node.key, self.comparison)? == Ordering::Greater {
                side = Ordering::Greater;
                cursor = node.greater;
            } else {
                side = Ordering::Less;
                cursor = node.lesser;
            }
        }

        self.nodes.push(TreeNode {
            key,
            payload,
            lesser: None,
            greater: None,
            above,
        });
        match above {
            None => self.root = Some(id),
            Some(parent) if side == Ordering::Greater => self.nodes[parent].greater = Some(id),
            Some(parent) => self.nodes[parent].lesser = Some(id),
        }
        Ok(id)
    }

    /// The node holding a key equal to `key`, if any.
    pub fn find(&self, key: &NodeKey) -> Result<Option<NodeId>, KeyError> {
        let mut cursor = self.root;
        while let Some(current) = cursor {
            let node = &self.nodes[current];
            cursor = match key.compare(&node.key, self.comparison)? {
                Ordering::Equal => return Ok(Some(current)),
                Ordering::Greater => node.greater,
                Ordering::Less => node.lesser,
            };
        }
        Ok(None)
    }

    /// Nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|root| (root, 1)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            height = height.max(depth);
            let node = &self.nodes[id];
            stack.extend(node.lesser.map(|child| (child, depth + 1)));
            stack.extend(node.greater.map(|child| (child, depth + 1)));
        }
        height
    }

    fn least_under(&self, mut id: NodeId) -> NodeId {
        while let Some(lesser) = self.nodes[id].lesser {
            id = lesser;
        }
        id
    }

    /// The node with the smallest key.
    #[must_use]
    pub fn least(&self) -> Option<NodeId> {
        self.root.map(|root| self.least_under(root))
    }

    /// In-order successor of `id`.
    #[must_use]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        if let Some(greater) = self.nodes.get(id)?.greater {
            return Some(self.least_under(greater));
        }
        // Climb until we leave a left subtree.
        let mut child = id;
        let mut parent = self.nodes[id].above;
        while let Some(above) = parent {
            if self.nodes[above].lesser == Some(child) {
                return Some(above);
            }
            child = above;
            parent = self.nodes[above].above;
        }
        None
    }

    #[must_use]
    pub fn key(&self, id: NodeId) -> Option<&NodeKey> {
        self.nodes.get(id).map(|node| &node.key)
    }

    #[must_use]
    pub fn payload(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.payload)
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.payload)
    }

    /// Walk every node in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeKey, &T)> + '_ {
        std::iter::successors(self.least(), |&id| self.next(id))
            .map(|id| (&self.nodes[id].key, &self.nodes[id].payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_empty_tree() {
        let tree: BinaryTree<u32> = BinaryTree::new(KeyComparison::Strict);
        assert!(tree.is_empty());
        assert_eq!(tree.least(), None);
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn test_links() {
        let mut tree = BinaryTree::new(KeyComparison::Strict);
        let root = tree.insert(NodeKey::text("M"), 1).expect("insert");
        let left = tree.insert(NodeKey::text("C"), 2).expect("insert");
        let right = tree.insert(NodeKey::text("X"), 3).expect("insert");
        let equal = tree.insert(NodeKey::text("M"), 4).expect("insert");

        assert_eq!(tree.least(), Some(left));
        assert_eq!(tree.next(left), Some(equal));
        assert_eq!(tree.next(equal), Some(root));
        assert_eq!(tree.next(root), Some(right));
        assert_eq!(tree.next(right), None);
        assert_eq!(tree.payload(equal), Some(&4));
        assert_eq!(tree.key(right), Some(&NodeKey::text("X")));
    }

    #[test]
    fn test_in_order_traversal_is_sorted() {
        let mut rng = StdRng::seed_from_u64(3);
        for round in 0..20 {
            let mut tree = BinaryTree::new(KeyComparison::Strict);
            let mut values: Vec<f64> = (0..200)
                .map(|_| f64::from(rng.random_range(-500i32..500)))
                .collect();
            for (i, value) in values.iter().enumerate() {
                tree.insert(NodeKey::Numeric(*value), i).expect("insert");
            }
            values.sort_by(f64::total_cmp);

            let walked: Vec<f64> = tree
                .iter()
                .map(|(key, _)| match key {
                    NodeKey::Numeric(value) => *value,
                    other => panic!("unexpected key {other}"),
                })
                .collect();
            assert_eq!(walked, values, "round {round}");
        }
    }

    #[test]
    fn test_distinct_keys_strictly_ascend() {
        let mut tree = BinaryTree::new(KeyComparison::Strict);
        for name in ["DAVE", "ALICE", "EVE", "BOB", "CAROL"] {
            tree.insert(NodeKey::text(name), ()).expect("insert");
        }
        let keys: Vec<&NodeKey> = tree.iter().map(|(key, _)| key).collect();
        for pair in keys.windows(2) {
            assert_eq!(
                pair[0].compare(pair[1], KeyComparison::Strict),
                Ok(Ordering::Less)
            );
        }
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_find_and_height() {
        let mut tree = BinaryTree::new(KeyComparison::Strict);
        assert_eq!(tree.height(), 0);
        for value in [4.0, 2.0, 6.0, 1.0, 3.0, 5.0, 7.0] {
            tree.insert(NodeKey::Numeric(value), vec![value]).expect("insert");
        }
        assert_eq!(tree.height(), 3);

        let six = tree.find(&NodeKey::Numeric(6.0)).expect("find").expect("present");
        tree.payload_mut(six).expect("payload").push(6.5);
        assert_eq!(tree.payload(six), Some(&vec![6.0, 6.5]));
        assert_eq!(tree.find(&NodeKey::Numeric(8.0)).expect("find"), None);

        let mut chain = BinaryTree::new(KeyComparison::Strict);
        for value in 0..50 {
            chain.insert(NodeKey::Numeric(f64::from(value)), ()).expect("insert");
        }
        assert_eq!(chain.height(), 50);
    }

    #[test]
    fn test_mixed_kinds_in_strict_mode() {
        let mut tree = BinaryTree::new(KeyComparison::Strict);
        tree.insert(NodeKey::text("A"), 1).expect("insert");
        assert!(tree.insert(NodeKey::Numeric(1.0), 2).is_err());
        assert_eq!(tree.len(), 1);
    }
}
