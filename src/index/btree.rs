//! B+Tree
//!
//! Ordered multi-map from string keys to record ids. Nodes live in an arena
//! and refer to each other by index, so splits, merges and root changes are
//! index reassignments. Leaves are chained through `next` for ordered scans.
//!
//! Keys compare byte-wise (`str` ordering); there is no locale collation.

use std::mem;
use std::ops::Bound;

/// Position of a node in the arena
pub type NodeId = usize;

/// Ordinal position of a record in its data file
pub type RecordId = usize;

/// Default order used when none is configured
pub const DEFAULT_ORDER: usize = 32;

#[derive(Debug, Clone)]
enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Default for Node {
    fn default() -> Self {
        Node::Leaf(LeafNode::default())
    }
}

#[derive(Debug, Clone, Default)]
struct LeafNode {
    keys: Vec<String>,
    /// Record ids per key, aligned with `keys`; duplicates are kept
    values: Vec<Vec<RecordId>>,
    next: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct InternalNode {
    /// `keys[i]` is the first key reachable from `children[i + 1]`
    keys: Vec<String>,
    children: Vec<NodeId>,
}

/// Balanced B+Tree over string keys
#[derive(Debug, Clone)]
pub struct BPlusTree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
    max_keys: usize,
    min_keys_internal: usize,
    min_keys_leaf: usize,
}

impl Default for BPlusTree {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER)
    }
}

impl BPlusTree {
    /// Create an empty tree; orders below 4 are raised to 4
    pub fn new(order: usize) -> Self {
        let max_keys = order.max(4) - 1;
        Self {
            nodes: vec![Node::default()],
            free: Vec::new(),
            root: 0,
            max_keys,
            min_keys_internal: max_keys / 2,
            min_keys_leaf: (max_keys + 1) / 2,
        }
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Remove every key
    pub fn clear(&mut self) {
        self.nodes = vec![Node::default()];
        self.free.clear();
        self.root = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.traverse(Bound::Unbounded, Bound::Unbounded).next().is_none()
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.traverse(Bound::Unbounded, Bound::Unbounded).count()
    }

    /// Number of levels from root to leaves
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal(node) = &self.nodes[id] {
            id = node.children[0];
            height += 1;
        }
        height
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Add `record` under `key`
    pub fn insert(&mut self, key: &str, record: RecordId) {
        if let Some((separator, right)) = self.insert_into(self.root, key, record) {
            let old_root = self.root;
            self.root = self.alloc(Node::Internal(InternalNode {
                keys: vec![separator],
                children: vec![old_root, right],
            }));
        }
    }

    /// Returns the promoted separator and new right node when `id` splits
    fn insert_into(&mut self, id: NodeId, key: &str, record: RecordId) -> Option<(String, NodeId)> {
        let (pos, child) = match &self.nodes[id] {
            Node::Leaf(_) => return self.insert_into_leaf(id, key, record),
            Node::Internal(node) => {
                let pos = child_index(&node.keys, key);
                (pos, node.children[pos])
            }
        };

        let (separator, new_child) = self.insert_into(child, key, record)?;

        let max_keys = self.max_keys;
        let Node::Internal(node) = &mut self.nodes[id] else {
            unreachable!("descended through a leaf")
        };
        node.keys.insert(pos, separator);
        node.children.insert(pos + 1, new_child);
        if node.keys.len() <= max_keys {
            return None;
        }

        let mid = node.keys.len() / 2;
        let right_keys = node.keys.split_off(mid + 1);
        let right_children = node.children.split_off(mid + 1);
        let promoted = node.keys.pop()?;

        let right = self.alloc(Node::Internal(InternalNode {
            keys: right_keys,
            children: right_children,
        }));
        Some((promoted, right))
    }

    fn insert_into_leaf(&mut self, id: NodeId, key: &str, record: RecordId) -> Option<(String, NodeId)> {
        let max_keys = self.max_keys;
        let Node::Leaf(leaf) = &mut self.nodes[id] else {
            unreachable!("expected a leaf")
        };

        match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(i) => {
                leaf.values[i].push(record);
                return None;
            }
            Err(i) => {
                leaf.keys.insert(i, key.to_string());
                leaf.values.insert(i, vec![record]);
            }
        }
        if leaf.keys.len() <= max_keys {
            return None;
        }

        let mid = leaf.keys.len() / 2;
        let right_leaf = LeafNode {
            keys: leaf.keys.split_off(mid),
            values: leaf.values.split_off(mid),
            next: leaf.next,
        };
        let separator = right_leaf.keys[0].clone();

        let right = self.alloc(Node::Leaf(right_leaf));
        if let Node::Leaf(leaf) = &mut self.nodes[id] {
            leaf.next = Some(right);
        }
        Some((separator, right))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove one occurrence of `record` under `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &str, record: RecordId) -> bool {
        let removed = self.delete_from(self.root, key, record);

        if let Node::Internal(root) = &self.nodes[self.root] {
            if root.keys.is_empty() {
                if let Some(&only_child) = root.children.first() {
                    let old_root = self.root;
                    self.root = only_child;
                    self.release(old_root);
                }
            }
        }
        removed
    }

    fn delete_from(&mut self, id: NodeId, key: &str, record: RecordId) -> bool {
        let (pos, child) = match &mut self.nodes[id] {
            Node::Leaf(leaf) => {
                let Ok(i) = leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) else {
                    return false;
                };
                let Some(at) = leaf.values[i].iter().position(|&r| r == record) else {
                    return false;
                };
                leaf.values[i].remove(at);
                if leaf.values[i].is_empty() {
                    leaf.keys.remove(i);
                    leaf.values.remove(i);
                }
                return true;
            }
            Node::Internal(node) => {
                let pos = child_index(&node.keys, key);
                (pos, node.children[pos])
            }
        };

        if !self.delete_from(child, key, record) {
            return false;
        }
        if self.underflows(child) {
            self.rebalance_child(id, pos);
        }
        self.refresh_separators(id);
        true
    }

    fn underflows(&self, id: NodeId) -> bool {
        match &self.nodes[id] {
            Node::Leaf(leaf) => leaf.keys.len() < self.min_keys_leaf,
            Node::Internal(node) => node.keys.len() < self.min_keys_internal,
        }
    }

    /// Fix an underflowing child: borrow left, borrow right, else merge
    /// (preferring the left sibling).
    fn rebalance_child(&mut self, parent: NodeId, index: usize) {
        let child_count = match &self.nodes[parent] {
            Node::Internal(node) => node.children.len(),
            Node::Leaf(_) => return,
        };

        if index > 0 && self.try_borrow_left(parent, index) {
            return;
        }
        if index + 1 < child_count && self.try_borrow_right(parent, index) {
            return;
        }
        if index > 0 {
            self.merge_children(parent, index - 1);
        } else if index + 1 < child_count {
            self.merge_children(parent, index);
        }
    }

    fn try_borrow_left(&mut self, parent: NodeId, index: usize) -> bool {
        let (left_id, child_id) = self.sibling_pair(parent, index - 1);
        let mut left = mem::take(&mut self.nodes[left_id]);
        let mut child = mem::take(&mut self.nodes[child_id]);

        let borrowed = match (&mut left, &mut child) {
            (Node::Leaf(l), Node::Leaf(c)) if l.keys.len() > self.min_keys_leaf => {
                if let (Some(k), Some(v)) = (l.keys.pop(), l.values.pop()) {
                    c.keys.insert(0, k);
                    c.values.insert(0, v);
                }
                true
            }
            (Node::Internal(l), Node::Internal(c)) if l.keys.len() > self.min_keys_internal => {
                l.keys.pop();
                if let Some(moved) = l.children.pop() {
                    c.children.insert(0, moved);
                    c.keys.insert(0, String::new());
                }
                true
            }
            _ => false,
        };

        self.nodes[left_id] = left;
        self.nodes[child_id] = child;
        if borrowed {
            self.refresh_separators(child_id);
        }
        borrowed
    }

    fn try_borrow_right(&mut self, parent: NodeId, index: usize) -> bool {
        let (child_id, right_id) = self.sibling_pair(parent, index);
        let mut child = mem::take(&mut self.nodes[child_id]);
        let mut right = mem::take(&mut self.nodes[right_id]);

        let borrowed = match (&mut child, &mut right) {
            (Node::Leaf(c), Node::Leaf(r)) if r.keys.len() > self.min_keys_leaf => {
                c.keys.push(r.keys.remove(0));
                c.values.push(r.values.remove(0));
                true
            }
            (Node::Internal(c), Node::Internal(r)) if r.keys.len() > self.min_keys_internal => {
                r.keys.remove(0);
                c.children.push(r.children.remove(0));
                c.keys.push(String::new());
                true
            }
            _ => false,
        };

        self.nodes[child_id] = child;
        self.nodes[right_id] = right;
        if borrowed {
            self.refresh_separators(child_id);
        }
        borrowed
    }

    /// Merge `children[index + 1]` into `children[index]`
    fn merge_children(&mut self, parent: NodeId, index: usize) {
        let (left_id, right_id) = self.sibling_pair(parent, index);
        let right = mem::take(&mut self.nodes[right_id]);

        let unmerged = match (&mut self.nodes[left_id], right) {
            (Node::Leaf(l), Node::Leaf(r)) => {
                l.keys.extend(r.keys);
                l.values.extend(r.values);
                l.next = r.next;
                None
            }
            (Node::Internal(l), Node::Internal(r)) => {
                l.keys.push(String::new());
                l.keys.extend(r.keys);
                l.children.extend(r.children);
                None
            }
            (_, right) => Some(right),
        };
        if let Some(right) = unmerged {
            // Siblings always share a level; put the node back untouched
            self.nodes[right_id] = right;
            return;
        }

        if let Node::Internal(node) = &mut self.nodes[parent] {
            node.keys.remove(index);
            node.children.remove(index + 1);
        }
        self.release(right_id);
        self.refresh_separators(left_id);
    }

    /// Recompute every separator of an internal node from its children
    fn refresh_separators(&mut self, id: NodeId) {
        let children = match &self.nodes[id] {
            Node::Internal(node) => node.children.clone(),
            Node::Leaf(_) => return,
        };

        let firsts: Vec<Option<String>> = children
            .iter()
            .skip(1)
            .map(|&c| self.first_key(c).map(str::to_string))
            .collect();

        if let Node::Internal(node) = &mut self.nodes[id] {
            for (slot, first) in node.keys.iter_mut().zip(firsts) {
                if let Some(first) = first {
                    *slot = first;
                }
            }
        }
    }

    fn sibling_pair(&self, parent: NodeId, left_index: usize) -> (NodeId, NodeId) {
        match &self.nodes[parent] {
            Node::Internal(node) => (node.children[left_index], node.children[left_index + 1]),
            Node::Leaf(_) => unreachable!("leaf has no children"),
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// All record ids stored under exactly `key`
    pub fn search(&self, key: &str) -> Vec<RecordId> {
        let Some(leaf) = self.leaf_node(self.find_leaf(key)) else {
            return Vec::new();
        };
        match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(i) => leaf.values[i].clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Record ids of every key starting with `prefix`, in key order
    pub fn search_prefix(&self, prefix: &str) -> Vec<RecordId> {
        self.traverse(Bound::Included(prefix), Bound::Unbounded)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Record ids of keys within `[min, max]`; `None` leaves a side open
    pub fn search_range(&self, min: Option<&str>, max: Option<&str>) -> Vec<RecordId> {
        let lower = min.map_or(Bound::Unbounded, Bound::Included);
        let upper = max.map_or(Bound::Unbounded, Bound::Included);
        self.traverse(lower, upper)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Ordered iteration over `(key, record ids)` within the bounds.
    ///
    /// Traversals only borrow the tree, so any number may run side by side.
    pub fn traverse(&self, lower: Bound<&str>, upper: Bound<&str>) -> Traverse<'_> {
        let (leaf, pos) = match lower {
            Bound::Unbounded => (self.leftmost_leaf(self.root), 0),
            Bound::Included(key) | Bound::Excluded(key) => {
                let id = self.find_leaf(key);
                let pos = match self.leaf_node(id) {
                    Some(leaf) => match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                        Ok(i) if matches!(lower, Bound::Excluded(_)) => i + 1,
                        Ok(i) => i,
                        Err(i) => i,
                    },
                    None => 0,
                };
                (id, pos)
            }
        };

        Traverse {
            tree: self,
            leaf: Some(leaf),
            pos,
            upper: match upper {
                Bound::Included(k) => Bound::Included(k.to_string()),
                Bound::Excluded(k) => Bound::Excluded(k.to_string()),
                Bound::Unbounded => Bound::Unbounded,
            },
        }
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Check structural invariants, returning a description of each violation
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut leaf_depth = None;
        self.check_node(self.root, 1, true, &mut leaf_depth, &mut violations);

        // Leaf chain must visit keys in strictly increasing order
        let mut previous: Option<&str> = None;
        for (key, ids) in self.traverse(Bound::Unbounded, Bound::Unbounded) {
            if ids.is_empty() {
                violations.push(format!("key '{}' has no record ids", key));
            }
            if let Some(prev) = previous {
                if prev >= key {
                    violations.push(format!("leaf chain out of order: '{}' before '{}'", prev, key));
                }
            }
            previous = Some(key);
        }
        violations
    }

    fn check_node(
        &self,
        id: NodeId,
        depth: usize,
        is_root: bool,
        leaf_depth: &mut Option<usize>,
        violations: &mut Vec<String>,
    ) {
        match &self.nodes[id] {
            Node::Leaf(leaf) => {
                if leaf.keys.len() != leaf.values.len() {
                    violations.push(format!("leaf {} has misaligned keys and values", id));
                }
                if !is_root && !(self.min_keys_leaf..=self.max_keys).contains(&leaf.keys.len()) {
                    violations.push(format!("leaf {} holds {} keys", id, leaf.keys.len()));
                }
                match leaf_depth {
                    Some(d) if *d != depth => {
                        violations.push(format!("leaf {} at depth {} (expected {})", id, depth, d))
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }
            }
            Node::Internal(node) => {
                if node.children.len() != node.keys.len() + 1 {
                    violations.push(format!("internal {} has {} keys and {} children", id, node.keys.len(), node.children.len()));
                }
                if !is_root && !(self.min_keys_internal..=self.max_keys).contains(&node.keys.len()) {
                    violations.push(format!("internal {} holds {} keys", id, node.keys.len()));
                }
                for (i, key) in node.keys.iter().enumerate() {
                    let first = node.children.get(i + 1).and_then(|&c| self.first_key(c));
                    if first != Some(key.as_str()) {
                        violations.push(format!("internal {} separator '{}' does not match child first key {:?}", id, key, first));
                    }
                }
                for &child in &node.children {
                    self.check_node(child, depth + 1, false, leaf_depth, violations);
                }
            }
        }
    }

    // =========================================================================
    // Arena Helpers
    // =========================================================================

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::default();
        self.free.push(id);
    }

    fn leaf_node(&self, id: NodeId) -> Option<&LeafNode> {
        match &self.nodes[id] {
            Node::Leaf(leaf) => Some(leaf),
            Node::Internal(_) => None,
        }
    }

    fn find_leaf(&self, key: &str) -> NodeId {
        let mut id = self.root;
        while let Node::Internal(node) = &self.nodes[id] {
            id = node.children[child_index(&node.keys, key)];
        }
        id
    }

    fn leftmost_leaf(&self, from: NodeId) -> NodeId {
        let mut id = from;
        while let Node::Internal(node) = &self.nodes[id] {
            id = node.children[0];
        }
        id
    }

    fn first_key(&self, id: NodeId) -> Option<&str> {
        self.leaf_node(self.leftmost_leaf(id))
            .and_then(|leaf| leaf.keys.first())
            .map(String::as_str)
    }
}

/// Child slot for `key`: the number of separators `<= key`
fn child_index(keys: &[String], key: &str) -> usize {
    keys.partition_point(|k| k.as_str() <= key)
}

/// Iterator returned by [`BPlusTree::traverse`]
pub struct Traverse<'a> {
    tree: &'a BPlusTree,
    leaf: Option<NodeId>,
    pos: usize,
    upper: Bound<String>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = (&'a str, &'a [RecordId]);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let leaf = tree.leaf_node(self.leaf?)?;
            if self.pos >= leaf.keys.len() {
                self.leaf = leaf.next;
                self.pos = 0;
                continue;
            }

            let key = leaf.keys[self.pos].as_str();
            let within = match &self.upper {
                Bound::Unbounded => true,
                Bound::Included(max) => key <= max.as_str(),
                Bound::Excluded(max) => key < max.as_str(),
            };
            if !within {
                self.leaf = None;
                return None;
            }

            let ids = leaf.values[self.pos].as_slice();
            self.pos += 1;
            return Some((key, ids));
        }
    }
}
