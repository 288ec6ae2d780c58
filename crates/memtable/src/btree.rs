//! Arena-backed B-tree.
//!
//! Nodes live in one `Vec` and refer to their parent and children by index,
//! so the upward walk needed by splits never fights the borrow checker.
//!
//! ```text
//!               [ m ]                 node 0 (root)
//!             /       \
//!       [ c  g ]     [ q  t ]         nodes 1, 2
//!      /   |   \     /   |   \
//!    ...  ...  ...  ... ...  ...      leaves
//! ```
//!
//! Insertion always lands in a leaf. An overflowing leaf first tries to hand
//! one key to an adjacent sibling through the parent (a rotation); only when
//! no sibling has room is the node split around its median, which may cascade
//! up to the root.
use record::Record;

use crate::OrderedStore;

type NodeId = usize;

#[derive(Debug, Default)]
struct Node {
    keys: Vec<String>,
    records: Vec<Record>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// B-tree of bounded fan-out keyed by string.
#[derive(Debug)]
pub struct BTree {
    nodes: Vec<Node>,
    root: NodeId,
    max_children: usize,
    len: usize,
}

impl BTree {
    /// Creates an empty tree whose nodes hold at most `max_children` children
    /// (and `max_children - 1` keys).
    ///
    /// # Panics
    ///
    /// Panics if `max_children < 3`.
    pub fn new(max_children: usize) -> Self {
        assert!(max_children >= 3, "max_children must be >= 3");
        Self {
            nodes: vec![Node::default()],
            root: 0,
            max_children,
            len: 0,
        }
    }

    fn max_keys(&self) -> usize {
        self.max_children - 1
    }

    /// Descends to the node holding `key`, or to the leaf where it belongs.
    fn locate(&self, key: &str) -> (NodeId, Result<usize, usize>) {
        let mut id = self.root;
        loop {
            let node = &self.nodes[id];
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(pos) => return (id, Ok(pos)),
                Err(pos) if node.is_leaf() => return (id, Err(pos)),
                Err(pos) => id = node.children[pos],
            }
        }
    }

    fn child_position(&self, parent: NodeId, child: NodeId) -> usize {
        let pos = self.nodes[parent].children.iter().position(|&c| c == child);
        debug_assert!(pos.is_some(), "node {child} is not linked from its parent {parent}");
        pos.unwrap_or(0)
    }

    /// Restores the key bound on an overflowing leaf.
    fn rebalance_leaf(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent {
            let idx = self.child_position(parent, id);
            let last = self.nodes[parent].children.len() - 1;
            let has_room = |tree: &Self, sibling: NodeId| tree.nodes[sibling].keys.len() < tree.max_keys();

            if idx > 0 {
                let left = self.nodes[parent].children[idx - 1];
                if has_room(self, left) {
                    self.rotate_into_left(id, parent, idx);
                    return;
                }
            }
            if idx < last {
                let right = self.nodes[parent].children[idx + 1];
                if has_room(self, right) {
                    self.rotate_into_right(id, parent, idx);
                    return;
                }
            }
        }
        self.split(id);
    }

    /// Smallest key of `id` moves up, the separator moves down to the left sibling.
    fn rotate_into_left(&mut self, id: NodeId, parent: NodeId, idx: usize) {
        let left = self.nodes[parent].children[idx - 1];
        let key = self.nodes[id].keys.remove(0);
        let record = self.nodes[id].records.remove(0);

        let sep_key = std::mem::replace(&mut self.nodes[parent].keys[idx - 1], key);
        let sep_record = std::mem::replace(&mut self.nodes[parent].records[idx - 1], record);

        self.nodes[left].keys.push(sep_key);
        self.nodes[left].records.push(sep_record);
    }

    /// Largest key of `id` moves up, the separator moves down to the right sibling.
    fn rotate_into_right(&mut self, id: NodeId, parent: NodeId, idx: usize) {
        let right = self.nodes[parent].children[idx + 1];
        let (Some(key), Some(record)) = (self.nodes[id].keys.pop(), self.nodes[id].records.pop())
        else {
            return;
        };

        let sep_key = std::mem::replace(&mut self.nodes[parent].keys[idx], key);
        let sep_record = std::mem::replace(&mut self.nodes[parent].records[idx], record);

        self.nodes[right].keys.insert(0, sep_key);
        self.nodes[right].records.insert(0, sep_record);
    }

    /// Splits `id` around its median and pushes the median into the parent,
    /// splitting upward while parents overflow.
    fn split(&mut self, mut id: NodeId) {
        loop {
            let mid = self.max_keys() / 2;
            let node = &mut self.nodes[id];

            let right_keys = node.keys.split_off(mid + 1);
            let right_records = node.records.split_off(mid + 1);
            let right_children = if node.is_leaf() {
                Vec::new()
            } else {
                node.children.split_off(mid + 1)
            };
            let (Some(mid_key), Some(mid_record)) = (node.keys.pop(), node.records.pop()) else {
                return;
            };
            let parent = node.parent;

            let right = self.nodes.len();
            for &child in &right_children {
                self.nodes[child].parent = Some(right);
            }
            self.nodes.push(Node {
                keys: right_keys,
                records: right_records,
                children: right_children,
                parent,
            });

            match parent {
                None => {
                    let root = self.nodes.len();
                    self.nodes.push(Node {
                        keys: vec![mid_key],
                        records: vec![mid_record],
                        children: vec![id, right],
                        parent: None,
                    });
                    self.nodes[id].parent = Some(root);
                    self.nodes[right].parent = Some(root);
                    self.root = root;
                    return;
                }
                Some(p) => {
                    let pos = self.child_position(p, id);
                    let pnode = &mut self.nodes[p];
                    pnode.keys.insert(pos, mid_key);
                    pnode.records.insert(pos, mid_record);
                    pnode.children.insert(pos + 1, right);
                    if pnode.keys.len() <= self.max_children - 1 {
                        return;
                    }
                    id = p;
                }
            }
        }
    }

    fn walk_node<F>(&self, id: NodeId, from: &str, visit: &mut F) -> bool
    where
        F: FnMut(&str, &Record) -> bool,
    {
        let node = &self.nodes[id];
        let start = node.keys.partition_point(|k| k.as_str() < from);
        if node.is_leaf() {
            for i in start..node.keys.len() {
                if !visit(&node.keys[i], &node.records[i]) {
                    return false;
                }
            }
            return true;
        }
        for i in start..node.keys.len() {
            if !self.walk_node(node.children[i], from, visit) {
                return false;
            }
            if !visit(&node.keys[i], &node.records[i]) {
                return false;
            }
        }
        self.walk_node(node.children[node.keys.len()], from, visit)
    }

    /// Depth of every leaf, for structural checks.
    #[cfg(test)]
    pub(crate) fn leaf_depths(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                out.push(depth);
            }
            stack.extend(node.children.iter().map(|&c| (c, depth + 1)));
        }
        out
    }

    /// Checks key bounds, child counts and parent links (both directions) on
    /// every reachable node.
    #[cfg(test)]
    pub(crate) fn check_structure(&self) -> bool {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.keys.len() > self.max_keys() || node.keys.len() != node.records.len() {
                return false;
            }
            if !node.is_leaf() && node.children.len() != node.keys.len() + 1 {
                return false;
            }
            if node.children.iter().any(|&c| self.nodes[c].parent != Some(id)) {
                return false;
            }
            if let Some(parent) = node.parent {
                if !self.nodes[parent].children.contains(&id) {
                    return false;
                }
            }
            stack.extend(node.children.iter().copied());
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn root_keys(&self) -> Vec<String> {
        self.nodes[self.root].keys.clone()
    }
}

impl OrderedStore for BTree {
    fn upsert(&mut self, key: &str, record: Record) -> bool {
        match self.locate(key) {
            (id, Ok(pos)) => {
                self.nodes[id].records[pos] = record;
                false
            }
            (id, Err(pos)) => {
                self.nodes[id].keys.insert(pos, key.to_string());
                self.nodes[id].records.insert(pos, record);
                self.len += 1;
                if self.nodes[id].keys.len() > self.max_keys() {
                    self.rebalance_leaf(id);
                }
                true
            }
        }
    }

    fn get(&self, key: &str) -> Option<&Record> {
        match self.locate(key) {
            (id, Ok(pos)) => Some(&self.nodes[id].records[pos]),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn walk_from(&self, from: &str, visit: &mut dyn FnMut(&str, &Record) -> bool) {
        self.walk_node(self.root, from, &mut |k: &str, r: &Record| visit(k, r));
    }

    fn clear(&mut self) {
        self.nodes = vec![Node::default()];
        self.root = 0;
        self.len = 0;
    }
}
