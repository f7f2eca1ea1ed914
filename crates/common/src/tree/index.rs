use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::uid::Uid;

use super::node::{Node, NodeKey, NodeState};

/// Node table plus a children index.
///
/// The index holds live and soft-deleted children; purged nodes are only
/// kept in the table as tombstones.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: HashMap<Uid, Node>,
    children: HashMap<NodeKey, BTreeSet<Uid>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: &Uid) -> Option<&Node> {
        self.nodes.get(uid)
    }

    pub fn get_mut(&mut self, uid: &Uid) -> Option<&mut Node> {
        self.nodes.get_mut(uid)
    }

    pub fn insert(&mut self, node: Node) {
        if !node.is_purged() {
            self.children
                .entry(node.parent_key())
                .or_default()
                .insert(node.uid);
        }
        self.nodes.insert(node.uid, node);
    }

    /// Non-purged children of `key`, in no particular order
    pub fn children(&self, key: &NodeKey) -> impl Iterator<Item = &Node> + '_ {
        self.children
            .get(key)
            .into_iter()
            .flat_map(|set| set.iter())
            .filter_map(|uid| self.nodes.get(uid))
    }

    pub fn live_child_named(&self, key: &NodeKey, name: &str) -> Option<Uid> {
        self.children(key)
            .find(|child| child.is_live() && child.name == name)
            .map(|child| child.uid)
    }

    pub fn has_live_children(&self, key: &NodeKey) -> bool {
        self.children(key).any(|child| child.is_live())
    }

    /// Whether `candidate` sits somewhere below `ancestor` (or is it)
    pub fn is_within(&self, candidate: Uid, ancestor: Uid) -> bool {
        let mut cursor = Some(candidate);
        while let Some(uid) = cursor {
            if uid == ancestor {
                return true;
            }
            cursor = self.nodes.get(&uid).and_then(|node| node.parent);
        }
        false
    }

    /// `uid` and every non-purged node below it, parents before children
    pub fn subtree(&self, uid: Uid) -> Vec<Uid> {
        let mut out = Vec::new();
        let mut stack = vec![uid];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(&NodeKey::Node(next)).map(|child| child.uid));
        }
        out
    }

    /// Like [`subtree`](Self::subtree) but skipping soft-deleted nodes and
    /// everything below them
    pub fn live_subtree(&self, uid: Uid) -> Vec<Uid> {
        let mut out = Vec::new();
        let mut stack = vec![uid];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(
                self.children(&NodeKey::Node(next))
                    .filter(|child| child.is_live())
                    .map(|child| child.uid),
            );
        }
        out
    }

    /// Hang `uid` under a new parent, keeping the index in step
    pub fn reparent(&mut self, uid: Uid, parent: Option<Uid>) {
        let Some(node) = self.nodes.get_mut(&uid) else {
            return;
        };
        let old_key = node.parent_key();
        node.parent = parent;
        let new_key = node.parent_key();

        if let Some(set) = self.children.get_mut(&old_key) {
            set.remove(&uid);
            if set.is_empty() {
                self.children.remove(&old_key);
            }
        }
        self.children.entry(new_key).or_default().insert(uid);
    }

    /// Turn a node into a tombstone and unhook it from its parent
    pub fn mark_purged(&mut self, uid: Uid, at: DateTime<Utc>) {
        let Some(node) = self.nodes.get_mut(&uid) else {
            return;
        };
        node.state = NodeState::Purged { at };
        let key = node.parent_key();
        if let Some(set) = self.children.get_mut(&key) {
            set.remove(&uid);
            if set.is_empty() {
                self.children.remove(&key);
            }
        }
        self.children.remove(&NodeKey::Node(uid));
    }

    pub fn nodes_of<'a>(&'a self, tenant: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.values().filter(move |node| node.tenant == tenant)
    }

    /// Every tenant owning at least one node, tombstones included
    pub fn tenants(&self) -> BTreeSet<String> {
        self.nodes.values().map(|node| node.tenant.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::node::NodeType;
    use crate::uid::UidAllocator;

    fn node(uid: Uid, parent: Option<Uid>, name: &str, node_type: NodeType) -> Node {
        let now = Utc::now();
        Node {
            uid,
            parent,
            name: name.to_string(),
            node_type,
            tenant: "default".to_string(),
            owner: "root".to_string(),
            mode: 0o755,
            created_at: now,
            modified_at: now,
            state: NodeState::Live,
        }
    }

    #[test]
    fn test_reparent_moves_index_entry() {
        let mut uids = UidAllocator::new();
        let (a, b, f) = (uids.allocate(), uids.allocate(), uids.allocate());
        let mut tree = Tree::new();
        tree.insert(node(a, None, "a", NodeType::Directory));
        tree.insert(node(b, None, "b", NodeType::Directory));
        tree.insert(node(f, Some(a), "f", NodeType::RegularFile));

        assert_eq!(tree.live_child_named(&NodeKey::Node(a), "f"), Some(f));
        tree.reparent(f, Some(b));
        assert!(!tree.has_live_children(&NodeKey::Node(a)));
        assert_eq!(tree.live_child_named(&NodeKey::Node(b), "f"), Some(f));
        assert!(tree.is_within(f, b));
        assert!(!tree.is_within(f, a));
    }

    #[test]
    fn test_subtree_and_purge() {
        let mut uids = UidAllocator::new();
        let (a, b, f) = (uids.allocate(), uids.allocate(), uids.allocate());
        let mut tree = Tree::new();
        tree.insert(node(a, None, "a", NodeType::Directory));
        tree.insert(node(b, Some(a), "b", NodeType::Directory));
        tree.insert(node(f, Some(b), "f", NodeType::RegularFile));

        let all = tree.subtree(a);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], a);

        tree.mark_purged(b, Utc::now());
        assert_eq!(tree.subtree(a), vec![a]);
        assert!(tree.get(&b).unwrap().is_purged());
        assert_eq!(tree.len(), 3);
    }
}
