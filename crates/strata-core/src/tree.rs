// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Flat node arena plus offset and size resolution.
//!
//! Nodes live in one `Vec`; parent links and references are ids, never
//! indices, so reparenting, copying between trees and undo capture stay
//! cheap. Index lookups go through an id → index map that is rebuilt after
//! every positional insert or removal.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::command::CommandError;
use crate::node::{Node, NodeId, NodeKind};

/// A layout tree: nodes, id allocator, and the absolute address of root
/// level.
///
/// Not internally synchronized. One thread owns and mutates a tree; during
/// editing all mutation goes through [`crate::Command`]s.
#[derive(Debug, Clone)]
pub struct NodeTree {
    /// Absolute address that root-level offsets are relative to.
    pub base_address: u64,
    nodes: Vec<Node>,
    index: FxHashMap<NodeId, usize>,
    next_id: u64,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NodeTree {
    /// Largest id accepted from persisted or caller-built nodes. The
    /// allocator starts at most one past it, so it has half the id space
    /// left and never wraps back to [`NodeId::NONE`].
    pub const MAX_ID: u64 = u64::MAX >> 1;

    /// Creates an empty tree mapped at `base_address`.
    pub fn new(base_address: u64) -> Self {
        Self {
            base_address,
            nodes: Vec::new(),
            index: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Builds a tree from persisted nodes, keeping their ids.
    ///
    /// The allocator resumes above both the largest id present and
    /// `next_id`. Ids and `next_id` must leave allocator headroom (see
    /// [`NodeTree::MAX_ID`]). Every parent must exist and be a container,
    /// and parent chains must be acyclic.
    pub fn from_nodes(
        base_address: u64,
        nodes: Vec<Node>,
        next_id: u64,
    ) -> Result<Self, CommandError> {
        let mut tree = Self::new(base_address);
        for node in nodes {
            if node.id.is_none() {
                return Err(CommandError::MissingNode(node.id));
            }
            if tree.index.contains_key(&node.id) {
                return Err(CommandError::DuplicateId(node.id));
            }
            check_id(node.id)?;
            tree.next_id = tree.next_id.max(node.id.value() + 1);
            tree.index.insert(node.id, tree.nodes.len());
            tree.nodes.push(node);
        }
        if next_id > Self::MAX_ID + 1 {
            return Err(CommandError::IdOutOfRange(NodeId::from_raw(next_id)));
        }
        tree.next_id = tree.next_id.max(next_id);
        for node in &tree.nodes {
            tree.check_parent(node.parent_id)?;
            if tree.has_parent_cycle(node.id) {
                return Err(CommandError::WouldCreateCycle {
                    node: node.id,
                    parent: node.parent_id,
                });
            }
        }
        Ok(tree)
    }

    /// All nodes in storage order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Next id the allocator will hand out.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Allocates a fresh id. Ids are never reused.
    pub fn reserve_id(&mut self) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Appends `node`, allocating an id when it has none. Returns its index.
    pub fn add_node(&mut self, mut node: Node) -> Result<usize, CommandError> {
        if node.id.is_none() {
            node.id = self.reserve_id();
        } else if self.index.contains_key(&node.id) {
            return Err(CommandError::DuplicateId(node.id));
        }
        check_id(node.id)?;
        self.check_parent(node.parent_id)?;
        self.next_id = self.next_id.max(node.id.value() + 1);
        let idx = self.nodes.len();
        self.index.insert(node.id, idx);
        self.nodes.push(node);
        Ok(idx)
    }

    /// Index of `id`, if present.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Node with `id`, if present.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Node at storage index `idx`.
    pub fn node_at(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    /// True when `id` is present.
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Indices of `parent`'s children ordered by offset, ties by storage
    /// order.
    pub fn children_of(&self, parent: NodeId) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent_id == parent)
            .map(|(i, _)| i)
            .collect();
        out.sort_by_key(|&i| self.nodes[i].offset);
        out
    }

    /// Indices of root-level nodes, ordered like [`NodeTree::children_of`].
    pub fn roots(&self) -> Vec<usize> {
        self.children_of(NodeId::NONE)
    }

    /// Root struct whose type name (see [`Node::type_name`]) is `name`.
    pub fn find_root_struct(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.is_root() && n.kind == NodeKind::Struct && n.type_name() == name)
            .map(|n| n.id)
    }

    /// Absolute address of the node at `idx`.
    ///
    /// Sums offsets along the parent chain plus `base_address`. O(depth).
    /// A dangling parent ends the walk as if the node were a root.
    pub fn compute_offset(&self, idx: usize) -> u64 {
        let mut addr = self.base_address;
        let mut cur = idx;
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(cur) else {
                break;
            };
            addr = addr.wrapping_add(node.offset);
            match self.index_of(node.parent_id) {
                Some(p) if node.parent_id.is_some() => cur = p,
                _ => break,
            }
        }
        addr
    }

    /// Absolute address of node `id`.
    pub fn address_of(&self, id: NodeId) -> Option<u64> {
        self.index_of(id).map(|i| self.compute_offset(i))
    }

    /// Byte size of the node at `idx`.
    ///
    /// Structs span the furthest child extent, or mirror the definition
    /// named by `ref_id` when they have no children. Struct-typed arrays
    /// multiply by the referenced definition's size. Reference cycles size
    /// as zero.
    pub fn byte_size(&self, idx: usize) -> u64 {
        let mut visiting = FxHashSet::default();
        self.size_inner(idx, &mut visiting)
    }

    /// Byte size of node `id`, zero when absent.
    pub fn size_of(&self, id: NodeId) -> u64 {
        self.index_of(id).map_or(0, |i| self.byte_size(i))
    }

    /// Distance between consecutive elements of the Array at `idx`.
    pub fn element_stride(&self, idx: usize) -> u64 {
        let mut visiting = FxHashSet::default();
        self.stride_inner(idx, &mut visiting)
    }

    /// Absolute address of element `i` of the Array at `idx`.
    pub fn element_address(&self, idx: usize, i: u64) -> u64 {
        self.compute_offset(idx)
            .wrapping_add(i.wrapping_mul(self.element_stride(idx)))
    }

    fn size_inner(&self, idx: usize, visiting: &mut FxHashSet<NodeId>) -> u64 {
        let Some(node) = self.nodes.get(idx) else {
            return 0;
        };
        match node.kind {
            NodeKind::Struct => {
                if !visiting.insert(node.id) {
                    return 0;
                }
                let children = self.children_of(node.id);
                let size = if children.is_empty() {
                    self.ref_index(node)
                        .map_or(0, |r| self.size_inner(r, visiting))
                } else {
                    children
                        .into_iter()
                        .map(|c| {
                            self.nodes[c]
                                .offset
                                .saturating_add(self.size_inner(c, visiting))
                        })
                        .max()
                        .unwrap_or(0)
                };
                visiting.remove(&node.id);
                size
            }
            NodeKind::Array => node
                .array_len
                .saturating_mul(self.stride_inner(idx, visiting)),
            _ => node.intrinsic_size().unwrap_or(0),
        }
    }

    fn stride_inner(&self, idx: usize, visiting: &mut FxHashSet<NodeId>) -> u64 {
        let Some(node) = self.nodes.get(idx) else {
            return 0;
        };
        if node.element_kind != NodeKind::Struct {
            return node.element_kind.fixed_size().unwrap_or(0);
        }
        if !visiting.insert(node.id) {
            return 0;
        }
        let stride = self
            .ref_index(node)
            .map_or(0, |r| self.size_inner(r, visiting));
        visiting.remove(&node.id);
        stride
    }

    fn ref_index(&self, node: &Node) -> Option<usize> {
        if node.ref_id.is_none() || node.ref_id == node.id {
            return None;
        }
        self.index_of(node.ref_id)
    }

    /// Indices of `id` and all of its descendants, parents before children,
    /// siblings by offset.
    pub fn subtree(&self, id: NodeId) -> Vec<usize> {
        let Some(start) = self.index_of(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node_id = self.nodes[idx].id;
            if !seen.insert(node_id) {
                continue;
            }
            out.push(idx);
            let children = self.children_of(node_id);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// True when `ancestor` is `id` or lies on `id`'s parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = id;
        for _ in 0..=self.nodes.len() {
            if cur == ancestor {
                return true;
            }
            match self.node(cur) {
                Some(n) if n.parent_id.is_some() => cur = n.parent_id,
                _ => return false,
            }
        }
        false
    }

    /// `base` if no struct uses it as a type name, else `base1`, `base2`, ...
    pub fn unique_type_name(&self, base: &str) -> String {
        let taken: FxHashSet<&str> = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Struct && !n.struct_type_name.is_empty())
            .map(|n| n.struct_type_name.as_str())
            .collect();
        if !taken.contains(base) {
            return base.to_owned();
        }
        (1u64..)
            .map(|i| format!("{base}{i}"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_owned())
    }

    /// Validates that `parent` can own children.
    pub(crate) fn check_parent(&self, parent: NodeId) -> Result<(), CommandError> {
        if parent.is_none() {
            return Ok(());
        }
        match self.node(parent) {
            None => Err(CommandError::MissingParent(parent)),
            Some(p) if !p.kind.is_container() => Err(CommandError::NotAContainer(parent)),
            Some(_) => Ok(()),
        }
    }

    fn has_parent_cycle(&self, id: NodeId) -> bool {
        let mut cur = self.node(id).map_or(NodeId::NONE, |n| n.parent_id);
        for _ in 0..=self.nodes.len() {
            if cur.is_none() {
                return false;
            }
            if cur == id {
                return true;
            }
            cur = self.node(cur).map_or(NodeId::NONE, |n| n.parent_id);
        }
        true
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let idx = self.index_of(id)?;
        self.nodes.get_mut(idx)
    }

    /// Inserts `node` at storage index `idx` (clamped to the end).
    pub(crate) fn insert_at(&mut self, idx: usize, node: Node) {
        debug_assert!(!self.index.contains_key(&node.id));
        let idx = idx.min(self.nodes.len());
        self.next_id = self.next_id.max(node.id.value().saturating_add(1));
        self.nodes.insert(idx, node);
        self.reindex_from(idx);
    }

    /// Appends without parent validation (caller validated the batch).
    pub(crate) fn push_unchecked(&mut self, node: Node) {
        debug_assert!(!self.index.contains_key(&node.id));
        self.next_id = self.next_id.max(node.id.value().saturating_add(1));
        self.index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    /// Removes and returns the node at `idx`.
    pub(crate) fn remove_at(&mut self, idx: usize) -> Option<Node> {
        if idx >= self.nodes.len() {
            return None;
        }
        let node = self.nodes.remove(idx);
        self.index.remove(&node.id);
        self.reindex_from(idx);
        Some(node)
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, n) in self.nodes.iter().enumerate().skip(start) {
            self.index.insert(n.id, i);
        }
    }
}

fn check_id(id: NodeId) -> Result<(), CommandError> {
    if id.value() > NodeTree::MAX_ID {
        return Err(CommandError::IdOutOfRange(id));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn player() -> (NodeTree, NodeId) {
        let mut tree = NodeTree::new(0x1000);
        let root = tree
            .add_node(Node::root_struct("player", "Player"))
            .expect("root");
        let root_id = tree.nodes()[root].id;
        tree.add_node(Node::field(root_id, 0, NodeKind::Int32, "health"))
            .expect("health");
        tree.add_node(Node::field(root_id, 4, NodeKind::Pointer64, "next").with_ref(root_id))
            .expect("next");
        (tree, root_id)
    }

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let mut tree = NodeTree::default();
        let a = tree.reserve_id();
        let b = tree.reserve_id();
        assert!(a.is_some());
        assert!(b > a);
        let idx = tree.add_node(Node::root_struct("x", "X")).expect("add");
        assert!(tree.nodes()[idx].id > b);
    }

    #[test]
    fn add_node_rejects_bad_parents() {
        let (mut tree, root) = player();
        let ghost = NodeId::from_raw(999);
        assert_eq!(
            tree.add_node(Node::field(ghost, 0, NodeKind::UInt8, "x")),
            Err(CommandError::MissingParent(ghost))
        );
        let health = tree.nodes()[1].id;
        assert_eq!(
            tree.add_node(Node::field(health, 0, NodeKind::UInt8, "x")),
            Err(CommandError::NotAContainer(health))
        );
        let mut dup = Node::field(root, 0, NodeKind::UInt8, "dup");
        dup.id = health;
        assert_eq!(tree.add_node(dup), Err(CommandError::DuplicateId(health)));
    }

    #[test]
    fn offsets_sum_along_parent_chain() {
        let (mut tree, root) = player();
        let inner = tree
            .add_node(Node::field(root, 16, NodeKind::Struct, "pos").with_type_name("Pos"))
            .expect("inner");
        let inner_id = tree.nodes()[inner].id;
        let y = tree
            .add_node(Node::field(inner_id, 4, NodeKind::Float, "y"))
            .expect("y");
        assert_eq!(tree.compute_offset(0), 0x1000);
        assert_eq!(tree.compute_offset(1), 0x1000);
        assert_eq!(tree.compute_offset(2), 0x1004);
        assert_eq!(tree.compute_offset(y), 0x1014);
        assert_eq!(tree.compute_offset(y), tree.compute_offset(y));
    }

    #[test]
    fn children_sort_stably_by_offset() {
        let mut tree = NodeTree::default();
        let root = tree.add_node(Node::root_struct("r", "R")).expect("root");
        let root_id = tree.nodes()[root].id;
        for (off, name) in [(8, "c"), (0, "a"), (8, "d"), (4, "b")] {
            tree.add_node(Node::field(root_id, off, NodeKind::UInt32, name))
                .expect("field");
        }
        let names: Vec<&str> = tree
            .children_of(root_id)
            .into_iter()
            .map(|i| tree.nodes()[i].name.as_str())
            .collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn struct_size_is_max_child_extent() {
        let (mut tree, root) = player();
        assert_eq!(tree.size_of(root), 12);
        // overlapping reinterpretation does not grow the struct
        tree.add_node(Node::field(root, 2, NodeKind::UInt16, "overlap"))
            .expect("overlap");
        assert_eq!(tree.size_of(root), 12);
        let empty = tree.add_node(Node::root_struct("e", "Empty")).expect("e");
        assert_eq!(tree.byte_size(empty), 0);
    }

    #[test]
    fn embedded_struct_mirrors_its_definition() {
        let (mut tree, player) = player();
        let holder = tree.add_node(Node::root_struct("h", "Holder")).expect("h");
        let holder_id = tree.nodes()[holder].id;
        let embed = tree
            .add_node(
                Node::field(holder_id, 8, NodeKind::Struct, "p")
                    .with_type_name("Player")
                    .with_ref(player),
            )
            .expect("embed");
        assert_eq!(tree.byte_size(embed), 12);
        assert_eq!(tree.byte_size(holder), 20);
    }

    #[test]
    fn struct_arrays_use_the_referenced_size() {
        let (mut tree, player) = player();
        let list = tree.add_node(Node::root_struct("l", "List")).expect("l");
        let list_id = tree.nodes()[list].id;
        let arr = tree
            .add_node(Node::array(list_id, 0, "items", NodeKind::Struct, 3).with_ref(player))
            .expect("arr");
        assert_eq!(tree.element_stride(arr), 12);
        assert_eq!(tree.byte_size(arr), 36);
        assert_eq!(tree.element_address(arr, 2), 0x1000 + 24);

        let unresolved = tree
            .add_node(Node::array(list_id, 64, "ghosts", NodeKind::Struct, 3))
            .expect("ghosts");
        assert_eq!(tree.byte_size(unresolved), 0);
    }

    #[test]
    fn reference_cycles_size_as_zero() {
        let mut tree = NodeTree::default();
        let a = tree.add_node(Node::root_struct("a", "A")).expect("a");
        let a_id = tree.nodes()[a].id;
        let b = tree.add_node(Node::root_struct("b", "B")).expect("b");
        let b_id = tree.nodes()[b].id;
        tree.add_node(Node::field(a_id, 0, NodeKind::Struct, "b").with_ref(b_id))
            .expect("a.b");
        tree.add_node(Node::field(b_id, 0, NodeKind::Struct, "a").with_ref(a_id))
            .expect("b.a");
        assert_eq!(tree.byte_size(a), 0);
        assert_eq!(tree.byte_size(b), 0);
    }

    #[test]
    fn subtree_lists_parents_first() {
        let (mut tree, root) = player();
        let inner = tree
            .add_node(Node::field(root, 16, NodeKind::Struct, "pos"))
            .expect("inner");
        let inner_id = tree.nodes()[inner].id;
        tree.add_node(Node::field(inner_id, 0, NodeKind::Float, "x"))
            .expect("x");
        let names: Vec<&str> = tree
            .subtree(root)
            .into_iter()
            .map(|i| tree.nodes()[i].name.as_str())
            .collect();
        assert_eq!(names, ["player", "health", "next", "pos", "x"]);
        assert!(tree.is_ancestor(root, inner_id));
        assert!(!tree.is_ancestor(inner_id, root));
    }

    #[test]
    fn unique_type_names_count_up() {
        let mut tree = NodeTree::default();
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass");
        tree.add_node(Node::root_struct("i", "NewClass")).expect("a");
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass1");
        tree.add_node(Node::root_struct("i", "NewClass1")).expect("b");
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass2");
    }

    #[test]
    fn from_nodes_keeps_ids_and_resumes_allocator() {
        let (tree, _) = player();
        let nodes = tree.nodes().to_vec();
        let mut loaded = NodeTree::from_nodes(0x1000, nodes, 50).expect("load");
        assert_eq!(loaded.nodes(), tree.nodes());
        assert_eq!(loaded.reserve_id(), NodeId::from_raw(50));

        let mut far = Node::root_struct("far", "Far");
        far.id = NodeId::from_raw(u64::MAX);
        let mut grown = tree.clone();
        assert_eq!(
            grown.add_node(far),
            Err(CommandError::IdOutOfRange(NodeId::from_raw(u64::MAX)))
        );
        assert_eq!(grown.next_id(), tree.next_id());

        let mut cyclic = tree.nodes().to_vec();
        cyclic[0].parent_id = cyclic[0].id;
        assert!(matches!(
            NodeTree::from_nodes(0, cyclic, 0),
            Err(CommandError::WouldCreateCycle { .. })
        ));
    }
}
