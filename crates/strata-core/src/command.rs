// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reversible mutations over a [`NodeTree`] and its byte source.
//!
//! A [`Command`] carries exactly the before/after state it needs. `apply`
//! and `revert` validate first and mutate second: on `Err` nothing changed.

use rustc_hash::FxHashSet;
use strata_source::ByteSource;
use thiserror::Error;
use tracing::warn;

use crate::node::{Node, NodeId, NodeKind};
use crate::tree::NodeTree;
use crate::value::ValueError;

/// Rejection raised before a command mutates anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The target node does not exist (or is not where it was captured).
    #[error("node {0} not found")]
    MissingNode(NodeId),
    /// The requested parent does not exist.
    #[error("parent {0} not found")]
    MissingParent(NodeId),
    /// The requested parent is not a Struct or Array.
    #[error("node {0} cannot own children")]
    NotAContainer(NodeId),
    /// A node with this id already exists.
    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),
    /// The id is above [`NodeTree::MAX_ID`], leaving the allocator no room.
    #[error("node id {0} is out of range")]
    IdOutOfRange(NodeId),
    /// The move would place a node inside its own subtree.
    #[error("moving {node} under {parent} would create a cycle")]
    WouldCreateCycle {
        /// Node being moved.
        node: NodeId,
        /// Requested parent.
        parent: NodeId,
    },
    /// The operation would leave children without a valid parent.
    #[error("node {0} still has children")]
    OrphanedChildren(NodeId),
    /// The byte source refused the write.
    #[error("write of {len} bytes at {addr:#x} failed")]
    WriteFailed {
        /// Absolute address.
        addr: u64,
        /// Byte count.
        len: usize,
    },
    /// The node's kind has no editable value.
    #[error("node {0} is not editable")]
    NotEditable(NodeId),
    /// User text could not be encoded.
    #[error(transparent)]
    InvalidValue(#[from] ValueError),
}

/// Fields that change together when a node's kind changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindState {
    /// Node kind.
    pub kind: NodeKind,
    /// Array length / padding size.
    pub array_len: u64,
    /// Array element kind.
    pub element_kind: NodeKind,
    /// String length.
    pub str_len: u64,
}

impl KindState {
    /// Captures the kind fields of `node`.
    pub fn of(node: &Node) -> Self {
        Self {
            kind: node.kind,
            array_len: node.array_len,
            element_kind: node.element_kind,
            str_len: node.str_len,
        }
    }

    fn write_to(&self, node: &mut Node) {
        node.kind = self.kind;
        node.array_len = self.array_len;
        node.element_kind = self.element_kind;
        node.str_len = self.str_len;
    }
}

/// One reversible edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append nodes. Each parent must exist already or appear earlier in
    /// the list.
    Insert {
        /// Nodes with ids assigned.
        nodes: Vec<Node>,
    },
    /// Remove nodes captured with their storage index, ascending. The set
    /// must be closed under children.
    Remove {
        /// `(index, node)` pairs in ascending index order.
        removed: Vec<(usize, Node)>,
    },
    /// Change kind and the size-determining fields.
    ChangeKind {
        /// Target node.
        id: NodeId,
        /// State before.
        old: KindState,
        /// State after.
        new: KindState,
    },
    /// Change the instance name.
    Rename {
        /// Target node.
        id: NodeId,
        /// Name before.
        old: String,
        /// Name after.
        new: String,
    },
    /// Change a struct's type name.
    SetTypeName {
        /// Target node.
        id: NodeId,
        /// Type name before.
        old: String,
        /// Type name after.
        new: String,
    },
    /// Reparent and/or change offset.
    Move {
        /// Target node.
        id: NodeId,
        /// `(parent, offset)` before.
        old: (NodeId, u64),
        /// `(parent, offset)` after.
        new: (NodeId, u64),
    },
    /// Fold or unfold.
    SetCollapsed {
        /// Target node.
        id: NodeId,
        /// Flag before.
        old: bool,
        /// Flag after.
        new: bool,
    },
    /// Change a pointer/embedded reference.
    SetRef {
        /// Target node.
        id: NodeId,
        /// Reference before.
        old: NodeId,
        /// Reference after.
        new: NodeId,
    },
    /// Byte patch routed through the source.
    WriteBytes {
        /// Absolute address.
        addr: u64,
        /// Bytes before.
        old: Vec<u8>,
        /// Bytes after.
        new: Vec<u8>,
    },
    /// Commands applied in order as one unit.
    Batch(Vec<Command>),
}

impl Command {
    /// Short label for logs and history views.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::ChangeKind { .. } => "change-kind",
            Self::Rename { .. } => "rename",
            Self::SetTypeName { .. } => "set-type-name",
            Self::Move { .. } => "move",
            Self::SetCollapsed { .. } => "set-collapsed",
            Self::SetRef { .. } => "set-ref",
            Self::WriteBytes { .. } => "write-bytes",
            Self::Batch(_) => "batch",
        }
    }

    /// Captures removal of `ids` and all their descendants.
    pub fn remove(tree: &NodeTree, ids: &[NodeId]) -> Result<Self, CommandError> {
        let mut indices = FxHashSet::default();
        for &id in ids {
            if !tree.contains(id) {
                return Err(CommandError::MissingNode(id));
            }
            indices.extend(tree.subtree(id));
        }
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_unstable();
        let removed = indices
            .into_iter()
            .filter_map(|i| tree.node_at(i).map(|n| (i, n.clone())))
            .collect();
        Ok(Self::Remove { removed })
    }

    /// Applies the edit.
    pub fn apply(&self, tree: &mut NodeTree, source: &dyn ByteSource) -> Result<(), CommandError> {
        match self {
            Self::Insert { nodes } => insert(tree, nodes),
            Self::Remove { removed } => remove(tree, removed),
            Self::ChangeKind { id, new, .. } => change_kind(tree, *id, new),
            Self::Rename { id, new, .. } => {
                node_mut(tree, *id)?.name.clone_from(new);
                Ok(())
            }
            Self::SetTypeName { id, new, .. } => {
                node_mut(tree, *id)?.struct_type_name.clone_from(new);
                Ok(())
            }
            Self::Move { id, new, .. } => move_node(tree, *id, *new),
            Self::SetCollapsed { id, new, .. } => {
                node_mut(tree, *id)?.collapsed = *new;
                Ok(())
            }
            Self::SetRef { id, new, .. } => {
                node_mut(tree, *id)?.ref_id = *new;
                Ok(())
            }
            Self::WriteBytes { addr, new, .. } => write(source, *addr, new),
            Self::Batch(cmds) => apply_batch(cmds, tree, source),
        }
    }

    /// Restores the state before [`Command::apply`].
    pub fn revert(&self, tree: &mut NodeTree, source: &dyn ByteSource) -> Result<(), CommandError> {
        match self {
            Self::Insert { nodes } => {
                let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
                let inverse = Self::remove(tree, &ids)?;
                inverse.apply(tree, source)
            }
            Self::Remove { removed } => restore(tree, removed),
            Self::ChangeKind { id, old, .. } => change_kind(tree, *id, old),
            Self::Rename { id, old, .. } => {
                node_mut(tree, *id)?.name.clone_from(old);
                Ok(())
            }
            Self::SetTypeName { id, old, .. } => {
                node_mut(tree, *id)?.struct_type_name.clone_from(old);
                Ok(())
            }
            Self::Move { id, old, .. } => move_node(tree, *id, *old),
            Self::SetCollapsed { id, old, .. } => {
                node_mut(tree, *id)?.collapsed = *old;
                Ok(())
            }
            Self::SetRef { id, old, .. } => {
                node_mut(tree, *id)?.ref_id = *old;
                Ok(())
            }
            Self::WriteBytes { addr, old, .. } => write(source, *addr, old),
            Self::Batch(cmds) => revert_batch(cmds, tree, source),
        }
    }
}

fn node_mut(tree: &mut NodeTree, id: NodeId) -> Result<&mut Node, CommandError> {
    tree.node_mut(id).ok_or(CommandError::MissingNode(id))
}

fn insert(tree: &mut NodeTree, nodes: &[Node]) -> Result<(), CommandError> {
    let mut batch: FxHashSet<NodeId> = FxHashSet::default();
    for node in nodes {
        if node.id.is_none() {
            return Err(CommandError::MissingNode(node.id));
        }
        if tree.contains(node.id) || !batch.insert(node.id) {
            return Err(CommandError::DuplicateId(node.id));
        }
        if batch.contains(&node.parent_id) && node.parent_id != node.id {
            let parent = nodes.iter().find(|n| n.id == node.parent_id);
            if parent.is_some_and(|p| !p.kind.is_container()) {
                return Err(CommandError::NotAContainer(node.parent_id));
            }
        } else {
            tree.check_parent(node.parent_id)?;
        }
    }
    for node in nodes {
        tree.push_unchecked(node.clone());
    }
    Ok(())
}

fn remove(tree: &mut NodeTree, removed: &[(usize, Node)]) -> Result<(), CommandError> {
    let ids: FxHashSet<NodeId> = removed.iter().map(|(_, n)| n.id).collect();
    for (idx, node) in removed {
        if tree.node_at(*idx).map(|n| n.id) != Some(node.id) {
            return Err(CommandError::MissingNode(node.id));
        }
    }
    if let Some(orphan_parent) = tree
        .nodes()
        .iter()
        .find(|n| !ids.contains(&n.id) && ids.contains(&n.parent_id))
        .map(|n| n.parent_id)
    {
        return Err(CommandError::OrphanedChildren(orphan_parent));
    }
    for (idx, _) in removed.iter().rev() {
        tree.remove_at(*idx);
    }
    Ok(())
}

fn restore(tree: &mut NodeTree, removed: &[(usize, Node)]) -> Result<(), CommandError> {
    let ids: FxHashSet<NodeId> = removed.iter().map(|(_, n)| n.id).collect();
    for (_, node) in removed {
        if tree.contains(node.id) {
            return Err(CommandError::DuplicateId(node.id));
        }
        if !ids.contains(&node.parent_id) {
            tree.check_parent(node.parent_id)?;
        }
    }
    for (idx, node) in removed {
        tree.insert_at(*idx, node.clone());
    }
    Ok(())
}

fn change_kind(tree: &mut NodeTree, id: NodeId, state: &KindState) -> Result<(), CommandError> {
    if !state.kind.is_container() && !tree.children_of(id).is_empty() {
        return Err(CommandError::OrphanedChildren(id));
    }
    state.write_to(node_mut(tree, id)?);
    Ok(())
}

fn move_node(tree: &mut NodeTree, id: NodeId, to: (NodeId, u64)) -> Result<(), CommandError> {
    let (parent, offset) = to;
    if !tree.contains(id) {
        return Err(CommandError::MissingNode(id));
    }
    tree.check_parent(parent)?;
    if parent.is_some() && tree.is_ancestor(id, parent) {
        return Err(CommandError::WouldCreateCycle { node: id, parent });
    }
    let node = node_mut(tree, id)?;
    node.parent_id = parent;
    node.offset = offset;
    Ok(())
}

fn write(source: &dyn ByteSource, addr: u64, bytes: &[u8]) -> Result<(), CommandError> {
    if source.write(addr, bytes) {
        Ok(())
    } else {
        warn!(addr, len = bytes.len(), "byte source refused write");
        Err(CommandError::WriteFailed {
            addr,
            len: bytes.len(),
        })
    }
}

fn apply_batch(
    cmds: &[Command],
    tree: &mut NodeTree,
    source: &dyn ByteSource,
) -> Result<(), CommandError> {
    for (i, cmd) in cmds.iter().enumerate() {
        if let Err(err) = cmd.apply(tree, source) {
            for done in cmds[..i].iter().rev() {
                if let Err(rollback) = done.revert(tree, source) {
                    warn!(?rollback, "batch rollback step failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

fn revert_batch(
    cmds: &[Command],
    tree: &mut NodeTree,
    source: &dyn ByteSource,
) -> Result<(), CommandError> {
    for (i, cmd) in cmds.iter().enumerate().rev() {
        if let Err(err) = cmd.revert(tree, source) {
            for undone in &cmds[i + 1..] {
                if let Err(rollback) = undone.apply(tree, source) {
                    warn!(?rollback, "batch rollback step failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}
