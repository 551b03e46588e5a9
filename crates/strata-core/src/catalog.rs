// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type lookup and cross-tree import.
//!
//! Types are looked up by name among root structs. The search order is
//! fixed: the local tree first, then external trees in the order the caller
//! supplies them. The first match wins, and a name already present locally
//! is never imported again.
//!
//! Importing deep-copies the external root with fresh local ids. Parent
//! links and references inside the copied subtree are remapped to the new
//! ids. References that leave the subtree are resolved by name through the
//! same lookup, which may import further types. Names already being
//! imported cut reference cycles.

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, warn};

use crate::hash::{structural_hash, Hash32};
use crate::node::{Node, NodeId};
use crate::tree::NodeTree;

/// Type name for reference target `ref_id`: its `struct_type_name`, or its
/// instance name when that is empty. `None` if the id is not in `tree`.
pub fn resolve_struct_name(tree: &NodeTree, ref_id: NodeId) -> Option<String> {
    if ref_id.is_none() {
        return None;
    }
    tree.node(ref_id).map(|n| n.type_name().to_owned())
}

/// Outcome of looking up a type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local tree already defines it.
    AlreadyLocal(NodeId),
    /// Copied from external tree `origin` (index into the caller's list).
    Imported {
        /// Id of the new local root.
        id: NodeId,
        /// Index of the external tree it came from.
        origin: usize,
    },
    /// Not found anywhere. References stay at [`NodeId::NONE`].
    Unresolved,
}

impl Resolution {
    /// Local id the name resolves to, if any.
    pub fn id(self) -> Option<NodeId> {
        match self {
            Self::AlreadyLocal(id) | Self::Imported { id, .. } => Some(id),
            Self::Unresolved => None,
        }
    }
}

/// Nodes to insert for an import, plus what the requested name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPlan {
    /// Resolution of the requested name.
    pub resolution: Resolution,
    /// New nodes, ids assigned, each subtree parents-first.
    pub nodes: Vec<Node>,
    /// Names referenced by imported nodes that could not be found.
    pub unresolved: Vec<String>,
}

/// Plans an import of `name` into `local` without inserting anything.
///
/// Ids for the new nodes are reserved from `local`'s allocator, which is
/// the only state touched. Insert `plan.nodes` (for example with a
/// [`crate::Command::Insert`]) to make the import visible.
#[instrument(skip(local, externals), fields(externals = externals.len()))]
pub fn plan_import(local: &mut NodeTree, externals: &[&NodeTree], name: &str) -> ImportPlan {
    let mut planner = Planner {
        local,
        externals,
        planned: FxHashMap::default(),
        nodes: Vec::new(),
        unresolved: Vec::new(),
    };
    let resolution = planner.resolve(name);
    if resolution == Resolution::Unresolved {
        debug!(name, "type not found locally or externally");
    }
    ImportPlan {
        resolution,
        nodes: planner.nodes,
        unresolved: planner.unresolved,
    }
}

/// Finds `name` locally or imports it immediately (no undo entry).
///
/// Intended for building trees programmatically; editing sessions go
/// through [`crate::Document::import_type`].
pub fn find_or_create_struct_by_name(
    local: &mut NodeTree,
    externals: &[&NodeTree],
    name: &str,
) -> Resolution {
    let plan = plan_import(local, externals, name);
    for node in plan.nodes {
        local.push_unchecked(node);
    }
    plan.resolution
}

struct Planner<'a, 'b> {
    local: &'a mut NodeTree,
    externals: &'a [&'b NodeTree],
    planned: FxHashMap<String, NodeId>,
    nodes: Vec<Node>,
    unresolved: Vec<String>,
}

impl Planner<'_, '_> {
    fn resolve(&mut self, name: &str) -> Resolution {
        if let Some(id) = self.local.find_root_struct(name) {
            return Resolution::AlreadyLocal(id);
        }
        if let Some(&id) = self.planned.get(name) {
            return Resolution::AlreadyLocal(id);
        }
        let externals = self.externals;
        for (origin, ext) in externals.iter().enumerate() {
            if let Some(root) = ext.find_root_struct(name) {
                let id = self.copy(ext, root, name);
                debug!(name, origin, %id, "imported type");
                return Resolution::Imported { id, origin };
            }
        }
        Resolution::Unresolved
    }

    fn copy(&mut self, ext: &NodeTree, root: NodeId, name: &str) -> NodeId {
        let order = ext.subtree(root);
        let remap: FxHashMap<NodeId, NodeId> = order
            .iter()
            .map(|&i| (ext.nodes()[i].id, self.local.reserve_id()))
            .collect();
        let new_root = remap.get(&root).copied().unwrap_or(NodeId::NONE);
        self.planned.insert(name.to_owned(), new_root);

        let start = self.nodes.len();
        let mut outward: Vec<(usize, String)> = Vec::new();
        for (pos, &i) in order.iter().enumerate() {
            let src = &ext.nodes()[i];
            let mut node = src.clone();
            node.id = remap.get(&src.id).copied().unwrap_or(NodeId::NONE);
            node.parent_id = if pos == 0 {
                NodeId::NONE
            } else {
                remap.get(&src.parent_id).copied().unwrap_or(NodeId::NONE)
            };
            node.ref_id = NodeId::NONE;
            if src.ref_id.is_some() {
                if let Some(&mapped) = remap.get(&src.ref_id) {
                    node.ref_id = mapped;
                } else if let Some(target) = resolve_struct_name(ext, src.ref_id) {
                    outward.push((start + pos, target));
                } else {
                    warn!(
                        node = %src.id,
                        target = %src.ref_id,
                        "dangling reference in imported type"
                    );
                }
            }
            self.nodes.push(node);
        }

        for (slot, target) in outward {
            match self.resolve(&target).id() {
                Some(id) => self.nodes[slot].ref_id = id,
                None => {
                    if !self.unresolved.contains(&target) {
                        self.unresolved.push(target);
                    }
                }
            }
        }
        new_root
    }
}

/// Where a candidate definition lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The local tree.
    Local,
    /// External tree at this index of the caller's list.
    External(usize),
}

/// One definition of a type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Tree holding it.
    pub origin: Origin,
    /// Root id in that tree.
    pub id: NodeId,
    /// Structural hash of the definition.
    pub hash: Hash32,
}

/// Every definition of `name`, in search order.
pub fn candidates(local: &NodeTree, externals: &[&NodeTree], name: &str) -> Vec<Candidate> {
    let trees = std::iter::once((Origin::Local, local))
        .chain(externals.iter().enumerate().map(|(i, t)| (Origin::External(i), *t)));
    trees
        .filter_map(|(origin, tree)| {
            let id = tree.find_root_struct(name)?;
            let hash = structural_hash(tree, id)?;
            Some(Candidate { origin, id, hash })
        })
        .collect()
}

/// Same-named definitions that disagree structurally.
///
/// The first candidate is the one lookup picks; the rest would be shadowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConflict {
    /// Type name.
    pub name: String,
    /// All definitions in search order.
    pub candidates: Vec<Candidate>,
}

/// Reports a conflict when definitions of `name` have more than one
/// distinct structural hash.
pub fn detect_conflict(
    local: &NodeTree,
    externals: &[&NodeTree],
    name: &str,
) -> Option<TypeConflict> {
    let found = candidates(local, externals, name);
    let first = found.first()?.hash;
    found.iter().any(|c| c.hash != first).then(|| TypeConflict {
        name: name.to_owned(),
        candidates: found,
    })
}
