// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural hash of a type definition.
//!
//! Two definitions hash equal when their fields agree on kind, name,
//! offset and size-determining data. Ids, the root's instance name and
//! fold state are excluded, so a definition and its imported copy hash the
//! same.

use ciborium::ser::into_writer;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::catalog::resolve_struct_name;
use crate::node::{NodeId, NodeKind};
use crate::tree::NodeTree;

/// BLAKE3 digest (32 bytes).
pub type Hash32 = [u8; 32];

#[derive(Serialize)]
enum CanonRef {
    None,
    Internal(usize),
    Named(String),
}

#[derive(Serialize)]
struct CanonNode<'a> {
    parent: Option<usize>,
    kind: NodeKind,
    name: &'a str,
    offset: u64,
    array_len: u64,
    element_kind: NodeKind,
    type_name: &'a str,
    str_len: u64,
    target: CanonRef,
}

/// Canonical CBOR bytes for the definition rooted at `root`.
///
/// Nodes are listed parents-first, siblings by offset; parent links and
/// internal references become positions in that list, and references that
/// leave the subtree become the target's type name.
pub fn to_canonical_bytes(tree: &NodeTree, root: NodeId) -> Option<Vec<u8>> {
    let order = tree.subtree(root);
    if order.is_empty() {
        return None;
    }
    let position: FxHashMap<NodeId, usize> = order
        .iter()
        .enumerate()
        .map(|(pos, &idx)| (tree.nodes()[idx].id, pos))
        .collect();
    let canon: Vec<CanonNode<'_>> = order
        .iter()
        .enumerate()
        .map(|(pos, &idx)| {
            let n = &tree.nodes()[idx];
            let target = if n.ref_id.is_none() {
                CanonRef::None
            } else if let Some(&p) = position.get(&n.ref_id) {
                CanonRef::Internal(p)
            } else {
                resolve_struct_name(tree, n.ref_id).map_or(CanonRef::None, CanonRef::Named)
            };
            CanonNode {
                parent: if pos == 0 {
                    None
                } else {
                    position.get(&n.parent_id).copied()
                },
                kind: n.kind,
                name: if pos == 0 { "" } else { &n.name },
                offset: if pos == 0 { 0 } else { n.offset },
                array_len: n.array_len,
                element_kind: n.element_kind,
                type_name: &n.struct_type_name,
                str_len: n.str_len,
                target,
            }
        })
        .collect();
    let mut bytes = Vec::new();
    into_writer(&canon, &mut bytes).ok()?;
    Some(bytes)
}

/// BLAKE3 of [`to_canonical_bytes`]; `None` when `root` is absent.
pub fn structural_hash(tree: &NodeTree, root: NodeId) -> Option<Hash32> {
    let bytes = to_canonical_bytes(tree, root)?;
    Some(blake3::hash(&bytes).into())
}
