// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Queries an external format mapper needs.

use crate::catalog::resolve_struct_name;
use crate::node::{Node, NodeKind};
use crate::tree::NodeTree;

/// Root structs in offset order (storage order on ties).
pub fn root_structs(tree: &NodeTree) -> Vec<usize> {
    tree.roots()
        .into_iter()
        .filter(|&i| tree.nodes()[i].kind == NodeKind::Struct)
        .collect()
}

/// Direct children of the node at `idx`, ordered by offset.
pub fn ordered_children(tree: &NodeTree, idx: usize) -> Vec<usize> {
    tree.node_at(idx)
        .map(|n| tree.children_of(n.id))
        .unwrap_or_default()
}

/// One member of a struct as seen by an exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// A single child node (by index).
    Node(usize),
    /// Adjacent hex fields merged into one opaque run.
    HexRun(HexRun),
}

/// A run of hex fields with no gaps or overlaps between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRun {
    /// Indices of the merged nodes, in offset order.
    pub nodes: Vec<usize>,
    /// Offset of the first node.
    pub offset: u64,
    /// Bytes from the first node's start to the last node's end.
    pub size: u64,
    /// The node's name when the run holds exactly one named node.
    pub name: Option<String>,
}

/// Members of the node at `idx`, with consecutive hex fields collapsed.
///
/// A run continues while the next child is a hex kind that starts at or
/// after the current run end; an overlapping hex child starts a new run.
pub fn collapse_hex_runs(tree: &NodeTree, idx: usize) -> Vec<Member> {
    let children = ordered_children(tree, idx);
    let nodes = tree.nodes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < children.len() {
        let first = &nodes[children[i]];
        if !first.kind.is_hex() {
            out.push(Member::Node(children[i]));
            i += 1;
            continue;
        }
        let start = first.offset;
        let mut end = start.saturating_add(tree.byte_size(children[i]));
        let mut j = i + 1;
        while j < children.len() {
            let next = &nodes[children[j]];
            if !next.kind.is_hex() || next.offset < end {
                break;
            }
            end = next.offset.saturating_add(tree.byte_size(children[j]));
            j += 1;
        }
        let run: Vec<usize> = children[i..j].to_vec();
        let name = (run.len() == 1 && !first.name.is_empty()).then(|| first.name.clone());
        out.push(Member::HexRun(HexRun {
            nodes: run,
            offset: start,
            size: end - start,
            name,
        }));
        i = j;
    }
    out
}

/// Target type name of a pointer node, if it has a resolvable target.
pub fn pointer_target_name(tree: &NodeTree, idx: usize) -> Option<String> {
    let node = tree.node_at(idx)?;
    if !node.kind.is_pointer() {
        return None;
    }
    resolve_struct_name(tree, node.ref_id)
}

/// Type name an embedded struct instance is declared with.
pub fn instance_type_name(node: &Node) -> &str {
    node.type_name()
}

/// Element type name of an array: the struct type for struct arrays,
/// otherwise the element kind.
pub fn array_element_type_name(tree: &NodeTree, node: &Node) -> String {
    if node.element_kind == NodeKind::Struct && !node.struct_type_name.is_empty() {
        return node.struct_type_name.clone();
    }
    if let Some(name) = resolve_struct_name(tree, node.ref_id) {
        return name;
    }
    node.element_kind.to_string()
}

/// Size an exporter records for a node, without tree lookups.
///
/// Strings and primitive arrays use their computed size. Struct-typed
/// arrays and struct nodes report 0: their size lives on the referenced
/// type.
pub fn export_size(node: &Node) -> u64 {
    node.intrinsic_size().unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn add(tree: &mut NodeTree, node: Node) -> (usize, NodeId) {
        let idx = tree.add_node(node).expect("add");
        (idx, tree.nodes()[idx].id)
    }

    #[test]
    fn roots_filter_to_structs_in_offset_order() {
        let mut tree = NodeTree::default();
        add(&mut tree, Node { offset: 8, ..Node::root_struct("b", "B") });
        add(&mut tree, Node::new(NodeKind::UInt32, "loose"));
        add(&mut tree, Node::root_struct("a", "A"));
        let names: Vec<&str> = root_structs(&tree)
            .into_iter()
            .map(|i| tree.nodes()[i].type_name())
            .collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn adjacent_hex_fields_collapse() {
        let mut tree = NodeTree::default();
        let (ri, root) = add(&mut tree, Node::root_struct("r", "R"));
        add(&mut tree, Node::field(root, 0, NodeKind::Hex32, "h0"));
        add(&mut tree, Node::field(root, 4, NodeKind::Hex16, "h1"));
        add(&mut tree, Node::field(root, 6, NodeKind::Hex8, "h2"));
        add(&mut tree, Node::field(root, 8, NodeKind::Int32, "n"));
        add(&mut tree, Node::field(root, 12, NodeKind::Hex64, "solo"));
        add(&mut tree, Node::field(root, 14, NodeKind::Hex8, "overlap"));

        let members = collapse_hex_runs(&tree, ri);
        assert_eq!(members.len(), 4);
        let Member::HexRun(first) = &members[0] else {
            unreachable!("expected run")
        };
        assert_eq!((first.offset, first.size, first.nodes.len()), (0, 7, 3));
        assert_eq!(first.name, None);
        assert!(matches!(members[1], Member::Node(_)));
        let Member::HexRun(solo) = &members[2] else {
            unreachable!("expected run")
        };
        assert_eq!((solo.offset, solo.size), (12, 8));
        assert_eq!(solo.name.as_deref(), Some("solo"));
        let Member::HexRun(over) = &members[3] else {
            unreachable!("expected run")
        };
        assert_eq!(over.offset, 14);
    }

    #[test]
    fn names_for_pointers_instances_and_arrays() {
        let mut tree = NodeTree::default();
        let (_, target) = add(&mut tree, Node::root_struct("inst", "Target"));
        let (_, holder) = add(&mut tree, Node::root_struct("h", "Holder"));
        let (p, _) = add(
            &mut tree,
            Node::field(holder, 0, NodeKind::Pointer64, "p").with_ref(target),
        );
        let (null_p, _) = add(&mut tree, Node::field(holder, 8, NodeKind::Pointer32, "q"));
        let (e, _) = add(
            &mut tree,
            Node::field(holder, 16, NodeKind::Struct, "embedded").with_type_name("Target"),
        );
        let (arr, _) = add(
            &mut tree,
            Node::array(holder, 32, "items", NodeKind::Struct, 2).with_ref(target),
        );
        let (prim, _) = add(&mut tree, Node::array(holder, 64, "raw", NodeKind::UInt16, 5));

        assert_eq!(pointer_target_name(&tree, p).as_deref(), Some("Target"));
        assert_eq!(pointer_target_name(&tree, null_p), None);
        assert_eq!(pointer_target_name(&tree, e), None);
        assert_eq!(instance_type_name(&tree.nodes()[e]), "Target");
        assert_eq!(array_element_type_name(&tree, &tree.nodes()[arr]), "Target");
        assert_eq!(array_element_type_name(&tree, &tree.nodes()[prim]), "UInt16");
        assert_eq!(export_size(&tree.nodes()[prim]), 10);
        assert_eq!(export_size(&tree.nodes()[arr]), 0);
    }

    #[test]
    fn export_sizes_for_strings() {
        let root = NodeId::from_raw(1);
        assert_eq!(export_size(&Node::string(root, 0, NodeKind::UTF8, "s", 32)), 32);
        assert_eq!(export_size(&Node::string(root, 0, NodeKind::UTF16, "w", 32)), 64);
        assert_eq!(export_size(&Node::new(NodeKind::Mat4x4, "m")), 64);
    }
}
