// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};
use strata_core::{persist, structural_hash, Document, Node, NodeId, NodeKind, NodeTree};
use strata_source::ByteSourceExt;

// Pinned so failures reproduce across machines. Override locally with
// PROPTEST_SEED when hunting for new counterexamples.
const SEED_BYTES: [u8; 32] = [
    0x5A, 0x17, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0,
];

fn runner() -> TestRunner {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    TestRunner::new_with_rng(
        PropConfig {
            cases: 64,
            ..PropConfig::default()
        },
        rng,
    )
}

const KINDS: [NodeKind; 10] = [
    NodeKind::Struct,
    NodeKind::Int32,
    NodeKind::UInt8,
    NodeKind::Hex16,
    NodeKind::Float,
    NodeKind::Pointer64,
    NodeKind::UTF8,
    NodeKind::Array,
    NodeKind::Padding,
    NodeKind::Vec3,
];

#[derive(Debug, Clone)]
struct FieldShape {
    parent: usize,
    kind: usize,
    offset: u8,
    target: usize,
}

fn fields() -> impl Strategy<Value = Vec<FieldShape>> {
    prop::collection::vec(
        (any::<usize>(), 0..KINDS.len(), any::<u8>(), any::<usize>()).prop_map(
            |(parent, kind, offset, target)| FieldShape {
                parent,
                kind,
                offset,
                target,
            },
        ),
        0..24,
    )
}

/// One root struct "Ext" with nested structs, strings, arrays and
/// pointers into the definition (self references included).
fn build(shapes: &[FieldShape], base: u64) -> (NodeTree, NodeId) {
    let mut tree = NodeTree::new(base);
    let idx = tree
        .add_node(Node::root_struct("root", "Ext"))
        .expect("root");
    let root = tree.nodes()[idx].id;
    let mut structs = vec![root];
    for (i, shape) in shapes.iter().enumerate() {
        let parent = structs[shape.parent % structs.len()];
        let kind = KINDS[shape.kind];
        let offset = u64::from(shape.offset);
        let mut node = Node::field(parent, offset, kind, format!("f{i}"));
        match kind {
            NodeKind::Array => {
                node.array_len = offset % 5;
                node.element_kind = NodeKind::UInt16;
            }
            NodeKind::Padding => node.array_len = offset % 7,
            NodeKind::UTF8 => node.str_len = offset % 9,
            NodeKind::Pointer64 => node.ref_id = structs[shape.target % structs.len()],
            NodeKind::Struct => node.struct_type_name = format!("Inner{i}"),
            _ => {}
        }
        let idx = tree.add_node(node).expect("field");
        if kind == NodeKind::Struct {
            structs.push(tree.nodes()[idx].id);
        }
    }
    (tree, root)
}

#[test]
fn persistence_round_trip_is_lossless() {
    runner()
        .run(&(fields(), any::<u32>()), |(shapes, base)| {
            let (tree, _) = build(&shapes, u64::from(base));
            let back = persist::from_json(&persist::to_json(&tree).expect("save")).expect("load");
            prop_assert_eq!(back.base_address, tree.base_address);
            prop_assert_eq!(back.nodes(), tree.nodes());
            for i in 0..tree.len() {
                prop_assert_eq!(back.byte_size(i), tree.byte_size(i));
                prop_assert_eq!(back.compute_offset(i), tree.compute_offset(i));
            }
            Ok(())
        })
        .expect("round trip holds for every generated tree");
}

#[test]
fn import_remaps_every_internal_id() {
    runner()
        .run(&(fields(), 0u64..8), |(shapes, padding)| {
            let (ext, ext_root) = build(&shapes, 0);
            let mut doc = Document::new(0);
            // shift the local allocator so copied ids cannot line up by accident
            for _ in 0..padding {
                doc.create_type().expect("filler");
            }
            let res = doc.import_type("Ext", &[&ext]).expect("import");
            let local_root = res.id().expect("imported");
            let tree = doc.tree();

            let copied = tree.subtree(local_root);
            prop_assert_eq!(copied.len(), ext.subtree(ext_root).len());
            let ids: Vec<NodeId> = copied.iter().map(|&i| tree.nodes()[i].id).collect();
            for &i in &copied {
                let n = &tree.nodes()[i];
                if n.id != local_root {
                    prop_assert!(ids.contains(&n.parent_id));
                }
                if n.ref_id.is_some() {
                    prop_assert!(ids.contains(&n.ref_id), "ref {} escaped the copy", n.ref_id);
                }
            }
            prop_assert_eq!(
                structural_hash(tree, local_root),
                structural_hash(&ext, ext_root)
            );
            prop_assert_eq!(tree.size_of(local_root), ext.size_of(ext_root));

            let again = doc.import_type("Ext", &[&ext]).expect("second import");
            prop_assert_eq!(again.id(), Some(local_root));
            prop_assert_eq!(doc.tree().subtree(local_root).len(), copied.len());
            Ok(())
        })
        .expect("import remap holds for every generated tree");
}

#[derive(Debug, Clone)]
enum Op {
    Rename(usize),
    Retype(usize, usize),
    Offset(usize, u8),
    Toggle(usize),
    Insert(usize, u8),
    Remove(usize),
    Write(usize, u32),
}

const LEAF_KINDS: [NodeKind; 5] = [
    NodeKind::Int32,
    NodeKind::UInt8,
    NodeKind::Hex16,
    NodeKind::Float,
    NodeKind::Double,
];

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        any::<usize>().prop_map(Op::Rename),
        (any::<usize>(), 0..LEAF_KINDS.len()).prop_map(|(n, k)| Op::Retype(n, k)),
        (any::<usize>(), any::<u8>()).prop_map(|(n, o)| Op::Offset(n, o)),
        any::<usize>().prop_map(Op::Toggle),
        (any::<usize>(), any::<u8>()).prop_map(|(n, o)| Op::Insert(n, o)),
        any::<usize>().prop_map(Op::Remove),
        (any::<usize>(), any::<u32>()).prop_map(|(n, v)| Op::Write(n, v)),
    ];
    prop::collection::vec(op, 1..16)
}

fn pick(doc: &Document, n: usize) -> NodeId {
    let nodes = doc.tree().nodes();
    if nodes.is_empty() {
        return NodeId::NONE;
    }
    nodes[n % nodes.len()].id
}

impl Op {
    fn target(&self) -> usize {
        match *self {
            Self::Rename(n)
            | Self::Retype(n, _)
            | Self::Offset(n, _)
            | Self::Toggle(n)
            | Self::Insert(n, _)
            | Self::Remove(n)
            | Self::Write(n, _) => n,
        }
    }
}

/// Applies `op`, ignoring rejections (they must leave no trace either).
fn apply(doc: &mut Document, op: &Op) {
    let id = pick(doc, op.target());
    let _ = match *op {
        Op::Rename(n) => doc.rename(id, format!("renamed{n}")),
        Op::Retype(_, k) => doc.change_kind(id, LEAF_KINDS[k]),
        Op::Offset(_, o) => doc.set_offset(id, u64::from(o)),
        Op::Toggle(_) => doc.toggle_collapse(id),
        Op::Insert(_, o) => doc
            .insert_node(id, Some(u64::from(o)), NodeKind::UInt32, "added")
            .map(|_| ()),
        Op::Remove(_) if doc.tree().len() > 1 => doc.remove_nodes(&[id]),
        Op::Remove(_) => Ok(()),
        Op::Write(_, v) => doc.set_value(id, &v.to_string()),
    };
}

const DATA_LEN: usize = 1024;

#[test]
fn undo_restores_and_redo_replays_exactly() {
    runner()
        .run(&(fields(), ops()), |(shapes, ops)| {
            let (tree, _) = build(&shapes, 0);
            let mut doc = Document::with_tree(tree);
            doc.load_data((0..DATA_LEN).map(|i| u8::try_from(i % 251).unwrap_or(0)).collect());

            let start_nodes = doc.tree().nodes().to_vec();
            let start_bytes = doc.source().read_bytes(0, DATA_LEN);
            for op in &ops {
                apply(&mut doc, op);
            }
            let end_nodes = doc.tree().nodes().to_vec();
            let end_bytes = doc.source().read_bytes(0, DATA_LEN);
            let steps = doc.history().undo_len();

            for _ in 0..steps {
                prop_assert!(doc.undo().expect("undo"));
            }
            prop_assert!(!doc.undo().expect("empty undo"));
            prop_assert_eq!(doc.tree().nodes(), start_nodes.as_slice());
            prop_assert_eq!(doc.source().read_bytes(0, DATA_LEN), start_bytes);

            for _ in 0..steps {
                prop_assert!(doc.redo().expect("redo"));
            }
            prop_assert!(!doc.redo().expect("empty redo"));
            prop_assert_eq!(doc.tree().nodes(), end_nodes.as_slice());
            prop_assert_eq!(doc.source().read_bytes(0, DATA_LEN), end_bytes);
            Ok(())
        })
        .expect("undo/redo is exact for every generated edit sequence");
}

/// Sum of offsets along the parent chain, walked by id.
fn chain_sum(tree: &NodeTree, idx: usize) -> u64 {
    let mut addr = tree.base_address;
    let mut cur = tree.node_at(idx);
    while let Some(n) = cur {
        addr = addr.wrapping_add(n.offset);
        cur = if n.is_root() { None } else { tree.node(n.parent_id) };
    }
    addr
}

#[test]
fn offsets_are_pure_and_ignore_value_writes() {
    runner()
        .run(&(fields(), any::<u16>(), any::<usize>()), |(shapes, base, pick_n)| {
            let (tree, _) = build(&shapes, u64::from(base));
            let mut doc = Document::with_tree(tree);
            doc.load_data(vec![0; usize::from(u16::MAX) + 2048]);

            let first: Vec<u64> = (0..doc.tree().len())
                .map(|i| doc.tree().compute_offset(i))
                .collect();
            let second: Vec<u64> = (0..doc.tree().len())
                .map(|i| doc.tree().compute_offset(i))
                .collect();
            prop_assert_eq!(&first, &second);
            for (i, &addr) in first.iter().enumerate() {
                prop_assert_eq!(addr, chain_sum(doc.tree(), i));
            }

            let id = pick(&doc, pick_n);
            let _ = doc.set_value(id, "7");
            let after: Vec<u64> = (0..doc.tree().len())
                .map(|i| doc.tree().compute_offset(i))
                .collect();
            prop_assert_eq!(first, after);
            Ok(())
        })
        .expect("offsets are deterministic for every generated tree");
}
