// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! C-style declarations for type definitions.
//!
//! Output lists forward declarations first, then one definition per
//! struct with by-value dependencies defined before their users. Gaps
//! between fields become `uint8_t pad_XXXX[n]` members. The walk tracks
//! visited ids, so self and mutual references terminate.

use rustc_hash::FxHashSet;

use crate::catalog::resolve_struct_name;
use crate::interchange::array_element_type_name;
use crate::node::{Node, NodeId, NodeKind};
use crate::tree::NodeTree;

/// Declarations for the root struct `root` and every struct it reaches.
///
/// Empty when `root` is absent or not a Struct.
pub fn render_declarations(tree: &NodeTree, root: NodeId) -> String {
    let mut emitter = Emitter::new(tree);
    if let Some(idx) = tree.index_of(root) {
        if tree.nodes()[idx].kind == NodeKind::Struct {
            emitter.collect(idx);
        }
    }
    emitter.finish()
}

/// Declarations for every root struct in the tree ("full SDK").
pub fn render_all(tree: &NodeTree) -> String {
    let mut emitter = Emitter::new(tree);
    for idx in tree.roots() {
        if tree.nodes()[idx].kind == NodeKind::Struct {
            emitter.collect(idx);
        }
    }
    emitter.finish()
}

struct Emitter<'a> {
    tree: &'a NodeTree,
    visited: FxHashSet<NodeId>,
    order: Vec<usize>,
}

impl<'a> Emitter<'a> {
    fn new(tree: &'a NodeTree) -> Self {
        Self {
            tree,
            visited: FxHashSet::default(),
            order: Vec::new(),
        }
    }

    /// Post-order: by-value dependencies land in `order` before `idx`.
    fn collect(&mut self, idx: usize) {
        let node = &self.tree.nodes()[idx];
        if !self.visited.insert(node.id) {
            return;
        }
        let mut by_value = Vec::new();
        let mut by_ref = Vec::new();
        for c in self.tree.children_of(node.id) {
            let child = &self.tree.nodes()[c];
            match child.kind {
                NodeKind::Struct if !self.tree.children_of(child.id).is_empty() => by_value.push(c),
                NodeKind::Struct | NodeKind::Array => by_value.extend(self.struct_target(child)),
                k if k.is_pointer() => by_ref.extend(self.struct_target(child)),
                _ => {}
            }
        }
        for dep in by_value {
            self.collect(dep);
        }
        self.order.push(idx);
        for dep in by_ref {
            self.collect(dep);
        }
    }

    fn struct_target(&self, node: &Node) -> Option<usize> {
        if node.ref_id.is_none() {
            return None;
        }
        let target = self.tree.index_of(node.ref_id)?;
        (self.tree.nodes()[target].kind == NodeKind::Struct).then_some(target)
    }

    fn finish(self) -> String {
        let mut out = String::new();
        let mut declared = FxHashSet::default();
        for &idx in &self.order {
            let name = ident(self.tree.nodes()[idx].type_name());
            if declared.insert(name.clone()) {
                out.push_str(&format!("struct {name};\n"));
            }
        }
        for &idx in &self.order {
            out.push('\n');
            out.push_str(&self.definition(idx));
        }
        out
    }

    fn definition(&self, idx: usize) -> String {
        let node = &self.tree.nodes()[idx];
        let size = self.tree.byte_size(idx);
        let mut out = format!(
            "// size: {size:#X}\nstruct {} {{\n",
            ident(node.type_name())
        );
        let mut cursor = 0u64;
        for c in self.tree.children_of(node.id) {
            let child = &self.tree.nodes()[c];
            if child.offset > cursor {
                out.push_str(&format!(
                    "    uint8_t pad_{cursor:04X}[{}];\n",
                    child.offset - cursor
                ));
            }
            let overlap = if child.offset < cursor {
                " overlaps previous field"
            } else {
                ""
            };
            out.push_str(&format!(
                "    {}; // {:#X}{overlap}\n",
                self.member(child),
                child.offset
            ));
            cursor = cursor.max(child.offset.saturating_add(self.tree.byte_size(c)));
        }
        out.push_str("};\n");
        out
    }

    fn member(&self, node: &Node) -> String {
        let name = field_ident(node);
        match node.kind {
            NodeKind::Pointer32 | NodeKind::Pointer64 => {
                match resolve_struct_name(self.tree, node.ref_id) {
                    Some(target) => format!("struct {}* {name}", ident(&target)),
                    None => format!("void* {name}"),
                }
            }
            NodeKind::Struct => {
                let type_name = if self.tree.children_of(node.id).is_empty() {
                    resolve_struct_name(self.tree, node.ref_id)
                        .unwrap_or_else(|| node.type_name().to_owned())
                } else {
                    node.type_name().to_owned()
                };
                format!("struct {} {name}", ident(&type_name))
            }
            NodeKind::Array => {
                if node.element_kind == NodeKind::Struct {
                    let elem = array_element_type_name(self.tree, node);
                    format!("struct {} {name}[{}]", ident(&elem), node.array_len)
                } else {
                    let (base, dims) = c_type(node.element_kind);
                    format!("{base} {name}[{}]{dims}", node.array_len)
                }
            }
            NodeKind::UTF8 => format!("char {name}[{}]", node.str_len),
            NodeKind::UTF16 => format!("char16_t {name}[{}]", node.str_len),
            NodeKind::Padding => format!("uint8_t {name}[{}]", node.array_len),
            kind => {
                let (base, dims) = c_type(kind);
                format!("{base} {name}{dims}")
            }
        }
    }
}

/// C spelling of a fixed-width kind: base type plus array suffix.
fn c_type(kind: NodeKind) -> (&'static str, &'static str) {
    match kind {
        NodeKind::Hex8 | NodeKind::UInt8 => ("uint8_t", ""),
        NodeKind::Hex16 | NodeKind::UInt16 => ("uint16_t", ""),
        NodeKind::Hex32 | NodeKind::UInt32 => ("uint32_t", ""),
        NodeKind::Hex64 | NodeKind::UInt64 => ("uint64_t", ""),
        NodeKind::Int8 => ("int8_t", ""),
        NodeKind::Int16 => ("int16_t", ""),
        NodeKind::Int32 => ("int32_t", ""),
        NodeKind::Int64 => ("int64_t", ""),
        NodeKind::Float => ("float", ""),
        NodeKind::Double => ("double", ""),
        NodeKind::Bool => ("bool", ""),
        NodeKind::Pointer32 => ("uint32_t", ""),
        NodeKind::Pointer64 => ("void*", ""),
        NodeKind::Vec2 => ("float", "[2]"),
        NodeKind::Vec3 => ("float", "[3]"),
        NodeKind::Vec4 => ("float", "[4]"),
        NodeKind::Mat4x4 => ("float", "[4][4]"),
        NodeKind::UTF8 => ("char", ""),
        NodeKind::UTF16 => ("char16_t", ""),
        NodeKind::Padding | NodeKind::Array | NodeKind::Struct => ("uint8_t", ""),
    }
}

fn field_ident(node: &Node) -> String {
    if node.name.is_empty() {
        format!("field_{:04X}", node.offset)
    } else {
        ident(&node.name)
    }
}

/// Maps arbitrary text onto a C identifier.
fn ident(text: &str) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
