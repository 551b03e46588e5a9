// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Projection of a tree (and bytes) into flat display lines.
//!
//! [`Layout::build`] walks the tree once and records every line's node,
//! kind, address and size. [`Layout::render`] fills in values from a byte
//! source. The structural pass only depends on the tree, so a byte change
//! needs a new render but not a new layout. Neither pass keeps hidden state
//! between calls.

use rustc_hash::FxHashSet;
use strata_source::{ByteSource, ByteSourceExt};

use crate::node::{Node, NodeId, NodeKind};
use crate::tree::NodeTree;
use crate::value::format_value;

/// Bytes of a value or padding span read for display; longer strings and
/// padding are shown truncated.
const MAX_DISPLAY_BYTES: u64 = 256;

/// Role of a projected line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Opening line of a struct.
    StructHeader,
    /// A primitive field.
    Field,
    /// Opening line of an array.
    ArrayHeader,
    /// One element of a primitive or struct-typed array.
    ArrayElement,
    /// A padding run.
    Padding,
    /// Closing line of a struct or array.
    Footer,
    /// Marker for elements beyond the display cap.
    Truncated,
}

/// One projected line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Owning node.
    pub node_id: NodeId,
    /// Kind used to format the value (the element kind for array
    /// elements).
    pub kind: NodeKind,
    /// Line role.
    pub line_kind: LineKind,
    /// Absolute address.
    pub address: u64,
    /// Byte size covered.
    pub size: u64,
    /// Nesting depth (roots are 0).
    pub depth: usize,
    /// Label.
    pub name: String,
    /// Type label: kind name, struct type name, or `T[n]` / `T*` forms.
    pub type_name: String,
    /// Element index for [`LineKind::ArrayElement`].
    pub element_index: Option<u64>,
    /// Formatted value; empty until rendered and for non-value lines.
    pub value: String,
}

/// Knobs for [`Layout::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Elements shown per array before a [`LineKind::Truncated`] marker.
    pub max_array_elements: u64,
    /// Expand childless embedded structs with their referenced definition.
    pub expand_embedded: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            max_array_elements: 256,
            expand_embedded: true,
        }
    }
}

/// Structural projection of one tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    lines: Vec<Line>,
}

impl Layout {
    /// Lays out every root in offset order.
    pub fn build(tree: &NodeTree, opts: ComposeOptions) -> Self {
        let mut b = Builder {
            tree,
            opts,
            lines: Vec::new(),
            expanding: FxHashSet::default(),
        };
        for idx in tree.roots() {
            b.node(idx, tree.compute_offset(idx), 0);
        }
        Self { lines: b.lines }
    }

    /// Lines without values.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Lines with values read from `source`.
    ///
    /// Unreadable bytes format as zero. Pointers whose value has a symbol
    /// get it appended.
    pub fn render(&self, source: &dyn ByteSource) -> Vec<Line> {
        self.lines
            .iter()
            .map(|line| {
                let mut line = line.clone();
                line.value = render_value(&line, source);
                line
            })
            .collect()
    }
}

/// [`Layout::build`] followed by [`Layout::render`].
pub fn compose(tree: &NodeTree, source: &dyn ByteSource, opts: ComposeOptions) -> Vec<Line> {
    Layout::build(tree, opts).render(source)
}

fn render_value(line: &Line, source: &dyn ByteSource) -> String {
    match line.line_kind {
        LineKind::Field | LineKind::ArrayElement if line.kind.is_value() => {
            let shown = line.size.min(MAX_DISPLAY_BYTES);
            let bytes = source.read_bytes(line.address, usize::try_from(shown).unwrap_or(0));
            let mut text = format_value(line.kind, &bytes);
            if line.size > shown && !terminated(line.kind, &bytes) {
                text.push_str("..");
            }
            if line.kind.is_pointer() {
                let target = match line.kind {
                    NodeKind::Pointer32 => u64::from(source.read_u32(line.address)),
                    _ => source.read_u64(line.address),
                };
                if let Some(sym) = source.symbol_at(target) {
                    return format!("{text} <{sym}>");
                }
            }
            text
        }
        LineKind::Padding => {
            let shown = line.size.min(16);
            let bytes = source.read_bytes(line.address, usize::try_from(shown).unwrap_or(0));
            let mut text = bytes
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ");
            if line.size > shown {
                text.push_str(" ..");
            }
            text
        }
        _ => String::new(),
    }
}

/// True when a string span holds its terminator, so truncation hid nothing.
fn terminated(kind: NodeKind, bytes: &[u8]) -> bool {
    match kind {
        NodeKind::UTF16 => bytes.chunks_exact(2).any(|c| c == [0, 0]),
        _ => bytes.contains(&0),
    }
}

struct Builder<'a> {
    tree: &'a NodeTree,
    opts: ComposeOptions,
    lines: Vec<Line>,
    expanding: FxHashSet<NodeId>,
}

impl Builder<'_> {
    fn push(&mut self, node: &Node, line_kind: LineKind, address: u64, size: u64, depth: usize) {
        self.lines.push(Line {
            node_id: node.id,
            kind: node.kind,
            line_kind,
            address,
            size,
            depth,
            name: node.name.clone(),
            type_name: type_label(self.tree, node),
            element_index: None,
            value: String::new(),
        });
    }

    fn node(&mut self, idx: usize, addr: u64, depth: usize) {
        let tree = self.tree;
        let node = &tree.nodes()[idx];
        let size = tree.byte_size(idx);
        match node.kind {
            NodeKind::Struct => {
                self.push(node, LineKind::StructHeader, addr, size, depth);
                if node.collapsed {
                    return;
                }
                self.children_or_definition(node, addr, depth);
                self.push(node, LineKind::Footer, addr.wrapping_add(size), 0, depth);
            }
            NodeKind::Array => {
                self.push(node, LineKind::ArrayHeader, addr, size, depth);
                if node.collapsed {
                    return;
                }
                if tree.children_of(node.id).is_empty() {
                    self.elements(idx, node, addr, depth);
                } else {
                    self.children(node.id, addr, depth + 1);
                }
                self.push(node, LineKind::Footer, addr.wrapping_add(size), 0, depth);
            }
            NodeKind::Padding => self.push(node, LineKind::Padding, addr, size, depth),
            _ => self.push(node, LineKind::Field, addr, size, depth),
        }
    }

    fn children(&mut self, parent: NodeId, addr: u64, depth: usize) {
        for c in self.tree.children_of(parent) {
            let off = self.tree.nodes()[c].offset;
            self.node(c, addr.wrapping_add(off), depth);
        }
    }

    /// Children of `node`, or, for a childless embedded struct, the fields of
    /// the definition it references.
    fn children_or_definition(&mut self, node: &Node, addr: u64, depth: usize) {
        if !self.tree.children_of(node.id).is_empty() {
            self.children(node.id, addr, depth + 1);
            return;
        }
        if let Some(def) = self.expandable(node) {
            self.expanding.insert(def);
            self.children(def, addr, depth + 1);
            self.expanding.remove(&def);
        }
    }

    fn expandable(&self, node: &Node) -> Option<NodeId> {
        let def = node.ref_id;
        if !self.opts.expand_embedded || def.is_none() || def == node.id {
            return None;
        }
        if self.expanding.contains(&def) || self.tree.is_ancestor(def, node.id) {
            return None;
        }
        self.tree
            .node(def)
            .filter(|d| d.kind == NodeKind::Struct)
            .map(|d| d.id)
    }

    fn elements(&mut self, idx: usize, node: &Node, addr: u64, depth: usize) {
        let stride = self.tree.element_stride(idx);
        let shown = node.array_len.min(self.opts.max_array_elements);
        let def = if node.element_kind == NodeKind::Struct {
            self.expandable(node)
        } else {
            None
        };
        for i in 0..shown {
            let el_addr = addr.wrapping_add(i.wrapping_mul(stride));
            self.lines.push(Line {
                node_id: node.id,
                kind: node.element_kind,
                line_kind: LineKind::ArrayElement,
                address: el_addr,
                size: stride,
                depth: depth + 1,
                name: format!("[{i}]"),
                type_name: element_label(self.tree, node),
                element_index: Some(i),
                value: String::new(),
            });
            if let Some(def) = def {
                self.expanding.insert(def);
                self.children(def, el_addr, depth + 2);
                self.expanding.remove(&def);
            }
        }
        if node.array_len > shown {
            let rest = node.array_len - shown;
            self.lines.push(Line {
                node_id: node.id,
                kind: node.element_kind,
                line_kind: LineKind::Truncated,
                address: addr.wrapping_add(shown.wrapping_mul(stride)),
                size: rest.saturating_mul(stride),
                depth: depth + 1,
                name: format!("... {rest} more"),
                type_name: String::new(),
                element_index: None,
                value: String::new(),
            });
        }
    }
}

fn type_label(tree: &NodeTree, node: &Node) -> String {
    match node.kind {
        NodeKind::Struct => {
            if node.struct_type_name.is_empty() && node.ref_id.is_some() {
                if let Some(def) = tree.node(node.ref_id) {
                    return def.type_name().to_owned();
                }
            }
            node.type_name().to_owned()
        }
        NodeKind::Array => format!("{}[{}]", element_label(tree, node), node.array_len),
        NodeKind::UTF8 | NodeKind::UTF16 => format!("{}[{}]", node.kind, node.str_len),
        NodeKind::Padding => format!("Padding[{}]", node.array_len),
        NodeKind::Pointer32 | NodeKind::Pointer64 => match tree.node(node.ref_id) {
            Some(t) if node.ref_id.is_some() => format!("{}*", t.type_name()),
            _ => node.kind.to_string(),
        },
        k => k.to_string(),
    }
}

fn element_label(tree: &NodeTree, node: &Node) -> String {
    if node.element_kind != NodeKind::Struct {
        return node.element_kind.to_string();
    }
    if !node.struct_type_name.is_empty() {
        return node.struct_type_name.clone();
    }
    match tree.node(node.ref_id) {
        Some(def) if node.ref_id.is_some() => def.type_name().to_owned(),
        _ => NodeKind::Struct.to_string(),
    }
}
