// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node identifiers, kinds, and the node record.

use serde::{Deserialize, Serialize};

/// Identifier for a node within one [`crate::NodeTree`].
///
/// # Invariants
/// - Zero ([`NodeId::NONE`]) is reserved: it means "no parent" on
///   `parent_id` and "unresolved" on `ref_id`. The allocator never issues it.
/// - Ids are unique within a tree and never reused after removal, so a stale
///   `ref_id` reads as dangling instead of aliasing a newer node.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// The reserved "no node" id.
    pub const NONE: Self = Self(0);

    /// Wraps a raw id value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// True for [`NodeId::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True for any id other than [`NodeId::NONE`].
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of node kinds.
///
/// Serialized by variant name (`"Hex32"`, `"UTF8"`, ...).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub enum NodeKind {
    /// 1-byte raw hex view.
    #[default]
    Hex8,
    /// 2-byte raw hex view.
    Hex16,
    /// 4-byte raw hex view.
    Hex32,
    /// 8-byte raw hex view.
    Hex64,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE-754 single.
    Float,
    /// IEEE-754 double.
    Double,
    /// One-byte boolean.
    Bool,
    /// 32-bit pointer.
    Pointer32,
    /// 64-bit pointer.
    Pointer64,
    /// Two `f32` components.
    Vec2,
    /// Three `f32` components.
    Vec3,
    /// Four `f32` components.
    Vec4,
    /// Row-major 4x4 `f32` matrix.
    Mat4x4,
    /// Fixed-length UTF-8 string (`str_len` bytes).
    UTF8,
    /// Fixed-length UTF-16LE string (`str_len` code units).
    UTF16,
    /// Opaque gap of `array_len` bytes.
    Padding,
    /// `array_len` elements of `element_kind`.
    Array,
    /// Container of fields; roots are type definitions.
    Struct,
}

impl NodeKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 26] = [
        Self::Hex8,
        Self::Hex16,
        Self::Hex32,
        Self::Hex64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float,
        Self::Double,
        Self::Bool,
        Self::Pointer32,
        Self::Pointer64,
        Self::Vec2,
        Self::Vec3,
        Self::Vec4,
        Self::Mat4x4,
        Self::UTF8,
        Self::UTF16,
        Self::Padding,
        Self::Array,
        Self::Struct,
    ];

    /// Width for kinds whose size does not depend on node fields.
    pub const fn fixed_size(self) -> Option<u64> {
        match self {
            Self::Hex8 | Self::Int8 | Self::UInt8 | Self::Bool => Some(1),
            Self::Hex16 | Self::Int16 | Self::UInt16 => Some(2),
            Self::Hex32 | Self::Int32 | Self::UInt32 | Self::Float | Self::Pointer32 => Some(4),
            Self::Hex64 | Self::Int64 | Self::UInt64 | Self::Double | Self::Pointer64 | Self::Vec2 => {
                Some(8)
            }
            Self::Vec3 => Some(12),
            Self::Vec4 => Some(16),
            Self::Mat4x4 => Some(64),
            Self::UTF8 | Self::UTF16 | Self::Padding | Self::Array | Self::Struct => None,
        }
    }

    /// Raw hex views.
    pub const fn is_hex(self) -> bool {
        matches!(self, Self::Hex8 | Self::Hex16 | Self::Hex32 | Self::Hex64)
    }

    /// 32- or 64-bit pointers.
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Pointer32 | Self::Pointer64)
    }

    /// Kinds that may own children.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Struct | Self::Array)
    }

    /// Fixed-length string kinds.
    pub const fn is_string(self) -> bool {
        matches!(self, Self::UTF8 | Self::UTF16)
    }

    /// Kinds whose bytes can be rendered and edited as a single value.
    pub const fn is_value(self) -> bool {
        !matches!(self, Self::Padding | Self::Array | Self::Struct)
    }

    /// Variant name as persisted.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hex8 => "Hex8",
            Self::Hex16 => "Hex16",
            Self::Hex32 => "Hex32",
            Self::Hex64 => "Hex64",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Bool => "Bool",
            Self::Pointer32 => "Pointer32",
            Self::Pointer64 => "Pointer64",
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Mat4x4 => "Mat4x4",
            Self::UTF8 => "UTF8",
            Self::UTF16 => "UTF16",
            Self::Padding => "Padding",
            Self::Array => "Array",
            Self::Struct => "Struct",
        }
    }
}

impl core::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a layout tree.
///
/// Kind-specific fields default to zero/empty when absent from a persisted
/// document. `name`, `parent_id` and `offset` are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique id; [`NodeId::NONE`] asks the tree to allocate one.
    pub id: NodeId,
    /// Node kind.
    pub kind: NodeKind,
    /// Instance label (not required to be unique).
    pub name: String,
    /// Containing Struct/Array, or [`NodeId::NONE`] for a root.
    pub parent_id: NodeId,
    /// Byte offset relative to the parent's start.
    pub offset: u64,
    /// Element count (Array) or byte length (Padding).
    #[serde(default)]
    pub array_len: u64,
    /// Element kind for Array nodes.
    #[serde(default)]
    pub element_kind: NodeKind,
    /// Type name for Struct nodes (lookup key for references).
    #[serde(default)]
    pub struct_type_name: String,
    /// Pointer target / embedded type definition / struct array element type.
    #[serde(default)]
    pub ref_id: NodeId,
    /// Character count for UTF8/UTF16 strings.
    #[serde(default)]
    pub str_len: u64,
    /// Display-only fold flag.
    #[serde(default)]
    pub collapsed: bool,
}

impl Node {
    /// A detached node of `kind` with no id, parent, or kind-specific data.
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::NONE,
            kind,
            name: name.into(),
            parent_id: NodeId::NONE,
            offset: 0,
            array_len: 0,
            element_kind: NodeKind::default(),
            struct_type_name: String::new(),
            ref_id: NodeId::NONE,
            str_len: 0,
            collapsed: false,
        }
    }

    /// A field of `kind` at `offset` inside `parent`.
    pub fn field(parent: NodeId, offset: u64, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            parent_id: parent,
            offset,
            ..Self::new(kind, name)
        }
    }

    /// A root struct definition.
    pub fn root_struct(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            struct_type_name: type_name.into(),
            ..Self::new(NodeKind::Struct, name)
        }
    }

    /// An array of `len` elements of `element`.
    pub fn array(
        parent: NodeId,
        offset: u64,
        name: impl Into<String>,
        element: NodeKind,
        len: u64,
    ) -> Self {
        Self {
            array_len: len,
            element_kind: element,
            ..Self::field(parent, offset, NodeKind::Array, name)
        }
    }

    /// A fixed-length string of `len` characters.
    pub fn string(
        parent: NodeId,
        offset: u64,
        kind: NodeKind,
        name: impl Into<String>,
        len: u64,
    ) -> Self {
        debug_assert!(kind.is_string());
        Self {
            str_len: len,
            ..Self::field(parent, offset, kind, name)
        }
    }

    /// Sets `ref_id`.
    pub fn with_ref(mut self, target: NodeId) -> Self {
        self.ref_id = target;
        self
    }

    /// Sets `struct_type_name`.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.struct_type_name = type_name.into();
        self
    }

    /// True when the node sits at root level.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// `struct_type_name`, falling back to `name` when empty.
    pub fn type_name(&self) -> &str {
        if self.struct_type_name.is_empty() {
            &self.name
        } else {
            &self.struct_type_name
        }
    }

    /// Size computable from the node alone.
    ///
    /// `None` for Struct nodes and struct-typed arrays, whose size depends on
    /// other nodes; see [`crate::NodeTree::byte_size`].
    pub fn intrinsic_size(&self) -> Option<u64> {
        match self.kind {
            NodeKind::UTF8 => Some(self.str_len),
            NodeKind::UTF16 => Some(self.str_len.saturating_mul(2)),
            NodeKind::Padding => Some(self.array_len),
            NodeKind::Array => match self.element_kind {
                NodeKind::Struct => None,
                k => Some(self.array_len.saturating_mul(k.fixed_size().unwrap_or(0))),
            },
            NodeKind::Struct => None,
            k => k.fixed_size(),
        }
    }
}
