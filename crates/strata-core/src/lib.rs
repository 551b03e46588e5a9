// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! strata-core: relocatable byte-layout model.
//!
//! A [`NodeTree`] describes how a memory region is laid out (structs,
//! arrays, pointers, primitives) as a flat arena with id links. Offsets and
//! sizes are resolved on demand against the current tree, values are read
//! through a [`strata_source::ByteSource`], and every edit is a reversible
//! [`Command`] recorded in a [`History`]. [`Document`] bundles the three for
//! an editing session.
//!
//! Types are shared between trees by name: [`catalog`] finds a definition
//! locally or deep-copies it from other trees with fresh ids.
#![forbid(unsafe_code)]

/// Type lookup, cross-tree import, and conflict detection.
pub mod catalog;
mod command;
/// Flat line projection for display.
pub mod compose;
mod document;
/// Structural hashing of type definitions.
pub mod hash;
mod history;
/// Queries for external format mappers.
pub mod interchange;
mod node;
/// JSON persistence.
pub mod persist;
/// C-style declaration output.
pub mod sdk;
mod tree;
mod value;

pub use catalog::{find_or_create_struct_by_name, resolve_struct_name, Resolution};
pub use command::{Command, CommandError, KindState};
pub use compose::{compose, ComposeOptions, Layout, Line, LineKind};
pub use document::{Document, DEFAULT_NEW_TYPE_NAME, NEW_INSTANCE_NAME};
pub use hash::{structural_hash, Hash32};
pub use history::{History, DEFAULT_HISTORY_LIMIT};
pub use node::{Node, NodeId, NodeKind};
pub use persist::PersistError;
pub use tree::NodeTree;
pub use value::{format_value, parse_value, ValueError};
