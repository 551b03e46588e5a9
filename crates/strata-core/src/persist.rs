// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON persistence for node trees.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandError;
use crate::node::Node;
use crate::tree::NodeTree;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors loading or saving a persisted tree.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON or wrong field types.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Well-formed document describing an invalid tree.
    #[error("invalid tree: {0}")]
    Invalid(#[from] CommandError),
    /// Written by a newer format.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeDoc {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    base_address: u64,
    #[serde(default)]
    next_id: u64,
    nodes: Vec<Node>,
}

const fn default_version() -> u32 {
    FORMAT_VERSION
}

/// Serializes `tree` (nodes, base address, allocator position).
pub fn to_json(tree: &NodeTree) -> Result<String, PersistError> {
    let doc = TreeDoc {
        version: FORMAT_VERSION,
        base_address: tree.base_address,
        next_id: tree.next_id(),
        nodes: tree.nodes().to_vec(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Parses a tree, keeping persisted ids.
pub fn from_json(text: &str) -> Result<NodeTree, PersistError> {
    let doc: TreeDoc = serde_json::from_str(text)?;
    if doc.version > FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(doc.version));
    }
    Ok(NodeTree::from_nodes(doc.base_address, doc.nodes, doc.next_id)?)
}

/// Writes `tree` to `path`.
pub fn save(tree: &NodeTree, path: impl AsRef<Path>) -> Result<(), PersistError> {
    fs::write(path, to_json(tree)?)?;
    Ok(())
}

/// Reads a tree from `path`.
pub fn load(path: impl AsRef<Path>) -> Result<NodeTree, PersistError> {
    from_json(&fs::read_to_string(path)?)
}
