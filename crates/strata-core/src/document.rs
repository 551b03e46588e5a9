// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One open layout: tree, undo history and the byte source it is viewed
//! against.
//!
//! Every edit method builds a [`Command`] and pushes it through
//! [`History`], so each one is a single undo step and a rejected edit
//! leaves the document untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_source::{BufferSource, ByteSource, NullSource, SourceError};
use tracing::debug;

use crate::catalog::{detect_conflict, plan_import, Resolution, TypeConflict};
use crate::command::{Command, CommandError, KindState};
use crate::compose::{ComposeOptions, Layout, Line};
use crate::history::History;
use crate::node::{Node, NodeId, NodeKind};
use crate::persist::{self, PersistError};
use crate::tree::NodeTree;
use crate::value::parse_value;

/// Type name [`Document::create_type`] starts from.
pub const DEFAULT_NEW_TYPE_NAME: &str = "NewClass";

/// Instance name given to roots made by [`Document::create_type`].
pub const NEW_INSTANCE_NAME: &str = "instance";

/// Editing session over one [`NodeTree`].
pub struct Document {
    tree: NodeTree,
    history: History,
    source: Arc<dyn ByteSource>,
    data_path: Option<PathBuf>,
    compose: ComposeOptions,
    new_type_name: String,
}

impl core::fmt::Debug for Document {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.tree.len())
            .field("base_address", &self.tree.base_address)
            .field("source", &self.source.name())
            .field("data_path", &self.data_path)
            .field("undo", &self.history.undo_len())
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Document {
    /// Empty document mapped at `base_address`, viewing [`NullSource`].
    pub fn new(base_address: u64) -> Self {
        Self::with_tree(NodeTree::new(base_address))
    }

    /// Document over an existing tree.
    pub fn with_tree(tree: NodeTree) -> Self {
        Self {
            tree,
            history: History::default(),
            source: Arc::new(NullSource),
            data_path: None,
            compose: ComposeOptions::default(),
            new_type_name: DEFAULT_NEW_TYPE_NAME.to_owned(),
        }
    }

    /// Sets the undo depth (`0` = unbounded).
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history.set_limit(limit);
        self
    }

    /// Sets the projection options used by [`Document::compose`].
    #[must_use]
    pub fn with_compose_options(mut self, opts: ComposeOptions) -> Self {
        self.compose = opts;
        self
    }

    /// Sets the base name for [`Document::create_type`].
    #[must_use]
    pub fn with_new_type_name(mut self, name: impl Into<String>) -> Self {
        self.new_type_name = name.into();
        self
    }

    /// Loads a persisted tree.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        Ok(Self::with_tree(persist::load(path)?))
    }

    /// Persists the tree.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        persist::save(&self.tree, path)
    }

    /// The tree. Mutate it through the edit methods.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Undo/redo state.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Changes the undo depth, dropping the oldest entries if needed.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history.set_limit(limit);
    }

    /// Projection options.
    pub fn compose_options(&self) -> ComposeOptions {
        self.compose
    }

    /// Replaces the projection options.
    pub fn set_compose_options(&mut self, opts: ComposeOptions) {
        self.compose = opts;
    }

    // ── byte source ─────────────────────────────────────────────────────

    /// Current byte source.
    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    /// File the current source was loaded from, if any.
    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    /// Views the tree against `source`. History is kept; byte edits undo
    /// against whichever source is current.
    ///
    /// A non-live source holds offsets rather than addresses, so it is
    /// rebased onto the tree's base address.
    pub fn set_source(&mut self, source: Arc<dyn ByteSource>) {
        debug!(name = %source.name(), kind = %source.kind(), "source attached");
        self.source = source;
        self.data_path = None;
        self.sync_source_base();
    }

    /// Moves the whole tree to `base` and rebases a non-live source with it.
    ///
    /// Recorded byte edits keep the absolute addresses they were made at.
    pub fn set_base_address(&mut self, base: u64) {
        self.tree.base_address = base;
        self.sync_source_base();
    }

    /// Views the tree against an in-memory copy of `data`.
    pub fn load_data(&mut self, data: Vec<u8>) {
        self.set_source(Arc::new(BufferSource::new(data)));
    }

    /// Views the tree against the contents of `path`.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SourceError> {
        let path = path.as_ref();
        let source = BufferSource::from_file(path)?;
        self.set_source(Arc::new(source));
        self.data_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Detaches the source and forgets the data path.
    pub fn clear_source(&mut self) {
        self.set_source(Arc::new(NullSource));
    }

    // ── history ─────────────────────────────────────────────────────────

    /// Applies `cmd` and records it as one undo step.
    pub fn execute(&mut self, cmd: Command) -> Result<(), CommandError> {
        self.history.push(cmd, &mut self.tree, &*self.source)
    }

    /// Reverts the newest edit. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        self.history.undo(&mut self.tree, &*self.source)
    }

    /// Re-applies the newest undone edit.
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        self.history.redo(&mut self.tree, &*self.source)
    }

    // ── projection ──────────────────────────────────────────────────────

    /// Structural projection of the tree.
    pub fn layout(&self) -> Layout {
        Layout::build(&self.tree, self.compose)
    }

    /// Projection with values read from the current source.
    pub fn compose(&self) -> Vec<Line> {
        self.layout().render(&*self.source)
    }

    // ── edits ───────────────────────────────────────────────────────────

    /// Encodes `text` for node `id` and writes it through the source.
    ///
    /// Nothing is recorded unless the write lands. Writing the bytes that
    /// are already there is a no-op.
    pub fn set_value(&mut self, id: NodeId, text: &str) -> Result<(), CommandError> {
        let idx = self.index(id)?;
        let kind = self.tree.nodes()[idx].kind;
        if !kind.is_value() {
            return Err(CommandError::NotEditable(id));
        }
        let addr = self.tree.compute_offset(idx);
        let size = self.tree.byte_size(idx);
        let len = usize::try_from(size).map_err(|_| CommandError::NotEditable(id))?;
        if !self.source.is_writable() || size > self.source.size() {
            return Err(CommandError::WriteFailed { addr, len });
        }
        let new = parse_value(kind, text, len)?;
        let mut old = vec![0u8; len];
        if !self.source.read(addr, &mut old) {
            return Err(CommandError::WriteFailed { addr, len });
        }
        if old == new {
            return Ok(());
        }
        self.execute(Command::WriteBytes { addr, old, new })
    }

    /// Renames a node.
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), CommandError> {
        let old = self.node(id)?.name.clone();
        self.execute(Command::Rename {
            id,
            old,
            new: name.into(),
        })
    }

    /// Changes a struct's type name.
    pub fn set_type_name(
        &mut self,
        id: NodeId,
        type_name: impl Into<String>,
    ) -> Result<(), CommandError> {
        let old = self.node(id)?.struct_type_name.clone();
        self.execute(Command::SetTypeName {
            id,
            old,
            new: type_name.into(),
        })
    }

    /// Changes a node's kind, keeping its length fields.
    pub fn change_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<(), CommandError> {
        let old = KindState::of(self.node(id)?);
        let new = KindState { kind, ..old.clone() };
        self.execute(Command::ChangeKind { id, old, new })
    }

    /// Turns a node into an array of `len` elements of `element`.
    pub fn set_array(
        &mut self,
        id: NodeId,
        element: NodeKind,
        len: u64,
    ) -> Result<(), CommandError> {
        let old = KindState::of(self.node(id)?);
        let new = KindState {
            kind: NodeKind::Array,
            array_len: len,
            element_kind: element,
            ..old.clone()
        };
        self.execute(Command::ChangeKind { id, old, new })
    }

    /// Sets a string node's character count or a padding node's byte length.
    pub fn set_length(&mut self, id: NodeId, len: u64) -> Result<(), CommandError> {
        let old = KindState::of(self.node(id)?);
        let mut new = old.clone();
        match old.kind {
            NodeKind::UTF8 | NodeKind::UTF16 => new.str_len = len,
            NodeKind::Padding | NodeKind::Array => new.array_len = len,
            _ => return Err(CommandError::NotEditable(id)),
        }
        self.execute(Command::ChangeKind { id, old, new })
    }

    /// Moves a node within its parent.
    pub fn set_offset(&mut self, id: NodeId, offset: u64) -> Result<(), CommandError> {
        let parent = self.node(id)?.parent_id;
        self.move_node(id, parent, offset)
    }

    /// Reparents a node and sets its offset.
    pub fn move_node(
        &mut self,
        id: NodeId,
        parent: NodeId,
        offset: u64,
    ) -> Result<(), CommandError> {
        let node = self.node(id)?;
        let old = (node.parent_id, node.offset);
        self.execute(Command::Move {
            id,
            old,
            new: (parent, offset),
        })
    }

    /// Flips the fold flag.
    pub fn toggle_collapse(&mut self, id: NodeId) -> Result<(), CommandError> {
        let old = self.node(id)?.collapsed;
        self.execute(Command::SetCollapsed {
            id,
            old,
            new: !old,
        })
    }

    /// Points a pointer, embedded struct or struct array at `target`.
    ///
    /// `target` must be a Struct in this tree, or [`NodeId::NONE`] to
    /// clear the reference.
    pub fn set_pointer_target(&mut self, id: NodeId, target: NodeId) -> Result<(), CommandError> {
        let node = self.node(id)?;
        if !(node.kind.is_pointer() || node.kind.is_container()) {
            return Err(CommandError::NotEditable(id));
        }
        let old = node.ref_id;
        if target.is_some() {
            match self.tree.node(target) {
                None => return Err(CommandError::MissingNode(target)),
                Some(t) if t.kind != NodeKind::Struct => {
                    return Err(CommandError::NotEditable(target))
                }
                Some(_) => {}
            }
        }
        self.execute(Command::SetRef {
            id,
            old,
            new: target,
        })
    }

    /// Adds a field under `parent` (or a root when `parent` is
    /// [`NodeId::NONE`]).
    ///
    /// With no `offset` the field goes right after the parent's furthest
    /// child extent. New root structs get a unique type name.
    pub fn insert_node(
        &mut self,
        parent: NodeId,
        offset: Option<u64>,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Result<NodeId, CommandError> {
        self.tree.check_parent(parent)?;
        let offset = offset.unwrap_or_else(|| self.end_of_children(parent));
        let mut node = Node::field(parent, offset, kind, name);
        if kind == NodeKind::Struct && parent.is_none() {
            node.struct_type_name = self.tree.unique_type_name(&self.new_type_name);
        }
        node.id = self.tree.reserve_id();
        let id = node.id;
        self.execute(Command::Insert { nodes: vec![node] })?;
        Ok(id)
    }

    /// Removes `ids` and their subtrees as one undo step. An empty
    /// selection records nothing.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<(), CommandError> {
        if ids.is_empty() {
            return Ok(());
        }
        let cmd = Command::remove(&self.tree, ids)?;
        self.execute(cmd)
    }

    /// Copies `id` and its subtree right after the original.
    ///
    /// The copy gets fresh ids; references inside the subtree follow the
    /// copy. A copied root struct gets a unique type name.
    pub fn duplicate(&mut self, id: NodeId) -> Result<NodeId, CommandError> {
        let idx = self.index(id)?;
        let size = self.tree.byte_size(idx);
        let order = self.tree.subtree(id);
        let mut remap: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        for &i in &order {
            let old = self.tree.nodes()[i].id;
            let fresh = self.tree.reserve_id();
            remap.insert(old, fresh);
        }
        let mut nodes: Vec<Node> = order
            .iter()
            .map(|&i| {
                let mut n = self.tree.nodes()[i].clone();
                n.id = remap.get(&n.id).copied().unwrap_or(n.id);
                n.parent_id = remap.get(&n.parent_id).copied().unwrap_or(n.parent_id);
                n.ref_id = remap.get(&n.ref_id).copied().unwrap_or(n.ref_id);
                n
            })
            .collect();
        let copy_id = remap.get(&id).copied().unwrap_or(NodeId::NONE);
        if let Some(first) = nodes.first_mut() {
            first.offset = first.offset.saturating_add(size);
            if first.is_root() && first.kind == NodeKind::Struct {
                first.struct_type_name = self.tree.unique_type_name(first.type_name());
            }
        }
        self.execute(Command::Insert { nodes })?;
        Ok(copy_id)
    }

    /// Adds an empty root struct named after the configured base type name
    /// (`NewClass`, `NewClass1`, ...).
    pub fn create_type(&mut self) -> Result<NodeId, CommandError> {
        let type_name = self.tree.unique_type_name(&self.new_type_name);
        let mut node = Node::root_struct(NEW_INSTANCE_NAME, type_name);
        node.id = self.tree.reserve_id();
        let id = node.id;
        self.execute(Command::Insert { nodes: vec![node] })?;
        Ok(id)
    }

    /// Finds type `name` locally or imports it from `externals` (searched
    /// in order) as one undo step.
    pub fn import_type(
        &mut self,
        name: &str,
        externals: &[&NodeTree],
    ) -> Result<Resolution, CommandError> {
        let plan = plan_import(&mut self.tree, externals, name);
        if !plan.nodes.is_empty() {
            self.execute(Command::Insert { nodes: plan.nodes })?;
        }
        Ok(plan.resolution)
    }

    /// Resolves `name` like [`Document::import_type`] and points node `id`
    /// at the result, all in one undo step.
    ///
    /// An unresolved name changes nothing.
    pub fn resolve_pointer_target(
        &mut self,
        id: NodeId,
        name: &str,
        externals: &[&NodeTree],
    ) -> Result<Resolution, CommandError> {
        let node = self.node(id)?;
        if !(node.kind.is_pointer() || node.kind.is_container()) {
            return Err(CommandError::NotEditable(id));
        }
        let old = node.ref_id;
        let plan = plan_import(&mut self.tree, externals, name);
        let Some(target) = plan.resolution.id() else {
            return Ok(Resolution::Unresolved);
        };
        let mut steps = Vec::with_capacity(2);
        if !plan.nodes.is_empty() {
            steps.push(Command::Insert { nodes: plan.nodes });
        }
        steps.push(Command::SetRef {
            id,
            old,
            new: target,
        });
        self.execute(Command::Batch(steps))?;
        Ok(plan.resolution)
    }

    /// Same-named definitions of `name` here and in `externals` that
    /// disagree structurally.
    pub fn type_conflict(&self, name: &str, externals: &[&NodeTree]) -> Option<TypeConflict> {
        detect_conflict(&self.tree, externals, name)
    }

    fn sync_source_base(&self) {
        if !self.source.is_live() {
            self.source.set_base(self.tree.base_address);
        }
    }

    fn index(&self, id: NodeId) -> Result<usize, CommandError> {
        self.tree.index_of(id).ok_or(CommandError::MissingNode(id))
    }

    fn node(&self, id: NodeId) -> Result<&Node, CommandError> {
        self.tree.node(id).ok_or(CommandError::MissingNode(id))
    }

    fn end_of_children(&self, parent: NodeId) -> u64 {
        self.tree
            .children_of(parent)
            .into_iter()
            .map(|c| {
                self.tree.nodes()[c]
                    .offset
                    .saturating_add(self.tree.byte_size(c))
            })
            .max()
            .unwrap_or(0)
    }
}
