// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Open documents and cross-document type sharing.
//!
//! Documents are addressed by their position in the workspace. Imports read
//! the other documents' trees while mutating one target, which the borrow
//! split in [`Workspace::split`] makes explicit: no tree is written while it
//! is being copied from.

use std::path::Path;

use strata_core::catalog::TypeConflict;
use strata_core::{CommandError, Document, NodeId, NodeTree, PersistError, Resolution};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::prefs::WorkspacePrefs;

/// Failures of workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No document at this position.
    #[error("no document at index {0}")]
    NoSuchDocument(usize),
    /// The edit was rejected.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// A layout file could not be loaded or saved.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Every open document plus the preferences new ones start from.
#[derive(Debug, Default)]
pub struct Workspace {
    documents: Vec<Document>,
    prefs: WorkspacePrefs,
}

impl Workspace {
    /// Empty workspace using `prefs`.
    pub fn new(prefs: WorkspacePrefs) -> Self {
        Self {
            documents: Vec::new(),
            prefs,
        }
    }

    /// Current preferences.
    pub fn prefs(&self) -> &WorkspacePrefs {
        &self.prefs
    }

    /// Replaces the preferences and applies history and projection settings
    /// to every open document.
    pub fn set_prefs(&mut self, prefs: WorkspacePrefs) {
        for doc in &mut self.documents {
            doc.set_history_limit(prefs.history_limit);
            doc.set_compose_options(prefs.compose.into());
        }
        self.prefs = prefs;
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when nothing is open.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document at `idx`.
    pub fn document(&self, idx: usize) -> Option<&Document> {
        self.documents.get(idx)
    }

    /// Mutable document at `idx`.
    pub fn document_mut(&mut self, idx: usize) -> Option<&mut Document> {
        self.documents.get_mut(idx)
    }

    /// All documents in workspace order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Opens an empty document configured from the preferences.
    pub fn new_document(&mut self) -> usize {
        let doc = self.configure(Document::new(self.prefs.default_base_address));
        self.add(doc)
    }

    /// Loads a persisted layout as a new document.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open_document(&mut self, path: impl AsRef<Path>) -> Result<usize, WorkspaceError> {
        let doc = self.configure(Document::open(path)?);
        Ok(self.add(doc))
    }

    /// Adds an existing document as is.
    pub fn add(&mut self, doc: Document) -> usize {
        self.documents.push(doc);
        debug!(count = self.documents.len(), "document added");
        self.documents.len() - 1
    }

    /// Closes the document at `idx`; later documents shift down by one.
    pub fn close(&mut self, idx: usize) -> Option<Document> {
        (idx < self.documents.len()).then(|| self.documents.remove(idx))
    }

    /// Imports type `name` into document `target`, searching the other
    /// documents in workspace order.
    pub fn import_type(&mut self, target: usize, name: &str) -> Result<Resolution, WorkspaceError> {
        let order = self.default_order(target);
        self.import_type_from(target, name, &order)
    }

    /// Imports type `name` into document `target`, searching documents in
    /// the caller-supplied `order` (the target itself is skipped).
    #[instrument(skip(self, order))]
    pub fn import_type_from(
        &mut self,
        target: usize,
        name: &str,
        order: &[usize],
    ) -> Result<Resolution, WorkspaceError> {
        let (doc, externals) = self.split(target, order)?;
        Ok(doc.import_type(name, &externals)?)
    }

    /// Points node `id` of document `target` at type `name`, importing it
    /// from the other documents (workspace order) when needed.
    #[instrument(skip(self))]
    pub fn resolve_pointer_target(
        &mut self,
        target: usize,
        id: NodeId,
        name: &str,
    ) -> Result<Resolution, WorkspaceError> {
        let order = self.default_order(target);
        let (doc, externals) = self.split(target, &order)?;
        Ok(doc.resolve_pointer_target(id, name, &externals)?)
    }

    /// Conflicting definitions of `name` visible from document `target`.
    pub fn type_conflict(
        &self,
        target: usize,
        name: &str,
    ) -> Result<Option<TypeConflict>, WorkspaceError> {
        let doc = self
            .documents
            .get(target)
            .ok_or(WorkspaceError::NoSuchDocument(target))?;
        let externals: Vec<&NodeTree> = self
            .documents
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != target)
            .map(|(_, d)| d.tree())
            .collect();
        Ok(doc.type_conflict(name, &externals))
    }

    fn configure(&self, doc: Document) -> Document {
        doc.with_history_limit(self.prefs.history_limit)
            .with_compose_options(self.prefs.compose.into())
            .with_new_type_name(self.prefs.new_type_name.clone())
    }

    fn default_order(&self, target: usize) -> Vec<usize> {
        (0..self.documents.len()).filter(|&i| i != target).collect()
    }

    /// Mutable target plus shared views of the trees named by `order`.
    fn split(
        &mut self,
        target: usize,
        order: &[usize],
    ) -> Result<(&mut Document, Vec<&NodeTree>), WorkspaceError> {
        let len = self.documents.len();
        if let Some(&bad) = std::iter::once(&target).chain(order).find(|&&i| i >= len) {
            return Err(WorkspaceError::NoSuchDocument(bad));
        }
        let (before, rest) = self.documents.split_at_mut(target);
        let (doc, after) = rest
            .split_first_mut()
            .ok_or(WorkspaceError::NoSuchDocument(target))?;
        let before: &[Document] = before;
        let after: &[Document] = after;
        let externals = order
            .iter()
            .filter(|&&i| i != target)
            .filter_map(move |&i| {
                if i < target {
                    before.get(i)
                } else {
                    after.get(i - target - 1)
                }
            })
            .map(Document::tree)
            .collect();
        Ok((doc, externals))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use strata_core::{Node, NodeKind};

    fn with_type(ws: &mut Workspace, type_name: &str, kind: NodeKind) -> usize {
        let idx = ws.new_document();
        let doc = ws.document_mut(idx).expect("doc");
        let root = doc.create_type().expect("type");
        doc.set_type_name(root, type_name).expect("name");
        doc.insert_node(root, Some(0), kind, "field").expect("field");
        idx
    }

    #[test]
    fn new_documents_follow_prefs() {
        let mut ws = Workspace::new(WorkspacePrefs {
            history_limit: 2,
            default_base_address: 0x1000,
            new_type_name: "Class".to_owned(),
            ..WorkspacePrefs::default()
        });
        let idx = ws.new_document();
        let doc = ws.document_mut(idx).expect("doc");
        assert_eq!(doc.tree().base_address, 0x1000);
        assert_eq!(doc.history().limit(), 2);
        let root = doc.create_type().expect("type");
        assert_eq!(doc.tree().node(root).map(Node::type_name), Some("Class"));
    }

    #[test]
    fn search_order_is_caller_supplied() {
        let mut ws = Workspace::default();
        let target = ws.new_document();
        let first = with_type(&mut ws, "Shared", NodeKind::Float);
        let second = with_type(&mut ws, "Shared", NodeKind::Double);

        let res = ws
            .import_type_from(target, "Shared", &[second, first])
            .expect("import");
        assert_eq!(res, Resolution::Imported { id: res.id().expect("id"), origin: 0 });
        let tree = ws.document(target).expect("target").tree();
        let root = tree.find_root_struct("Shared").expect("root");
        let field = &tree.nodes()[tree.children_of(root)[0]];
        assert_eq!(field.kind, NodeKind::Double);

        let again = ws.import_type(target, "Shared").expect("again");
        assert_eq!(again, Resolution::AlreadyLocal(root));
    }

    #[test]
    fn bad_indices_are_reported() {
        let mut ws = Workspace::default();
        ws.new_document();
        assert!(matches!(
            ws.import_type(3, "X"),
            Err(WorkspaceError::NoSuchDocument(3))
        ));
        assert!(matches!(
            ws.import_type_from(0, "X", &[9]),
            Err(WorkspaceError::NoSuchDocument(9))
        ));
        assert!(ws.close(5).is_none());
        assert!(ws.close(0).is_some());
        assert!(ws.is_empty());
    }

    #[test]
    fn set_prefs_reaches_open_documents() {
        let mut ws = Workspace::default();
        let idx = ws.new_document();
        ws.set_prefs(WorkspacePrefs {
            history_limit: 3,
            ..WorkspacePrefs::default()
        });
        assert_eq!(ws.document(idx).map(|d| d.history().limit()), Some(3));
    }
}
