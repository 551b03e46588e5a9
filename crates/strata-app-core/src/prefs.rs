// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Workspace preferences: editing defaults and the remembered source list.

use serde::{Deserialize, Serialize};
use strata_core::{ComposeOptions, DEFAULT_HISTORY_LIMIT, DEFAULT_NEW_TYPE_NAME};

/// Saved preferences for a Strata workspace.
///
/// Every field defaults when absent, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspacePrefs {
    /// Undo depth per document; `0` keeps everything.
    pub history_limit: usize,
    /// Base address for newly created documents.
    pub default_base_address: u64,
    /// Base name for new types (`NewClass`, `NewClass1`, ...).
    pub new_type_name: String,
    /// Projection knobs.
    pub compose: ComposePrefs,
    /// Sources the user picked before, most recent last.
    pub saved_sources: Vec<SavedSource>,
    /// Index into `saved_sources` of the selected entry.
    pub active_source: Option<usize>,
}

impl Default for WorkspacePrefs {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_base_address: 0,
            new_type_name: DEFAULT_NEW_TYPE_NAME.to_owned(),
            compose: ComposePrefs::default(),
            saved_sources: Vec::new(),
            active_source: None,
        }
    }
}

/// Display projection preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposePrefs {
    /// Array elements shown before truncation.
    pub max_array_elements: u64,
    /// Expand embedded struct definitions inline.
    pub expand_embedded: bool,
}

impl Default for ComposePrefs {
    fn default() -> Self {
        let opts = ComposeOptions::default();
        Self {
            max_array_elements: opts.max_array_elements,
            expand_embedded: opts.expand_embedded,
        }
    }
}

impl From<ComposePrefs> for ComposeOptions {
    fn from(p: ComposePrefs) -> Self {
        Self {
            max_array_elements: p.max_array_elements,
            expand_embedded: p.expand_embedded,
        }
    }
}

/// A remembered byte source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedSource {
    /// Backend family ("File", "Process", ...).
    pub kind: String,
    /// Label shown in the picker.
    pub display_name: String,
    /// Backing file, for file sources.
    pub file_path: String,
    /// Rebasing address applied on reconnect.
    pub base_address: u64,
}

impl Default for SavedSource {
    fn default() -> Self {
        Self {
            kind: "File".to_owned(),
            display_name: String::new(),
            file_path: String::new(),
            base_address: 0,
        }
    }
}

impl WorkspacePrefs {
    /// Remembers `source` and selects it. An entry with the same kind and
    /// path is replaced instead of duplicated.
    pub fn remember_source(&mut self, source: SavedSource) -> usize {
        let existing = self
            .saved_sources
            .iter()
            .position(|s| s.kind == source.kind && s.file_path == source.file_path);
        let idx = match existing {
            Some(i) => {
                self.saved_sources[i] = source;
                i
            }
            None => {
                self.saved_sources.push(source);
                self.saved_sources.len() - 1
            }
        };
        self.active_source = Some(idx);
        idx
    }

    /// Selects entry `idx`. Out-of-range indices are ignored.
    pub fn select_source(&mut self, idx: usize) {
        if idx < self.saved_sources.len() {
            self.active_source = Some(idx);
        }
    }

    /// The selected entry, if any.
    pub fn active(&self) -> Option<&SavedSource> {
        self.active_source.and_then(|i| self.saved_sources.get(i))
    }

    /// Forgets every saved source and the selection.
    pub fn clear_sources(&mut self) {
        self.saved_sources.clear();
        self.active_source = None;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn file(path: &str) -> SavedSource {
        SavedSource {
            display_name: path.to_owned(),
            file_path: path.to_owned(),
            ..SavedSource::default()
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let prefs = WorkspacePrefs::default();
        assert_eq!(prefs.history_limit, 512);
        assert_eq!(prefs.default_base_address, 0);
        assert_eq!(prefs.new_type_name, "NewClass");
        assert_eq!(prefs.compose.max_array_elements, 256);
        assert!(prefs.compose.expand_embedded);
        assert!(prefs.active().is_none());
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let prefs: WorkspacePrefs =
            serde_json::from_str(r#"{"history_limit": 0, "compose": {"expand_embedded": false}}"#)
                .expect("parse");
        assert_eq!(prefs.history_limit, 0);
        assert_eq!(prefs.new_type_name, "NewClass");
        assert_eq!(prefs.compose.max_array_elements, 256);
        assert!(!prefs.compose.expand_embedded);
    }

    #[test]
    fn source_selection_ignores_bad_indices() {
        let mut prefs = WorkspacePrefs::default();
        prefs.remember_source(file("a.bin"));
        prefs.remember_source(file("b.bin"));
        assert_eq!(prefs.active().map(|s| s.file_path.as_str()), Some("b.bin"));
        prefs.select_source(7);
        assert_eq!(prefs.active_source, Some(1));
        prefs.select_source(0);
        assert_eq!(prefs.active().map(|s| s.file_path.as_str()), Some("a.bin"));

        let again = prefs.remember_source(SavedSource {
            base_address: 0x400000,
            ..file("b.bin")
        });
        assert_eq!(again, 1);
        assert_eq!(prefs.saved_sources.len(), 2);
        assert_eq!(prefs.saved_sources[1].base_address, 0x400000);

        prefs.clear_sources();
        assert!(prefs.saved_sources.is_empty());
        assert!(prefs.active().is_none());
    }
}
