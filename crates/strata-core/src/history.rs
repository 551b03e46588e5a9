// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Linear undo/redo log.

use std::collections::VecDeque;

use strata_source::ByteSource;
use tracing::{debug, warn};

use crate::command::{Command, CommandError};
use crate::tree::NodeTree;

/// Default number of undo steps kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 512;

/// Undo/redo stacks over one tree.
///
/// Pushing applies the command first and records it only on success, so a
/// refused byte write never becomes an undo entry. Pushing while positioned
/// mid-history discards the redo tail.
#[derive(Debug, Clone)]
pub struct History {
    done: VecDeque<Command>,
    undone: Vec<Command>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    /// History keeping at most `limit` undo steps; `0` keeps everything.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            done: VecDeque::new(),
            undone: Vec::new(),
            limit,
        }
    }

    /// Current limit (`0` = unbounded).
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Changes the limit, dropping the oldest entries if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.trim();
    }

    /// Applies `cmd` and records it.
    pub fn push(
        &mut self,
        cmd: Command,
        tree: &mut NodeTree,
        source: &dyn ByteSource,
    ) -> Result<(), CommandError> {
        if let Err(err) = cmd.apply(tree, source) {
            warn!(command = cmd.label(), %err, "command rejected");
            return Err(err);
        }
        debug!(command = cmd.label(), "applied");
        self.undone.clear();
        self.done.push_back(cmd);
        self.trim();
        Ok(())
    }

    /// Reverts the newest entry. `Ok(false)` when there is nothing to undo.
    pub fn undo(
        &mut self,
        tree: &mut NodeTree,
        source: &dyn ByteSource,
    ) -> Result<bool, CommandError> {
        let Some(cmd) = self.done.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = cmd.revert(tree, source) {
            warn!(command = cmd.label(), %err, "undo failed");
            self.done.push_back(cmd);
            return Err(err);
        }
        debug!(command = cmd.label(), "undone");
        self.undone.push(cmd);
        Ok(true)
    }

    /// Re-applies the newest undone entry. `Ok(false)` when there is nothing
    /// to redo.
    pub fn redo(
        &mut self,
        tree: &mut NodeTree,
        source: &dyn ByteSource,
    ) -> Result<bool, CommandError> {
        let Some(cmd) = self.undone.pop() else {
            return Ok(false);
        };
        if let Err(err) = cmd.apply(tree, source) {
            warn!(command = cmd.label(), %err, "redo failed");
            self.undone.push(cmd);
            return Err(err);
        }
        debug!(command = cmd.label(), "redone");
        self.done.push_back(cmd);
        Ok(true)
    }

    /// True when [`History::undo`] has something to revert.
    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    /// True when [`History::redo`] has something to re-apply.
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_len(&self) -> usize {
        self.done.len()
    }

    /// Number of redo steps.
    pub fn redo_len(&self) -> usize {
        self.undone.len()
    }

    /// Newest undoable command.
    pub fn last(&self) -> Option<&Command> {
        self.done.back()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }

    fn trim(&mut self) {
        if self.limit == 0 {
            return;
        }
        while self.done.len() > self.limit {
            self.done.pop_front();
        }
    }
}
