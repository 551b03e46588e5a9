// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config port for workspace preferences.

use tracing::warn;

use crate::config::{ConfigService, ConfigStore};
use crate::prefs::WorkspacePrefs;

/// Key workspace preferences are stored under.
pub const WORKSPACE_PREFS_KEY: &str = "workspace";

/// Loads and saves [`WorkspacePrefs`].
pub trait ConfigPort {
    /// Saved preferences; `None` if missing or unreadable.
    fn load_prefs(&self) -> Option<WorkspacePrefs>;
    /// Persists preferences. Best effort: failures are logged.
    fn save_prefs(&self, prefs: &WorkspacePrefs);
}

impl<S: ConfigStore> ConfigPort for ConfigService<S> {
    fn load_prefs(&self) -> Option<WorkspacePrefs> {
        match self.load(WORKSPACE_PREFS_KEY) {
            Ok(prefs) => prefs,
            Err(err) => {
                warn!(%err, "ignoring unreadable workspace prefs");
                None
            }
        }
    }

    fn save_prefs(&self, prefs: &WorkspacePrefs) {
        if let Err(err) = self.save(WORKSPACE_PREFS_KEY, prefs) {
            warn!(%err, "failed to save workspace prefs");
        }
    }
}
