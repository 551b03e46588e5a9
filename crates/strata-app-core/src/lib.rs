// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Application services for Strata: config, workspace preferences, and the
//! multi-document workspace.
//! Keeps UI and storage adapters thin and framework-agnostic.

pub mod config;
pub mod config_port;
pub mod prefs;
pub mod workspace;

pub use workspace::{Workspace, WorkspaceError};
