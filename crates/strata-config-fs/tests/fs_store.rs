// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use strata_app_core::config::{ConfigError, ConfigService, ConfigStore};
use strata_app_core::config_port::{ConfigPort, WORKSPACE_PREFS_KEY};
use strata_app_core::prefs::{SavedSource, WorkspacePrefs};
use strata_config_fs::FsConfigStore;

#[test]
fn missing_key_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsConfigStore::at(dir.path()).expect("store");
    assert!(matches!(store.load_raw("absent"), Err(ConfigError::NotFound)));
}

#[test]
fn keys_map_to_json_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsConfigStore::at(dir.path().join("nested")).expect("store");
    store.save_raw("window", b"{}").expect("save");
    assert!(store.base().join("window.json").is_file());
    assert_eq!(store.load_raw("window").expect("load"), b"{}");
}

#[test]
fn path_like_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsConfigStore::at(dir.path()).expect("store");
    for key in ["", "../escape", "a/b", ".hidden"] {
        assert!(matches!(store.save_raw(key, b"x"), Err(ConfigError::Other(_))), "{key}");
    }
}

#[test]
fn workspace_prefs_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut prefs = WorkspacePrefs {
        history_limit: 64,
        default_base_address: 0x1400_0000,
        ..WorkspacePrefs::default()
    };
    prefs.remember_source(SavedSource {
        display_name: "dump".to_owned(),
        file_path: "/tmp/dump.bin".to_owned(),
        ..SavedSource::default()
    });

    ConfigService::new(FsConfigStore::at(dir.path()).expect("store")).save_prefs(&prefs);

    let svc = ConfigService::new(FsConfigStore::at(dir.path()).expect("store"));
    assert_eq!(svc.load_prefs(), Some(prefs));
}

#[test]
fn corrupt_prefs_load_as_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsConfigStore::at(dir.path()).expect("store");
    store.save_raw(WORKSPACE_PREFS_KEY, b"[1, 2").expect("save");
    let svc = ConfigService::new(store);
    assert!(svc.load_prefs().is_none());
    assert!(svc.load::<WorkspacePrefs>(WORKSPACE_PREFS_KEY).is_err());
}
