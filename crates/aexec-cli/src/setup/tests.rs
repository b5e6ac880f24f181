use std::path::Path;

use aexec_common::config::types::FilterConfig;

use super::*;
use crate::fs::OsFs;
use crate::fs::memory::MemoryFs;

const ROOT: &str = "/project";

fn layout() -> ProjectLayout {
    ProjectLayout::new(ROOT)
}

/// Build a project tree matching the three existence flags.
fn project(folder: bool, anon: bool, config: bool) -> MemoryFs {
    let layout = layout();
    let mut fs = MemoryFs::new().with_dir(ROOT);
    if folder {
        fs = fs.with_dir(layout.anon_dir());
        if anon {
            fs = fs.with_file(layout.anon_file(), "System.debug('mine');");
        }
        if config {
            fs = fs.with_file(layout.config_file(), r#"{"filterKeys": ["MINE"]}"#);
        }
    }
    fs
}

// --- classify ---

#[test]
fn classify_covers_all_eight_combinations() {
    use SetupState::{AnonOnly, ConfigOnly, Empty, NoFile, Valid};
    let table = [
        ((false, false, false), Empty),
        ((false, false, true), Empty),
        ((false, true, false), Empty),
        ((false, true, true), Empty),
        ((true, false, false), NoFile),
        ((true, false, true), ConfigOnly),
        ((true, true, false), AnonOnly),
        ((true, true, true), Valid),
    ];
    for ((folder, anon, config), expected) in table {
        assert_eq!(
            SetupState::classify(folder, anon, config),
            expected,
            "folder={folder} anon={anon} config={config}"
        );
    }
}

// --- resolve ---

#[test]
fn resolver_matches_classify_for_every_layout() {
    for folder in [false, true] {
        for anon in [false, true] {
            for config in [false, true] {
                let fs = project(folder, anon, config);
                let state = resolve_setup_state(&fs, &layout()).unwrap();
                let expected = if folder {
                    SetupState::classify(true, anon, config)
                } else {
                    SetupState::Empty
                };
                assert_eq!(state, expected, "folder={folder} anon={anon} config={config}");
            }
        }
    }
}

#[test]
fn anonymous_file_is_not_the_folder() {
    let fs = MemoryFs::new().with_file(Path::new(ROOT).join("anonymous"), "not a dir");
    assert_eq!(
        resolve_setup_state(&fs, &layout()).unwrap(),
        SetupState::Empty
    );
}

#[test]
fn unrelated_files_are_ignored() {
    let layout = layout();
    let fs = project(true, true, true)
        .with_file(layout.log_file(), "old log")
        .with_file(Path::new(ROOT).join("sfdx-project.json"), "{}");
    assert_eq!(resolve_setup_state(&fs, &layout).unwrap(), SetupState::Valid);
}

#[test]
fn missing_root_is_file_system_error() {
    let fs = MemoryFs::new();
    let err = resolve_setup_state(&fs, &layout()).unwrap_err();
    match err {
        Error::FileSystem { path, .. } => assert_eq!(path, Path::new(ROOT)),
        other => panic!("expected FileSystem error, got {other:?}"),
    }
}

#[test]
fn inventory_counts_any_entry_kind() {
    let layout = layout();
    let fs = MemoryFs::new()
        .with_dir(layout.anon_file())
        .with_file(layout.config_file(), "{}");
    let inventory = inspect_project(&fs, &layout).unwrap();
    assert_eq!(
        inventory,
        ProjectInventory {
            folder: true,
            anon: true,
            config: true,
            log: false,
        }
    );
    assert_eq!(inventory.state(), SetupState::Valid);
    assert_eq!(resolve_setup_state(&fs, &layout).unwrap(), inventory.state());
}

#[test]
fn inventory_without_folder_is_empty() {
    let fs = project(false, false, false);
    let inventory = inspect_project(&fs, &layout()).unwrap();
    assert_eq!(inventory, ProjectInventory::default());
    assert_eq!(inventory.state(), SetupState::Empty);
}

// --- apply ---

#[test]
fn apply_creates_exactly_what_each_state_lacks() {
    let cases = [
        ((false, false, false), true, true),
        ((true, false, false), true, true),
        ((true, true, false), false, true),
        ((true, false, true), true, false),
        ((true, true, true), false, false),
    ];
    for ((folder, anon, config), expect_anon, expect_config) in cases {
        let fs = project(folder, anon, config);
        let layout = layout();
        let state = resolve_setup_state(&fs, &layout).unwrap();
        let outcome = apply_setup(&fs, &layout, state).unwrap();

        let mut expected = Vec::new();
        if expect_anon {
            expected.push(layout.anon_file());
        }
        if expect_config {
            expected.push(layout.config_file());
        }
        assert_eq!(outcome.created, expected, "state {state}");
        assert_eq!(outcome.state, state);
    }
}

#[test]
fn every_state_converges_to_valid_and_then_stays_put() {
    for folder in [false, true] {
        for anon in [false, true] {
            for config in [false, true] {
                let fs = project(folder, anon, config);
                let layout = layout();

                do_setup(&fs, &layout).unwrap();
                assert_eq!(
                    resolve_setup_state(&fs, &layout).unwrap(),
                    SetupState::Valid
                );

                let before = fs.snapshot();
                let second = do_setup(&fs, &layout).unwrap();
                assert_eq!(second.state, SetupState::Valid);
                assert!(second.created.is_empty());
                assert_eq!(fs.snapshot(), before);
            }
        }
    }
}

#[test]
fn existing_files_are_never_overwritten() {
    let fs = project(true, true, false);
    let layout = layout();
    do_setup(&fs, &layout).unwrap();

    assert_eq!(
        fs.file(layout.anon_file()).as_deref(),
        Some("System.debug('mine');")
    );
    assert_eq!(
        fs.file(layout.config_file()).as_deref(),
        Some(DEFAULT_CONFIG_JSON)
    );
}

#[test]
fn file_appearing_after_resolve_is_left_alone() {
    let layout = layout();
    let fs = project(true, false, false);
    let state = resolve_setup_state(&fs, &layout).unwrap();
    assert_eq!(state, SetupState::NoFile);

    // another writer wins the race
    fs.create_new(&layout.anon_file(), "// raced").unwrap();

    let outcome = apply_setup(&fs, &layout, state).unwrap();
    assert_eq!(outcome.created, vec![layout.config_file()]);
    assert_eq!(fs.file(layout.anon_file()).as_deref(), Some("// raced"));
    assert_eq!(outcome.message(), SetupState::NoFile.message());
}

#[test]
fn partial_failure_is_not_rolled_back_and_retry_completes() {
    let layout = layout();
    let fs = project(false, false, false);
    fs.fail_writes_to(layout.config_file());

    let err = do_setup(&fs, &layout).unwrap_err();
    assert!(matches!(err, Error::FileSystem { .. }));
    assert!(fs.exists(layout.anon_file()));
    assert_eq!(
        resolve_setup_state(&fs, &layout).unwrap(),
        SetupState::AnonOnly
    );

    let fs = MemoryFs::new()
        .with_dir(ROOT)
        .with_file(layout.anon_file(), &fs.file(layout.anon_file()).unwrap());
    let outcome = do_setup(&fs, &layout).unwrap();
    assert_eq!(outcome.state, SetupState::AnonOnly);
    assert_eq!(outcome.created, vec![layout.config_file()]);
}

// --- content ---

#[test]
fn default_config_parses_to_default_keys() {
    let cfg = FilterConfig::from_json(DEFAULT_CONFIG_JSON).unwrap();
    assert_eq!(cfg.filter_keys, vec!["USER_DEBUG", "ERROR"]);
}

#[test]
fn anon_template_is_a_single_comment_line() {
    assert!(ANON_TEMPLATE.starts_with("//"));
    assert!(!ANON_TEMPLATE.contains('\n'));
}

#[test]
fn messages_are_distinct_per_state() {
    use std::collections::HashSet;
    let states = [
        SetupState::Valid,
        SetupState::NoFile,
        SetupState::Empty,
        SetupState::AnonOnly,
        SetupState::ConfigOnly,
    ];
    let messages: HashSet<_> = states.iter().map(|s| s.message()).collect();
    assert_eq!(messages.len(), 5);
    assert_eq!(
        SetupState::Empty.message(),
        "A folder \"anonymous\" has been created with all files."
    );
    assert_eq!(
        SetupState::Valid.message(),
        "File system is already set up properly, no changes made."
    );
}

// --- real filesystem ---

#[test]
fn setup_on_disk_from_empty_project() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(tmp.path());

    let outcome = do_setup(&OsFs, &layout).unwrap();
    assert_eq!(outcome.state, SetupState::Empty);
    assert_eq!(
        std::fs::read_to_string(layout.anon_file()).unwrap(),
        ANON_TEMPLATE
    );
    assert_eq!(
        std::fs::read_to_string(layout.config_file()).unwrap(),
        DEFAULT_CONFIG_JSON
    );

    let again = do_setup(&OsFs, &layout).unwrap();
    assert_eq!(again.state, SetupState::Valid);
    assert!(again.created.is_empty());
}

#[test]
fn anonymous_as_file_on_disk_fails_setup() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("anonymous"), "oops").unwrap();
    let layout = ProjectLayout::new(tmp.path());

    assert_eq!(
        resolve_setup_state(&OsFs, &layout).unwrap(),
        SetupState::Empty
    );
    let err = do_setup(&OsFs, &layout).unwrap_err();
    assert!(matches!(err, Error::FileSystem { .. }));
}
