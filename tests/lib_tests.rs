use retexer::pipeline::DiscoverOptions;
use retexer::types::{ProcessingOptions, RunStatus};
use retexer::{RuleSet, retex_dir};
use std::fs;
use std::path::PathBuf;

fn test_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("retexer_lib_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn url_rules() -> RuleSet {
    RuleSet::from_pairs(vec![(
        "http://old.example/repo".to_string(),
        "https://new.example/repo".to_string(),
    )])
    .unwrap()
}

// --- retex_dir (discovery + pipeline in one call) ---

#[test]
fn test_retex_dir_end_to_end() {
    let root = test_root("end_to_end");
    fs::create_dir_all(root.join("svc")).unwrap();
    fs::write(
        root.join("app.toml"),
        "repo = \"http://old.example/repo\"\n",
    )
    .unwrap();
    fs::write(
        root.join("svc/ci.yaml"),
        "url: http://old.example/repo\n",
    )
    .unwrap();
    fs::write(root.join("untouched.json"), "{\"a\": 1}\n").unwrap();

    let result = retex_dir(
        &root,
        &url_rules(),
        &DiscoverOptions::default(),
        &ProcessingOptions::default(),
        None,
    )
    .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.files_processed, 3);
    assert_eq!(result.files_changed, 2);
    assert_eq!(result.backup_paths.len(), 2);
    assert!(
        fs::read_to_string(root.join("app.toml"))
            .unwrap()
            .contains("https://new.example/repo")
    );
    assert_eq!(
        fs::read_to_string(root.join("untouched.json")).unwrap(),
        "{\"a\": 1}\n"
    );
}

#[test]
fn test_retex_dir_empty_tree_completes() {
    let root = test_root("empty");
    let result = retex_dir(
        &root,
        &url_rules(),
        &DiscoverOptions::default(),
        &ProcessingOptions::default(),
        None,
    )
    .unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.files_processed, 0);
}

#[cfg(unix)]
#[test]
fn test_retex_dir_surfaces_skipped_paths_as_warnings() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root("skipped");
    fs::write(root.join("ok.toml"), "x = \"http://old.example/repo\"\n").unwrap();
    let locked = root.join("locked");
    fs::create_dir_all(&locked).unwrap();
    fs::write(locked.join("hidden.toml"), "x = 1\n").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        eprintln!("skip: running with privileges that ignore directory modes");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = retex_dir(
        &root,
        &url_rules(),
        &DiscoverOptions::default(),
        &ProcessingOptions::default(),
        None,
    )
    .unwrap();

    assert_eq!(result.files_processed, 1);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("skipped during discovery"))
    );

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
#[test]
fn test_retex_dir_strict_discovery_error_is_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root("strict");
    fs::write(root.join("ok.toml"), "x = 1\n").unwrap();
    let locked = root.join("locked");
    fs::create_dir_all(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        eprintln!("skip: running with privileges that ignore directory modes");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let outcome = retex_dir(
        &root,
        &url_rules(),
        &DiscoverOptions {
            strict: true,
            ..Default::default()
        },
        &ProcessingOptions::default(),
        None,
    );
    assert!(outcome.is_err());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}
