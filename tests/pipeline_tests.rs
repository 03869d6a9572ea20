use retexer::pipeline::{DiscoverOptions, discover_files, process_files};
use retexer::rules::RuleSet;
use retexer::types::{CancelToken, FileDescriptor, ProcessingOptions, RunStatus};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const OLD_URL: &str = "http://old.example/repo";
const NEW_URL: &str = "https://new.example/repo";

fn test_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("retexer_pipe_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn url_rules() -> RuleSet {
    RuleSet::from_pairs(vec![(OLD_URL.to_string(), NEW_URL.to_string())]).unwrap()
}

fn write_tree(root: &PathBuf, count: usize) {
    for i in 0..count {
        fs::write(
            root.join(format!("f{i:03}.toml")),
            format!("remote = \"{OLD_URL}\"\nindex = {i}\n"),
        )
        .unwrap();
    }
}

fn descriptors(root: &PathBuf) -> Vec<FileDescriptor> {
    discover_files(root, &DiscoverOptions::default()).unwrap().files
}

// --- full-run scenarios ---

#[test]
fn test_hundred_files_all_rewritten() {
    let root = test_root("hundred");
    write_tree(&root, 100);
    let files = descriptors(&root);
    assert_eq!(files.len(), 100);

    let options = ProcessingOptions {
        chunk_size: 10,
        max_parallel_jobs: 4,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.success());
    assert_eq!(result.files_processed, 100);
    assert_eq!(result.files_changed, 100);
    assert!(result.errors.is_empty());
    assert_eq!(result.chunks_run, 10);
    assert_eq!(result.backup_paths.len(), 100);

    for fd in &files {
        let content = fs::read_to_string(&fd.absolute_path).unwrap();
        assert!(content.contains(NEW_URL), "{} not rewritten", fd.relative_path.display());
        assert!(!content.contains(OLD_URL));
    }
}

#[test]
fn test_backups_hold_original_bytes() {
    let root = test_root("backups");
    write_tree(&root, 5);
    let files = descriptors(&root);
    let originals: Vec<(PathBuf, Vec<u8>)> = files
        .iter()
        .map(|fd| (fd.relative_path.clone(), fs::read(&fd.absolute_path).unwrap()))
        .collect();

    let result = process_files(&files, &url_rules(), None, &ProcessingOptions::default()).unwrap();
    assert_eq!(result.backup_paths.len(), 5);

    let backup_root = root.canonicalize().unwrap().join(".retexer_backups");
    for (rel, bytes) in &originals {
        let backed_up = fs::read(backup_root.join(rel)).unwrap();
        assert_eq!(&backed_up, bytes, "backup of {} differs", rel.display());
    }
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_isolated() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root("unreadable");
    write_tree(&root, 20);
    let blocked = root.join("f007.toml");
    fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_to_string(&blocked).is_ok() {
        eprintln!("skip: running with privileges that ignore file modes");
        return;
    }

    let files = descriptors(&root);
    assert_eq!(files.len(), 20, "stat works without read permission");
    let result = process_files(&files, &url_rules(), None, &ProcessingOptions::default()).unwrap();

    assert_eq!(result.status, RunStatus::PartialSuccess);
    assert!(result.partial_success());
    assert!(!result.success());
    assert_eq!(result.files_processed, 19);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, PathBuf::from("f007.toml"));

    fs::set_permissions(&blocked, fs::Permissions::from_mode(0o644)).unwrap();
}

#[test]
fn test_chunk_count_is_ceil_of_files_over_chunk_size() {
    let root = test_root("chunks");
    write_tree(&root, 25);
    let files = descriptors(&root);

    let options = ProcessingOptions {
        chunk_size: 10,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();
    assert_eq!(result.chunks_run, 3);
    assert_eq!(result.files_processed, 25);
}

#[test]
fn test_progress_reported_per_chunk_and_reaches_one() {
    let root = test_root("progress");
    write_tree(&root, 30);
    let files = descriptors(&root);

    let fractions: Mutex<Vec<f64>> = Mutex::new(Vec::new());
    let sink = |fraction: f64, _message: &str| fractions.lock().unwrap().push(fraction);
    let options = ProcessingOptions {
        chunk_size: 10,
        ..Default::default()
    };
    process_files(&files, &url_rules(), Some(&sink), &options).unwrap();

    let fractions = fractions.into_inner().unwrap();
    assert_eq!(fractions.len(), 3, "one report per chunk");
    assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    assert!((fractions.last().unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_empty_file_list_completes_immediately() {
    let result =
        process_files(&[], &url_rules(), None, &ProcessingOptions::default()).unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.files_processed, 0);
    assert_eq!(result.chunks_run, 0);
}

// --- modes ---

#[test]
fn test_dry_run_writes_nothing() {
    let root = test_root("dryrun");
    write_tree(&root, 8);
    let files = descriptors(&root);

    let options = ProcessingOptions {
        dry_run: true,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert!(result.success());
    assert_eq!(result.files_changed, 8, "dry run still reports would-change");
    assert!(result.backup_paths.is_empty());
    assert!(!root.canonicalize().unwrap().join(".retexer_backups").exists());
    for fd in &files {
        assert!(fs::read_to_string(&fd.absolute_path).unwrap().contains(OLD_URL));
    }
}

#[test]
fn test_cancelled_run_stops_at_chunk_boundary() {
    let root = test_root("cancel");
    write_tree(&root, 10);
    let files = descriptors(&root);

    let cancel = CancelToken::new();
    cancel.cancel();
    let options = ProcessingOptions {
        cancel,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert_eq!(result.files_processed, 0);
    assert_eq!(result.chunks_run, 0);
    assert!(result.warnings.iter().any(|w| w.contains("cancelled")));
    for fd in &files {
        assert!(fs::read_to_string(&fd.absolute_path).unwrap().contains(OLD_URL));
    }
}

#[test]
fn test_streaming_path_rewrites_oversized_file() {
    let root = test_root("streaming");
    // Well past the 1 MB streaming threshold.
    let line = format!("endpoint = {OLD_URL} # padding padding padding padding\n");
    fs::write(root.join("huge.conf"), line.repeat(40_000)).unwrap();
    fs::write(root.join("small.toml"), format!("url = \"{OLD_URL}\"\n")).unwrap();
    let files = descriptors(&root);
    assert_eq!(files.len(), 2);

    let options = ProcessingOptions {
        use_streaming: true,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert!(result.success());
    assert_eq!(result.files_changed, 2);
    assert_eq!(result.backup_paths.len(), 2);
    let huge = fs::read_to_string(root.join("huge.conf")).unwrap();
    let new_count = huge.matches(NEW_URL).count();
    let old_count = huge.matches(OLD_URL).count();
    // Matches straddling a chunk boundary stay unrewritten (documented
    // limitation); with ~64 KB chunks that is at most one per boundary.
    assert_eq!(new_count + old_count, 40_000);
    assert!(old_count <= 50, "{old_count} misses is more than chunk boundaries can explain");
    assert!(new_count >= 39_900);
}

#[test]
fn test_worker_pool_path_matches_inline_result() {
    let root = test_root("pooled");
    // One file above the 50 KB pool threshold, several below.
    let big_line = format!("host = {OLD_URL} # {}\n", "x".repeat(80));
    fs::write(root.join("big.conf"), big_line.repeat(1000)).unwrap();
    write_tree(&root, 4);
    let files = descriptors(&root);

    let options = ProcessingOptions {
        enable_worker_threads: true,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert!(result.success());
    assert_eq!(result.files_changed, 5);
    assert!(!fs::read_to_string(root.join("big.conf")).unwrap().contains(OLD_URL));
}

#[test]
fn test_worker_pool_reads_on_worker_when_cache_disabled() {
    let root = test_root("pooled_nocache");
    let big_line = format!("host = {OLD_URL} # {}\n", "y".repeat(80));
    fs::write(root.join("big.conf"), big_line.repeat(1000)).unwrap();
    let files = descriptors(&root);

    let options = ProcessingOptions {
        enable_worker_threads: true,
        enable_caching: false,
        ..Default::default()
    };
    let result = process_files(&files, &url_rules(), None, &options).unwrap();

    assert!(result.success());
    assert_eq!(result.files_changed, 1);
    assert_eq!(result.cache_hits + result.cache_misses, 0, "cache stays cold");
    assert!(!fs::read_to_string(root.join("big.conf")).unwrap().contains(OLD_URL));
}

#[test]
fn test_validate_mode_warns_on_broken_output() {
    let root = test_root("validate");
    fs::write(root.join("cfg.toml"), "url = \"http://old.example/repo\"\n").unwrap();
    let files = descriptors(&root);

    // The replacement eats the closing quote, leaving invalid TOML.
    let rules = RuleSet::from_pairs(vec![(
        "\"http://old.example/repo\"".to_string(),
        "https://new.example/repo\"".to_string(),
    )])
    .unwrap();
    let options = ProcessingOptions {
        validate: true,
        ..Default::default()
    };
    let result = process_files(&files, &rules, None, &options).unwrap();

    assert!(result.success());
    assert!(
        result.warnings.iter().any(|w| w.contains("cfg.toml")),
        "expected a validation warning, got {:?}",
        result.warnings
    );
}

// --- second run / caching ---

#[test]
fn test_second_run_is_idempotent() {
    let root = test_root("idem");
    write_tree(&root, 6);
    let first = process_files(
        &descriptors(&root),
        &url_rules(),
        None,
        &ProcessingOptions::default(),
    )
    .unwrap();
    assert_eq!(first.files_changed, 6);

    // Re-discover so descriptors carry the post-write mtimes.
    let second = process_files(
        &descriptors(&root),
        &url_rules(),
        None,
        &ProcessingOptions::default(),
    )
    .unwrap();
    assert!(second.success());
    assert_eq!(second.files_changed, 0, "already-transformed content is stable");
    assert!(second.backup_paths.is_empty());
}
