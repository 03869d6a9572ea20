use retexer::pool::{Task, TaskFailure, TaskOutput, WorkerPool};
use retexer::rules::RuleSet;
use retexer::types::FileCategory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn rules(find: &str, replace: &str) -> Arc<RuleSet> {
    Arc::new(RuleSet::from_pairs(vec![(find.to_string(), replace.to_string())]).unwrap())
}

const GENEROUS: Duration = Duration::from_secs(10);

// --- sizing ---

#[test]
fn test_pool_capped_at_hard_limit() {
    let pool = WorkerPool::new(64);
    assert!(pool.max_workers() <= 8);
    assert!(pool.max_workers() >= 1);
    assert_eq!(pool.stats().max_workers, pool.max_workers());
}

#[test]
fn test_pool_respects_configured_max() {
    let pool = WorkerPool::new(2);
    assert!(pool.max_workers() <= 2);
}

#[test]
fn test_pool_spawns_lazily() {
    let pool = WorkerPool::new(4);
    assert_eq!(pool.stats().total_workers, 0, "no work, no workers");
}

// --- task execution ---

#[test]
fn test_apply_rules_task_transforms() {
    let pool = WorkerPool::new(2);
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("a.toml"),
        content: Arc::from("url = old-host"),
        rules: rules("old-host", "new-host"),
    });
    match pending.wait(GENEROUS) {
        Ok(TaskOutput::Transformed(Some(s))) => assert_eq!(s, "url = new-host"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_apply_rules_task_unchanged() {
    let pool = WorkerPool::new(2);
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("a.toml"),
        content: Arc::from("nothing matches"),
        rules: rules("old-host", "new-host"),
    });
    assert!(matches!(
        pending.wait(GENEROUS),
        Ok(TaskOutput::Transformed(None))
    ));
}

#[test]
fn test_process_file_task_read_failure_is_task_error() {
    let pool = WorkerPool::new(2);
    let pending = pool.submit(Task::ProcessFile {
        path: PathBuf::from("/definitely/not/here.toml"),
        rules: rules("a", "b"),
    });
    assert!(matches!(
        pending.wait(GENEROUS),
        Err(TaskFailure::Failed { .. })
    ));
}

#[test]
fn test_validate_syntax_task_flags_broken_toml() {
    let pool = WorkerPool::new(2);
    let pending = pool.submit(Task::ValidateSyntax {
        path: PathBuf::from("a.toml"),
        category: FileCategory::Toml,
        content: Arc::from("key = = broken"),
    });
    assert!(matches!(
        pending.wait(GENEROUS),
        Ok(TaskOutput::SyntaxWarning(_))
    ));
}

// --- timeout isolation ---

#[test]
fn test_timeout_resolves_as_error_and_pool_survives() {
    let pool = WorkerPool::new(2);

    // A large haystack keeps the worker busy well past a zero timeout.
    let big: String = "replace-me ".repeat(400_000);
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("big.txt"),
        content: Arc::from(big.as_str()),
        rules: rules("replace-me", "with-this"),
    });
    assert!(matches!(
        pending.wait(Duration::ZERO),
        Err(TaskFailure::Timeout { .. })
    ));

    // Sibling work is unaffected and the pool keeps serving tasks.
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("small.txt"),
        content: Arc::from("replace-me"),
        rules: rules("replace-me", "with-this"),
    });
    match pending.wait(GENEROUS) {
        Ok(TaskOutput::Transformed(Some(s))) => assert_eq!(s, "with-this"),
        other => panic!("pool unusable after timeout: {other:?}"),
    }
}

// --- termination ---

#[test]
fn test_terminate_is_idempotent() {
    let pool = WorkerPool::new(2);
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("a"),
        content: Arc::from("x"),
        rules: rules("x", "y"),
    });
    let _ = pending.wait(GENEROUS);
    pool.terminate();
    pool.terminate();
    assert_eq!(pool.stats().total_workers, 0);
}

#[test]
fn test_submit_after_terminate_resolves_terminated() {
    let pool = WorkerPool::new(2);
    pool.terminate();
    let pending = pool.submit(Task::ApplyRules {
        path: PathBuf::from("a"),
        content: Arc::from("x"),
        rules: rules("x", "y"),
    });
    assert!(matches!(
        pending.wait(GENEROUS),
        Err(TaskFailure::PoolTerminated)
    ));
}
