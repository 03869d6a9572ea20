use retexer::rules::{RuleSet, validate_syntax};
use retexer::types::FileCategory;
use std::borrow::Cow;

fn rules(pairs: &[(&str, &str)]) -> RuleSet {
    RuleSet::from_pairs(
        pairs
            .iter()
            .map(|(f, r)| (f.to_string(), r.to_string())),
    )
    .unwrap()
}

// --- apply ---

#[test]
fn test_apply_single_rule_all_occurrences() {
    let rs = rules(&[("http://old.example/repo", "https://new.example/repo")]);
    let out = rs.apply("a http://old.example/repo b http://old.example/repo");
    assert_eq!(out, "a https://new.example/repo b https://new.example/repo");
}

#[test]
fn test_apply_no_match_borrows() {
    let rs = rules(&[("needle", "thread")]);
    let content = "nothing to see here";
    match rs.apply(content) {
        Cow::Borrowed(s) => assert_eq!(s, content),
        Cow::Owned(_) => panic!("unchanged content should not allocate"),
    }
}

#[test]
fn test_apply_rules_in_order() {
    // Second rule sees the first rule's output.
    let rs = rules(&[("a", "b"), ("b", "c")]);
    assert_eq!(rs.apply("a"), "c");
}

#[test]
fn test_apply_empty_ruleset_is_noop() {
    let rs = RuleSet::default();
    assert!(matches!(rs.apply("anything"), Cow::Borrowed(_)));
}

#[test]
fn test_empty_find_rejected() {
    assert!(RuleSet::from_pairs(vec![(String::new(), "x".to_string())]).is_err());
}

// --- idempotence ---

#[test]
fn test_apply_twice_is_stable() {
    let rs = rules(&[("http://old.example/repo", "https://new.example/repo")]);
    let once = rs.apply("url = http://old.example/repo").into_owned();
    let twice = rs.apply(&once).into_owned();
    assert_eq!(once, twice);
}

#[test]
fn test_is_idempotent_for_stable_targets() {
    let rs = rules(&[("http://old.example", "https://new.example")]);
    assert!(rs.is_idempotent());
}

#[test]
fn test_is_idempotent_detects_rematchable_target() {
    // The target contains the source; every run grows the string.
    let rs = rules(&[("v1", "v1.2")]);
    assert!(!rs.is_idempotent());
}

// --- validate_syntax ---

#[test]
fn test_validate_toml_ok() {
    assert!(validate_syntax(FileCategory::Toml, "key = \"value\"\n").is_none());
}

#[test]
fn test_validate_toml_broken() {
    assert!(validate_syntax(FileCategory::Toml, "key = = broken").is_some());
}

#[test]
fn test_validate_json_ok() {
    assert!(validate_syntax(FileCategory::Json, "{\"a\": [1, 2]}").is_none());
}

#[test]
fn test_validate_json_broken() {
    assert!(validate_syntax(FileCategory::Json, "{\"a\": [1, 2}").is_some());
}

#[test]
fn test_validate_other_unbalanced_bracket() {
    assert!(validate_syntax(FileCategory::Other, "list = [1, 2\n").is_some());
}

#[test]
fn test_validate_other_balanced() {
    assert!(validate_syntax(FileCategory::Other, "list = [1, {2}]\n").is_none());
}
