//! Ordered literal substitution rules and content validation.

use anyhow::{Result, bail};
use std::borrow::Cow;

use crate::types::FileCategory;

/// One literal substitution: every occurrence of `find` becomes `replace`.
#[derive(Clone, Debug)]
pub struct Rule {
    pub find: String,
    pub replace: String,
}

/// An ordered set of literal substitutions, applied in insertion order.
///
/// Application is idempotent as long as no rule's target is re-matchable by a
/// source pattern; [`RuleSet::is_idempotent`] is a best-effort check for that.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set from `(find, replace)` pairs. Empty `find` strings are
    /// rejected (they would match everywhere).
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut rules = Vec::new();
        for (find, replace) in pairs {
            if find.is_empty() {
                bail!("substitution rule with empty source pattern");
            }
            rules.push(Rule { find, replace });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Apply every rule in order. Returns `Cow::Borrowed` when nothing matched,
    /// so unchanged content costs no allocation.
    pub fn apply<'a>(&self, content: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(content);
        for rule in &self.rules {
            if out.contains(rule.find.as_str()) {
                out = Cow::Owned(out.replace(rule.find.as_str(), &rule.replace));
            }
        }
        out
    }

    /// Best-effort idempotence check: a second application is a no-op unless
    /// some rule's source occurs in a (possibly earlier) rule's target.
    pub fn is_idempotent(&self) -> bool {
        self.rules.iter().all(|candidate| {
            self.rules
                .iter()
                .all(|other| !other.replace.contains(candidate.find.as_str()))
        })
    }
}

/// Category-appropriate well-formedness check for post-transform content.
/// Returns `Some(message)` when the content looks malformed; advisory only.
pub fn validate_syntax(category: FileCategory, content: &str) -> Option<String> {
    match category {
        FileCategory::Toml => toml::from_str::<toml::Value>(content)
            .err()
            .map(|e| format!("TOML no longer parses after transform: {e}")),
        FileCategory::Json => serde_json::from_str::<serde_json::Value>(content)
            .err()
            .map(|e| format!("JSON no longer parses after transform: {e}")),
        // No dedicated parser in the stack for these; a pairing sniff catches
        // the common breakage (a rule eating a bracket or quote).
        FileCategory::Yaml | FileCategory::Ini | FileCategory::Env | FileCategory::Other => {
            balanced_pairs(content)
        }
    }
}

/// Check that brackets and braces outside quoted strings pair up.
fn balanced_pairs(content: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for c in content.chars() {
        if let Some(q) = quote {
            if c == q && prev != '\\' {
                quote = None;
            }
        } else {
            match c {
                '"' | '\'' => quote = Some(c),
                '{' | '[' => stack.push(c),
                '}' => {
                    if stack.pop() != Some('{') {
                        return Some("unbalanced '}' after transform".to_string());
                    }
                }
                ']' => {
                    if stack.pop() != Some('[') {
                        return Some("unbalanced ']' after transform".to_string());
                    }
                }
                _ => {}
            }
        }
        prev = c;
    }
    match stack.last() {
        Some(open) => Some(format!("unclosed '{open}' after transform")),
        None => None,
    }
}
