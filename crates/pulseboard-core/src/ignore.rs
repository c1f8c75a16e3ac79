//! Exclusion rules for dimension values (internal traffic, test campaigns,
//! junk referrers).

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[default]
    Literal,
    /// `%` and `*` match any run of characters; everything else is literal.
    Glob,
    Regex,
}

impl RuleKind {
    /// Stored rules carry two flags; regex wins over glob.
    pub fn from_flags(is_regex: bool, is_glob: bool) -> Self {
        if is_regex {
            RuleKind::Regex
        } else if is_glob {
            RuleKind::Glob
        } else {
            RuleKind::Literal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub id: String,
    pub pattern: String,
    pub kind: RuleKind,
    pub note: Option<String>,
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut literal = String::new();
    for ch in pattern.chars() {
        if ch == '%' || ch == '*' {
            out.push_str(&regex::escape(&literal));
            literal.clear();
            out.push_str(".*");
        } else {
            literal.push(ch);
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

#[derive(Debug, Clone)]
enum CompiledRule {
    Literal(String),
    Pattern(Regex),
}

/// Compile a single rule. `None` for a regex that does not compile.
fn compile_rule(rule: &IgnoreRule) -> Option<CompiledRule> {
    match rule.kind {
        RuleKind::Literal => Some(CompiledRule::Literal(rule.pattern.clone())),
        RuleKind::Glob => Regex::new(&glob_to_regex(&rule.pattern))
            .ok()
            .map(CompiledRule::Pattern),
        RuleKind::Regex => Regex::new(&rule.pattern).ok().map(CompiledRule::Pattern),
    }
}

/// Whether a rule would participate in matching.
pub fn is_valid_rule(rule: &IgnoreRule) -> bool {
    compile_rule(rule).is_some()
}

/// A rule list compiled once per refresh.
///
/// Rules whose pattern does not compile are dropped with a warning: they
/// match nothing, so the value stays visible.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<CompiledRule>,
}

impl IgnoreMatcher {
    pub fn compile(rules: &[IgnoreRule]) -> Self {
        let compiled = rules
            .iter()
            .filter_map(|rule| {
                let compiled = compile_rule(rule);
                if compiled.is_none() {
                    warn!(rule_id = %rule.id, pattern = %rule.pattern, "Ignore rule does not compile; treating as non-matching");
                }
                compiled
            })
            .collect();
        Self { rules: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_ignored(&self, value: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            CompiledRule::Literal(lit) => lit == value,
            CompiledRule::Pattern(re) => re.is_match(value),
        })
    }
}

/// One-shot form of [`IgnoreMatcher::is_ignored`]. Prefer compiling once
/// when checking many values.
pub fn is_ignored(value: &str, rules: &[IgnoreRule]) -> bool {
    IgnoreMatcher::compile(rules).is_ignored(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, kind: RuleKind) -> IgnoreRule {
        IgnoreRule {
            id: format!("rule_{pattern}"),
            pattern: pattern.to_string(),
            kind,
            note: None,
        }
    }

    #[test]
    fn literal_requires_exact_match() {
        let rules = vec![rule("internal", RuleKind::Literal)];
        assert!(is_ignored("internal", &rules));
        assert!(!is_ignored("internal-tools", &rules));
        assert!(!is_ignored("Internal", &rules));
    }

    #[test]
    fn glob_wildcards_and_escaping() {
        let rules = vec![rule("test_%", RuleKind::Glob), rule("*.local", RuleKind::Glob)];
        assert!(is_ignored("test_campaign", &rules));
        assert!(is_ignored("dev.local", &rules));
        assert!(!is_ignored("devXlocal", &rules));
        assert!(!is_ignored("my test_campaign", &rules));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let rules = vec![rule("(paid)+*", RuleKind::Glob)];
        assert!(is_ignored("(paid)+search", &rules));
        assert!(!is_ignored("paidpaid", &rules));
    }

    #[test]
    fn only_compiled_rules_count() {
        assert!(IgnoreMatcher::default().is_empty());
        assert!(IgnoreMatcher::compile(&[rule("[unclosed", RuleKind::Regex)]).is_empty());
        assert!(!IgnoreMatcher::compile(&[rule("spam", RuleKind::Literal)]).is_empty());
    }

    #[test]
    fn regex_used_as_is() {
        let rules = vec![rule("^utm_(test|qa)$", RuleKind::Regex)];
        assert!(is_ignored("utm_qa", &rules));
        assert!(!is_ignored("utm_prod", &rules));
    }

    #[test]
    fn malformed_regex_fails_open() {
        let rules = vec![
            rule("[unclosed", RuleKind::Regex),
            rule("spam", RuleKind::Literal),
        ];
        let matcher = IgnoreMatcher::compile(&rules);
        assert!(!matcher.is_ignored("[unclosed"));
        assert!(!matcher.is_ignored("google"));
        assert!(matcher.is_ignored("spam"));
        assert!(!is_valid_rule(&rules[0]));
        assert!(is_valid_rule(&rules[1]));
    }

    #[test]
    fn flags_map_to_kind() {
        assert_eq!(RuleKind::from_flags(true, true), RuleKind::Regex);
        assert_eq!(RuleKind::from_flags(false, true), RuleKind::Glob);
        assert_eq!(RuleKind::from_flags(false, false), RuleKind::Literal);
    }
}
