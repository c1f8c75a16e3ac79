use anyhow::Result;

use pulseboard_core::ignore::{IgnoreRule, RuleKind};

use crate::DuckDbBackend;

/// All stored ignore rules, oldest first.
///
/// Invalid patterns are returned as stored; the matcher drops them at
/// compile time.
pub async fn list_ignore_rules_inner(db: &DuckDbBackend) -> Result<Vec<IgnoreRule>> {
    let conn = db.conn.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, pattern, is_regex, is_glob, note \
         FROM ignore_rules \
         ORDER BY created_at ASC, id ASC",
    )?;
    let rules = stmt
        .query_map([], |row| {
            let is_regex: bool = row.get(2)?;
            let is_glob: bool = row.get(3)?;
            Ok(IgnoreRule {
                id: row.get(0)?,
                pattern: row.get(1)?,
                kind: RuleKind::from_flags(is_regex, is_glob),
                note: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

/// Store a rule. Used by fixtures and dev seeding.
pub async fn insert_ignore_rule_inner(db: &DuckDbBackend, rule: &IgnoreRule) -> Result<()> {
    let conn = db.conn.lock().await;
    conn.execute(
        "INSERT INTO ignore_rules (id, pattern, is_regex, is_glob, note) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        duckdb::params![
            rule.id,
            rule.pattern,
            rule.kind == RuleKind::Regex,
            rule.kind == RuleKind::Glob,
            rule.note,
        ],
    )?;
    Ok(())
}
