// src/answer/guard.rs

//! SQL guard for LLM-generated analytics queries.
//!
//! Only single-statement SELECTs survive, and every query leaves with a
//! `tenant_id = <caller>` predicate - injected when the model forgot it.
//! Second line of defense behind the read-only replica.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{HivemindError, Result};

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "UPSERT", "GRANT", "REVOKE", "EXEC", "EXECUTE", "CALL", "SET", "LOCK", "UNLOCK",
];

static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i);\s*(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER)",
        r"(?m)--.*$",
        r"(?s)/\*.*?\*/",
        r"(?i)UNION\s+ALL\s+SELECT",
        r"(?i)INTO\s+OUTFILE",
        r"(?i)INTO\s+DUMPFILE",
        r"(?i)LOAD_FILE",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

static FORBIDDEN_WORD: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"\b{kw}\b")).expect("valid pattern")))
        .collect()
});

/// Validate that `sql` is a single safe SELECT. Returns the normalized
/// statement without a trailing semicolon.
pub fn validate_select(sql: &str) -> Result<String> {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(HivemindError::Validation("empty SQL query".to_string()));
    }

    let upper = normalized.to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(HivemindError::Security(format!(
            "query must start with SELECT, got: {}",
            crate::util::truncate_chars(&normalized, 50)
        )));
    }

    for (keyword, pattern) in FORBIDDEN_WORD.iter() {
        if pattern.is_match(&upper) {
            return Err(HivemindError::Security(format!(
                "forbidden keyword detected: {keyword}"
            )));
        }
    }

    for pattern in INJECTION_PATTERNS.iter() {
        if pattern.is_match(&normalized) {
            return Err(HivemindError::Security(
                "SQL injection pattern detected".to_string(),
            ));
        }
    }

    // More than one non-empty statement is refused outright.
    let statements: Vec<&str> = normalized
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if statements.len() > 1 {
        return Err(HivemindError::Security(
            "multiple SQL statements not allowed".to_string(),
        ));
    }

    Ok(normalized.trim_end_matches(';').trim().to_string())
}

/// Validate and guarantee a `tenant_id = <tenant>` predicate.
///
/// Injection order: into an existing WHERE as the first conjunct, else a new
/// WHERE before the first of GROUP BY / ORDER BY / HAVING / LIMIT, else
/// appended.
pub fn enforce_tenant_filter(sql: &str, tenant_id: i64) -> Result<String> {
    let sanitized = validate_select(sql)?;
    let upper = sanitized.to_uppercase();

    let tenant_pattern = Regex::new(&format!(r"(?i)\btenant_id\s*=\s*{tenant_id}\b"))
        .expect("valid pattern");
    if tenant_pattern.is_match(&sanitized) {
        return Ok(sanitized);
    }

    if let Some(where_idx) = upper.find("WHERE") {
        let insert_at = where_idx + "WHERE".len();
        let (before, after) = sanitized.split_at(insert_at);
        return Ok(format!("{before} tenant_id = {tenant_id} AND{after}"));
    }

    let mut insert_before: Option<usize> = None;
    for clause in ["GROUP BY", "ORDER BY", "HAVING", "LIMIT"] {
        if let Some(idx) = upper.find(clause) {
            insert_before = Some(insert_before.map_or(idx, |existing| existing.min(idx)));
        }
    }

    match insert_before {
        Some(idx) => {
            let before = sanitized[..idx].trim_end();
            let after = &sanitized[idx..];
            Ok(format!("{before} WHERE tenant_id = {tenant_id} {after}"))
        }
        None => Ok(format!("{sanitized} WHERE tenant_id = {tenant_id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_passes() {
        let sql = validate_select("SELECT COUNT(*) FROM messages;").unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM messages");
    }

    #[test]
    fn mutations_are_refused() {
        for sql in [
            "DELETE FROM messages",
            "DROP TABLE messages",
            "INSERT INTO messages VALUES (1)",
            "UPDATE messages SET content = 'x'",
        ] {
            let err = validate_select(sql).unwrap_err();
            assert!(matches!(err, HivemindError::Security(_)), "{sql}");
        }
    }

    #[test]
    fn forbidden_keyword_inside_select_is_refused() {
        let err = validate_select("SELECT * FROM messages; DROP TABLE messages").unwrap_err();
        assert!(matches!(err, HivemindError::Security(_)));
    }

    #[test]
    fn comments_and_union_injection_are_refused() {
        for sql in [
            "SELECT * FROM messages -- sneaky",
            "SELECT * FROM messages /* hidden */",
            "SELECT id FROM messages UNION ALL SELECT key FROM secrets",
            "SELECT LOAD_FILE('/etc/passwd')",
        ] {
            assert!(validate_select(sql).is_err(), "{sql}");
        }
    }

    #[test]
    fn multi_statement_is_refused() {
        let err = validate_select("SELECT 1; SELECT 2").unwrap_err();
        assert!(matches!(err, HivemindError::Security(_)));
    }

    #[test]
    fn empty_and_whitespace_are_validation_errors() {
        assert!(matches!(
            validate_select("").unwrap_err(),
            HivemindError::Validation(_)
        ));
        assert!(matches!(
            validate_select("   ").unwrap_err(),
            HivemindError::Validation(_)
        ));
    }

    #[test]
    fn tenant_filter_injected_into_existing_where() {
        let sql = enforce_tenant_filter(
            "SELECT COUNT(*) FROM messages WHERE deleted = 0",
            42,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM messages WHERE tenant_id = 42 AND deleted = 0"
        );
    }

    #[test]
    fn tenant_filter_injected_before_group_by() {
        let sql = enforce_tenant_filter(
            "SELECT author_id, COUNT(*) FROM messages GROUP BY author_id ORDER BY COUNT(*) DESC",
            7,
        )
        .unwrap();
        assert!(sql.contains("WHERE tenant_id = 7 GROUP BY"));
    }

    #[test]
    fn tenant_filter_appended_when_no_clauses() {
        let sql = enforce_tenant_filter("SELECT COUNT(*) FROM messages", 7).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM messages WHERE tenant_id = 7");
    }

    #[test]
    fn existing_tenant_filter_is_untouched() {
        let input = "SELECT COUNT(*) FROM messages WHERE tenant_id = 7 AND deleted = 0";
        let sql = enforce_tenant_filter(input, 7).unwrap();
        assert_eq!(sql, input);
    }

    #[test]
    fn foreign_tenant_filter_still_gets_caller_injected() {
        let sql =
            enforce_tenant_filter("SELECT COUNT(*) FROM messages WHERE tenant_id = 999", 7)
                .unwrap();
        assert!(sql.contains("tenant_id = 7 AND tenant_id = 999"));
    }

    #[test]
    fn limit_clause_gets_where_before_it() {
        let sql = enforce_tenant_filter("SELECT id FROM messages LIMIT 10", 3).unwrap();
        assert_eq!(sql, "SELECT id FROM messages WHERE tenant_id = 3 LIMIT 10");
    }
}
