//! Statement classification and table name extraction.

use once_cell::sync::Lazy;
use regex::Regex;

/// The kind of data-access operation a statement performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Query,
    Update,
    Delete,
    /// A statement with no fixed verb; the verb is derived from its SQL.
    RawQuery,
}

impl OperationKind {
    /// The verb recorded as `db.method`. Empty for [`OperationKind::RawQuery`].
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Create => "INSERT",
            OperationKind::Query => "SELECT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::RawQuery => "",
        }
    }

    /// Classify a statement by its leading keyword.
    pub fn classify(sql: &str) -> Self {
        match leading_keyword(sql) {
            Some(k) if k.eq_ignore_ascii_case("SELECT") || k.eq_ignore_ascii_case("WITH") => {
                OperationKind::Query
            }
            Some(k) if k.eq_ignore_ascii_case("INSERT") => OperationKind::Create,
            Some(k) if k.eq_ignore_ascii_case("UPDATE") => OperationKind::Update,
            Some(k) if k.eq_ignore_ascii_case("DELETE") => OperationKind::Delete,
            _ => OperationKind::RawQuery,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// First whitespace-delimited token of a statement.
pub fn leading_keyword(sql: &str) -> Option<&str> {
    sql.split_whitespace().next()
}

/// Upper-cased leading keyword, or an empty string for blank SQL.
pub fn derive_verb(sql: &str) -> String {
    leading_keyword(sql)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

// Keyed by leading keyword; capture group 1 is the table name.
static TABLE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let select = r#"(?i)\bFROM\s+[`"\[]?(\w+)[`"\]]?"#;
    [
        ("SELECT", select),
        ("WITH", select),
        ("INSERT", r#"(?i)\bINSERT\s+INTO\s+[`"\[]?(\w+)[`"\]]?"#),
        ("UPDATE", r#"(?i)\bUPDATE\s+[`"\[]?(\w+)[`"\]]?"#),
        ("DELETE", r#"(?i)\bDELETE\s+FROM\s+[`"\[]?(\w+)[`"\]]?"#),
        (
            "CREATE",
            r#"(?i)\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"\[]?(\w+)[`"\]]?"#,
        ),
        ("DROP", r#"(?i)\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?[`"\[]?(\w+)[`"\]]?"#),
        ("ALTER", r#"(?i)\bALTER\s+TABLE\s+[`"\[]?(\w+)[`"\]]?"#),
        ("TRUNCATE", r#"(?i)\bTRUNCATE\s+(?:TABLE\s+)?[`"\[]?(\w+)[`"\]]?"#),
    ]
    .into_iter()
    .map(|(keyword, pattern)| (keyword, Regex::new(pattern).unwrap()))
    .collect()
});

/// Extract the primary table name from a SQL statement, lower-cased.
///
/// Returns `None` if the table cannot be determined.
pub fn extract_table(sql: &str) -> Option<String> {
    let keyword = leading_keyword(sql)?;
    let (_, regex) = TABLE_PATTERNS
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(keyword))?;

    regex
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}
