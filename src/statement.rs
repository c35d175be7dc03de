//! Reconstruction of a literal SQL statement from a parameterized template.
//!
//! The output is meant for spans and logs, never for execution: values are
//! embedded without escaping.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sea_orm::DbBackend;

use crate::value::SqlValue;

static NUMBERED_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

// Quoted literals are matched whole so a `?` inside one is never a placeholder.
static POSITIONAL_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'|\?").unwrap());

/// How placeholders are written in a query template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (PostgreSQL)
    #[default]
    Numbered,
    /// Bare `?`, bound in order of appearance (MySQL, SQLite)
    Positional,
}

impl PlaceholderStyle {
    /// The placeholder style SeaORM emits for a backend.
    pub fn for_backend(backend: DbBackend) -> Self {
        match backend {
            DbBackend::Postgres => PlaceholderStyle::Numbered,
            DbBackend::MySql | DbBackend::Sqlite => PlaceholderStyle::Positional,
        }
    }
}

/// Placeholder and argument counts disagree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("statement has {placeholders} placeholders but {arguments} arguments were bound")]
    ArityMismatch { placeholders: usize, arguments: usize },

    #[error("placeholder ${missing} is never used")]
    PlaceholderGap { missing: usize },
}

/// Substitute every `$n` placeholder in `sql` with the literal form of `args[n - 1]`.
///
/// The substitution is a single pass, so a value containing `$2` is never
/// substituted again. Placeholders without a matching argument are left as-is
/// and surplus arguments are ignored.
pub fn render(sql: &str, args: &[SqlValue]) -> String {
    render_with(PlaceholderStyle::Numbered, sql, args)
}

/// Like [`render`], for an explicit placeholder style.
pub fn render_with(style: PlaceholderStyle, sql: &str, args: &[SqlValue]) -> String {
    if args.is_empty() {
        return sql.to_string();
    }

    let literals: Vec<String> = args.iter().map(SqlValue::to_literal).collect();

    let rendered = match style {
        PlaceholderStyle::Numbered => {
            NUMBERED_PLACEHOLDER.replace_all(sql, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| literals.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
        }
        PlaceholderStyle::Positional => {
            let mut next = literals.iter();
            POSITIONAL_PLACEHOLDER.replace_all(sql, |caps: &Captures<'_>| {
                if &caps[0] != "?" {
                    return caps[0].to_string();
                }
                next.next().cloned().unwrap_or_else(|| caps[0].to_string())
            })
        }
    };

    rendered.into_owned()
}

/// Verify that the placeholders of `sql` match `args` one-to-one.
///
/// For numbered placeholders this also rejects gaps such as `$1, $3`.
pub fn check_arity(
    style: PlaceholderStyle,
    sql: &str,
    args: &[SqlValue],
) -> Result<(), RenderError> {
    let placeholders = match style {
        PlaceholderStyle::Numbered => {
            let used: BTreeSet<usize> = NUMBERED_PLACEHOLDER
                .captures_iter(sql)
                .filter_map(|caps| caps[1].parse().ok())
                .collect();

            let highest = used.last().copied().unwrap_or(0);
            if let Some(missing) = (1..=highest).find(|n| !used.contains(n)) {
                return Err(RenderError::PlaceholderGap { missing });
            }
            used.len()
        }
        PlaceholderStyle::Positional => POSITIONAL_PLACEHOLDER
            .find_iter(sql)
            .filter(|m| m.as_str() == "?")
            .count(),
    };

    if placeholders != args.len() {
        return Err(RenderError::ArityMismatch {
            placeholders,
            arguments: args.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Nullable;

    #[test]
    fn test_render_mixed_arguments() {
        let sql = "SELECT * FROM t WHERE id = $1 AND name = $2";
        let args = [SqlValue::from(5), SqlValue::from("ann")];
        assert_eq!(render(sql, &args), "SELECT * FROM t WHERE id = 5 AND name = 'ann'");
    }

    #[test]
    fn test_render_without_arguments_is_unchanged() {
        let sql = "SELECT * FROM t WHERE id = $1";
        assert_eq!(render(sql, &[]), sql);
    }

    #[test]
    fn test_render_leaves_no_placeholders() {
        let sql = "INSERT INTO t (a, b, c) VALUES ($1, $2, $3)";
        let args = [SqlValue::from(1), SqlValue::from(Some("x")), SqlValue::from(None::<i64>)];
        let rendered = render(sql, &args);
        assert_eq!(rendered, "INSERT INTO t (a, b, c) VALUES (1, 'x', NULL)");
        assert!(!NUMBERED_PLACEHOLDER.is_match(&rendered));
    }

    #[test]
    fn test_render_is_single_pass() {
        let sql = "UPDATE t SET a = $1, b = $2";
        let args = [SqlValue::from("$2"), SqlValue::from(7)];
        assert_eq!(render(sql, &args), "UPDATE t SET a = '$2', b = 7");
    }

    #[test]
    fn test_render_two_digit_placeholders() {
        let sql = (1..=11).map(|i| format!("${}", i)).collect::<Vec<_>>().join(",");
        let args: Vec<SqlValue> = (1..=11).map(|i| SqlValue::from(i * 100)).collect();
        assert_eq!(
            render(&sql, &args),
            "100,200,300,400,500,600,700,800,900,1000,1100"
        );
    }

    #[test]
    fn test_render_tolerates_mismatched_counts() {
        let sql = "SELECT $1, $2, $3";
        assert_eq!(render(sql, &[SqlValue::from(1)]), "SELECT 1, $2, $3");

        let args = [SqlValue::from(1), SqlValue::from(2), SqlValue::from(3)];
        assert_eq!(render("SELECT $1", &args), "SELECT 1");
        assert_eq!(render("SELECT $0", &args), "SELECT $0");
    }

    #[test]
    fn test_render_invalid_nullable() {
        let sql = "UPDATE t SET a = $1, b = $2";
        let args = [
            SqlValue::from("O'Reilly"),
            SqlValue::Nullable(Nullable::Time(None)),
        ];
        assert_eq!(render(sql, &args), "UPDATE t SET a = 'O'Reilly', b = NULL");
    }

    #[test]
    fn test_render_positional() {
        let sql = "SELECT * FROM t WHERE id = ? AND name = ? AND x = ?";
        let args = [SqlValue::from(1), SqlValue::from("a?")];
        assert_eq!(
            render_with(PlaceholderStyle::Positional, sql, &args),
            "SELECT * FROM t WHERE id = 1 AND name = 'a?' AND x = ?"
        );
    }

    #[test]
    fn test_positional_skips_quoted_question_marks() {
        let sql = "SELECT * FROM t WHERE note = '?' AND id = ?";
        let args = [SqlValue::from(7)];
        assert_eq!(
            render_with(PlaceholderStyle::Positional, sql, &args),
            "SELECT * FROM t WHERE note = '?' AND id = 7"
        );
        assert_eq!(check_arity(PlaceholderStyle::Positional, sql, &args), Ok(()));
    }

    #[test]
    fn test_style_for_backend() {
        assert_eq!(PlaceholderStyle::for_backend(DbBackend::Postgres), PlaceholderStyle::Numbered);
        assert_eq!(PlaceholderStyle::for_backend(DbBackend::MySql), PlaceholderStyle::Positional);
        assert_eq!(PlaceholderStyle::for_backend(DbBackend::Sqlite), PlaceholderStyle::Positional);
    }

    #[test]
    fn test_check_arity() {
        let args = [SqlValue::from(1), SqlValue::from(2)];
        let numbered = PlaceholderStyle::Numbered;

        assert_eq!(check_arity(numbered, "SELECT $1, $2, $1", &args), Ok(()));
        assert_eq!(
            check_arity(numbered, "SELECT $1", &args),
            Err(RenderError::ArityMismatch { placeholders: 1, arguments: 2 })
        );
        assert_eq!(
            check_arity(numbered, "SELECT $1, $3", &args),
            Err(RenderError::PlaceholderGap { missing: 2 })
        );
        assert_eq!(check_arity(PlaceholderStyle::Positional, "SELECT ?, ?", &args), Ok(()));
        assert!(check_arity(PlaceholderStyle::Positional, "SELECT ?", &args).is_err());
    }

    #[test]
    fn test_render_error_message() {
        let err = RenderError::ArityMismatch { placeholders: 1, arguments: 2 };
        assert_eq!(err.to_string(), "statement has 1 placeholders but 2 arguments were bound");
    }
}
