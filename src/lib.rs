//! # sea-orm-sqltrace
//!
//! Opt-in SQL spans for SeaORM, annotated with database metadata and a
//! human-readable statement in which every bound value has been substituted
//! for its placeholder.
//!
//! Tracing is requested per call: a [`TracedConnection`] only creates spans once
//! a parent span has been attached to it. Each traced operation becomes one
//! `sql` span, a child of that parent, that is closed exactly once when the
//! operation completes, whether it succeeded or not.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sea_orm_sqltrace::TracedConnection;
//!
//! let db = TracedConnection::from(Database::connect("postgres://localhost/mydb").await?);
//!
//! // Inside a request handler span:
//! let users = Users::find().all(&db.with_current_span()).await?;
//! ```
//!
//! ## Statement Reconstruction
//!
//! ```rust
//! use sea_orm_sqltrace::{render, SqlValue};
//!
//! let sql = render(
//!     "SELECT * FROM t WHERE id = $1 AND name = $2",
//!     &[SqlValue::from(5), SqlValue::from("ann")],
//! );
//! assert_eq!(sql, "SELECT * FROM t WHERE id = 5 AND name = 'ann'");
//! ```
//!
//! Text and time values are single-quoted without escaping, so the result is
//! for display only and must never be executed.
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `db.type` | "postgresql", "mysql", or "sqlite" |
//! | `db.instance` | Configured database name or a generated connection id |
//! | `db.table` | Target table name (when detectable) |
//! | `db.method` | SQL verb (SELECT, INSERT, UPDATE, DELETE, ...) |
//! | `db.count` | Number of rows returned/affected |
//! | `error` | Whether the operation failed |
//! | `db.err` | Error details (on failure) |
//! | `db.statement` | Statement with bound values substituted |

mod config;
mod connection;
mod lifecycle;
mod parser;
mod statement;
mod value;

#[cfg(test)]
mod test_support;

pub use config::TracingConfig;
pub use connection::{TracedConnection, TracingExt};
pub use lifecycle::{Completion, Instrumentation, OperationState, SpanLifecycle};
pub use parser::{derive_verb, OperationKind};
pub use statement::{check_arity, render, render_with, PlaceholderStyle, RenderError};
pub use value::{Nullable, SqlValue, Temporal};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{SqlValue, TracedConnection, TracingConfig, TracingExt};
}
