//! Basic example showing how to use sea-orm-sqltrace.
//!
//! Run with: cargo run --example basic

use sea_orm::{ConnectionTrait, DbBackend, MockDatabase, MockExecResult, Statement, Value};
use sea_orm_sqltrace::prelude::*;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Print every span with its fields when it closes
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sea_orm_sqltrace=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE))
        .init();

    // A mock connection stands in for `Database::connect(...)`
    let db = MockDatabase::new(DbBackend::Postgres)
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();

    let traced_db = db.with_tracing_config(TracingConfig::development().with_database_name("shop"));

    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"UPDATE "customers" SET "name" = $1, "deleted_at" = $2 WHERE "id" = $3"#,
        [Value::from("O'Reilly"), Value::String(None), Value::from(42i64)],
    );

    // No parent span attached: this query is not traced
    traced_db.execute(stmt.clone()).await?;

    // Inside a request span, the query becomes a child `sql` span
    let request = tracing::info_span!("request", path = "/customers/42");
    let scoped = request.in_scope(|| traced_db.with_current_span());
    scoped.execute(stmt).await?;

    tracing::info!("done");
    Ok(())
}
