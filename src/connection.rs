//! Traced database connection wrapper.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    ExecResult, IsolationLevel, QueryResult, Statement, StreamTrait, TransactionError,
    TransactionTrait,
};
use tracing::{Instrument, Span};

use crate::config::TracingConfig;
use crate::lifecycle::{
    dispatch_of, with_dispatch, Completion, Instrumentation, OperationState, SpanLifecycle,
};
use crate::parser::{self, OperationKind};
use crate::statement::PlaceholderStyle;
use crate::value::SqlValue;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A traced wrapper around SeaORM's `DatabaseConnection`.
///
/// This wrapper implements `ConnectionTrait`, `StreamTrait`, and `TransactionTrait`,
/// making it a drop-in replacement for `DatabaseConnection`.
///
/// # Opt-in Spans
///
/// Operations are only traced once a parent span has been attached with
/// [`TracedConnection::with_parent`] or [`TracedConnection::with_current_span`].
/// Each traced operation then produces one `sql` span, a child of that parent,
/// carrying the statement with its bound values substituted in.
///
/// # Transactions
///
/// `begin` and `transaction` get a single `BEGIN` / `TRANSACTION` span. The
/// statements run through the returned `DatabaseTransaction` are not traced.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sea_orm_sqltrace::TracedConnection;
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let traced = TracedConnection::from(db);
///
/// // Queries issued inside a request span are now traced
/// let users = Users::find().all(&traced.with_current_span()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TracedConnection {
    inner: Arc<DatabaseConnection>,
    config: Arc<TracingConfig>,
    instrumentation: Arc<dyn Instrumentation>,
    parent: Option<Span>,
}

impl TracedConnection {
    /// Create a new traced connection with the given configuration.
    pub fn new(connection: DatabaseConnection, config: TracingConfig) -> Self {
        let backend = connection.get_database_backend();
        let instance = config.database_name.clone().unwrap_or_else(|| {
            let n = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}", db_system(backend), n)
        });

        let lifecycle = SpanLifecycle::new(db_system(backend), instance)
            .with_placeholder_style(PlaceholderStyle::for_backend(backend))
            .with_statement_recording(config.record_statements)
            .with_row_count_recording(config.record_row_counts);

        Self {
            inner: Arc::new(connection),
            config: Arc::new(config),
            instrumentation: Arc::new(lifecycle),
            parent: None,
        }
    }

    /// Create a new traced connection with default configuration.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        Self::new(connection, TracingConfig::default())
    }

    /// Replace the hooks invoked around each operation.
    pub fn with_instrumentation(mut self, instrumentation: impl Instrumentation + 'static) -> Self {
        self.instrumentation = Arc::new(instrumentation);
        self
    }

    /// Return a copy whose operations become children of `parent`.
    ///
    /// `self` is left untouched. A disabled span attaches nothing.
    pub fn with_parent(&self, parent: &Span) -> Self {
        let mut traced = self.clone();
        if !parent.is_disabled() {
            traced.parent = Some(parent.clone());
        }
        traced
    }

    /// Return a copy whose operations become children of the current span.
    pub fn with_current_span(&self) -> Self {
        self.with_parent(&Span::current())
    }

    /// The span operations are attached to, if any.
    pub fn parent_span(&self) -> Option<&Span> {
        self.parent.as_ref()
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Get the tracing configuration.
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    ///
    /// Copies made by `with_parent` share the connection, so this returns `None`
    /// while any other copy is still alive.
    pub fn into_inner(self) -> Option<DatabaseConnection> {
        Arc::try_unwrap(self.inner).ok()
    }

    /// Run the before hook and capture what the after hook will need.
    ///
    /// The statement is only captured when the hook opened a span.
    fn begin_operation(&self, capture: impl FnOnce() -> TracedStatement) -> Operation<'_> {
        let mut state = OperationState::with_parent(self.parent.as_ref());
        self.instrumentation.on_before(&mut state);
        let statement = state.is_active().then(capture);

        Operation {
            connection: self,
            state,
            statement,
            start: Instant::now(),
        }
    }
}

/// Get the database backend name for span attributes.
fn db_system(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite",
    }
}

/// Owned copy of a statement, taken before it is handed to the driver.
#[derive(Debug)]
struct TracedStatement {
    verb: &'static str,
    table: Option<String>,
    sql: String,
    args: Vec<SqlValue>,
}

impl TracedStatement {
    fn capture(stmt: &Statement) -> Self {
        let args = stmt
            .values
            .as_ref()
            .map(|values| values.0.iter().map(SqlValue::from).collect())
            .unwrap_or_default();
        Self {
            args,
            ..Self::unprepared(&stmt.sql)
        }
    }

    fn unprepared(sql: &str) -> Self {
        Self {
            verb: OperationKind::classify(sql).verb(),
            table: parser::extract_table(sql),
            sql: sql.to_string(),
            args: Vec::new(),
        }
    }

    fn transaction(verb: &'static str) -> Self {
        Self {
            verb,
            table: None,
            sql: String::new(),
            args: Vec::new(),
        }
    }
}

/// One in-flight operation between the before and after hooks.
struct Operation<'c> {
    connection: &'c TracedConnection,
    state: OperationState,
    statement: Option<TracedStatement>,
    start: Instant,
}

impl Operation<'_> {
    /// The span to run the inner future in.
    fn span(&self) -> Span {
        self.state.active_span().cloned().unwrap_or_else(Span::none)
    }

    /// Run the after hook. Untraced operations return without calling it.
    fn finish<E: fmt::Display>(mut self, outcome: Result<u64, &E>) {
        let Some(statement) = self.statement.take() else {
            return;
        };

        let elapsed = self.start.elapsed();
        let threshold = self.connection.config.slow_query_threshold;
        if elapsed > threshold {
            if let Some(span) = self.state.active_span() {
                let dispatch = dispatch_of(span);
                with_dispatch(dispatch.as_ref(), || {
                    tracing::warn!(
                        parent: span,
                        duration_ms = elapsed.as_millis() as u64,
                        threshold_ms = threshold.as_millis() as u64,
                        "Slow query detected"
                    )
                });
            }
        }

        let completion = Completion {
            verb: statement.verb,
            table: statement.table.as_deref().unwrap_or(""),
            rows_affected: outcome.unwrap_or(0),
            error: outcome.err().map(|e| e as &dyn fmt::Display),
            sql: &statement.sql,
            args: &statement.args,
        };
        self.connection
            .instrumentation
            .on_after(&mut self.state, &completion);
    }
}

impl From<DatabaseConnection> for TracedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for TracedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        self.inner()
    }
}

#[async_trait]
impl ConnectionTrait for TracedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner().get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::capture(&stmt));

        let result = self.inner().execute(stmt).instrument(operation.span()).await;

        operation.finish(result.as_ref().map(|r| r.rows_affected()));
        result
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::unprepared(sql));

        let result = self
            .inner()
            .execute_unprepared(sql)
            .instrument(operation.span())
            .await;

        operation.finish(result.as_ref().map(|r| r.rows_affected()));
        result
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::capture(&stmt));

        let result = self.inner().query_one(stmt).instrument(operation.span()).await;

        operation.finish(result.as_ref().map(|row| u64::from(row.is_some())));
        result
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::capture(&stmt));

        let result = self.inner().query_all(stmt).instrument(operation.span()).await;

        operation.finish(result.as_ref().map(|rows| rows.len() as u64));
        result
    }

    fn support_returning(&self) -> bool {
        self.inner().support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner().is_mock_connection()
    }
}

#[async_trait]
impl StreamTrait for TracedConnection {
    type Stream<'a> = <DatabaseConnection as StreamTrait>::Stream<'a>;

    fn stream<'a>(
        &'a self,
        stmt: Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream<'a>, DbErr>> + 'a + Send>> {
        let operation = self.begin_operation(|| TracedStatement::capture(&stmt));

        Box::pin(async move {
            let result = self.inner().stream(stmt).instrument(operation.span()).await;

            // Rows are consumed after the span closes, so none are counted.
            operation.finish(result.as_ref().map(|_| 0));
            result
        })
    }
}

#[async_trait]
impl TransactionTrait for TracedConnection {
    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::transaction("BEGIN"));

        let result = self.inner().begin().instrument(operation.span()).await;

        operation.finish(result.as_ref().map(|_| 0));
        result
    }

    async fn begin_with_config(
        &self,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<DatabaseTransaction, DbErr> {
        let operation = self.begin_operation(|| TracedStatement::transaction("BEGIN"));

        let result = self
            .inner()
            .begin_with_config(isolation_level, access_mode)
            .instrument(operation.span())
            .await;

        operation.finish(result.as_ref().map(|_| 0));
        result
    }

    async fn transaction<F, T, E>(&self, callback: F) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        let operation = self.begin_operation(|| TracedStatement::transaction("TRANSACTION"));

        let result = self
            .inner()
            .transaction(callback)
            .instrument(operation.span())
            .await;

        let detail = result.as_ref().err().map(|e| format!("{:?}", e));
        operation.finish(detail.as_ref().map_or(Ok(0), Err));
        result
    }

    async fn transaction_with_config<F, T, E>(
        &self,
        callback: F,
        isolation_level: Option<IsolationLevel>,
        access_mode: Option<AccessMode>,
    ) -> Result<T, TransactionError<E>>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: std::fmt::Display + std::fmt::Debug + Send,
    {
        let operation = self.begin_operation(|| TracedStatement::transaction("TRANSACTION"));

        let result = self
            .inner()
            .transaction_with_config(callback, isolation_level, access_mode)
            .instrument(operation.span())
            .await;

        let detail = result.as_ref().err().map(|e| format!("{:?}", e));
        operation.finish(detail.as_ref().map_or(Ok(0), Err));
        result
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait TracingExt {
    /// Wrap this connection with tracing instrumentation.
    fn with_tracing(self) -> TracedConnection;

    /// Wrap this connection with custom tracing configuration.
    fn with_tracing_config(self, config: TracingConfig) -> TracedConnection;
}

impl TracingExt for DatabaseConnection {
    fn with_tracing(self) -> TracedConnection {
        TracedConnection::wrap(self)
    }

    fn with_tracing_config(self, config: TracingConfig) -> TracedConnection {
        TracedConnection::new(self, config)
    }
}
