//! Span lifecycle for a single data-access operation.
//!
//! The host calls [`Instrumentation::on_before`] right before an operation runs
//! and [`Instrumentation::on_after`] once it has completed, passing the same
//! [`OperationState`] to both. A span is only created when a parent span was
//! attached to that state, so tracing is opt-in per call.

use std::borrow::Cow;
use std::fmt;

use tracing::{field, Dispatch, Span};

use crate::parser;
use crate::statement::{self, PlaceholderStyle};
use crate::value::SqlValue;

/// Per-operation state shared by the before and after hooks.
///
/// `parent_span` is set by the caller; `active_span` only exists between a
/// traced `on_before` and the matching `on_after`.
#[derive(Debug, Default)]
pub struct OperationState {
    parent_span: Option<Span>,
    active_span: Option<Span>,
}

impl OperationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state with `parent` attached, if there is one.
    pub fn with_parent(parent: Option<&Span>) -> Self {
        let mut state = Self::new();
        if let Some(parent) = parent {
            state.attach_parent(parent);
        }
        state
    }

    /// Attach the span new operation spans become children of.
    ///
    /// A disabled span is ignored. Any previously attached parent is replaced.
    pub fn attach_parent(&mut self, parent: &Span) {
        if parent.is_disabled() {
            return;
        }
        self.parent_span = Some(parent.clone());
    }

    pub fn parent_span(&self) -> Option<&Span> {
        self.parent_span.as_ref()
    }

    pub fn active_span(&self) -> Option<&Span> {
        self.active_span.as_ref()
    }

    /// Store the span opened by a custom [`Instrumentation`].
    pub fn set_active_span(&mut self, span: Span) {
        self.replace_active_span(Some(span));
    }

    fn replace_active_span(&mut self, span: Option<Span>) {
        if let Some(stale) = std::mem::replace(&mut self.active_span, span) {
            close_span(stale);
        }
    }

    pub fn take_active_span(&mut self) -> Option<Span> {
        self.active_span.take()
    }

    /// Whether a parent span has been attached.
    pub fn is_traced(&self) -> bool {
        self.parent_span.is_some()
    }

    /// Whether a span is open and waiting for `on_after`.
    pub fn is_active(&self) -> bool {
        self.active_span.is_some()
    }
}

impl Drop for OperationState {
    // An operation that is cancelled or unwinds before `on_after` still closes its span.
    fn drop(&mut self) {
        for span in [self.active_span.take(), self.parent_span.take()]
            .into_iter()
            .flatten()
        {
            close_span(span);
        }
    }
}

/// The dispatcher `span` was created in, if it is enabled.
pub(crate) fn dispatch_of(span: &Span) -> Option<Dispatch> {
    span.with_subscriber(|(_, dispatch)| dispatch.clone())
}

/// Run `f` with `dispatch` as the default dispatcher, or under the current one.
pub(crate) fn with_dispatch<T>(dispatch: Option<&Dispatch>, f: impl FnOnce() -> T) -> T {
    match dispatch {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

/// Drop a span handle inside its own dispatcher.
///
/// Closing a span makes the registry release its parent through the default
/// dispatcher, which must be the one the span belongs to.
fn close_span(span: Span) {
    let dispatch = dispatch_of(&span);
    with_dispatch(dispatch.as_ref(), move || drop(span));
}

/// What the host knows about an operation once it has completed.
#[derive(Clone, Copy)]
pub struct Completion<'a> {
    /// Fixed verb for the operation kind; empty to derive it from `sql`.
    pub verb: &'a str,
    pub table: &'a str,
    pub rows_affected: u64,
    pub error: Option<&'a dyn fmt::Display>,
    /// The template actually sent to the driver.
    pub sql: &'a str,
    /// The arguments actually bound, in placeholder order.
    pub args: &'a [SqlValue],
}

impl fmt::Debug for Completion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("verb", &self.verb)
            .field("table", &self.table)
            .field("rows_affected", &self.rows_affected)
            .field("error", &self.error.map(|e| e.to_string()))
            .field("sql", &self.sql)
            .field("args", &self.args)
            .finish()
    }
}

/// Hooks a host invokes around each data-access operation.
pub trait Instrumentation: fmt::Debug + Send + Sync {
    fn on_before(&self, state: &mut OperationState);

    fn on_after(&self, state: &mut OperationState, completion: &Completion<'_>);
}

/// Creates one `sql` span per traced operation and closes it on completion.
///
/// # Span Fields
///
/// | Field | Recorded |
/// |-------|----------|
/// | `db.type` | on start |
/// | `db.instance` | on start |
/// | `error` | on finish |
/// | `db.table` | on finish |
/// | `db.method` | on finish |
/// | `db.count` | on finish (when row counts are recorded) |
/// | `db.err` | on finish, failures only |
/// | `db.statement` | on finish (when statements are recorded) |
#[derive(Debug, Clone)]
pub struct SpanLifecycle {
    db_system: &'static str,
    instance: String,
    placeholders: PlaceholderStyle,
    record_statements: bool,
    record_row_counts: bool,
}

impl SpanLifecycle {
    pub fn new(db_system: &'static str, instance: impl Into<String>) -> Self {
        Self {
            db_system,
            instance: instance.into(),
            placeholders: PlaceholderStyle::default(),
            record_statements: true,
            record_row_counts: true,
        }
    }

    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholders = style;
        self
    }

    pub fn with_statement_recording(mut self, enabled: bool) -> Self {
        self.record_statements = enabled;
        self
    }

    pub fn with_row_count_recording(mut self, enabled: bool) -> Self {
        self.record_row_counts = enabled;
        self
    }

    pub fn db_system(&self) -> &'static str {
        self.db_system
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Start a child of `parent` through the subscriber `parent` belongs to.
    fn start_span(&self, parent: &Span) -> Option<Span> {
        parent.with_subscriber(|(id, dispatch)| {
            tracing::dispatcher::with_default(dispatch, || {
                tracing::info_span!(
                    target: "sea_orm_sqltrace",
                    parent: id.clone(),
                    "sql",
                    "db.type" = self.db_system,
                    "db.instance" = self.instance.as_str(),
                    "error" = field::Empty,
                    "db.table" = field::Empty,
                    "db.method" = field::Empty,
                    "db.count" = field::Empty,
                    "db.err" = field::Empty,
                    "db.statement" = field::Empty,
                )
            })
        })
    }
}

impl Instrumentation for SpanLifecycle {
    fn on_before(&self, state: &mut OperationState) {
        let Some(parent) = state.parent_span.as_ref() else {
            return;
        };
        let span = self.start_span(parent);
        state.replace_active_span(span);
    }

    fn on_after(&self, state: &mut OperationState, completion: &Completion<'_>) {
        // Taken out of the state so a repeated call finds nothing to finish.
        let Some(span) = state.take_active_span() else {
            return;
        };

        // Events and the final close belong to the subscriber that owns the span.
        let dispatch = dispatch_of(&span);
        with_dispatch(dispatch.as_ref(), move || self.finish_span(span, completion));
    }
}

impl SpanLifecycle {
    /// Record the completion fields; `span` closes when this returns.
    fn finish_span(&self, span: Span, completion: &Completion<'_>) {
        let verb = if completion.verb.is_empty() {
            Cow::Owned(parser::derive_verb(completion.sql))
        } else {
            Cow::Borrowed(completion.verb)
        };

        span.record("error", completion.error.is_some());
        span.record("db.table", completion.table);
        span.record("db.method", verb.as_ref());
        if self.record_row_counts {
            span.record("db.count", completion.rows_affected);
        }

        if let Some(err) = completion.error {
            span.record("db.err", field::display(err));
            tracing::error!(parent: &span, error = %err, "Database query failed");
        }

        if self.record_statements {
            if let Err(reason) =
                statement::check_arity(self.placeholders, completion.sql, completion.args)
            {
                tracing::debug!(parent: &span, %reason, "Statement arguments do not match placeholders");
            }
            let rendered =
                statement::render_with(self.placeholders, completion.sql, completion.args);
            span.record("db.statement", rendered.as_str());
        }
    }
}
