//! A `tracing_subscriber` layer that records span and event activity for assertions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
pub(crate) struct RecordedEvent {
    pub level: Level,
    pub message: String,
    pub parent: Option<String>,
}

#[derive(Debug, Default)]
struct Recorded {
    opened: Vec<String>,
    closed: Vec<String>,
    // Fields of every `sql` span in creation order.
    sql_spans: Vec<HashMap<String, String>>,
    // Live span id to its index in `sql_spans`; ids are reused after close.
    live: HashMap<Id, usize>,
    events: Vec<RecordedEvent>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Recorded>>);

impl Recorder {
    /// Install a registry with this layer as the thread's default subscriber.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// A registry with this layer that is not installed anywhere.
    pub fn dispatch(&self) -> tracing::Dispatch {
        tracing::Dispatch::new(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn opened(&self) -> Vec<String> {
        self.0.lock().unwrap().opened.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.0.lock().unwrap().closed.clone()
    }

    pub fn count_opened(&self, name: &str) -> usize {
        self.opened().iter().filter(|n| *n == name).count()
    }

    pub fn count_closed(&self, name: &str) -> usize {
        self.closed().iter().filter(|n| *n == name).count()
    }

    pub fn sql_fields(&self, index: usize) -> HashMap<String, String> {
        self.0.lock().unwrap().sql_spans[index].clone()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.0.lock().unwrap().events.clone()
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

impl<S> Layer<S> for Recorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let name = attrs.metadata().name();
        let mut recorded = self.0.lock().unwrap();
        recorded.opened.push(name.to_string());
        recorded.live.remove(id);

        if name == "sql" {
            let mut fields = HashMap::new();
            attrs.record(&mut FieldVisitor(&mut fields));
            if let Some(parent) = attrs.parent().and_then(|p| ctx.span(p)) {
                fields.insert("parent".to_string(), parent.name().to_string());
            }
            recorded.sql_spans.push(fields);
            let index = recorded.sql_spans.len() - 1;
            recorded.live.insert(id.clone(), index);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut recorded = self.0.lock().unwrap();
        if let Some(index) = recorded.live.get(id).copied() {
            values.record(&mut FieldVisitor(&mut recorded.sql_spans[index]));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let parent = event
            .parent()
            .and_then(|p| ctx.span(p))
            .or_else(|| ctx.lookup_current())
            .map(|span| span.name().to_string());

        self.0.lock().unwrap().events.push(RecordedEvent {
            level: *event.metadata().level(),
            message: fields.remove("message").unwrap_or_default(),
            parent,
        });
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let name = ctx.span(&id).map(|span| span.name().to_string());
        let mut recorded = self.0.lock().unwrap();
        recorded.live.remove(&id);
        if let Some(name) = name {
            recorded.closed.push(name);
        }
    }
}
