// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Captures log events for assertions in tests.
//!
//! # Example
//!
//! ```rust
//! use vmapi_test_utils::capture::EventCapture;
//!
//! let (capture, _guard) = EventCapture::install();
//! tracing::info_span!("bucket_setup", component = "vmapi").in_scope(|| {
//!     tracing::warn!(attempt = 1, "retrying");
//! });
//!
//! let events = capture.events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].message, "retrying");
//! assert_eq!(events[0].field("attempt"), Some("1"));
//! assert_eq!(events[0].span_field("component"), Some("vmapi"));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Event, Level, Subscriber, field, span};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// A captured log event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    /// The event message, the `message` field in `tracing`.
    pub message: String,
    /// The remaining fields, formatted as strings.
    pub fields: HashMap<String, String>,
    /// The names of the enclosing spans, from the root.
    pub spans: Vec<String>,
    /// The fields of the enclosing spans. Inner spans win on conflicts.
    pub span_fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn span_field(&self, name: &str) -> Option<&str> {
        self.span_fields.get(name).map(String::as_str)
    }
}

struct Visitor<'a>(&'a mut HashMap<String, String>);

impl field::Visit for Visitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// The fields recorded on a span, stored in the span extensions.
struct SpanFields(HashMap<String, String>);

/// A layer that records every event.
///
/// The layer is installed as the default subscriber for the current thread.
/// Tests using the current thread runtime (the `#[tokio::test]` default) also
/// capture the events of any spawned tasks.
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Installs a new capture layer for the current thread.
    ///
    /// Events are captured while the returned guard is in scope.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// All the events captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    /// The events with the given message.
    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.lock()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    /// The events at the given level.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut Visitor(&mut fields));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(fields));
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(SpanFields(fields)) = span.extensions_mut().get_mut::<SpanFields>() {
                values.record(&mut Visitor(fields));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut Visitor(&mut fields));
        let message = fields.remove("message").unwrap_or_default();
        let mut spans = Vec::new();
        let mut span_fields = HashMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                spans.push(span.name().to_string());
                if let Some(SpanFields(f)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(f.clone());
                }
            }
        }
        self.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
            spans,
            span_fields,
        });
    }
}
