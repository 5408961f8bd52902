//! Bridge from `tracing` to a [`Logger`]
//!
//! Applications that already log through `tracing` macros install
//! [`LoggerLayer`] next to their other layers and reach the same outputs and
//! store as direct [`Logger`] calls.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::event::{LogEvent, SourceLocation};
use crate::level::Level;
use crate::logger::{Logger, error_chain};

/// Crates whose own diagnostics are never routed back into a logger
const INTERNAL_CRATES: &[&str] = &["logkeep", "logkeep_logging", "logkeep_storage"];

/// Whether `target` belongs to logkeep itself
///
/// A failing store reports through `tracing`; routing that report back into
/// the store would never end.
pub fn is_internal_target(target: &str) -> bool {
    let root = target.split("::").next().unwrap_or(target);
    INTERNAL_CRATES.contains(&root)
}

/// Layer forwarding tracing events to a [`Logger`]
///
/// Fields other than `message` are appended to the message as `key=value`;
/// an `exception` field becomes the event's exception text. Spans are not
/// recorded.
pub struct LoggerLayer {
    logger: Arc<Logger>,
}

impl LoggerLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}

impl<S> Layer<S> for LoggerLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return;
        }
        let level = Level::from(*metadata.level());
        if !self.logger.is_enabled_for(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let (message, exception) = visitor.finish();

        let location = SourceLocation::new(
            metadata.file().unwrap_or("<unknown>"),
            metadata.line().unwrap_or(0),
            metadata.module_path().map(str::to_string),
        );
        let mut log_event = LogEvent::new(level, self.logger.name(), message, location);
        if let Some(exception) = exception {
            log_event = log_event.with_exception(exception);
        }
        self.logger.log_event(log_event);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    exception: Option<String>,
    extras: Vec<String>,
}

impl FieldVisitor {
    fn record_value(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "exception" => self.exception = Some(value),
            _ => self.extras.push(format!("{name}={value}")),
        }
    }

    fn finish(self) -> (String, Option<String>) {
        let mut message = self.message.unwrap_or_default();
        if !self.extras.is_empty() {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&self.extras.join(" "));
        }
        (message, self.exception)
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field.name(), value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.record_value(field.name(), error_chain(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field.name(), format!("{value:?}"));
    }
}
