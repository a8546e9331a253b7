// ABOUTME: Tagged, human-readable events published at every pipeline step.
// ABOUTME: Sinks are fire-and-forget; publishing can never fail a pass.

mod output;

pub use output::{OutputMode, OutputSink};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::types::TraceId;

/// Tags attached to events.
pub mod tag {
    pub const SWARM: &str = "swarm";
    pub const BUILD: &str = "build";
    pub const WAIT: &str = "wait";
    pub const DEPLOY: &str = "deploy";
    pub const DELETE: &str = "delete";
    pub const SCALE_UP: &str = "scale-up";
    pub const SCALE_DOWN: &str = "scale-down";
    pub const UPTEST: &str = "uptest";
    pub const ROUTE: &str = "route";
    pub const CLEANUP: &str = "cleanup";
    pub const SCHEDULED: &str = "scheduled";
    pub const FAILED: &str = "failed";
    pub const WARNING: &str = "warning";
    pub const DONE: &str = "done";
    pub const DEBUG: &str = "debug";
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub title: String,
    pub message: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            tags: Vec::new(),
            trace_id: None,
            at: Utc::now(),
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
        self
    }

    pub fn tags(self, tags: &[&str]) -> Self {
        tags.iter().fold(self, |event, t| event.tag(t))
    }

    pub fn trace(mut self, trace_id: &TraceId) -> Self {
        self.trace_id = Some(trace_id.clone());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_failure(&self) -> bool {
        self.has_tag(tag::FAILED)
    }

    /// Failures and finished passes end a trigger.
    pub fn is_terminal(&self) -> bool {
        self.has_tag(tag::DONE) || self.is_failure()
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Logs every event through tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: Event) {
        let tags = event.tags.join(",");
        let trace_id = event.trace_id.as_ref().map(TraceId::as_str).unwrap_or("-");
        if event.is_failure() {
            tracing::warn!(tags = tags.as_str(), trace_id, title = event.title.as_str(), "{}", event.message);
        } else if event.has_tag(tag::DEBUG) {
            tracing::debug!(tags = tags.as_str(), trace_id, title = event.title.as_str(), "{}", event.message);
        } else {
            tracing::info!(tags = tags.as_str(), trace_id, title = event.title.as_str(), "{}", event.message);
        }
    }
}

/// Hands every event to each inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: Event) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    impl EventSink for Collect {
        fn publish(&self, event: Event) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn tags_are_deduplicated() {
        let event = Event::new("billing-web", "deployed")
            .tags(&[tag::SWARM, tag::DEPLOY])
            .tag(tag::SWARM);
        assert_eq!(event.tags, vec!["swarm", "deploy"]);
    }

    #[test]
    fn failure_and_done_are_terminal() {
        assert!(Event::new("a", "b").tag(tag::FAILED).is_terminal());
        assert!(Event::new("a", "b").tag(tag::DONE).is_terminal());
        assert!(!Event::new("a", "b").tag(tag::UPTEST).is_terminal());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingSink));

        fanout.publish(Event::new("billing-web", "hello").trace(&TraceId::new("t1")));

        assert_eq!(first.0.lock().len(), 1);
        assert_eq!(second.0.lock()[0].trace_id, Some(TraceId::new("t1")));
    }
}
