// ABOUTME: Renders events and CLI messages for a terminal.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use super::{Event, EventSink, tag};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Every event, human-readable
    Normal,
    /// Only failures and finished passes
    Quiet,
    /// JSON lines for scripting
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

pub struct OutputSink {
    mode: OutputMode,
    verbose: bool,
    started: Instant,
}

impl OutputSink {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            verbose: false,
            started: Instant::now(),
        }
    }

    /// Also show events tagged `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub(crate) fn render(&self, event: &Event) -> Option<(Stream, String)> {
        if event.has_tag(tag::DEBUG) && !self.verbose {
            return None;
        }

        let stream = if event.is_failure() {
            Stream::Stderr
        } else {
            Stream::Stdout
        };

        match self.mode {
            OutputMode::Normal => {
                let mut line = format!("[{}] {}: {}", event.tags.join(","), event.title, event.message);
                if event.has_tag(tag::DONE) {
                    line.push_str(&format!(" ({:.1}s)", self.elapsed_secs()));
                }
                Some((stream, line))
            }
            OutputMode::Quiet => event
                .is_terminal()
                .then(|| (stream, format!("{}: {}", event.title, event.message))),
            OutputMode::Json => {
                let json = JsonEvent {
                    event: "event",
                    title: Some(event.title.as_str()),
                    message: &event.message,
                    tags: &event.tags,
                    trace_id: event.trace_id.as_ref().map(|t| t.as_str()),
                    duration_secs: event.has_tag(tag::DONE).then(|| self.elapsed_secs()),
                };
                serde_json::to_string(&json).ok().map(|line| (stream, line))
            }
        }
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let json = JsonEvent {
                    event: "error",
                    title: None,
                    message,
                    tags: &[],
                    trace_id: None,
                    duration_secs: Some(self.elapsed_secs()),
                };
                if let Ok(line) = serde_json::to_string(&json) {
                    eprintln!("{line}");
                }
            }
        }
    }
}

impl EventSink for OutputSink {
    fn publish(&self, event: Event) {
        match self.render(&event) {
            Some((Stream::Stdout, line)) => println!("{line}"),
            Some((Stream::Stderr, line)) => eprintln!("{line}"),
            None => {}
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    message: &'a str,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}
