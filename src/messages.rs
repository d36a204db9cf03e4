//! Visible message display for load and fetch failures.

use std::sync::{Arc, Mutex};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

pub trait MessageSink: Send + Sync {
    fn display(&self, message: &str, severity: Severity);
}

/// Routes messages into the structured log and, for errors, stderr.
pub struct LogSink;

impl MessageSink for LogSink {
    fn display(&self, message: &str, severity: Severity) {
        let level = match severity {
            Severity::Info => Level::Info,
            Severity::Error => Level::Error,
        };
        log(
            level,
            Domain::System,
            "message",
            obj(&[("severity", v_str(severity.as_str())), ("msg", v_str(message))]),
        );
        if severity == Severity::Error {
            eprintln!("error: {}", message);
        }
    }
}

/// Keeps every displayed message; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<(String, Severity)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(_, s)| *s == Severity::Error)
            .map(|(m, _)| m)
            .collect()
    }
}

impl MessageSink for MemorySink {
    fn display(&self, message: &str, severity: Severity) {
        if let Ok(mut m) = self.messages.lock() {
            m.push((message.to_string(), severity));
        }
    }
}
