//! Bounded operator log.
//!
//! The operator-facing console: a fixed number of lines, oldest evicted
//! first. Every line is mirrored to `tracing` under the
//! `scoutwatch::operator` target so it also lands in the log files.

use std::collections::VecDeque;

/// Default number of lines kept, matching the height of the original console.
pub const DEFAULT_OPERATOR_LINES: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug)]
pub struct OperatorLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for OperatorLog {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATOR_LINES)
    }
}

impl OperatorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn info(&mut self, line: impl Into<String>) {
        self.push(Severity::Info, line.into());
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        self.push(Severity::Warn, line.into());
    }

    pub fn error(&mut self, line: impl Into<String>) {
        self.push(Severity::Error, line.into());
    }

    pub fn push(&mut self, severity: Severity, line: String) {
        match severity {
            Severity::Info => tracing::info!(target: "scoutwatch::operator", "{}", line),
            Severity::Warn => tracing::warn!(target: "scoutwatch::operator", "{}", line),
            Severity::Error => tracing::error!(target: "scoutwatch::operator", "{}", line),
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    /// Newline-joined console contents.
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tear the log down, handing back whatever is still buffered.
    pub fn close(self) -> Vec<String> {
        tracing::debug!(lines = self.lines.len(), "Operator log closed");
        self.lines.into()
    }
}
