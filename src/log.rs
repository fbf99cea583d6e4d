// log.rs
//
// This file defines the assembler log: the ordered list of diagnostics produced
// while tokenizing, parsing, resolving and placing a program.
//
// Diagnostics are collected rather than raised. A pass keeps going after an
// error so that as many problems as possible are reported in one run, until
// the configured maximum error count is reached.

use std::fmt;

use crate::ast::{Location, SourceFile};

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// A single diagnostic, optionally attributed to a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub level: LogLevel,
    pub location: Option<Location>,
    pub content: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, location: Option<Location>, content: impl Into<String>) -> Self {
        LogMessage { level, location, content: content.into() }
    }

    /// Render the message followed by a few lines of surrounding source, with the
    /// offending line marked.
    pub fn with_source_context(&self, source: &SourceFile) -> String {
        let Some(location) = &self.location else {
            return self.to_string();
        };
        let line_num = location.line as usize;
        let start = line_num.saturating_sub(3).max(1);
        let end = line_num + 3;
        let mut context = String::new();
        for n in start..=end {
            if let Some(text) = source.line_text(n as u32) {
                let marker = if n == line_num { ">>> " } else { "    " };
                context.push_str(&format!("{}{:4}: {}\n", marker, n, text));
            }
        }
        format!("{}\n{}", self, context)
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} in {}: {}", self.level, location, self.content),
            None => write!(f, "{}: {}", self.level, self.content),
        }
    }
}

/// Ordered collection of diagnostics with a cutoff on the number of errors.
#[derive(Debug, Clone, Default)]
pub struct AssemblerLog {
    messages: Vec<LogMessage>,
    max_error_count: Option<usize>,
    error_count: usize,
    warning_count: usize,
}

impl AssemblerLog {
    /// A log that accepts at most `max_error_count` errors (`None` for unlimited).
    pub fn new(max_error_count: Option<usize>) -> Self {
        AssemblerLog { max_error_count, ..Default::default() }
    }

    pub fn log(&mut self, message: LogMessage) {
        match message.level {
            LogLevel::Error => {
                if let Some(max) = self.max_error_count {
                    if self.error_count >= max {
                        if self.error_count == max {
                            // Recorded once; the count moves past the limit so later errors are dropped
                            self.error_count += 1;
                            self.push(LogMessage::new(
                                LogLevel::Error,
                                None,
                                "Maximum error count exceeded; halting assembly",
                            ));
                        }
                        return;
                    }
                }
                self.error_count += 1;
            }
            LogLevel::Warning => self.warning_count += 1,
            LogLevel::Info => {}
        }
        self.push(message);
    }

    fn push(&mut self, message: LogMessage) {
        tracing::debug!(level = %message.level, "{}", message);
        self.messages.push(message);
    }

    pub fn info(&mut self, location: Option<&Location>, content: impl Into<String>) {
        self.log(LogMessage::new(LogLevel::Info, location.cloned(), content));
    }

    pub fn warning(&mut self, location: Option<&Location>, content: impl Into<String>) {
        self.log(LogMessage::new(LogLevel::Warning, location.cloned(), content));
    }

    pub fn error(&mut self, location: Option<&Location>, content: impl Into<String>) {
        self.log(LogMessage::new(LogLevel::Error, location.cloned(), content));
    }

    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn max_error_count(&self) -> Option<usize> {
        self.max_error_count
    }

    pub fn has_exceeded_max_error_count(&self) -> bool {
        self.max_error_count.is_some_and(|max| self.error_count > max)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }
}
