//! User-facing notifications
//!
//! Progress and error messages share one channel. Info messages respect the
//! global `silent` flag; warnings and errors are always delivered.

use std::sync::{Arc, Mutex};

use colored::*;
use tracing::{error, info, warn};

/// Notification level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// A delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    Capture(Arc<Mutex<Vec<Notice>>>),
}

/// Notification channel shared by every plugdeps operation
#[derive(Debug, Clone)]
pub struct Notifier {
    silent: bool,
    sink: Sink,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::stderr(false)
    }
}

impl Notifier {
    /// Notifier printing to stderr
    pub fn stderr(silent: bool) -> Self {
        Self {
            silent,
            sink: Sink::Stderr,
        }
    }

    /// Notifier recording notices in memory (for tests and embedding hosts)
    pub fn capturing(silent: bool) -> Self {
        Self {
            silent,
            sink: Sink::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        if !self.silent {
            self.deliver(Level::Info, message);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.deliver(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.deliver(Level::Error, message);
    }

    /// Notices recorded so far; empty for the stderr sink
    pub fn notices(&self) -> Vec<Notice> {
        match &self.sink {
            Sink::Stderr => Vec::new(),
            Sink::Capture(store) => store.lock().map(|v| v.clone()).unwrap_or_default(),
        }
    }

    fn deliver(&self, level: Level, message: String) {
        match &self.sink {
            Sink::Stderr => {
                let prefix = "(plugdeps)".dimmed();
                match level {
                    Level::Info => eprintln!("{} {}", prefix, message),
                    Level::Warn => eprintln!("{} {}", prefix, message.yellow()),
                    Level::Error => eprintln!("{} {}", prefix, message.red()),
                }
            }
            Sink::Capture(store) => {
                if let Ok(mut notices) = store.lock() {
                    notices.push(Notice { level, message });
                }
            }
        }
    }
}
