//! Leveled logging for contexts, built on `tracing`.

use serde::Deserialize;
use std::fmt;
use std::rc::Rc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for formatted log lines.
pub trait LogSink {
    fn write(&self, level: LogLevel, message: fmt::Arguments<'_>);
}

/// Forwards every line to `tracing` under the crate's target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "novade_vulkan_bootstrap", "{}", message),
            LogLevel::Info => tracing::info!(target: "novade_vulkan_bootstrap", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "novade_vulkan_bootstrap", "{}", message),
            LogLevel::Error => tracing::error!(target: "novade_vulkan_bootstrap", "{}", message),
            LogLevel::Fatal => {
                tracing::error!(target: "novade_vulkan_bootstrap", fatal = true, "{}", message)
            }
        }
    }
}

/// A sink plus a minimum level. Calls under the threshold return before the
/// message is formatted.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    sink: Rc<dyn LogSink>,
}

impl Logger {
    pub fn new(min_level: LogLevel, sink: Rc<dyn LogSink>) -> Self {
        Self { min_level, sink }
    }

    pub fn tracing(min_level: LogLevel) -> Self {
        Self::new(min_level, Rc::new(TracingSink))
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.sink.write(level, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        let level = if cfg!(debug_assertions) {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        Self::tracing(level)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("min_level", &self.min_level).finish()
    }
}

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `info`).
/// A subscriber that is already installed is left alone.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
