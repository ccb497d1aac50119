// Diagnostic sink
//
// Receives messages from the GPU provider (validation layers, driver
// callbacks). It is handed to the device at creation and released with it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

pub trait DiagnosticSink: Send + Sync {
    fn message(&self, severity: Severity, text: &str);
}

/// Forwards provider messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn message(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Error => log::error!("[gpu] {}", text),
            Severity::Warning => log::warn!("[gpu] {}", text),
            Severity::Info => log::info!("[gpu] {}", text),
            Severity::Verbose => log::debug!("[gpu] {}", text),
        }
    }
}
