//! Injected diagnostics capability.
//!
//! Every component that degrades instead of failing (extraction misses,
//! unparseable documents, unknown ids) reports through a `Diagnostics`
//! handed to it by the caller rather than through process-wide state.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single reported event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub component: String,
    pub message: String,
}

/// Observer for non-fatal events raised while processing one sample
pub trait Diagnostics: Send + Sync {
    fn report(&self, severity: Severity, component: &str, message: &str);

    fn info(&self, component: &str, message: &str) {
        self.report(Severity::Info, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.report(Severity::Warning, component, message);
    }
}

/// Forwards diagnostics to the `log` facade.
///
/// Concurrent samples log through the same sink, so each message is
/// prefixed with the scope (usually the sample name) when one is set.
#[derive(Debug, Clone, Default)]
pub struct LogDiagnostics {
    scope: Option<String>,
}

impl LogDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
        }
    }

    fn prefix(&self, component: &str) -> String {
        match &self.scope {
            Some(scope) => format!("[{}] [{}]", scope, component),
            None => format!("[{}]", component),
        }
    }
}

impl Diagnostics for LogDiagnostics {
    fn report(&self, severity: Severity, component: &str, message: &str) {
        let prefix = self.prefix(component);
        match severity {
            Severity::Info => log::info!(target: "figsmith", "{} {}", prefix, message),
            Severity::Warning => log::warn!(target: "figsmith", "{} {}", prefix, message),
        }
    }
}

/// Keeps every diagnostic in memory, in the order reported
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    pub fn has_warning_from(&self, component: &str) -> bool {
        self.warnings().iter().any(|d| d.component == component)
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, severity: Severity, component: &str, message: &str) {
        let entry = Diagnostic {
            severity,
            component: component.to_string(),
            message: message.to_string(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
