use tracing::{info, warn};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Alert,
}

impl std::fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyLevel::Info => write!(f, "info"),
            NotifyLevel::Warning => write!(f, "warning"),
            NotifyLevel::Alert => write!(f, "alert"),
        }
    }
}

/// Best-effort user notification sink.
///
/// Implementations must never propagate failure into the caller; a lost
/// notification is logged and forgotten.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, category: &str, message: &str);
}

/// Notifier that emits structured log records
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, category: &str, message: &str) {
        match level {
            NotifyLevel::Info => info!(category, "{message}"),
            NotifyLevel::Warning | NotifyLevel::Alert => {
                warn!(category, severity = %level, "{message}");
            }
        }
    }
}

/// Notifier that records messages in memory; used by tests to assert on
/// notification traffic.
#[derive(Debug, Default)]
pub struct BufferedNotifier {
    messages: std::sync::Mutex<Vec<(NotifyLevel, String, String)>>,
}

impl BufferedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(NotifyLevel, String, String)> {
        self.messages.lock().expect("notifier lock").clone()
    }

    pub fn count_in_category(&self, category: &str) -> usize {
        self.messages()
            .iter()
            .filter(|(_, c, _)| c == category)
            .count()
    }
}

impl Notifier for BufferedNotifier {
    fn notify(&self, level: NotifyLevel, category: &str, message: &str) {
        self.messages
            .lock()
            .expect("notifier lock")
            .push((level, category.to_string(), message.to_string()));
    }
}
