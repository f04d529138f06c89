//! User-facing status output.
//!
//! Status lines such as `Created [link].` are part of the command's
//! interface, not diagnostics, so they bypass `tracing`.

/// Receives progress lines and warning summaries meant for the user.
pub trait StatusReporter: Send + Sync {
    fn status(&self, line: &str);
    fn warning(&self, message: &str);
}

/// Writes to stderr, keeping stdout free for command output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrStatus;

impl StatusReporter for StderrStatus {
    fn status(&self, line: &str) {
        eprintln!("{line}");
    }

    fn warning(&self, message: &str) {
        eprintln!("WARNING: {message}");
    }
}

/// Collects everything it is given.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    lines: parking_lot::Mutex<Vec<String>>,
    warnings: parking_lot::Mutex<Vec<String>>,
}

impl RecordingStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl StatusReporter for RecordingStatus {
    fn status(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let status = RecordingStatus::new();
        status.status("Created [a].");
        status.warning("careful");
        status.status("Created [b].");

        assert_eq!(status.lines(), vec!["Created [a].", "Created [b]."]);
        assert_eq!(status.warnings(), vec!["careful"]);
    }
}
