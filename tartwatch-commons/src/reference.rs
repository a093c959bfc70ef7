//! In-memory adapters for tests and embedding.

use anyhow::{Error, Result};
use parking_lot::Mutex;

use crate::errors::ErrorReporter;

/// Collects captured errors as rendered strings.
#[derive(Debug, Default)]
pub struct MemoryErrorReporter {
    captured: Mutex<Vec<String>>,
}

impl MemoryErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything captured so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.captured.lock())
    }

    pub fn len(&self) -> usize {
        self.captured.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.lock().is_empty()
    }
}

impl ErrorReporter for MemoryErrorReporter {
    fn capture(&self, error: &Error) -> Result<()> {
        self.captured.lock().push(format!("{error:#}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_full_context_chain() {
        let reporter = MemoryErrorReporter::new();
        reporter
            .capture(&Error::msg("bad frame").context("push channel"))
            .expect("capture");
        reporter.capture_message("poll failed").expect("capture");

        assert_eq!(reporter.len(), 2);
        assert_eq!(
            reporter.take(),
            vec!["push channel: bad frame".to_string(), "poll failed".to_string()]
        );
        assert!(reporter.is_empty());
    }
}
