//! The warning side channel for degraded mappings.
//!
//! Every sub-mapper reports recoverable problems through an injected
//! [`MappingLogger`]. The same message is also emitted as a `tracing` event so
//! that process-level subscribers see it.

use std::error::Error;
use std::sync::{Mutex, PoisonError};

/// Receives warnings for mappings that succeeded with lost or coerced data.
pub trait MappingLogger: Send + Sync {
    fn log_warning(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Discards every warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl MappingLogger for NullLogger {
    fn log_warning(&self, _message: &str, _cause: Option<&(dyn Error + 'static)>) {}
}

/// Keeps warnings in memory so the caller can attach them to a sync report.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    warnings: Mutex<Vec<String>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings collected so far, in order of arrival.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// True if any collected warning contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|w| w.contains(needle))
    }
}

impl MappingLogger for CollectingLogger {
    fn log_warning(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        let entry = match cause {
            Some(cause) => format!("{message}: {cause}"),
            None => message.to_string(),
        };
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

pub(crate) fn warn(logger: &dyn MappingLogger, message: &str) {
    tracing::warn!(target: "calbridge", "{message}");
    logger.log_warning(message, None);
}

pub(crate) fn warn_with_cause(
    logger: &dyn MappingLogger,
    message: &str,
    cause: &(dyn Error + 'static),
) {
    tracing::warn!(target: "calbridge", error = %cause, "{message}");
    logger.log_warning(message, Some(cause));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;

    #[test]
    fn test_collecting_logger_keeps_order_and_cause() {
        let logger = CollectingLogger::new();
        warn(&logger, "first");
        let cause = HostError::NotRecurring;
        warn_with_cause(&logger, "second", &cause);

        assert_eq!(
            logger.warnings(),
            vec![
                "first".to_string(),
                "second: item has no recurrence pattern".to_string()
            ]
        );
        assert!(logger.contains("second"));
    }

    #[test]
    fn test_null_logger_accepts_everything() {
        let logger = NullLogger;
        warn(&logger, "ignored");
    }
}
