//! Lifecycle signal vocabulary and signal provenance

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle signals emitted by the task runtime.
///
/// A well-behaved task traverses `Enqueued -> Executing -> Complete`. The
/// remaining variants are terminal outcomes; `Unknown` is synthesized by the
/// startup reconciler for tasks whose worker died without a final signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSignal {
    Enqueued,
    Executing,
    Complete,
    Error,
    Canceled,
    Expired,
    Revoked,
    Interrupted,
    Unknown,
}

impl TaskSignal {
    /// True once the task no longer waits or runs.
    ///
    /// Terminal does not mean successful: `Error`, `Canceled`, `Expired`,
    /// `Revoked` and `Interrupted` are just as final as `Complete`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Enqueued | Self::Executing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Interrupted => "interrupted",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TaskSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown signal name: {0}")]
pub struct ParseSignalError(String);

impl std::str::FromStr for TaskSignal {
    type Err = ParseSignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(Self::Enqueued),
            "executing" => Ok(Self::Executing),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "canceled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "interrupted" => Ok(Self::Interrupted),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseSignalError(other.to_string())),
        }
    }
}

/// Host/process/thread that observed a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub hostname: String,
    pub pid: u32,
    pub thread_name: String,
}

impl Provenance {
    /// Capture the provenance of the current process and thread.
    pub fn capture() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            hostname,
            pid: std::process::id(),
            thread_name: std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string(),
        }
    }
}

/// Structured exception data captured by the runtime for `error` signals.
///
/// Stored verbatim; taskwatch never interprets or re-raises it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// One-line summary (the exception message).
    pub summary: String,
    /// Full traceback, if available.
    pub detail: Option<String>,
}

impl ExceptionInfo {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_terminal_signals() {
        assert!(!TaskSignal::Enqueued.is_terminal());
        assert!(!TaskSignal::Executing.is_terminal());
        assert!(TaskSignal::Complete.is_terminal());
        assert!(TaskSignal::Error.is_terminal());
        assert!(TaskSignal::Canceled.is_terminal());
        assert!(TaskSignal::Expired.is_terminal());
        assert!(TaskSignal::Revoked.is_terminal());
        assert!(TaskSignal::Interrupted.is_terminal());
        assert!(TaskSignal::Unknown.is_terminal());
    }

    #[test]
    fn test_signal_round_trip() {
        for name in [
            "enqueued",
            "executing",
            "complete",
            "error",
            "canceled",
            "expired",
            "revoked",
            "interrupted",
            "unknown",
        ] {
            let signal = TaskSignal::from_str(name).unwrap();
            assert_eq!(signal.to_string(), name);
        }

        assert!(TaskSignal::from_str("retrying").is_err());
    }

    #[test]
    fn test_provenance_capture() {
        let provenance = Provenance::capture();
        assert!(!provenance.hostname.is_empty());
        assert!(provenance.pid > 0);
    }
}
