//! Caller-visible error envelope.
//!
//! Failures that callers need to see are values, not panics or opaque errors:
//! a [`TaskError`] is `{message, status}` on the wire so it can be cached in
//! place of a result and replayed without re-running the failing operation.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No code at the address, nothing resolved, no result yet.
    NotFound,
    /// Malformed address, slot, topic or selector.
    BadInput,
    /// The engine or an external provider failed.
    UpstreamFailure,
    /// A required endpoint or credential is not configured.
    ConfigurationMissing,
}

impl ErrorKind {
    /// Default status code for the kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::BadInput => 400,
            ErrorKind::UpstreamFailure => 500,
            ErrorKind::ConfigurationMissing => 500,
        }
    }

    /// Best guess for envelopes that arrive with a status but no kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorKind::NotFound,
            400..=499 => ErrorKind::BadInput,
            _ => ErrorKind::UpstreamFailure,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::BadInput => "bad input",
            ErrorKind::UpstreamFailure => "upstream failure",
            ErrorKind::ConfigurationMissing => "configuration missing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EnvelopeRepr")]
pub struct TaskError {
    pub message: String,
    pub status: u16,
    pub kind: ErrorKind,
}

/// Wire form; external engines send `{message, status}` only.
#[derive(Deserialize)]
struct EnvelopeRepr {
    message: String,
    status: u16,
    #[serde(default)]
    kind: Option<ErrorKind>,
}

impl From<EnvelopeRepr> for TaskError {
    fn from(repr: EnvelopeRepr) -> Self {
        Self {
            kind: repr.kind.unwrap_or_else(|| ErrorKind::from_status(repr.status)),
            message: repr.message,
            status: repr.status,
        }
    }
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: kind.status(),
            kind,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    /// An analysis engine failure (status 500).
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamFailure, message)
    }

    /// A chain-state or signature provider failure (status 502).
    pub fn provider_failure(message: impl Into<String>) -> Self {
        Self {
            status: 502,
            ..Self::new(ErrorKind::UpstreamFailure, message)
        }
    }

    pub fn configuration_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationMissing, message)
    }

    /// Recover an envelope carried through `anyhow`, or classify the error as
    /// an engine failure.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<TaskError>() {
            Ok(task_error) => task_error,
            Err(other) => Self::engine_failure(format!("{:#}", other)),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for TaskError {}
