use core::fmt;
use std::error::Error;
use std::io;

use serde::{Deserialize, Serialize};

/// Stable error classes carried across the service boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    RenderError,
    MalformedDocument,
    Timeout,
    SessionUnavailable,
}

/// Why a job produced no result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobError {
    /// No figure module answers to this id.
    NotFound(String),
    /// The module threw, or the worker failed while producing output.
    RenderError(String),
    /// The module produced something that is not a usable document.
    MalformedDocument(String),
    /// The job did not settle within its hard limit.
    Timeout { waited_ms: u64 },
    /// The worker session cannot take jobs right now.
    SessionUnavailable(String),
}

impl JobError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RenderError(_) => ErrorKind::RenderError,
            Self::MalformedDocument(_) => ErrorKind::MalformedDocument,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::SessionUnavailable(_) => ErrorKind::SessionUnavailable,
        }
    }

    /// The variant payload, as sent over the wire next to [`Self::kind`].
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound(message)
            | Self::RenderError(message)
            | Self::MalformedDocument(message)
            | Self::SessionUnavailable(message) => message.clone(),
            Self::Timeout { waited_ms } => format!("{waited_ms}ms"),
        }
    }

    /// Rebuild an error received over the wire.
    #[must_use]
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::RenderError => Self::RenderError(message),
            ErrorKind::MalformedDocument => Self::MalformedDocument(message),
            ErrorKind::Timeout => Self::Timeout {
                waited_ms: message
                    .trim()
                    .strip_suffix("ms")
                    .and_then(|millis| millis.parse().ok())
                    .unwrap_or(0),
            },
            ErrorKind::SessionUnavailable => Self::SessionUnavailable(message),
        }
    }

    /// Wrap a worker or module failure, keeping the whole context chain.
    #[must_use]
    pub fn render(err: &anyhow::Error) -> Self {
        Self::RenderError(format!("{err:#}"))
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(figure_id) => write!(formatter, "figure not found: {figure_id}"),
            Self::RenderError(message) => write!(formatter, "render failed: {message}"),
            Self::MalformedDocument(message) => {
                write!(formatter, "malformed document: {message}")
            }
            Self::Timeout { waited_ms } => write!(formatter, "timed out after {waited_ms}ms"),
            Self::SessionUnavailable(message) => {
                write!(formatter, "worker session unavailable: {message}")
            }
        }
    }
}

impl Error for JobError {}

impl From<io::Error> for JobError {
    fn from(value: io::Error) -> Self {
        Self::RenderError(format!("io error: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_survives_the_wire() {
        let original = JobError::Timeout { waited_ms: 30_000 };
        let rebuilt = JobError::from_wire(original.kind(), original.detail());
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn display_does_not_repeat_over_the_wire() {
        let original = JobError::NotFound("charts/missing".to_owned());
        let rebuilt = JobError::from_wire(original.kind(), original.detail());
        assert_eq!(rebuilt.to_string(), "figure not found: charts/missing");
    }

    #[test]
    fn kinds_serialize_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&ErrorKind::SessionUnavailable)?,
            "\"session_unavailable\""
        );
        Ok(())
    }
}
