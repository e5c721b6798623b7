use core::fmt;
use figure_service::{ErrorKind, JobError};
use std::error::Error;

/// Why a client call produced no result.
///
/// The three operational cases are kept apart so a caller can tell
/// "nothing is listening" from "the job failed" from "the job hung".
#[derive(Debug)]
pub enum ClientError {
    /// Nothing answered at the service address.
    Unreachable { addr: String, reason: String },
    /// The service ran the job and it failed.
    JobFailed(JobError),
    /// No answer within the hard limit; the service has been restarted.
    TimedOut { job_id: String, waited_ms: u64 },
    /// The service answered with something unexpected.
    Protocol(String),
}

impl ClientError {
    /// The service-side error class this failure corresponds to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::SessionUnavailable,
            Self::JobFailed(err) => err.kind(),
            Self::TimedOut { .. } => ErrorKind::Timeout,
            Self::Protocol(_) => ErrorKind::RenderError,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { addr, reason } => write!(
                formatter,
                "figure service unreachable at {addr} ({reason}); start it with `figure-service serve`"
            ),
            Self::JobFailed(err) => write!(formatter, "job failed: {err}"),
            Self::TimedOut { job_id, waited_ms } => write!(
                formatter,
                "job timed out: `{job_id}` gave no answer within {waited_ms}ms; the service was restarted, retry the job"
            ),
            Self::Protocol(message) => write!(formatter, "unexpected reply from figure service: {message}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::JobFailed(err) => Some(err),
            Self::Unreachable { .. } | Self::TimedOut { .. } | Self::Protocol(_) => None,
        }
    }
}

impl From<JobError> for ClientError {
    fn from(value: JobError) -> Self {
        Self::JobFailed(value)
    }
}
