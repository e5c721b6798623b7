//! Wire format between the client and the service: one JSON object per line.

use figure_layout::CheckReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ErrorKind, JobError};
use crate::executor::OutputFormat;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Status,
    Render {
        figure_id: String,
        output_target: PathBuf,
        format: OutputFormat,
        #[serde(default)]
        reload: bool,
    },
    Check {
        figure_id: String,
        #[serde(default)]
        screenshot_target: Option<PathBuf>,
        #[serde(default)]
        reload: bool,
    },
    LoadExternalUrl {
        url: String,
        #[serde(default)]
        screenshot_target: Option<PathBuf>,
    },
    Shutdown,
}

impl Request {
    /// Short identifier used in logs and hang records.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Status => "status".to_owned(),
            Self::Render {
                figure_id, format, ..
            } => format!("render {figure_id} ({})", format.extension()),
            Self::Check { figure_id, .. } => format!("check {figure_id}"),
            Self::LoadExternalUrl { url, .. } => format!("load {url}"),
            Self::Shutdown => "shutdown".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Status {
        ready: bool,
        figure_ids: Vec<String>,
    },
    Rendered {
        ok: bool,
    },
    Checked(CheckReport),
    Loaded {
        ok: bool,
        failed_resource_urls: Vec<String>,
    },
    ShuttingDown,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl From<&JobError> for Response {
    fn from(err: &JobError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.detail(),
        }
    }
}

impl Response {
    /// Split error responses off into a [`JobError`].
    ///
    /// # Errors
    ///
    /// Returns the rebuilt job error for [`Response::Error`].
    pub fn into_result(self) -> Result<Self, JobError> {
        match self {
            Self::Error { kind, message } => Err(JobError::from_wire(kind, message)),
            other => Ok(other),
        }
    }
}
