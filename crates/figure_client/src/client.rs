//! Job submission with two-tier hang detection.

use core::time::Duration;
use figure_layout::CheckReport;
use figure_service::{CheckJob, JobError, LoadUrlJob, RenderJob, Request, Response};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::hang::{HangLog, HangRecord, SLOW_COMPLETED};
use crate::transport::Transport;

/// What `status` reports about the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub ready: bool,
    pub figure_ids: Vec<String>,
}

/// What loading an external page reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLoad {
    pub ok: bool,
    pub failed_resource_urls: Vec<String>,
}

/// Results of a batch, one entry per submitted job.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Labels of jobs that succeeded, in submission order.
    pub completed: Vec<String>,
    /// Labels and errors of jobs that failed, in submission order.
    pub errors: Vec<(String, ClientError)>,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Process exit status for the batch: 0 only if every job succeeded.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.is_success())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn unexpected(label: &str, response: &Response) -> ClientError {
    ClientError::Protocol(format!("{label}: unexpected response {response:?}"))
}

pub struct RenderClient {
    transport: Box<dyn Transport>,
    soft_timeout: Duration,
    hard_timeout: Duration,
    hangs: HangLog,
}

impl RenderClient {
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            soft_timeout: config.soft_timeout,
            hard_timeout: config.hard_timeout,
            hangs: HangLog::new(config.hang_log.clone()),
        }
    }

    #[must_use]
    pub const fn hang_log(&self) -> &HangLog {
        &self.hangs
    }

    fn record(&self, record: &HangRecord) {
        if let Err(err) = self.hangs.append(record) {
            warn!(
                "[HANG] could not append to {}: {err:#}",
                self.hangs.path().display()
            );
        }
    }

    /// Send one request under the soft and hard limits.
    ///
    /// A request that finishes after the soft limit is logged as slow and its
    /// result returned as usual. A request still pending at the hard limit is
    /// abandoned, logged, and followed by a restart of the service.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TimedOut`] at the hard limit,
    /// [`ClientError::JobFailed`] for error responses, and transport errors
    /// as they occur.
    pub async fn call(&self, label: &str, request: &Request) -> Result<Response, ClientError> {
        let started = Instant::now();
        let outcome = timeout(self.hard_timeout, self.transport.send(request)).await;
        let waited_ms = millis(started.elapsed());

        let Ok(result) = outcome else {
            let err = ClientError::TimedOut {
                job_id: label.to_owned(),
                waited_ms,
            };
            error!("[CLIENT] {err}");
            self.record(&HangRecord::now(label, waited_ms, err.to_string()));
            match self.transport.restart().await {
                Ok(()) => info!("[CLIENT] restart ok"),
                Err(restart_err) => error!("[CLIENT] restart failed: {restart_err}"),
            }
            return Err(err);
        };

        if started.elapsed() > self.soft_timeout {
            warn!("[CLIENT] {label} took {waited_ms}ms");
            self.record(&HangRecord::now(label, waited_ms, SLOW_COMPLETED));
        }
        result?.into_result().map_err(ClientError::JobFailed)
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn status(&self) -> Result<ServiceStatus, ClientError> {
        let request = Request::Status;
        match self.call(&request.label(), &request).await? {
            Response::Status { ready, figure_ids } => Ok(ServiceStatus { ready, figure_ids }),
            other => Err(unexpected("status", &other)),
        }
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn render(&self, job: RenderJob) -> Result<(), ClientError> {
        let request = Request::Render {
            figure_id: job.figure_id,
            output_target: job.output_target,
            format: job.format,
            reload: job.reload,
        };
        let label = request.label();
        match self.call(&label, &request).await? {
            Response::Rendered { ok: true } => Ok(()),
            Response::Rendered { ok: false } => Err(ClientError::JobFailed(JobError::RenderError(
                format!("{label}: service reported no artifact"),
            ))),
            other => Err(unexpected(&label, &other)),
        }
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn check(&self, job: CheckJob) -> Result<CheckReport, ClientError> {
        let request = Request::Check {
            figure_id: job.figure_id,
            screenshot_target: job.screenshot_target,
            reload: job.reload,
        };
        let label = request.label();
        match self.call(&label, &request).await? {
            Response::Checked(report) => Ok(report),
            other => Err(unexpected(&label, &other)),
        }
    }

    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn load_url(&self, job: LoadUrlJob) -> Result<PageLoad, ClientError> {
        let request = Request::LoadExternalUrl {
            url: job.url,
            screenshot_target: job.screenshot_target,
        };
        let label = request.label();
        match self.call(&label, &request).await? {
            Response::Loaded {
                ok,
                failed_resource_urls,
            } => Ok(PageLoad {
                ok,
                failed_resource_urls,
            }),
            other => Err(unexpected(&label, &other)),
        }
    }

    /// Ask the service to stop. Returns `false` if nothing was listening.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn shutdown(&self) -> Result<bool, ClientError> {
        let request = Request::Shutdown;
        match self.call(&request.label(), &request).await {
            Ok(Response::ShuttingDown) => Ok(true),
            Ok(other) => Err(unexpected("shutdown", &other)),
            Err(ClientError::Unreachable { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Render `jobs` one after another. A failed or hung job is recorded and
    /// the batch moves on.
    pub async fn render_batch(&self, jobs: Vec<RenderJob>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let total = jobs.len();
        for (index, job) in jobs.into_iter().enumerate() {
            let label = format!("{} ({})", job.figure_id, job.format.extension());
            match self.render(job).await {
                Ok(()) => {
                    info!("[CLIENT] [{}/{total}] {label} ok", index + 1);
                    outcome.completed.push(label);
                }
                Err(err) => {
                    warn!("[CLIENT] [{}/{total}] {label} failed: {err}", index + 1);
                    outcome.errors.push((label, err));
                }
            }
        }
        outcome
    }
}
