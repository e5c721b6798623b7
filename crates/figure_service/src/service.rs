//! The operations the orchestrator exposes.

use figure_layout::CheckReport;
use figure_worker::{NavigationReport, WorkerSession};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::JobError;
use crate::executor::{self, CheckJob, LoadUrlJob, RenderJob, RenderSettings, Workspace};
use crate::figure::{FigureCache, FigureLoader};
use crate::idle::{ActivityClock, ShutdownSignal};
use crate::protocol::{Request, Response};
use crate::queue::JobQueue;

/// Job queue, module cache and worker session behind one façade.
pub struct FigureService {
    queue: JobQueue<Workspace>,
    loader: Arc<dyn FigureLoader>,
    clock: ActivityClock,
    shutdown: ShutdownSignal,
    closing: AtomicBool,
    /// Fires once the queue has drained and the session is closed.
    released: ShutdownSignal,
}

impl FigureService {
    /// Take ownership of `session` and start the job queue. Must be called
    /// inside a tokio runtime.
    pub fn new(
        session: Box<dyn WorkerSession>,
        loader: Arc<dyn FigureLoader>,
        settings: RenderSettings,
        clock: ActivityClock,
        shutdown: ShutdownSignal,
    ) -> Self {
        info!("[QUEUE] service starting with a {} session", session.mode());
        let figures = FigureCache::new(Arc::clone(&loader));
        let queue = JobQueue::new(Workspace::new(session, figures, settings));
        clock.touch();
        Self {
            queue,
            loader,
            clock,
            shutdown,
            closing: AtomicBool::new(false),
            released: ShutdownSignal::new(),
        }
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn activity(&self) -> ActivityClock {
        self.clock.clone()
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.queue.is_open() && !self.shutdown.is_triggered()
    }

    /// Readiness and the figures available to render. Answered without
    /// queueing, so it never waits behind a running job.
    #[must_use]
    pub fn status(&self) -> Response {
        Response::Status {
            ready: self.is_ready(),
            figure_ids: self.loader.list_ids(),
        }
    }

    fn admit(&self) -> Result<(), JobError> {
        if self.shutdown.is_triggered() {
            return Err(JobError::SessionUnavailable(
                "service is shutting down".to_owned(),
            ));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// See [`executor::render`]; `SessionUnavailable` once shutdown began.
    pub async fn render(&self, job: RenderJob) -> Result<(), JobError> {
        self.admit()?;
        let _busy = self.clock.begin_job();
        self.queue
            .enqueue(move |workspace| Box::pin(async move { executor::render(workspace, &job).await }))
            .await
    }

    /// # Errors
    ///
    /// See [`executor::check`]; `SessionUnavailable` once shutdown began.
    pub async fn check(&self, job: CheckJob) -> Result<CheckReport, JobError> {
        self.admit()?;
        let _busy = self.clock.begin_job();
        self.queue
            .enqueue(move |workspace| Box::pin(async move { executor::check(workspace, &job).await }))
            .await
    }

    /// # Errors
    ///
    /// See [`executor::load_url`]; `SessionUnavailable` once shutdown began.
    pub async fn load_url(&self, job: LoadUrlJob) -> Result<NavigationReport, JobError> {
        self.admit()?;
        let _busy = self.clock.begin_job();
        self.queue
            .enqueue(move |workspace| {
                Box::pin(async move { executor::load_url(workspace, &job).await })
            })
            .await
    }

    /// Stop taking jobs, let queued ones finish and release the worker
    /// session. Safe to call any number of times; every call returns only
    /// once the session has been released.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("[QUEUE] shutdown requested; draining {} jobs", self.queue.len());
        }
        if self.closing.swap(true, Ordering::SeqCst) {
            self.released.wait().await;
            return;
        }
        if let Some(workspace) = self.queue.close().await {
            let mode = workspace.session.mode();
            if let Err(err) = workspace.session.close().await {
                warn!("[WORKER] closing {mode} session failed: {err:#}");
            } else {
                info!("[WORKER] {mode} session closed");
            }
        }
        self.released.trigger();
    }

    /// Whether shutdown has finished releasing the session.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.is_triggered()
    }

    /// Dispatch one wire request.
    pub async fn handle(&self, request: Request) -> Response {
        let outcome = match request {
            Request::Status => return self.status(),
            Request::Shutdown => {
                self.shutdown().await;
                return Response::ShuttingDown;
            }
            Request::Render {
                figure_id,
                output_target,
                format,
                reload,
            } => self
                .render(RenderJob {
                    figure_id,
                    output_target,
                    format,
                    reload,
                })
                .await
                .map(|()| Response::Rendered { ok: true }),
            Request::Check {
                figure_id,
                screenshot_target,
                reload,
            } => self
                .check(CheckJob {
                    figure_id,
                    screenshot_target,
                    reload,
                })
                .await
                .map(Response::Checked),
            Request::LoadExternalUrl {
                url,
                screenshot_target,
            } => self
                .load_url(LoadUrlJob {
                    url,
                    screenshot_target,
                })
                .await
                .map(|report| Response::Loaded {
                    ok: report.ok,
                    failed_resource_urls: report.failed_resource_urls,
                }),
        };
        outcome.unwrap_or_else(|err| {
            warn!("[QUEUE] job failed: {err}");
            Response::from(&err)
        })
    }
}
