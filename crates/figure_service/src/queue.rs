//! Strict FIFO, single-flight job execution.
//!
//! The queue owns the job-mutable state (the worker session and the module
//! cache) inside one background task. Jobs borrow it one at a time, in
//! submission order, so no job ever observes another job's half-finished
//! work. Every caller gets its own result back over a private channel; the
//! drive loop itself never looks at job outcomes and keeps going after a
//! job fails or panics.

use core::panic::AssertUnwindSafe;
use core::sync::atomic::{AtomicUsize, Ordering};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use log::{debug, error};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::spawn;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::JobError;

/// A queued job, type-erased over its result.
trait Job<S>: Send {
    fn run(self: Box<Self>, state: &mut S) -> BoxFuture<'_, ()>;
}

struct Pending<F, T> {
    task: F,
    reply: oneshot::Sender<Result<T, JobError>>,
}

impl<S, F, T> Job<S> for Pending<F, T>
where
    S: Send,
    T: Send + 'static,
    F: for<'state> FnOnce(&'state mut S) -> BoxFuture<'state, Result<T, JobError>> + Send + 'static,
{
    fn run(self: Box<Self>, state: &mut S) -> BoxFuture<'_, ()> {
        let Self { task, reply } = *self;
        Box::pin(async move {
            let result = task(state).await;
            // The caller may have stopped waiting; the job still counts as run.
            let _ignore = reply.send(result);
        })
    }
}

type BoxedJob<S> = Box<dyn Job<S>>;

/// Single-consumer job queue around a piece of exclusively owned state.
pub struct JobQueue<S> {
    intake: Mutex<Option<mpsc::UnboundedSender<BoxedJob<S>>>>,
    driver: Mutex<Option<JoinHandle<S>>>,
    pending: Arc<AtomicUsize>,
}

async fn drive<S: Send>(
    mut state: S,
    mut jobs: mpsc::UnboundedReceiver<BoxedJob<S>>,
    pending: Arc<AtomicUsize>,
) -> S {
    let mut sequence: u64 = 0;
    while let Some(job) = jobs.recv().await {
        sequence += 1;
        debug!("[QUEUE] running job #{sequence}");
        if AssertUnwindSafe(job.run(&mut state))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("[QUEUE] job #{sequence} panicked; continuing with the next job");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("[QUEUE] intake closed after {sequence} jobs");
    state
}

impl<S: Send + 'static> JobQueue<S> {
    /// Start the drive loop. Must be called inside a tokio runtime.
    pub fn new(state: S) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let driver = spawn(drive(state, receiver, Arc::clone(&pending)));
        Self {
            intake: Mutex::new(Some(sender)),
            driver: Mutex::new(Some(driver)),
            pending,
        }
    }

    /// Run `task` after every previously enqueued job has settled and return
    /// its result.
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` if the queue no longer accepts work, `RenderError`
    /// if the job panicked, otherwise whatever the task returned.
    pub async fn enqueue<T, F>(&self, task: F) -> Result<T, JobError>
    where
        T: Send + 'static,
        F: for<'state> FnOnce(&'state mut S) -> BoxFuture<'state, Result<T, JobError>>
            + Send
            + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        {
            let intake = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(sender) = intake.as_ref() else {
                return Err(JobError::SessionUnavailable(
                    "job queue is shutting down".to_owned(),
                ));
            };
            self.pending.fetch_add(1, Ordering::SeqCst);
            if sender.send(Box::new(Pending { task, reply })).is_err() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(JobError::SessionUnavailable(
                    "job queue drive loop has stopped".to_owned(),
                ));
            }
        }
        outcome.await.unwrap_or_else(|_| {
            Err(JobError::RenderError(
                "job aborted before producing a result".to_owned(),
            ))
        })
    }

    /// Jobs queued or running.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether new jobs are still accepted.
    pub fn is_open(&self) -> bool {
        self.intake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop accepting jobs, let the queued ones finish, and hand back the
    /// state. Returns `None` if the queue was already closed.
    pub async fn close(&self) -> Option<S> {
        drop(
            self.intake
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match driver.await {
            Ok(state) => Some(state),
            Err(err) => {
                error!("[QUEUE] drive loop ended abnormally: {err}");
                None
            }
        }
    }
}
