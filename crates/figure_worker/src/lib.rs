//! Worker sessions for figure rendering.
//!
//! A [`WorkerSession`] is one persistent automation context inside a browser
//! process. Sessions come in two flavours that callers only distinguish at
//! construction time: attached to an externally supervised worker, or owning
//! a worker they launched themselves.

mod chrome;
pub mod config;
pub mod session;
/// Launching the externally supervised worker process
pub mod supervised;

pub use chrome::ChromeSession;
pub use config::WorkerConfig;
pub use session::{CaptureRequest, NavigationReport, SessionFuture, SessionMode, WorkerSession};
