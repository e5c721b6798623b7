//! Figure render orchestrator.
//!
//! Owns one worker session and runs render, check and page-load jobs against
//! it strictly one at a time. Figure modules are loaded once and cached until
//! a caller asks for a reload. The process shuts itself down after a quiet
//! period; clients restart it on demand.

pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod figure;
/// Idle supervision and the shared shutdown signal
pub mod idle;
/// Timestamp normalization for paginated output
pub mod pdf;
pub mod probe;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod service;

pub use config::ServiceConfig;
pub use error::{ErrorKind, JobError};
pub use executor::{CheckJob, LoadUrlJob, OutputFormat, RenderJob, RenderSettings, Workspace};
pub use figure::{FigureCache, FigureDirectory, FigureLoader, FigureModule, FigureRegistry};
pub use idle::{ActivityClock, IdleSupervisor, ShutdownSignal};
pub use protocol::{Request, Response};
pub use queue::JobQueue;
pub use service::FigureService;
