//! Client side of the figure service.
//!
//! Every call runs under two limits. Past the soft limit a finished job is
//! only logged as slow; at the hard limit the job is abandoned, recorded in
//! the hang log, and the service process is restarted so the next job gets a
//! fresh worker surface.

pub mod client;
pub mod config;
pub mod error;
/// Append-only record of slow and hung jobs
pub mod hang;
pub mod transport;

pub use client::{BatchOutcome, PageLoad, RenderClient, ServiceStatus};
pub use config::ClientConfig;
pub use error::ClientError;
pub use hang::{HangLog, HangRecord};
pub use transport::{TcpTransport, Transport, TransportFuture};
