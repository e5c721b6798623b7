//! The capability interface every worker backend implements.

use anyhow::Error;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Boxed future returned by [`WorkerSession`] operations.
pub type SessionFuture<'session, T> =
    Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'session>>;

/// How the session relates to the worker process behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Connected to an externally supervised worker; closing leaves it running.
    Attached,
    /// Worker launched by this session; closing terminates it.
    Owned,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached => formatter.write_str("attached"),
            Self::Owned => formatter.write_str("owned"),
        }
    }
}

/// What to capture from the loaded surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureRequest {
    /// PNG of the `width` x `height` region at `scale` device pixels per unit.
    Raster { width: u32, height: u32, scale: f64 },
    /// Single-page PDF whose page is exactly `width` x `height`, no margins.
    Paginated { width: u32, height: u32 },
}

/// Outcome of loading an external URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationReport {
    /// Whether the top-level navigation itself succeeded.
    pub ok: bool,
    /// Sub-resources that failed to load or answered with an error status.
    pub failed_resource_urls: Vec<String>,
}

/// One persistent automation context.
///
/// Implementations perform no locking of their own: callers must route every
/// operation through a single serializer so that at most one operation is in
/// flight at a time.
pub trait WorkerSession: Send + Sync {
    fn mode(&self) -> SessionMode;

    /// Set the content surface to exactly `width` x `height` at 1x scale.
    fn resize_surface(&self, width: u32, height: u32) -> SessionFuture<'_, ()>;

    /// Replace the surface content with `html` and wait until it has loaded.
    fn load_content<'session>(&'session self, html: &'session str)
    -> SessionFuture<'session, ()>;

    /// Capture the loaded surface.
    fn capture(&self, request: CaptureRequest) -> SessionFuture<'_, Vec<u8>>;

    /// Evaluate a read-only script and return its JSON result.
    fn evaluate<'session>(&'session self, script: &'session str)
    -> SessionFuture<'session, JsonValue>;

    /// Navigate the surface to an external URL, reporting failed resources.
    fn navigate<'session>(&'session self, url: &'session str)
    -> SessionFuture<'session, NavigationReport>;

    /// Release the session. Attached sessions close their surface only;
    /// owned sessions terminate the worker process.
    fn close(self: Box<Self>) -> SessionFuture<'static, ()>;
}
