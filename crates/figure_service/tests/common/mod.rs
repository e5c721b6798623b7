//! In-process stand-in for a browser worker.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::anyhow;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use figure_service::{
    ActivityClock, FigureRegistry, FigureService, RenderSettings, ShutdownSignal,
};
use figure_worker::{
    CaptureRequest, NavigationReport, SessionFuture, SessionMode, WorkerSession,
};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder as _};
use lopdf::{Document as LoDocument, Object as LoObject, dictionary};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::sleep;

/// What the fake saw, shared with the test after the session is boxed.
#[derive(Clone, Default)]
pub struct FakeProbe {
    calls: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    captures: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether two operations were ever in flight at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

pub struct FakeSession {
    mode: SessionMode,
    probe: FakeProbe,
    snapshot: JsonValue,
    navigation: NavigationReport,
    op_delay: Duration,
    close_delay: Duration,
    fail_capture: bool,
}

impl FakeSession {
    pub fn new() -> (Self, FakeProbe) {
        let probe = FakeProbe::default();
        (
            Self {
                mode: SessionMode::Attached,
                probe: probe.clone(),
                snapshot: JsonValue::Null,
                navigation: NavigationReport {
                    ok: true,
                    failed_resource_urls: Vec::new(),
                },
                op_delay: Duration::ZERO,
                close_delay: Duration::ZERO,
                fail_capture: false,
            },
            probe,
        )
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Geometry the layout probe will report, as the probe's JSON string.
    pub fn with_snapshot(mut self, snapshot: &JsonValue) -> Self {
        self.snapshot = JsonValue::String(snapshot.to_string());
        self
    }

    pub fn with_navigation(mut self, report: NavigationReport) -> Self {
        self.navigation = report;
        self
    }

    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    /// Make `close` take `delay` before the session counts as closed.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    async fn enter(&self, call: String) {
        if self.probe.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.probe.overlapped.store(true, Ordering::SeqCst);
        }
        self.probe.record(call);
        if !self.op_delay.is_zero() {
            sleep(self.op_delay).await;
        }
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let pixels = vec![255u8; (width * height * 4) as usize];
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(&pixels, width, height, ColorType::Rgba8.into())?;
    Ok(buf)
}

/// A minimal PDF stamped with a per-capture date, like a real worker.
pub fn pdf_bytes(width: u32, height: u32, stamp: usize) -> anyhow::Result<Vec<u8>> {
    let mut doc = LoDocument::with_version("1.4");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), i64::from(width).into(), i64::from(height).into()],
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    let date = format!("D:2025010100{:04}Z", stamp % 10_000);
    let info_id = doc.add_object(dictionary! {
        "CreationDate" => LoObject::string_literal(date.clone()),
        "ModDate" => LoObject::string_literal(date),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

impl WorkerSession for FakeSession {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    fn resize_surface(&self, width: u32, height: u32) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            self.enter(format!("resize {width}x{height}")).await;
            Ok(())
        })
    }

    fn load_content<'session>(
        &'session self,
        html: &'session str,
    ) -> SessionFuture<'session, ()> {
        Box::pin(async move {
            self.enter(format!("load {} bytes", html.len())).await;
            Ok(())
        })
    }

    fn capture(&self, request: CaptureRequest) -> SessionFuture<'_, Vec<u8>> {
        Box::pin(async move {
            let count = self.probe.captures.fetch_add(1, Ordering::SeqCst);
            match request {
                CaptureRequest::Raster {
                    width,
                    height,
                    scale,
                } => {
                    self.enter(format!("capture raster {width}x{height}@{scale}")).await;
                    if self.fail_capture {
                        return Err(anyhow!("surface crashed"));
                    }
                    let factor = scale.round() as u32;
                    png_bytes(width * factor, height * factor)
                }
                CaptureRequest::Paginated { width, height } => {
                    self.enter(format!("capture paginated {width}x{height}")).await;
                    if self.fail_capture {
                        return Err(anyhow!("surface crashed"));
                    }
                    pdf_bytes(width, height, count)
                }
            }
        })
    }

    fn evaluate<'session>(
        &'session self,
        _script: &'session str,
    ) -> SessionFuture<'session, JsonValue> {
        Box::pin(async move {
            self.enter("evaluate".to_owned()).await;
            Ok(self.snapshot.clone())
        })
    }

    fn navigate<'session>(
        &'session self,
        url: &'session str,
    ) -> SessionFuture<'session, NavigationReport> {
        Box::pin(async move {
            self.enter(format!("navigate {url}")).await;
            Ok(self.navigation.clone())
        })
    }

    fn close(self: Box<Self>) -> SessionFuture<'static, ()> {
        Box::pin(async move {
            self.probe.record("close".to_owned());
            if !self.close_delay.is_zero() {
                sleep(self.close_delay).await;
            }
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// A service over `session` and `registry` with default settings.
pub fn service_with(session: FakeSession, registry: Arc<FigureRegistry>) -> FigureService {
    FigureService::new(
        Box::new(session),
        registry,
        RenderSettings::default(),
        ActivityClock::new(),
        ShutdownSignal::new(),
    )
}

/// An SVG of the given size containing `body`.
pub fn svg(width: u32, height: u32, body: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\">{body}</svg>"
    )
}
