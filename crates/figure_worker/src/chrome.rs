use anyhow::{Context as _, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chromiumoxide::Handler;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, PrintToPdfParams, Viewport,
};
use chromiumoxide::page::Page;
use futures::{FutureExt as _, StreamExt as _};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::config::WorkerConfig;
use crate::session::{CaptureRequest, NavigationReport, SessionFuture, SessionMode, WorkerSession};
use crate::supervised::find_chrome_executable;

/// Flags shared by owned and supervised workers. Scrollbars are hidden and
/// the device scale is pinned so surface size equals document size.
pub(crate) const RENDER_FLAGS: &[&str] = &[
    "--force-device-scale-factor=1",
    "--hide-scrollbars",
    "--disable-gpu",
    "--disable-features=OverlayScrollbar",
    "--allow-file-access-from-files",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--force-color-profile=sRGB",
    "--font-render-hinting=none",
];

/// CSS pixels per inch, used to express page sizes for PDF export.
const CSS_PX_PER_INCH: f64 = 96.0;

/// Time allowed for late network events after navigation settles.
const NAVIGATION_SETTLE: Duration = Duration::from_millis(250);

/// A Chromium page driven over the DevTools protocol.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    mode: SessionMode,
    handler: JoinHandle<()>,
}

/// Drive the browser's event loop until the connection goes away.
fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                debug!("[WORKER] browser event error: {err}");
            }
        }
        debug!("[WORKER] browser handler stream ended");
    })
}

impl ChromeSession {
    /// Connect to an externally supervised worker and open a fresh page.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing answers on the control endpoint.
    pub async fn attach(config: &WorkerConfig) -> Result<Self> {
        let start = Instant::now();
        let connected = timeout(config.launch_timeout, Browser::connect(config.endpoint.clone()))
            .await
            .map_err(|_| anyhow!("worker at {} did not answer in time", config.endpoint))?;
        let (browser, handler) = connected
            .with_context(|| format!("no worker reachable at {}", config.endpoint))?;
        let handler = spawn_handler(handler);
        let page = browser.new_page("about:blank").await?;
        info!(
            "[WORKER] attached to {} in {:?}",
            config.endpoint,
            start.elapsed()
        );
        Ok(Self {
            browser,
            page,
            mode: SessionMode::Attached,
            handler,
        })
    }

    /// Launch a worker owned by this session.
    ///
    /// # Errors
    ///
    /// Returns an error if no browser binary is found or it fails to start.
    pub async fn launch(config: &WorkerConfig) -> Result<Self> {
        let start = Instant::now();
        let executable = match &config.chrome_executable {
            Some(path) => path.clone(),
            None => find_chrome_executable()?,
        };
        let (width, height) = config.window_size;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .no_sandbox()
            .window_size(width, height);
        for flag in RENDER_FLAGS {
            builder = builder.arg(*flag);
        }
        let browser_config = builder
            .build()
            .map_err(|err| anyhow!("Browser config error: {err}"))?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch owned worker")?;
        let handler = spawn_handler(handler);
        let page = browser.new_page("about:blank").await?;
        info!("[WORKER] launched owned worker in {:?}", start.elapsed());
        Ok(Self {
            browser,
            page,
            mode: SessionMode::Owned,
            handler,
        })
    }

    /// Prefer the supervised worker; fall back to launching one.
    ///
    /// # Errors
    ///
    /// Returns an error only if both attaching and launching fail.
    pub async fn connect_or_launch(config: &WorkerConfig) -> Result<Self> {
        match Self::attach(config).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!("[WORKER] {err:#}; launching an owned worker instead");
                Self::launch(config).await
            }
        }
    }

    async fn capture_png(&self, width: u32, height: u32, scale: f64) -> Result<Vec<u8>> {
        let clip = Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(f64::from(width))
            .height(f64::from(height))
            .scale(scale)
            .build()
            .map_err(|err| anyhow!("Failed to build clip region: {err}"))?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(clip)
            .from_surface(true)
            .build();
        let response = self.page.execute(params).await?;
        let base64_str: &str = response.data.as_ref();
        BASE64_STANDARD
            .decode(base64_str)
            .map_err(|err| anyhow!("Failed to decode base64 screenshot: {err}"))
    }

    async fn print_pdf(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .print_background(true)
            .scale(1.0)
            .paper_width(f64::from(width) / CSS_PX_PER_INCH)
            .paper_height(f64::from(height) / CSS_PX_PER_INCH)
            .margin_top(0.0)
            .margin_bottom(0.0)
            .margin_left(0.0)
            .margin_right(0.0)
            .page_ranges("1")
            .prefer_css_page_size(false)
            .build();
        Ok(self.page.pdf(params).await?)
    }

    async fn navigate_and_collect(&self, url: &str) -> Result<NavigationReport> {
        let mut requests = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let mut failures = self.page.event_listener::<EventLoadingFailed>().await?;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;

        let target = Url::parse(url).with_context(|| format!("invalid URL `{url}`"))?;
        let ok = match self.page.goto(target.as_str()).await {
            Ok(_) => true,
            Err(err) => {
                warn!("[WORKER] navigation to {url} failed: {err}");
                false
            }
        };
        sleep(NAVIGATION_SETTLE).await;

        let mut urls_by_request = HashMap::new();
        while let Some(Some(event)) = requests.next().now_or_never() {
            urls_by_request.insert(event.request_id.inner().clone(), event.request.url.clone());
        }

        let mut failed_resource_urls = Vec::new();
        while let Some(Some(event)) = failures.next().now_or_never() {
            let failed_url = urls_by_request
                .get(event.request_id.inner())
                .cloned()
                .unwrap_or_else(|| format!("<request {}>", event.request_id.inner()));
            debug!("[WORKER] resource failed: {failed_url} ({})", event.error_text);
            failed_resource_urls.push(failed_url);
        }
        while let Some(Some(event)) = responses.next().now_or_never() {
            if event.response.status >= 400 {
                debug!(
                    "[WORKER] resource answered {}: {}",
                    event.response.status, event.response.url
                );
                failed_resource_urls.push(event.response.url.clone());
            }
        }
        failed_resource_urls.sort();
        failed_resource_urls.dedup();

        Ok(NavigationReport {
            ok,
            failed_resource_urls,
        })
    }
}

impl WorkerSession for ChromeSession {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    fn resize_surface(&self, width: u32, height: u32) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            let viewport_params = SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(width))
                .height(i64::from(height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|err| anyhow!("Failed to build viewport params: {err}"))?;
            self.page.execute(viewport_params).await?;
            Ok(())
        })
    }

    fn load_content<'session>(
        &'session self,
        html: &'session str,
    ) -> SessionFuture<'session, ()> {
        Box::pin(async move {
            self.page.set_content(html).await?;
            // Layout is only final once web fonts have resolved.
            self.page.evaluate("document.fonts.ready.then(() => true)").await?;
            Ok(())
        })
    }

    fn capture(&self, request: CaptureRequest) -> SessionFuture<'_, Vec<u8>> {
        Box::pin(async move {
            match request {
                CaptureRequest::Raster {
                    width,
                    height,
                    scale,
                } => self.capture_png(width, height, scale).await,
                CaptureRequest::Paginated { width, height } => self.print_pdf(width, height).await,
            }
        })
    }

    fn evaluate<'session>(
        &'session self,
        script: &'session str,
    ) -> SessionFuture<'session, JsonValue> {
        Box::pin(async move {
            let result = self.page.evaluate(script).await?;
            Ok(result.value().cloned().unwrap_or(JsonValue::Null))
        })
    }

    fn navigate<'session>(
        &'session self,
        url: &'session str,
    ) -> SessionFuture<'session, NavigationReport> {
        Box::pin(self.navigate_and_collect(url))
    }

    fn close(self: Box<Self>) -> SessionFuture<'static, ()> {
        Box::pin(async move {
            let Self {
                mut browser,
                page,
                mode,
                handler,
            } = *self;
            if let Err(err) = page.close().await {
                warn!("[WORKER] failed to close surface: {err}");
            }
            if mode == SessionMode::Owned {
                browser.close().await?;
                let _exit_status = browser.wait().await?;
                info!("[WORKER] owned worker terminated");
            } else {
                info!("[WORKER] detached from supervised worker");
            }
            handler.abort();
            Ok(())
        })
    }
}
