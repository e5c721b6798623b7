//! Turning figure modules into artifacts and layout reports.
//!
//! Everything here runs inside a queued job and therefore has exclusive use
//! of the [`Workspace`].

use anyhow::{Context as _, Result, anyhow};
use figure_layout::{AnalyzerConfig, CheckReport, analyze};
use figure_worker::{CaptureRequest, NavigationReport, WorkerSession};
use image::codecs::png::PngEncoder;
use image::{
    ColorType, GenericImageView as _, ImageEncoder as _, ImageFormat, load_from_memory_with_format,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::create_dir_all;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

use crate::document::SizedDocument;
use crate::error::JobError;
use crate::figure::FigureCache;
use crate::pdf::normalize_timestamps;
use crate::probe::collect_snapshot;

/// Device pixels per document pixel for raster output.
pub const RASTER_SCALE: u32 = 2;

/// Artifact kinds a figure can be rendered to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// PNG at twice the document size.
    Raster,
    /// Single-page PDF with the page exactly the document size.
    Paginated,
    /// The produced SVG text, byte for byte.
    RawVector,
}

impl OutputFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Raster => "png",
            Self::Paginated => "pdf",
            Self::RawVector => "svg",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderJob {
    pub figure_id: String,
    pub output_target: PathBuf,
    pub format: OutputFormat,
    pub reload: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckJob {
    pub figure_id: String,
    pub screenshot_target: Option<PathBuf>,
    pub reload: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadUrlJob {
    pub url: String,
    pub screenshot_target: Option<PathBuf>,
}

/// Settings the executor needs for every job.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub default_size: (u32, u32),
    pub analyzer: AnalyzerConfig,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            default_size: (800, 600),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

/// The state a job borrows exclusively from the queue.
pub struct Workspace {
    pub session: Box<dyn WorkerSession>,
    pub figures: FigureCache,
    pub settings: RenderSettings,
}

impl Workspace {
    #[must_use]
    pub fn new(
        session: Box<dyn WorkerSession>,
        figures: FigureCache,
        settings: RenderSettings,
    ) -> Self {
        Self {
            session,
            figures,
            settings,
        }
    }

    /// Resolve the module, run it and size what it produced.
    fn produce(&mut self, figure_id: &str, reload: bool) -> Result<SizedDocument, JobError> {
        let module = self.figures.resolve(figure_id, reload)?;
        let svg = module.produce().map_err(|err| JobError::render(&err))?;
        SizedDocument::parse(svg, self.settings.default_size)
    }

    /// Size the surface to the document and load it.
    async fn present(&self, document: &SizedDocument) -> Result<()> {
        self.session
            .resize_surface(document.width, document.height)
            .await
            .context("resizing surface")?;
        self.session
            .load_content(&document.wrap_html())
            .await
            .context("loading document")?;
        Ok(())
    }

    async fn capture_raster(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let png = self
            .session
            .capture(CaptureRequest::Raster {
                width,
                height,
                scale: f64::from(RASTER_SCALE),
            })
            .await
            .context("capturing raster")?;
        fit_raster(png, width * RASTER_SCALE, height * RASTER_SCALE)
    }
}

/// Make sure a captured PNG is exactly `width` x `height`, cropping any
/// surplus the worker returned around the surface.
///
/// # Errors
///
/// Returns an error if the bytes are not a PNG or the image is too small.
pub fn fit_raster(png: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = load_from_memory_with_format(&png, ImageFormat::Png)
        .context("worker returned an unreadable PNG")?;
    let (actual_width, actual_height) = image.dimensions();
    if (actual_width, actual_height) == (width, height) {
        return Ok(png);
    }
    if actual_width < width || actual_height < height {
        return Err(anyhow!(
            "captured {actual_width}x{actual_height}, expected {width}x{height}"
        ));
    }
    warn!(
        "[RENDER] cropping {actual_width}x{actual_height} capture to {width}x{height}"
    );
    let cropped = image.crop_imm(0, 0, width, height).to_rgba8();
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        cropped.as_raw(),
        width,
        height,
        ColorType::Rgba8.into(),
    )?;
    Ok(buf)
}

/// Write `bytes` to `target` through a sibling temp file, so the target
/// either holds the complete artifact or is left as it was.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written or moved into place.
pub fn write_artifact(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("staging artifact in {}", parent.display()))?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(target)
        .map_err(|err| anyhow!("moving artifact to {}: {}", target.display(), err.error))?;
    Ok(())
}

/// Render one figure to its output target.
///
/// # Errors
///
/// `NotFound` before the worker is touched, `MalformedDocument` for unusable
/// output, `RenderError` for module, worker or write failures.
pub async fn render(workspace: &mut Workspace, job: &RenderJob) -> Result<(), JobError> {
    let start = Instant::now();
    let document = workspace.produce(&job.figure_id, job.reload)?;
    let (width, height) = (document.width, document.height);

    let bytes = match job.format {
        OutputFormat::RawVector => document.svg.into_bytes(),
        OutputFormat::Raster => {
            workspace
                .present(&document)
                .await
                .map_err(|err| JobError::render(&err))?;
            workspace
                .capture_raster(width, height)
                .await
                .map_err(|err| JobError::render(&err))?
        }
        OutputFormat::Paginated => {
            workspace
                .present(&document)
                .await
                .map_err(|err| JobError::render(&err))?;
            let pdf = workspace
                .session
                .capture(CaptureRequest::Paginated { width, height })
                .await
                .map_err(|err| JobError::render(&err))?;
            normalize_timestamps(&pdf).map_err(|err| JobError::render(&err))?
        }
    };

    write_artifact(&job.output_target, &bytes).map_err(|err| JobError::render(&err))?;
    info!(
        "[RENDER] {} -> {} ({:?}, {}x{}, {} bytes) in {:?}",
        job.figure_id,
        job.output_target.display(),
        job.format,
        width,
        height,
        bytes.len(),
        start.elapsed()
    );
    Ok(())
}

/// Load a figure, probe its geometry and classify its layout.
///
/// # Errors
///
/// `NotFound`, `MalformedDocument` or `RenderError`; no partial report is
/// produced on failure.
pub async fn check(workspace: &mut Workspace, job: &CheckJob) -> Result<CheckReport, JobError> {
    let start = Instant::now();
    let document = workspace.produce(&job.figure_id, job.reload)?;
    workspace
        .present(&document)
        .await
        .map_err(|err| JobError::render(&err))?;
    let snapshot = collect_snapshot(workspace.session.as_ref())
        .await
        .map_err(|err| JobError::render(&err))?;

    if let Some(target) = &job.screenshot_target {
        let png = workspace
            .capture_raster(document.width, document.height)
            .await
            .map_err(|err| JobError::render(&err))?;
        write_artifact(target, &png).map_err(|err| JobError::render(&err))?;
        debug!("[CHECK] screenshot saved to {}", target.display());
    }

    let report = analyze(&snapshot, &workspace.settings.analyzer);
    info!(
        "[CHECK] {}: {} findings across {} elements in {:?}",
        job.figure_id,
        report.finding_count(),
        report.total_elements,
        start.elapsed()
    );
    Ok(report)
}

/// Navigate to an external page and report resources that failed to load.
///
/// # Errors
///
/// `RenderError` if the worker fails outright or the screenshot cannot be
/// written.
pub async fn load_url(
    workspace: &mut Workspace,
    job: &LoadUrlJob,
) -> Result<NavigationReport, JobError> {
    let (width, height) = workspace.settings.default_size;
    workspace
        .session
        .resize_surface(width, height)
        .await
        .map_err(|err| JobError::render(&err))?;
    let report = workspace
        .session
        .navigate(&job.url)
        .await
        .map_err(|err| JobError::render(&err))?;
    if report.failed_resource_urls.is_empty() {
        info!("[RENDER] loaded {} (ok: {})", job.url, report.ok);
    } else {
        warn!(
            "[RENDER] loaded {} with {} failed resources",
            job.url,
            report.failed_resource_urls.len()
        );
    }

    if let Some(target) = &job.screenshot_target {
        let png = workspace
            .session
            .capture(CaptureRequest::Raster {
                width,
                height,
                scale: 1.0,
            })
            .await
            .map_err(|err| JobError::render(&err))?;
        write_artifact(target, &png).map_err(|err| JobError::render(&err))?;
    }
    Ok(report)
}
