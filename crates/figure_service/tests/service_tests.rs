mod common;

use anyhow::{Result, anyhow};
use common::{FakeSession, service_with, svg};
use core::time::Duration;
use figure_service::{
    CheckJob, ErrorKind, FigureRegistry, JobError, LoadUrlJob, OutputFormat, RenderJob, Request,
    Response,
};
use figure_worker::{NavigationReport, SessionMode};
use futures::future::join_all;
use image::{GenericImageView as _, ImageFormat, load_from_memory_with_format};
use serde_json::json;
use std::fs::{read, read_dir};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn registry_with(figure_id: &str, document: String) -> Arc<FigureRegistry> {
    let registry = Arc::new(FigureRegistry::new());
    registry.register(figure_id, move || Ok(document.clone()));
    registry
}

fn render_job(figure_id: &str, target: &Path, format: OutputFormat) -> RenderJob {
    RenderJob {
        figure_id: figure_id.to_owned(),
        output_target: target.to_path_buf(),
        format,
        reload: false,
    }
}

fn entries(dir: &Path) -> usize {
    read_dir(dir).map_or(0, Iterator::count)
}

#[tokio::test]
async fn raster_output_is_twice_the_document_size() -> Result<()> {
    let dir = tempdir()?;
    let target = dir.path().join("bar.png");
    let (session, probe) = FakeSession::new();
    let service = service_with(session, registry_with("charts/bar", svg(320, 200, "")));

    service
        .render(render_job("charts/bar", &target, OutputFormat::Raster))
        .await?;

    let image = load_from_memory_with_format(&read(&target)?, ImageFormat::Png)?;
    assert_eq!(image.dimensions(), (640, 400));
    let calls = probe.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "resize 320x200");
    assert!(calls[1].starts_with("load "));
    assert_eq!(calls[2], "capture raster 320x200@2");
    Ok(())
}

#[tokio::test]
async fn raw_vector_output_skips_the_worker() -> Result<()> {
    let dir = tempdir()?;
    let target = dir.path().join("plain.svg");
    let document = svg(50, 40, "<text x=\"1\" y=\"10\">hi</text>");
    let (session, probe) = FakeSession::new();
    let service = service_with(session, registry_with("plain/text", document.clone()));

    service
        .render(render_job("plain/text", &target, OutputFormat::RawVector))
        .await?;

    assert_eq!(read(&target)?, document.into_bytes());
    assert!(probe.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn paginated_output_is_reproducible() -> Result<()> {
    let dir = tempdir()?;
    let first = dir.path().join("first.pdf");
    let second = dir.path().join("second.pdf");
    let (session, probe) = FakeSession::new();
    let service = service_with(session, registry_with("tables/sum", svg(400, 300, "")));

    service
        .render(render_job("tables/sum", &first, OutputFormat::Paginated))
        .await?;
    service
        .render(render_job("tables/sum", &second, OutputFormat::Paginated))
        .await?;

    assert_eq!(read(&first)?, read(&second)?);
    assert!(probe.calls().contains(&"capture paginated 400x300".to_owned()));
    Ok(())
}

#[tokio::test]
async fn unknown_figure_fails_before_touching_the_worker() -> Result<()> {
    let dir = tempdir()?;
    let (session, probe) = FakeSession::new();
    let service = service_with(session, Arc::new(FigureRegistry::new()));

    let result = service
        .render(render_job(
            "nope/missing",
            &dir.path().join("x.png"),
            OutputFormat::Raster,
        ))
        .await;

    assert_eq!(result, Err(JobError::NotFound("nope/missing".to_owned())));
    assert!(probe.calls().is_empty());
    assert_eq!(entries(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn non_svg_output_is_malformed() -> Result<()> {
    let dir = tempdir()?;
    let (session, _probe) = FakeSession::new();
    let service = service_with(
        session,
        registry_with("bad/html", "<html><body/></html>".to_owned()),
    );

    let result = service
        .render(render_job(
            "bad/html",
            &dir.path().join("x.png"),
            OutputFormat::Raster,
        ))
        .await;

    assert!(matches!(result, Err(JobError::MalformedDocument(_))));
    assert_eq!(entries(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn throwing_module_is_a_render_error() -> Result<()> {
    let dir = tempdir()?;
    let registry = Arc::new(FigureRegistry::new());
    registry.register("broken/module", || Err(anyhow!("division by zero")));
    let (session, _probe) = FakeSession::new();
    let service = service_with(session, registry);

    let result = service
        .render(render_job(
            "broken/module",
            &dir.path().join("x.svg"),
            OutputFormat::RawVector,
        ))
        .await;

    assert!(
        matches!(&result, Err(JobError::RenderError(message)) if message.contains("division by zero"))
    );
    Ok(())
}

#[tokio::test]
async fn worker_failure_leaves_no_partial_artifact() -> Result<()> {
    let dir = tempdir()?;
    let target = dir.path().join("out").join("bar.png");
    let (session, _probe) = FakeSession::new();
    let service = service_with(
        session.failing_capture(),
        registry_with("charts/bar", svg(10, 10, "")),
    );

    let result = service
        .render(render_job("charts/bar", &target, OutputFormat::Raster))
        .await;

    assert!(matches!(result, Err(JobError::RenderError(_))));
    assert!(!target.exists());
    assert_eq!(entries(&dir.path().join("out")), 0);
    Ok(())
}

#[tokio::test]
async fn cached_module_is_kept_until_reload() -> Result<()> {
    let dir = tempdir()?;
    let target = dir.path().join("live.svg");
    let registry = Arc::new(FigureRegistry::new());
    registry.register("live/chart", || Ok(svg(10, 10, "<g id=\"v1\"/>")));
    let (session, _probe) = FakeSession::new();
    let service = service_with(session, Arc::clone(&registry));

    service
        .render(render_job("live/chart", &target, OutputFormat::RawVector))
        .await?;
    registry.register("live/chart", || Ok(svg(10, 10, "<g id=\"v2\"/>")));

    service
        .render(render_job("live/chart", &target, OutputFormat::RawVector))
        .await?;
    assert!(String::from_utf8(read(&target)?)?.contains("v1"));

    let mut reload = render_job("live/chart", &target, OutputFormat::RawVector);
    reload.reload = true;
    service.render(reload).await?;
    assert!(String::from_utf8(read(&target)?)?.contains("v2"));
    Ok(())
}

#[tokio::test]
async fn check_reports_overlapping_labels() -> Result<()> {
    let snapshot = json!({
        "canvas": { "width": 200.0, "height": 100.0 },
        "texts": [
            { "label": "Revenue", "box": { "left": 10.0, "top": 10.0, "right": 50.0, "bottom": 30.0 } },
            { "label": "Costs", "box": { "left": 44.0, "top": 14.0, "right": 90.0, "bottom": 34.0 } }
        ],
        "containers": []
    });
    let (session, _probe) = FakeSession::new();
    let service = service_with(
        session.with_snapshot(&snapshot),
        registry_with("charts/pie", svg(200, 100, "")),
    );

    let report = service
        .check(CheckJob {
            figure_id: "charts/pie".to_owned(),
            screenshot_target: None,
            reload: false,
        })
        .await?;

    assert_eq!(report.total_elements, 2);
    assert_eq!(report.overlaps.len(), 1);
    assert!((report.overlaps[0].magnitude() - 96.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn check_saves_a_screenshot_when_asked() -> Result<()> {
    let dir = tempdir()?;
    let shot = dir.path().join("shot.png");
    let snapshot = json!({ "canvas": { "width": 30.0, "height": 20.0 }, "texts": [], "containers": [] });
    let (session, _probe) = FakeSession::new();
    let service = service_with(
        session.with_snapshot(&snapshot),
        registry_with("charts/empty", svg(30, 20, "")),
    );

    let report = service
        .check(CheckJob {
            figure_id: "charts/empty".to_owned(),
            screenshot_target: Some(shot.clone()),
            reload: false,
        })
        .await?;

    assert!(report.is_clean());
    let image = load_from_memory_with_format(&read(&shot)?, ImageFormat::Png)?;
    assert_eq!(image.dimensions(), (60, 40));
    Ok(())
}

#[tokio::test]
async fn check_of_unknown_figure_has_no_findings() {
    let (session, probe) = FakeSession::new();
    let service = service_with(session, Arc::new(FigureRegistry::new()));
    let result = service
        .check(CheckJob {
            figure_id: "ghost/figure".to_owned(),
            screenshot_target: None,
            reload: false,
        })
        .await;
    assert_eq!(result, Err(JobError::NotFound("ghost/figure".to_owned())));
    assert!(probe.calls().is_empty());
}

#[tokio::test]
async fn load_url_reports_failed_resources() -> Result<()> {
    let (session, probe) = FakeSession::new();
    let service = service_with(
        session.with_navigation(NavigationReport {
            ok: true,
            failed_resource_urls: vec!["https://cdn.example/font.woff2".to_owned()],
        }),
        Arc::new(FigureRegistry::new()),
    );

    let report = service
        .load_url(LoadUrlJob {
            url: "https://example.com/gallery".to_owned(),
            screenshot_target: None,
        })
        .await?;

    assert!(report.ok);
    assert_eq!(report.failed_resource_urls.len(), 1);
    assert_eq!(
        probe.calls(),
        vec![
            "resize 800x600".to_owned(),
            "navigate https://example.com/gallery".to_owned(),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_never_overlap_on_the_session() -> Result<()> {
    let dir = tempdir()?;
    let (session, probe) = FakeSession::new();
    let service = service_with(
        session.with_op_delay(Duration::from_millis(20)),
        registry_with("charts/bar", svg(16, 16, "")),
    );

    let targets: Vec<_> = (0..6)
        .map(|index| dir.path().join(format!("bar-{index}.png")))
        .collect();
    let results = join_all(
        targets
            .iter()
            .map(|target| service.render(render_job("charts/bar", target, OutputFormat::Raster))),
    )
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert!(!probe.overlapped());
    assert_eq!(probe.calls().len(), 18);
    Ok(())
}

#[tokio::test]
async fn shutdown_is_idempotent_and_stops_intake() -> Result<()> {
    let (session, probe) = FakeSession::new();
    let service = service_with(
        session.with_mode(SessionMode::Owned),
        registry_with("charts/bar", svg(16, 16, "")),
    );
    assert!(service.is_ready());

    service.shutdown().await;
    service.shutdown().await;

    assert!(!service.is_ready());
    assert!(probe.closed());
    assert_eq!(
        probe.calls().iter().filter(|call| *call == "close").count(),
        1
    );
    let dir = tempdir()?;
    let rejected = service
        .render(render_job(
            "charts/bar",
            &dir.path().join("late.png"),
            OutputFormat::Raster,
        ))
        .await;
    assert!(matches!(rejected, Err(JobError::SessionUnavailable(_))));
    Ok(())
}

#[tokio::test]
async fn wire_requests_dispatch_to_operations() {
    let (session, _probe) = FakeSession::new();
    let service = service_with(session, registry_with("charts/bar", svg(16, 16, "")));

    let status = service.handle(Request::Status).await;
    assert_eq!(
        status,
        Response::Status {
            ready: true,
            figure_ids: vec!["charts/bar".to_owned()],
        }
    );

    let missing = service
        .handle(Request::Check {
            figure_id: "charts/none".to_owned(),
            screenshot_target: None,
            reload: false,
        })
        .await;
    assert!(matches!(
        missing,
        Response::Error {
            kind: ErrorKind::NotFound,
            ..
        }
    ));

    assert_eq!(service.handle(Request::Shutdown).await, Response::ShuttingDown);
    assert_eq!(service.handle(Request::Shutdown).await, Response::ShuttingDown);
}
