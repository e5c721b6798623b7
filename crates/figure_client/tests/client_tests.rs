use anyhow::{Result, anyhow};
use core::future::pending;
use core::time::Duration;
use figure_client::hang::SLOW_COMPLETED;
use figure_client::{ClientConfig, ClientError, RenderClient, Transport, TransportFuture};
use figure_layout::CheckReport;
use figure_service::{CheckJob, ErrorKind, OutputFormat, RenderJob, Request, Response};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::{TempDir, tempdir};
use tokio::time::sleep;

/// What the fake service does with the next request.
enum Step {
    Reply(Response),
    Slow(Duration, Response),
    Hang,
    Refuse,
}

#[derive(Clone, Default)]
struct Probe {
    requests: Arc<Mutex<Vec<Request>>>,
    restarts: Arc<AtomicUsize>,
}

impl Probe {
    fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    probe: Probe,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> (Self, Probe) {
        let probe = Probe::default();
        let transport = Self {
            steps: Mutex::new(steps.into()),
            probe: probe.clone(),
        };
        (transport, probe)
    }
}

impl Transport for ScriptedTransport {
    fn send<'call>(&'call self, request: &'call Request) -> TransportFuture<'call, Response> {
        self.probe
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Box::pin(async move {
            match step {
                Some(Step::Reply(response)) => Ok(response),
                Some(Step::Slow(delay, response)) => {
                    sleep(delay).await;
                    Ok(response)
                }
                Some(Step::Hang) => pending().await,
                Some(Step::Refuse) | None => Err(ClientError::Unreachable {
                    addr: "127.0.0.1:7341".to_owned(),
                    reason: "connection refused".to_owned(),
                }),
            }
        })
    }

    fn restart(&self) -> TransportFuture<'_, ()> {
        self.probe.restarts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

fn client_with(steps: Vec<Step>) -> Result<(RenderClient, Probe, TempDir)> {
    let dir = tempdir()?;
    let config = ClientConfig {
        hang_log: dir.path().join("hangs.jsonl"),
        ..ClientConfig::default()
    };
    let (transport, probe) = ScriptedTransport::new(steps);
    Ok((RenderClient::new(Box::new(transport), &config), probe, dir))
}

fn render_job(figure_id: &str, out: &Path) -> RenderJob {
    RenderJob {
        figure_id: figure_id.to_owned(),
        output_target: out.join(format!("{figure_id}.png")),
        format: OutputFormat::Raster,
        reload: false,
    }
}

fn rendered() -> Step {
    Step::Reply(Response::Rendered { ok: true })
}

#[tokio::test(start_paused = true)]
async fn hung_job_times_out_logs_and_restarts() -> Result<()> {
    let (client, probe, dir) = client_with(vec![Step::Hang])?;

    let outcome = client.render(render_job("charts/bar", dir.path())).await;
    let (job_id, waited_ms) = match outcome {
        Err(ClientError::TimedOut { job_id, waited_ms }) => (job_id, waited_ms),
        other => return Err(anyhow!("expected a timeout, got {other:?}")),
    };
    assert_eq!(job_id, "render charts/bar (png)");
    assert!(waited_ms >= 30_000);
    assert_eq!(probe.restarts(), 1);

    let records = client.hang_log().records()?;
    assert_eq!(records.len(), 1);
    assert!(records[0].job_id.contains("charts/bar"));
    assert!(records[0].duration_ms >= 30_000);
    assert!(records[0].reason.starts_with("job timed out"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_job_succeeds_and_is_logged() -> Result<()> {
    let (client, probe, dir) = client_with(vec![Step::Slow(
        Duration::from_secs(6),
        Response::Rendered { ok: true },
    )])?;

    let outcome = client.render(render_job("charts/pie", dir.path())).await;
    assert!(matches!(outcome, Ok(())));
    assert_eq!(probe.restarts(), 0);

    let records = client.hang_log().records()?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, SLOW_COMPLETED);
    assert!(records[0].duration_ms >= 6_000);
    assert!(records[0].duration_ms < 30_000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fast_job_leaves_no_record() -> Result<()> {
    let (client, probe, dir) = client_with(vec![Step::Slow(
        Duration::from_secs(1),
        Response::Rendered { ok: true },
    )])?;

    let outcome = client.render(render_job("charts/line", dir.path())).await;
    assert!(matches!(outcome, Ok(())));
    assert!(client.hang_log().records()?.is_empty());
    assert_eq!(
        probe.requests(),
        vec![Request::Render {
            figure_id: "charts/line".to_owned(),
            output_target: dir.path().join("charts/line.png"),
            format: OutputFormat::Raster,
            reload: false,
        }]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn error_responses_keep_their_kind() -> Result<()> {
    let (client, probe, _dir) = client_with(vec![Step::Reply(Response::Error {
        kind: ErrorKind::NotFound,
        message: "charts/missing".to_owned(),
    })])?;

    let outcome = client
        .check(CheckJob {
            figure_id: "charts/missing".to_owned(),
            screenshot_target: None,
            reload: false,
        })
        .await;
    let err = match outcome {
        Err(err) => err,
        Ok(report) => return Err(anyhow!("expected an error, got {report:?}")),
    };
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "job failed: figure not found: charts/missing");
    assert_eq!(probe.restarts(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn check_returns_the_report() -> Result<()> {
    let report = CheckReport {
        total_elements: 4,
        checked_elements: 3,
        ..CheckReport::default()
    };
    let (client, _probe, _dir) = client_with(vec![Step::Reply(Response::Checked(report.clone()))])?;

    let checked = client
        .check(CheckJob {
            figure_id: "charts/bar".to_owned(),
            screenshot_target: Some(PathBuf::from("shot.png")),
            reload: true,
        })
        .await;
    assert!(matches!(checked, Ok(ref got) if *got == report));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn batch_continues_past_failures() -> Result<()> {
    let (client, probe, dir) = client_with(vec![
        rendered(),
        Step::Hang,
        Step::Reply(Response::Error {
            kind: ErrorKind::MalformedDocument,
            message: "root element is not <svg>".to_owned(),
        }),
        rendered(),
    ])?;
    let jobs = ["a", "b", "c", "d"]
        .iter()
        .map(|figure_id| render_job(figure_id, dir.path()))
        .collect();

    let outcome = client.render_batch(jobs).await;
    assert_eq!(outcome.completed, vec!["a (png)", "d (png)"]);
    let failed: Vec<(&str, ErrorKind)> = outcome
        .errors
        .iter()
        .map(|(label, err)| (label.as_str(), err.kind()))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("b (png)", ErrorKind::Timeout),
            ("c (png)", ErrorKind::MalformedDocument),
        ]
    );
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(probe.restarts(), 1);
    assert_eq!(probe.requests().len(), 4);
    assert_eq!(client.hang_log().records()?.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn clean_batch_exits_zero() -> Result<()> {
    let (client, _probe, dir) = client_with(vec![rendered(), rendered()])?;
    let jobs = vec![render_job("a", dir.path()), render_job("b", dir.path())];

    let outcome = client.render_batch(jobs).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.exit_code(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unreachable_service_is_reported_not_restarted() -> Result<()> {
    let (client, probe, _dir) = client_with(vec![Step::Refuse, Step::Refuse])?;

    let status = client.status().await;
    assert!(matches!(status, Err(ClientError::Unreachable { .. })));
    assert_eq!(probe.restarts(), 0);

    let stopped = client.shutdown().await;
    assert!(matches!(stopped, Ok(false)));
    Ok(())
}
