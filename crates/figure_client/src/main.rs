//! `figure-client`: submit jobs to a running figure service.

use anyhow::{Result, anyhow};
use env_logger::{Builder, Env};
use figure_client::{ClientConfig, RenderClient, TcpTransport};
use figure_layout::report::format_report;
use figure_service::{CheckJob, LoadUrlJob, OutputFormat, RenderJob};
use log::error;
use std::env;
use std::ffi::OsStr;
use std::io::{Write as _, stderr, stdout};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn print_usage() {
    drop(writeln!(
        stderr(),
        "Usage:
  figure-client status
  figure-client render <FIGURE_ID> <OUTPUT> [--format raster|paginated|raw_vector] [--reload]
  figure-client check <FIGURE_ID> [--screenshot <PNG>] [--reload]
  figure-client load <URL> [--screenshot <PNG>]
  figure-client batch --out <DIR> [--format raster|paginated|raw_vector] [--reload] [FIGURE_ID...]
  figure-client shutdown"
    ));
}

fn parse_format(name: &str) -> Result<OutputFormat> {
    match name {
        "raster" | "png" => Ok(OutputFormat::Raster),
        "paginated" | "pdf" => Ok(OutputFormat::Paginated),
        "raw_vector" | "svg" => Ok(OutputFormat::RawVector),
        other => Err(anyhow!("unknown format `{other}`")),
    }
}

fn format_for(target: &Path) -> Result<OutputFormat> {
    let extension = target
        .extension()
        .and_then(OsStr::to_str)
        .ok_or_else(|| anyhow!("cannot tell the format of {}; pass --format", target.display()))?;
    parse_format(&extension.to_ascii_lowercase())
}

/// Flags shared by the job commands, plus the positionals left over.
#[derive(Default)]
struct JobArgs {
    positionals: Vec<String>,
    format: Option<OutputFormat>,
    reload: bool,
    screenshot: Option<PathBuf>,
    out_dir: Option<PathBuf>,
}

fn parse_job_args(args: &[String]) -> Result<JobArgs> {
    let mut parsed = JobArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--format" if index + 1 < args.len() => {
                parsed.format = Some(parse_format(&args[index + 1])?);
                index += 2;
            }
            "--screenshot" if index + 1 < args.len() => {
                parsed.screenshot = Some(PathBuf::from(&args[index + 1]));
                index += 2;
            }
            "--out" if index + 1 < args.len() => {
                parsed.out_dir = Some(PathBuf::from(&args[index + 1]));
                index += 2;
            }
            "--reload" => {
                parsed.reload = true;
                index += 1;
            }
            flag if flag.starts_with("--") => return Err(anyhow!("unexpected argument `{flag}`")),
            positional => {
                parsed.positionals.push(positional.to_owned());
                index += 1;
            }
        }
    }
    Ok(parsed)
}

async fn cmd_status(client: &RenderClient) -> Result<ExitCode> {
    let status = client.status().await?;
    let mut out = stdout().lock();
    writeln!(
        out,
        "ready: {}\nfigures: {}",
        status.ready,
        status.figure_ids.len()
    )?;
    for figure_id in &status.figure_ids {
        writeln!(out, "  {figure_id}")?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_render(client: &RenderClient, args: &JobArgs) -> Result<ExitCode> {
    let [figure_id, target] = args.positionals.as_slice() else {
        return Err(anyhow!("render takes a figure id and an output path"));
    };
    let output_target = PathBuf::from(target);
    let format = match args.format {
        Some(format) => format,
        None => format_for(&output_target)?,
    };
    client
        .render(RenderJob {
            figure_id: figure_id.clone(),
            output_target: output_target.clone(),
            format,
            reload: args.reload,
        })
        .await?;
    writeln!(stdout(), "{}", output_target.display())?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(client: &RenderClient, args: JobArgs) -> Result<ExitCode> {
    let [figure_id] = args.positionals.as_slice() else {
        return Err(anyhow!("check takes exactly one figure id"));
    };
    let report = client
        .check(CheckJob {
            figure_id: figure_id.clone(),
            screenshot_target: args.screenshot,
            reload: args.reload,
        })
        .await?;
    write!(stdout(), "{}", format_report(figure_id, &report))?;
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_load(client: &RenderClient, args: JobArgs) -> Result<ExitCode> {
    let [url] = args.positionals.as_slice() else {
        return Err(anyhow!("load takes exactly one URL"));
    };
    let page = client
        .load_url(LoadUrlJob {
            url: url.clone(),
            screenshot_target: args.screenshot,
        })
        .await?;
    let mut out = stdout().lock();
    writeln!(out, "{url}: {}", if page.ok { "loaded" } else { "failed" })?;
    for failed in &page.failed_resource_urls {
        writeln!(out, "  failed resource: {failed}")?;
    }
    Ok(if page.ok && page.failed_resource_urls.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_batch(client: &RenderClient, args: JobArgs) -> Result<ExitCode> {
    let out_dir = args
        .out_dir
        .ok_or_else(|| anyhow!("batch needs --out <DIR>"))?;
    let format = args.format.unwrap_or(OutputFormat::Raster);
    let figure_ids = if args.positionals.is_empty() {
        client.status().await?.figure_ids
    } else {
        args.positionals
    };
    let jobs = figure_ids
        .into_iter()
        .map(|figure_id| RenderJob {
            output_target: out_dir.join(format!("{figure_id}.{}", format.extension())),
            figure_id,
            format,
            reload: args.reload,
        })
        .collect();

    let outcome = client.render_batch(jobs).await;
    let mut out = stdout().lock();
    writeln!(
        out,
        "{} rendered, {} failed",
        outcome.completed.len(),
        outcome.errors.len()
    )?;
    for (label, err) in &outcome.errors {
        writeln!(out, "  {label}: {err}")?;
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

async fn cmd_shutdown(client: &RenderClient) -> Result<ExitCode> {
    let message = if client.shutdown().await? {
        "figure service shutting down"
    } else {
        "figure service was not running"
    };
    writeln!(stdout(), "{message}")?;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return ExitCode::from(2);
    }
    let cmd = args.remove(0);

    let config = ClientConfig::from_env();
    let client = RenderClient::new(Box::new(TcpTransport::new(&config)), &config);

    let result = match parse_job_args(&args) {
        Ok(job_args) => match cmd.as_str() {
            "status" => cmd_status(&client).await,
            "render" => cmd_render(&client, &job_args).await,
            "check" => cmd_check(&client, job_args).await,
            "load" => cmd_load(&client, job_args).await,
            "batch" => cmd_batch(&client, job_args).await,
            "shutdown" => cmd_shutdown(&client).await,
            _ => {
                print_usage();
                Err(anyhow!("unknown command `{cmd}`"))
            }
        },
        Err(err) => {
            print_usage();
            Err(err)
        }
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
