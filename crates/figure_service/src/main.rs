//! `figure-service`: the render orchestrator process.

use anyhow::{Result, anyhow};
use env_logger::{Builder, Env};
use figure_service::server::serve;
use figure_service::{
    ActivityClock, FigureDirectory, FigureService, IdleSupervisor, JobError, RenderSettings,
    ServiceConfig, ShutdownSignal,
};
use figure_worker::supervised::spawn_supervised_worker;
use figure_worker::{ChromeSession, WorkerConfig};
use log::{error, info, warn};
use std::env;
use std::io::{Write as _, stderr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tokio::spawn;

fn print_usage() {
    drop(writeln!(
        stderr(),
        "Usage:\n  figure-service serve [--addr <HOST:PORT>] [--root <DIR>] [--owned]\n  figure-service worker"
    ));
}

/// Run the orchestrator until it is asked to stop or goes idle.
///
/// # Errors
/// Returns an error if no worker session can be established or the listener
/// cannot be bound.
async fn cmd_serve(config: ServiceConfig, owned: bool) -> Result<()> {
    let session = if owned {
        ChromeSession::launch(&config.worker).await
    } else {
        ChromeSession::connect_or_launch(&config.worker).await
    }
    .map_err(|err| JobError::SessionUnavailable(format!("{err:#}")))?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let clock = ActivityClock::new();
    let shutdown = ShutdownSignal::new();
    let service = Arc::new(FigureService::new(
        Box::new(session),
        Arc::new(FigureDirectory::new(&config.figure_root)),
        RenderSettings {
            default_size: config.default_size,
            analyzer: config.analyzer.clone(),
        },
        clock.clone(),
        shutdown.clone(),
    ));
    let idle = IdleSupervisor::spawn(
        clock,
        config.idle_window,
        config.idle_check_interval,
        shutdown.clone(),
    );

    let interrupt = shutdown.clone();
    spawn(async move {
        if ctrl_c().await.is_ok() && interrupt.trigger() {
            info!("[QUEUE] interrupted");
        }
    });

    let served = serve(listener, Arc::clone(&service)).await;
    service.shutdown().await;
    idle.abort();
    served
}

/// Start the long-lived worker sessions attach to.
///
/// # Errors
/// Returns an error if the worker cannot be started.
async fn cmd_worker() -> Result<()> {
    let config = WorkerConfig::from_env();
    match spawn_supervised_worker(&config).await? {
        Some(pid) => info!("[WORKER] supervised worker pid {pid} on port {}", config.port),
        None => warn!("[WORKER] a worker is already listening on port {}", config.port),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let cmd = if args.is_empty() {
        "serve".to_owned()
    } else {
        args.remove(0)
    };
    let result = match cmd.as_str() {
        "serve" => {
            let mut config = ServiceConfig::from_env();
            let mut owned = false;
            let mut index = 0;
            while index < args.len() {
                match args[index].as_str() {
                    "--addr" if index + 1 < args.len() => {
                        config.bind_addr.clone_from(&args[index + 1]);
                        index += 2;
                    }
                    "--root" if index + 1 < args.len() => {
                        config.figure_root = PathBuf::from(&args[index + 1]);
                        index += 2;
                    }
                    "--owned" => {
                        owned = true;
                        index += 1;
                    }
                    other => {
                        print_usage();
                        return Err(anyhow!("unexpected argument `{other}`"));
                    }
                }
            }
            cmd_serve(config, owned).await
        }
        "worker" => cmd_worker().await,
        _ => {
            print_usage();
            Err(anyhow!("unknown command"))
        }
    };
    if let Err(err) = &result {
        error!("{err:#}");
    }
    result
}
