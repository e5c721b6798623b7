//! Line-delimited JSON over TCP.

use anyhow::Result;
use log::{debug, info, warn};
use serde_json::{from_str, to_string};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::task::JoinSet;

use crate::error::ErrorKind;
use crate::protocol::{Request, Response};
use crate::service::FigureService;

async fn handle_connection(stream: TcpStream, peer: SocketAddr, service: Arc<FigureService>) {
    let shutdown = service.shutdown_signal();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        // Idle connections end with the service; a request already read is
        // still answered.
        let next = select! {
            next = lines.next_line() => next,
            () = shutdown.wait() => break,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!("[QUEUE] connection {peer} read failed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match from_str::<Request>(&line) {
            Ok(request) => {
                debug!("[QUEUE] {peer}: {}", request.label());
                service.handle(request).await
            }
            Err(err) => Response::Error {
                kind: ErrorKind::RenderError,
                message: format!("invalid request: {err}"),
            },
        };
        let mut encoded = match to_string(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("[QUEUE] failed to encode response: {err}");
                break;
            }
        };
        encoded.push('\n');
        if let Err(err) = writer.write_all(encoded.as_bytes()).await {
            debug!("[QUEUE] connection {peer} write failed: {err}");
            break;
        }
    }
}

/// Accept connections until the service's shutdown signal fires, then wait
/// for open connections to finish the request they are handling.
///
/// Each connection gets its own task; requests on one connection are
/// answered in order.
///
/// # Errors
///
/// Returns an error if accepting fails fatally.
pub async fn serve(listener: TcpListener, service: Arc<FigureService>) -> Result<()> {
    let shutdown = service.shutdown_signal();
    info!("[QUEUE] listening on {}", listener.local_addr()?);
    let mut connections = JoinSet::new();
    loop {
        while connections.try_join_next().is_some() {}
        let (stream, peer) = select! {
            accepted = listener.accept() => accepted?,
            () = shutdown.wait() => break,
        };
        connections.spawn(handle_connection(stream, peer, Arc::clone(&service)));
    }
    drop(listener);
    info!(
        "[QUEUE] listener closed; finishing {} connections",
        connections.len()
    );
    while connections.join_next().await.is_some() {}
    Ok(())
}
