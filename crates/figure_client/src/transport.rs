//! How requests reach the service.

use core::future::Future;
use core::pin::Pin;
use core::time::Duration;
use figure_service::{Request, Response};
use log::{debug, info};
use serde_json::{from_str, to_string};
use std::io::Error as IoError;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Boxed future returned by [`Transport`] operations.
pub type TransportFuture<'call, T> =
    Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'call>>;

/// One request, one response.
pub trait Transport: Send + Sync {
    /// Deliver `request` and wait for the service's answer.
    fn send<'call>(&'call self, request: &'call Request) -> TransportFuture<'call, Response>;

    /// Replace the running service with a fresh process.
    fn restart(&self) -> TransportFuture<'_, ()>;
}

const CONNECT_POLL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Line-delimited JSON over TCP, one connection per request.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    addr: String,
    service_bin: PathBuf,
    restart_timeout: Duration,
}

impl TcpTransport {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            addr: config.service_addr.clone(),
            service_bin: config.service_bin.clone(),
            restart_timeout: config.restart_timeout,
        }
    }

    fn unreachable(&self, err: &IoError) -> ClientError {
        ClientError::Unreachable {
            addr: self.addr.clone(),
            reason: err.to_string(),
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = TcpStream::connect(self.addr.as_str())
            .await
            .map_err(|err| self.unreachable(&err))?;
        let (reader, mut writer) = stream.into_split();

        let mut line = to_string(request).map_err(|err| ClientError::Protocol(err.to_string()))?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|err| self.unreachable(&err))?;

        let reply = BufReader::new(reader)
            .lines()
            .next_line()
            .await
            .map_err(|err| self.unreachable(&err))?
            .ok_or_else(|| ClientError::Protocol("connection closed before a reply".to_owned()))?;
        from_str(&reply).map_err(|err| ClientError::Protocol(format!("{err}: {reply}")))
    }

    async fn wait_until_listening(&self) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.restart_timeout;
        loop {
            match TcpStream::connect(self.addr.as_str()).await {
                Ok(_stream) => return Ok(()),
                Err(err) if Instant::now() >= deadline => return Err(self.unreachable(&err)),
                Err(_) => sleep(CONNECT_POLL).await,
            }
        }
    }

    async fn relaunch(&self) -> Result<(), ClientError> {
        match timeout(SHUTDOWN_GRACE, self.exchange(&Request::Shutdown)).await {
            Ok(Ok(_)) => debug!("[CLIENT] old service acknowledged shutdown"),
            Ok(Err(err)) => debug!("[CLIENT] old service did not answer shutdown: {err}"),
            Err(_) => debug!("[CLIENT] old service ignored shutdown"),
        }

        // Dropping the handle leaves the process running on its own.
        let _child = Command::new(&self.service_bin)
            .arg("serve")
            .arg("--addr")
            .arg(&self.addr)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| ClientError::Unreachable {
                addr: self.addr.clone(),
                reason: format!("cannot start {}: {err}", self.service_bin.display()),
            })?;
        info!(
            "[CLIENT] started {} serve --addr {}",
            self.service_bin.display(),
            self.addr
        );
        self.wait_until_listening().await
    }
}

impl Transport for TcpTransport {
    fn send<'call>(&'call self, request: &'call Request) -> TransportFuture<'call, Response> {
        Box::pin(self.exchange(request))
    }

    fn restart(&self) -> TransportFuture<'_, ()> {
        Box::pin(self.relaunch())
    }
}
