//! Control socket: the external profile-switch and status source.
//!
//! # How it works (for beginners)
//!
//! The daemon listens on a Unix domain socket.  A client writes one JSON
//! request per line ([`messages::ControlRequest`]) and reads one JSON
//! response line back.  The server does not touch daemon state itself: it
//! turns each request into a [`ControlMessage`] carrying a `oneshot` reply
//! channel, sends it to the controller, and waits for the answer.  That way
//! socket requests are serialised with signals and hot-plug events.
//!
//! The `keyweave` CLI uses [`request`] as its client.

pub mod messages;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::controller::ControlMessage;
use messages::{ControlRequest, ControlResponse};

const SOCKET_NAME: &str = "keyweave.sock";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ControlSocketError {
    #[error("cannot bind control socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot connect to {path} (is keyweaved running?): {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("control socket I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("daemon closed the connection without answering")]
    Closed,
}

/// `$XDG_RUNTIME_DIR/keyweave.sock`, or `/tmp/keyweave-$USER.sock` when no
/// runtime directory is set.
pub fn socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => {
            let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
            std::env::temp_dir().join(format!("keyweave-{user}.sock"))
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A bound control socket.  The socket file is removed on drop.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds `path`, replacing a stale socket left by a previous run.
    pub fn bind(path: &Path) -> Result<Self, ControlSocketError> {
        if path.exists() {
            debug!(path = %path.display(), "removing stale control socket");
            std::fs::remove_file(path).map_err(|source| ControlSocketError::Bind {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let listener = UnixListener::bind(path).map_err(|source| ControlSocketError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until the task is aborted, serving each one on
    /// its own task.
    pub fn spawn(self, control: mpsc::Sender<ControlMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let control = control.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, control).await {
                                debug!("control connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("control socket accept failed: {e}"),
                }
            }
        })
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "cannot remove control socket: {e}");
            }
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    control: mpsc::Sender<ControlMessage>,
) -> Result<(), ControlSocketError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                debug!(?request, "control request");
                dispatch(request, &control).await
            }
            Err(e) => ControlResponse::error(format!("invalid request: {e}")),
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Forwards one request to the controller and converts its answer.
async fn dispatch(request: ControlRequest, control: &mpsc::Sender<ControlMessage>) -> ControlResponse {
    match request {
        ControlRequest::SwitchProfile { device, profile } => {
            match ask(control, |reply| ControlMessage::SwitchProfile { device, profile, reply }).await {
                Some(Ok(listing)) => ControlResponse::Profiles(listing.into()),
                Some(Err(e)) => ControlResponse::error(e),
                None => daemon_stopping(),
            }
        }
        ControlRequest::ListProfiles { device } => {
            match ask(control, |reply| ControlMessage::ListProfiles { device, reply }).await {
                Some(Ok(listing)) => ControlResponse::Profiles(listing.into()),
                Some(Err(e)) => ControlResponse::error(e),
                None => daemon_stopping(),
            }
        }
        ControlRequest::Status => match ask(control, |reply| ControlMessage::Status { reply }).await {
            Some(status) => status.into(),
            None => daemon_stopping(),
        },
        ControlRequest::Reload => {
            match ask(control, |reply| ControlMessage::Reload { reply: Some(reply) }).await {
                Some(Ok(summary)) => summary.into(),
                Some(Err(e)) => ControlResponse::error(e),
                None => daemon_stopping(),
            }
        }
    }
}

async fn ask<T>(
    control: &mpsc::Sender<ControlMessage>,
    build: impl FnOnce(oneshot::Sender<T>) -> ControlMessage,
) -> Option<T> {
    let (reply, answer) = oneshot::channel();
    control.send(build(reply)).await.ok()?;
    answer.await.ok()
}

fn daemon_stopping() -> ControlResponse {
    ControlResponse::error("daemon is shutting down")
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Sends one request to the daemon listening on `path` and waits for the
/// response.
pub async fn request(
    path: &Path,
    request: &ControlRequest,
) -> Result<ControlResponse, ControlSocketError> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| ControlSocketError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await? {
        Some(answer) => Ok(serde_json::from_str(&answer)?),
        None => Err(ControlSocketError::Closed),
    }
}
