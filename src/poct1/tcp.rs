//! # TCP Transport Adapter
//!
//! Bridges TCP connections to the I/O-free session engine: each accepted
//! connection gets its own task and its own [`DeviceSession`], reads are
//! fed through `on_data`, responses are written back, and the session is
//! finalized when the connection ends for any reason.
//!
//! The meter opens a fresh connection per sync and transfers are short,
//! so the adapter enforces the one timing rule the engine must not: a
//! connection silent past the idle limit is treated as closed. Whatever
//! the session collected up to that point still reconciles.

use crate::constants::{CONNECTION_IDLE_TIMEOUT_SECS, READ_CHUNK_SIZE};
use crate::error::Poct1Error;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::poct1::session::{DeviceSession, SessionStep, SyncEvent};
use crate::sync_manager::SyncManager;
use chrono::Local;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Listens for device connections and runs each as a session task.
pub struct DeviceServer {
    listener: TcpListener,
    manager: Arc<SyncManager>,
}

impl DeviceServer {
    /// Binds the listener and prepares the capture directory.
    ///
    /// Bind `host:0` to let the OS pick a port; [`DeviceServer::local_addr`]
    /// reports the result.
    pub async fn bind(manager: Arc<SyncManager>, addr: &str) -> Result<Self, Poct1Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Poct1Error::TransportError(format!("bind {addr}: {e}")))?;
        if let Some(dir) = &manager.config().capture_dir {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                log_warn(&format!(
                    "Capture directory {} unavailable: {e}; captures disabled for this run",
                    dir.display()
                ));
            }
        }
        Ok(DeviceServer { listener, manager })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, Poct1Error> {
        self.listener
            .local_addr()
            .map_err(|e| Poct1Error::TransportError(e.to_string()))
    }

    /// Accepts connections forever, one task per connection.
    pub async fn run(self) -> Result<(), Poct1Error> {
        log_info(&format!(
            "Listening for device connections on {}",
            self.local_addr()?
        ));
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| Poct1Error::TransportError(format!("accept: {e}")))?;
            let manager = Arc::clone(&self.manager);
            tokio::spawn(async move {
                if let Err(error) = handle_connection(manager, stream, peer).await {
                    log_error(&format!("Session from {peer} failed: {error}"));
                }
            });
        }
    }
}

/// Runs one connection start to finish. The session is always finalized,
/// whatever ended the connection; this is the sole merge trigger.
async fn handle_connection(
    manager: Arc<SyncManager>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), Poct1Error> {
    manager.notify(&SyncEvent::Connected {
        peer: peer.to_string(),
    });

    let mut session = manager.open_session();
    drive(&manager, &mut stream, &mut session).await;

    let report = manager.finalize_session(session.finish())?;
    log_info(&format!(
        "Connection from {peer} closed: {} new reading(s), {} stored",
        report.new_readings, report.total_stored
    ));
    Ok(())
}

/// Pumps the connection until it ends: EOF, read or write failure, or
/// idle timeout. Each terminal condition just returns; the caller
/// finalizes.
async fn drive(manager: &SyncManager, stream: &mut TcpStream, session: &mut DeviceSession) {
    let idle = Duration::from_secs(CONNECTION_IDLE_TIMEOUT_SECS);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = match timeout(idle, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                log_debug("Peer closed the connection");
                return;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                log_warn(&format!("Read failed: {e}"));
                manager.notify(&SyncEvent::Error {
                    detail: format!("transport read failed: {e}"),
                });
                return;
            }
            Err(_) => {
                log_warn(&format!(
                    "No data for {CONNECTION_IDLE_TIMEOUT_SECS}s; treating connection as closed"
                ));
                return;
            }
        };

        let step = session.on_data(&chunk[..read]);
        for event in &step.events {
            manager.notify(event);
        }
        if !write_responses(stream, &step).await {
            return;
        }
        archive_captures(manager.config().capture_dir.as_deref(), &step.captures).await;
    }
}

/// Writes every queued response; false means the connection is dead.
async fn write_responses(stream: &mut TcpStream, step: &SessionStep) -> bool {
    for text in &step.outbound {
        log_debug(&format!("Sending {} byte response", text.len()));
        if let Err(e) = stream.write_all(text.as_bytes()).await {
            log_warn(&format!("Write failed: {e}"));
            return false;
        }
    }
    true
}

/// Archives raw observation bodies, one file per message. Failures are
/// logged and swallowed; archival never blocks the protocol.
async fn archive_captures(dir: Option<&Path>, captures: &[String]) {
    let Some(dir) = dir else { return };
    for text in captures {
        let path = dir.join(capture_file_name());
        match tokio::fs::write(&path, text).await {
            Ok(()) => log_debug(&format!("Captured raw observations to {}", path.display())),
            Err(e) => log_warn(&format!("Capture write to {} failed: {e}", path.display())),
        }
    }
}

fn capture_file_name() -> String {
    format!("OBS_DATA_{}.xml", Local::now().format("%Y%m%d_%H%M%S_%6f"))
}
