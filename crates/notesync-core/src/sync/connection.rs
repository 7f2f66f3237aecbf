//! Push channel connection
//!
//! Maintains a long-lived WebSocket connection to the notes server's `/ws`
//! endpoint. Every successful open triggers a full reload; every close or
//! failed attempt schedules exactly one new attempt after a fixed delay.
//! Retries never stop and the delay never grows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;

/// Commands sent to the connection task
#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    /// Close the socket and stop reconnecting
    Shutdown,
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected; waiting to retry or shut down
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and listening
    Connected,
}

/// Configuration for the push connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL
    pub url: String,
    /// Fixed wait between a close and the next attempt
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Handle to control the connection task
pub struct ConnectionHandle {
    command_tx: mpsc::Sender<ConnectionCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    attempts: Arc<AtomicU64>,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectionHandle {
    /// Get the current status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawn the push connection task
///
/// Messages are decoded and handed to `engine`. The task runs until
/// [`ConnectionHandle::shutdown`] is called or the handle is dropped.
pub fn spawn_connection(config: ConnectionConfig, engine: Arc<SyncEngine>) -> ConnectionHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let attempts = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(connection_loop(
        config,
        engine,
        command_rx,
        status_tx,
        attempts.clone(),
    ));

    ConnectionHandle {
        command_tx,
        status_rx,
        attempts,
        task,
    }
}

/// Main loop with fixed-interval reconnection
async fn connection_loop(
    config: ConnectionConfig,
    engine: Arc<SyncEngine>,
    mut command_rx: mpsc::Receiver<ConnectionCommand>,
    status_tx: watch::Sender<ConnectionStatus>,
    attempts: Arc<AtomicU64>,
) {
    let client_id = format!("notesync-{}", &uuid::Uuid::new_v4().to_string()[..8]);

    loop {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        status_tx.send_replace(ConnectionStatus::Connecting);
        debug!(%client_id, attempt, url = %config.url, "Connecting to push channel");

        match connect_and_listen(&config, &engine, &mut command_rx, &status_tx).await {
            Ok(true) => {
                status_tx.send_replace(ConnectionStatus::Disconnected);
                info!(%client_id, "Push channel shut down");
                break;
            }
            Ok(false) => info!(%client_id, "Push channel closed"),
            Err(e) => warn!(%client_id, error = %e, "Push channel failed"),
        }

        status_tx.send_replace(ConnectionStatus::Disconnected);

        // Wait before reconnecting, but check for shutdown command
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::Shutdown) | None => break,
                }
            }
        }
    }
}

/// Connect and dispatch messages until close or shutdown
///
/// Returns `Ok(true)` when shut down on request, `Ok(false)` when the
/// server closed the channel.
async fn connect_and_listen(
    config: &ConnectionConfig,
    engine: &SyncEngine,
    command_rx: &mut mpsc::Receiver<ConnectionCommand>,
    status_tx: &watch::Sender<ConnectionStatus>,
) -> Result<bool> {
    let (ws_stream, _) = connect_async(config.url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    status_tx.send_replace(ConnectionStatus::Connected);
    info!(url = %config.url, "Push channel connected");

    // Resynchronize before reading; failures are logged by the engine
    let _ = engine.load_all().await;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::Shutdown) | None => {
                        write.close().await.ok();
                        return Ok(true);
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        engine.handle_text(&text);
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            engine.handle_text(text);
                        }
                        Err(e) => warn!(error = %e, "Dropping non UTF-8 push message"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(false),
                    Some(Err(e)) => return Err(e.into()),
                    _ => {
                        // Ping/pong/raw frames
                    }
                }
            }
        }
    }
}
