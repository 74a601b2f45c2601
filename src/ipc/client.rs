//! # IPC Client
//!
//! Unix socket client used by `routinectl` to drive the daemon.

use crate::ipc::protocol::{encode_message, read_frame, ClientCommand, DaemonEvent};
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IpcClient {
    event_rx: mpsc::Receiver<DaemonEvent>,
    command_tx: mpsc::Sender<ClientCommand>,
    connected: Arc<AtomicBool>,
}

impl IpcClient {
    /// Connect to the daemon's IPC server
    pub async fn connect(socket_path: &str) -> Result<Self> {
        info!("Connecting to IPC server at {}", socket_path);

        let stream = timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path))
            .await
            .map_err(|_| anyhow!("Connection timeout"))?
            .map_err(|e| anyhow!("Failed to connect to {}: {}", socket_path, e))?;

        debug!("Connected to IPC server");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(true));

        let connected_clone = connected.clone();
        tokio::spawn(async move {
            Self::connection_loop(stream, event_tx, command_rx, connected_clone).await;
        });

        Ok(IpcClient {
            event_rx,
            command_tx,
            connected,
        })
    }

    /// Runs until the daemon hangs up or the client is dropped
    async fn connection_loop(
        stream: UnixStream,
        event_tx: mpsc::Sender<DaemonEvent>,
        command_rx: mpsc::Receiver<ClientCommand>,
        connected: Arc<AtomicBool>,
    ) {
        let (reader, writer) = stream.into_split();
        let writer_task = tokio::spawn(write_commands(writer, command_rx, connected.clone()));

        read_events(reader, event_tx).await;

        connected.store(false, Ordering::SeqCst);
        writer_task.abort();
        debug!("IPC connection closed");
    }

    /// Receive the next event; `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<DaemonEvent> {
        self.event_rx.recv().await
    }

    pub async fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| anyhow!("Failed to send command: {}", e))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn request_status(&self) -> Result<()> {
        self.send(ClientCommand::GetStatus).await
    }

    /// Reconcile against the store. Returns the request id to match the response.
    pub async fn reconcile(&self) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::Reconcile {
            request_id: request_id.clone(),
        })
        .await?;
        Ok(request_id)
    }

    pub async fn reschedule_all(&self) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::RescheduleAll {
            request_id: request_id.clone(),
        })
        .await?;
        Ok(request_id)
    }

    pub async fn dismiss(&self) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::Dismiss {
            request_id: request_id.clone(),
        })
        .await?;
        Ok(request_id)
    }

    pub async fn cancel_alarm(&self, reminder_id: &str) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::CancelAlarm {
            request_id: request_id.clone(),
            reminder_id: reminder_id.to_string(),
        })
        .await?;
        Ok(request_id)
    }

    pub async fn request_exact_permission(&self) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::RequestExactPermission {
            request_id: request_id.clone(),
        })
        .await?;
        Ok(request_id)
    }
}

/// Forward decoded events until the socket closes or nobody listens
async fn read_events(mut reader: OwnedReadHalf, event_tx: mpsc::Sender<DaemonEvent>) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read ended: {}", e);
                return;
            }
        };
        let event = match serde_json::from_slice::<DaemonEvent>(&frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping undecodable event: {}", e);
                continue;
            }
        };
        if event_tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Frame and write queued commands; a write failure marks the client disconnected
async fn write_commands(
    mut writer: OwnedWriteHalf,
    mut command_rx: mpsc::Receiver<ClientCommand>,
    connected: Arc<AtomicBool>,
) {
    while let Some(cmd) = command_rx.recv().await {
        let data = match encode_message(&cmd) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode {:?}: {}", cmd, e);
                continue;
            }
        };
        let written = async {
            writer.write_all(&data).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            error!("Failed to send command to daemon: {}", e);
            connected.store(false, Ordering::SeqCst);
            return;
        }
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Try to connect with retries
pub async fn connect_with_retry(
    socket_path: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<IpcClient> {
    let mut attempt = 1;
    loop {
        match IpcClient::connect(socket_path).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to connect after {} attempts: {}",
                    attempt,
                    e
                ));
            }
        }
    }
}
