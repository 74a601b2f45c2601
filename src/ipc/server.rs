//! # IPC Server
//!
//! Unix socket server through which control clients drive the alarm daemon
//! and watch alerts.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Acts as an alert surface, broadcasting AlertShown/AlertCleared
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

use crate::features::alarms::service::AlarmService;
use crate::features::alarms::timer::TokioTimerFacility;
use crate::features::alert::output::{AlertSurface, AlertView};
use crate::features::get_routine_version;
use crate::ipc::protocol::{encode_message, read_frame, AlertInfo, ClientCommand, DaemonEvent};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use uuid::Uuid;

/// Maximum number of connected clients
const MAX_CLIENTS: usize = 10;

/// Broadcast channel capacity for events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Command channel capacity
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// IPC server handle for the daemon
#[derive(Clone)]
pub struct IpcServer {
    socket_path: String,
    /// Broadcast sender for events to all clients
    event_tx: broadcast::Sender<DaemonEvent>,
    /// Commands forwarded by client handlers
    command_rx: Arc<Mutex<mpsc::Receiver<ClientCommand>>>,
    command_tx: mpsc::Sender<ClientCommand>,
    client_count: Arc<RwLock<usize>>,
    /// Server start time for uptime calculation
    start_time: Instant,
    /// Host timer table, for the armed count in status updates
    timers: Option<Arc<TokioTimerFacility>>,
}

impl IpcServer {
    /// Create a new IPC server (does not start listening yet)
    pub fn new(socket_path: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        IpcServer {
            socket_path: socket_path.into(),
            event_tx,
            command_rx: Arc::new(Mutex::new(command_rx)),
            command_tx,
            client_count: Arc::new(RwLock::new(0)),
            start_time: Instant::now(),
            timers: None,
        }
    }

    pub fn with_timers(mut self, timers: Arc<TokioTimerFacility>) -> Self {
        self.timers = Some(timers);
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Bind the socket and start accepting clients in a background task
    pub async fn start(self: Arc<Self>) -> Result<()> {
        // Remove a stale socket left by a previous run
        if std::path::Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {}", self.socket_path);

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let client_count = *server.client_count.read().await;
                        if client_count >= MAX_CLIENTS {
                            warn!("Maximum IPC clients reached ({}), rejecting connection", MAX_CLIENTS);
                            continue;
                        }

                        *server.client_count.write().await += 1;
                        info!("Control client connected (total: {})", client_count + 1);

                        let server_clone = server.clone();
                        let client_count_ref = server.client_count.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server_clone.handle_client(stream).await {
                                debug!("Client handler ended: {}", e);
                            }
                            *client_count_ref.write().await -= 1;
                            info!("Control client disconnected");
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept IPC connection: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    async fn handle_client(self: Arc<Self>, stream: UnixStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut event_rx = self.event_tx.subscribe();

        let write_handle = tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => match encode_message(&event) {
                        Ok(data) => {
                            if let Err(e) = writer.write_all(&data).await {
                                debug!("Failed to write to client: {}", e);
                                break;
                            }
                            if let Err(e) = writer.flush().await {
                                debug!("Failed to flush to client: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to encode event: {}", e);
                        }
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged behind by {} events", n);
                    }
                }
            }
        });

        let command_tx = self.command_tx.clone();
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Client stream closed: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<ClientCommand>(&frame) {
                Ok(cmd) => {
                    if let Err(e) = command_tx.send(cmd).await {
                        error!("Failed to forward command: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command from client: {}", e);
                }
            }
        }

        write_handle.abort();
        Ok(())
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: DaemonEvent) {
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the event stream, as a connected client would
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_tx.subscribe()
    }

    /// Queue a command as if it came from a client
    pub async fn submit(&self, cmd: ClientCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| anyhow::anyhow!("Command queue closed: {}", e))
    }

    /// Receive the next client command
    pub async fn recv_command(&self) -> Option<ClientCommand> {
        self.command_rx.lock().await.recv().await
    }

    pub async fn client_count(&self) -> usize {
        *self.client_count.read().await
    }

    pub fn send_heartbeat(&self) {
        let timestamp = chrono::Utc::now().timestamp();
        self.broadcast(DaemonEvent::Heartbeat { timestamp });
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn respond(&self, request_id: String, success: bool, message: String, data: Option<serde_json::Value>) {
        self.broadcast(DaemonEvent::CommandResponse {
            request_id,
            success,
            message: Some(message),
            data,
        });
    }

    /// Execute one client command against the service and broadcast the response
    pub async fn process_command(&self, service: &Arc<AlarmService>, cmd: ClientCommand) {
        match cmd {
            ClientCommand::GetStatus => {
                let active_alert = service.active_alert().map(|a| AlertInfo {
                    session_id: a.session_id,
                    title: a.title,
                    description: a.description,
                });
                self.broadcast(DaemonEvent::StatusUpdate {
                    version: get_routine_version().to_string(),
                    uptime_seconds: self.get_uptime_seconds(),
                    exact_alarms_permitted: service.can_schedule_exact_alarms(),
                    armed_timers: self.timers.as_ref().map(|t| t.armed_count()),
                    active_alert,
                    client_count: self.client_count().await,
                });
                debug!("Sent StatusUpdate response");
            }
            ClientCommand::Reconcile { request_id } => {
                match service.reconcile_from_store().await {
                    Ok(report) => {
                        let warnings: Vec<String> =
                            report.warnings().iter().map(|w| w.to_string()).collect();
                        self.respond(
                            request_id,
                            true,
                            format!(
                                "{} armed, {} skipped, {} failed",
                                report.armed.len(),
                                report.skipped.len(),
                                report.failures.len()
                            ),
                            Some(serde_json::json!({
                                "armed": report.armed_ids(),
                                "warnings": warnings,
                            })),
                        );
                    }
                    Err(e) => self.respond(request_id, false, e.to_string(), None),
                }
            }
            ClientCommand::RescheduleAll { request_id } => {
                match service.reschedule_all_alarms().await {
                    Ok(report) => {
                        let warnings: Vec<String> =
                            report.warnings().iter().map(|w| w.to_string()).collect();
                        self.respond(
                            request_id,
                            true,
                            format!("Rebuilt {} alarms", report.armed.len()),
                            Some(serde_json::json!({
                                "armed": report.armed_ids(),
                                "warnings": warnings,
                            })),
                        );
                    }
                    Err(e) => self.respond(request_id, false, e.to_string(), None),
                }
            }
            ClientCommand::Dismiss { request_id } => {
                let service = service.clone();
                let dismissed = tokio::task::spawn_blocking(move || service.dismiss_active_alert())
                    .await
                    .unwrap_or(false);
                let message = if dismissed {
                    "Alert dismissed"
                } else {
                    "No alert is sounding"
                };
                self.respond(request_id, dismissed, message.to_string(), None);
            }
            ClientCommand::CancelAlarm {
                request_id,
                reminder_id,
            } => {
                service.cancel_alarm(&reminder_id);
                self.respond(
                    request_id,
                    true,
                    format!("Cancelled alarm for {reminder_id}"),
                    None,
                );
            }
            ClientCommand::RequestExactPermission { request_id } => {
                let permitted = service.request_exact_alarm_permission();
                let message = if permitted {
                    "Exact alarms are permitted"
                } else {
                    "Exact alarms are not permitted; alarms may be delayed"
                };
                self.respond(
                    request_id,
                    permitted,
                    message.to_string(),
                    Some(serde_json::json!({ "permitted": permitted })),
                );
            }
        }
    }

    /// Process client commands until the queue closes
    pub fn start_command_processor(self: Arc<Self>, service: Arc<AlarmService>) {
        tokio::spawn(async move {
            info!("📡 IPC command processor started");
            while let Some(cmd) = self.recv_command().await {
                debug!("Processing client command: {:?}", cmd);
                self.process_command(&service, cmd).await;
            }
        });
    }
}

impl AlertSurface for IpcServer {
    fn show(&self, view: &AlertView) {
        self.broadcast(DaemonEvent::AlertShown {
            session_id: view.session_id,
            title: view.title.clone(),
            description: view.description.clone(),
            action_label: view.action_label.clone(),
        });
    }

    fn clear(&self, session_id: Uuid) {
        self.broadcast(DaemonEvent::AlertCleared { session_id });
    }
}
