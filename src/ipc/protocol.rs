//! # IPC Protocol
//!
//! Message types for daemon <-> control client communication over a Unix
//! socket.
//!
//! Uses length-prefixed JSON framing:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON payload

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Frames larger than this are rejected
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

// ============================================================================
// Daemon -> Client Events
// ============================================================================

/// Events broadcast by the daemon to every connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonEvent {
    /// An alert session started sounding
    AlertShown {
        session_id: Uuid,
        title: String,
        description: String,
        action_label: String,
    },
    /// An alert session was dismissed
    AlertCleared { session_id: Uuid },
    /// Response to a command carrying a request id
    CommandResponse {
        request_id: String,
        success: bool,
        message: Option<String>,
        data: Option<serde_json::Value>,
    },
    /// Response to GetStatus
    StatusUpdate {
        version: String,
        uptime_seconds: u64,
        exact_alarms_permitted: bool,
        armed_timers: Option<usize>,
        active_alert: Option<AlertInfo>,
        client_count: usize,
    },
    /// Periodic liveness beacon
    Heartbeat { timestamp: i64 },
}

/// The sounding alert as reported in a status update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertInfo {
    pub session_id: Uuid,
    pub title: String,
    pub description: String,
}

// ============================================================================
// Client -> Daemon Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Reconcile timers against the store's current contents
    Reconcile { request_id: String },
    /// Cancel everything and rebuild from the store
    RescheduleAll { request_id: String },
    /// Dismiss the sounding alert
    Dismiss { request_id: String },
    /// Cancel a single reminder's alarm
    CancelAlarm {
        request_id: String,
        reminder_id: String,
    },
    /// Ask the host for exact alarm permission
    RequestExactPermission { request_id: String },
    GetStatus,
}

// ============================================================================
// Framing - Length-prefixed JSON messages
// ============================================================================

/// Encode a message with length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_BYTES {
        return Err(anyhow!("Message too large: {} bytes", json.len()));
    }
    let len = json.len() as u32;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Read one length-prefixed frame. Fails on EOF, I/O errors and oversize frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_BYTES {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
