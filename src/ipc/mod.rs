//! # IPC Module
//!
//! Control socket between the alarm daemon and command line clients.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Alert events for watching clients
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{connect_with_retry, IpcClient};
pub use protocol::{AlertInfo, ClientCommand, DaemonEvent};
pub use server::IpcServer;

/// Default socket path for IPC communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/routine-alarms.sock";

/// Get the socket path from environment or use default
pub fn get_socket_path() -> String {
    std::env::var("ROUTINE_IPC_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}
