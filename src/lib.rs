// Core layer - shared types, clock and configuration
pub mod core;

// Features layer - scheduling, delivery, recovery
pub mod features;

// IPC layer - control socket between daemon and clients
pub mod ipc;

// Reminder store
pub mod database;

// In-memory collaborators for tests, behind the `testing` feature
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use core::{AlarmError, Clock, Config, Reminder, Settings, SystemClock};
pub use database::{Database, ReminderStore};
pub use features::{
    get_features, get_routine_version, AlarmDeliveryHandler, AlarmScheduler, AlarmService,
    AlertManager, AlertOutputs, AlertSession, RecoveryTrigger, TokioTimerFacility,
};
pub use ipc::{ClientCommand, DaemonEvent, IpcClient, IpcServer};
