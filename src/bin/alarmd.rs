use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};

use routine::core::{Config, SystemClock};
use routine::database::Database;
use routine::features::alert::{
    AlertManager, AlertOutputs, AlertSurface, LogSurface, LogVibrator, PacedAudioOutput, SurfaceSet,
};
use routine::features::{get_features, get_routine_version, AlarmService, TokioTimerFacility};
use routine::ipc::IpcServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let mut shutdown = ShutdownSignals::install()?;
    info!("Starting routine alarm daemon v{}", get_routine_version());
    for feature in get_features() {
        info!("  {:<18} v{}", feature.name, feature.version);
    }

    let database = Database::open(&config.database_path)?;
    let clock = Arc::new(SystemClock);

    let (timers, fired_rx) = TokioTimerFacility::new(
        clock.clone(),
        config.exact_alarms_permitted,
        config.inexact_window,
    );
    let timers = Arc::new(timers);

    let ipc_server = Arc::new(IpcServer::new(config.socket_path.clone()).with_timers(timers.clone()));

    let alerts = Arc::new(AlertManager::new(AlertOutputs {
        audio: Arc::new(PacedAudioOutput),
        vibrator: Arc::new(LogVibrator),
        surface: Arc::new(SurfaceSet::new(vec![
            Arc::new(LogSurface) as Arc<dyn AlertSurface>,
            ipc_server.clone(),
        ])),
        dismiss_timeout: config.dismiss_timeout,
    }));

    let service = Arc::new(AlarmService::new(
        Arc::new(database),
        timers.clone(),
        clock,
        alerts,
        config.task_reminder_time,
    ));

    let dispatcher = service.clone().spawn_dispatcher(fired_rx);

    if !service.can_schedule_exact_alarms() {
        warn!("⚠️ Exact alarms are not permitted; set EXACT_ALARMS_PERMITTED=true for on-time delivery");
    }

    // Every timer from a previous run is gone
    service.recovery().on_system_restart().await;

    if let Err(e) = ipc_server.clone().start().await {
        error!("Failed to start IPC server: {e}. Remote control will be unavailable.");
    } else {
        info!("📡 IPC server started on {}", ipc_server.socket_path());
    }
    ipc_server.clone().start_command_processor(service.clone());

    let heartbeat_ipc = ipc_server.clone();
    let heartbeat_interval = config.heartbeat_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        loop {
            interval.tick().await;
            heartbeat_ipc.send_heartbeat();
        }
    });

    let reason = shutdown.wait().await?;
    info!("Shutting down ({reason:?})");

    let teardown = service.clone();
    tokio::task::spawn_blocking(move || teardown.dismiss_active_alert()).await?;
    dispatcher.abort();
    if let Err(e) = std::fs::remove_file(ipc_server.socket_path()) {
        warn!("Could not remove socket {}: {}", ipc_server.socket_path(), e);
    }

    Ok(())
}

/// What stopped the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupt,
    /// Service managers stop the daemon with SIGTERM
    Terminate,
}

struct ShutdownSignals {
    terminate: Signal,
}

impl ShutdownSignals {
    /// Register the handlers up front so a SIGTERM during startup still
    /// goes through teardown
    fn install() -> Result<Self> {
        Ok(ShutdownSignals {
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn wait(&mut self) -> Result<Shutdown> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok(Shutdown::Interrupt)
            }
            _ = self.terminate.recv() => Ok(Shutdown::Terminate),
        }
    }
}
