//! Command line control for the alarm daemon
//!
//! Usage: routinectl <status|reconcile|reschedule|dismiss|cancel <id>|permission|watch|preview-tone <path> [cycles]>

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use routine::features::alert::write_alert_wav;
use routine::ipc::{connect_with_retry, get_socket_path, DaemonEvent, IpcClient};
use std::path::Path;
use std::time::Duration;

const USAGE: &str = "usage: routinectl <command>

commands:
  status                     show daemon status
  reconcile                  re-arm alarms from the reminder store
  reschedule                 cancel everything and rebuild from the store
  dismiss                    dismiss the sounding alert
  cancel <reminder-id>       cancel one reminder's alarm
  permission                 check exact alarm permission
  watch                      print alerts as they fire
  preview-tone <path> [n]    write n alert cycles (default 5) to a WAV file";

/// How long to wait for the daemon's answer
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    if command == "preview-tone" {
        return preview_tone(&args[1..]);
    }

    let mut client = connect_with_retry(&get_socket_path(), 3, Duration::from_millis(200)).await?;

    match command.as_str() {
        "status" => {
            client.request_status().await?;
            let event = wait_for(&mut client, |e| matches!(e, DaemonEvent::StatusUpdate { .. })).await?;
            print_event(&event);
        }
        "reconcile" => {
            let request_id = client.reconcile().await?;
            await_response(&mut client, &request_id).await?;
        }
        "reschedule" => {
            let request_id = client.reschedule_all().await?;
            await_response(&mut client, &request_id).await?;
        }
        "dismiss" => {
            let request_id = client.dismiss().await?;
            await_response(&mut client, &request_id).await?;
        }
        "cancel" => {
            let reminder_id = args
                .get(1)
                .ok_or_else(|| anyhow!("cancel needs a reminder id\n\n{USAGE}"))?;
            let request_id = client.cancel_alarm(reminder_id).await?;
            await_response(&mut client, &request_id).await?;
        }
        "permission" => {
            let request_id = client.request_exact_permission().await?;
            await_response(&mut client, &request_id).await?;
        }
        "watch" => watch(&mut client).await?,
        other => {
            eprintln!("unknown command '{other}'\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn preview_tone(args: &[String]) -> Result<()> {
    let path = args
        .first()
        .ok_or_else(|| anyhow!("preview-tone needs an output path\n\n{USAGE}"))?;
    let cycles = match args.get(1) {
        Some(n) => n
            .parse::<usize>()
            .map_err(|e| anyhow!("Invalid cycle count '{}': {}", n, e))?,
        None => 5,
    };
    write_alert_wav(Path::new(path), cycles)?;
    println!("Wrote {cycles} alert cycles to {path}");
    Ok(())
}

async fn wait_for<F>(client: &mut IpcClient, wanted: F) -> Result<DaemonEvent>
where
    F: Fn(&DaemonEvent) -> bool,
{
    tokio::time::timeout(RESPONSE_TIMEOUT, async {
        while let Some(event) = client.recv().await {
            if wanted(&event) {
                return Ok(event);
            }
        }
        Err(anyhow!("Daemon closed the connection"))
    })
    .await
    .map_err(|_| anyhow!("No response from daemon within {:?}", RESPONSE_TIMEOUT))?
}

async fn await_response(client: &mut IpcClient, request_id: &str) -> Result<()> {
    let event = wait_for(client, |e| {
        matches!(e, DaemonEvent::CommandResponse { request_id: id, .. } if id == request_id)
    })
    .await?;
    print_event(&event);
    if let DaemonEvent::CommandResponse { success: false, .. } = event {
        std::process::exit(1);
    }
    Ok(())
}

async fn watch(client: &mut IpcClient) -> Result<()> {
    println!("Watching for alerts (Ctrl-C to stop)");
    while let Some(event) = client.recv().await {
        if matches!(
            event,
            DaemonEvent::AlertShown { .. } | DaemonEvent::AlertCleared { .. }
        ) {
            print_event(&event);
        }
    }
    Err(anyhow!("Daemon closed the connection"))
}

fn print_event(event: &DaemonEvent) {
    match event {
        DaemonEvent::AlertShown {
            title, description, ..
        } => {
            println!("⏰ {title}");
            if !description.is_empty() {
                println!("   {description}");
            }
        }
        DaemonEvent::AlertCleared { session_id } => println!("✔ alert {session_id} dismissed"),
        DaemonEvent::CommandResponse { success, message, data, .. } => {
            let mark = if *success { "ok" } else { "failed" };
            println!("[{mark}] {}", message.as_deref().unwrap_or(""));
            if let Some(data) = data {
                if let Some(warnings) = data.get("warnings").and_then(|w| w.as_array()) {
                    for warning in warnings {
                        println!("  warning: {}", warning.as_str().unwrap_or_default());
                    }
                }
            }
        }
        DaemonEvent::StatusUpdate {
            version,
            uptime_seconds,
            exact_alarms_permitted,
            armed_timers,
            active_alert,
            client_count,
        } => {
            println!("routine alarmd v{version}, up {uptime_seconds}s");
            println!("  exact alarms: {}", if *exact_alarms_permitted { "permitted" } else { "not permitted" });
            if let Some(armed) = armed_timers {
                println!("  armed timers: {armed}");
            }
            match active_alert {
                Some(alert) => println!("  sounding: {}", alert.title),
                None => println!("  sounding: nothing"),
            }
            println!("  clients: {client_count}");
        }
        DaemonEvent::Heartbeat { timestamp } => println!("heartbeat {timestamp}"),
    }
}
