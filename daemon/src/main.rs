mod config;
mod coordinator;
mod credential;
mod desktop;
mod event;
mod login;
mod paths;
mod process;
mod request;
mod status;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::CharacterProfile;
use crate::coordinator::LauncherCoordinator;
use crate::credential::ProtectedCredentials;
use crate::desktop::router::DesktopRouter;
use crate::process::SystemProcessService;

/// Seconds between liveness sweeps.
const MONITOR_INTERVAL_SECS: u64 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        error!("failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let mut config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("config error (using defaults): {e:#}");
        config::Config::default()
    });
    let mut profiles: Vec<CharacterProfile> = config.characters.clone();

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::DaemonStatus::new();

    // ── Orchestration engine ──────────────────────────────────────────────────
    #[cfg(windows)]
    let desktop_ops = desktop::win32::ShellDesktopOps::new();
    #[cfg(not(windows))]
    let desktop_ops = desktop::UnsupportedDesktopOps;

    let mut coordinator = LauncherCoordinator::new(
        SystemProcessService::new(),
        DesktopRouter::new(desktop_ops),
        ProtectedCredentials,
    );
    coordinator.initialize_runtime_state(&mut profiles);
    current_status.sync_characters(&profiles);
    status::write_status(&status_path, &mut current_status);

    // ── Background tasks ──────────────────────────────────────────────────────
    let (event_tx, mut event_rx) = mpsc::channel::<event::DaemonEvent>(32);
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(request::watch_requests(paths::request_file_path(), event_tx.clone()));

    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(MONITOR_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                if tx.send(event::DaemonEvent::MonitorTick).await.is_err() {
                    break;
                }
            }
        });
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("altpilot-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    // Single consumer: monitor ticks and launch requests are serialized here,
    // so the coordinator's maps never see concurrent access.
    while let Some(evt) = event_rx.recv().await {
        match evt {
            event::DaemonEvent::MonitorTick => {
                let updates = coordinator.monitor_running_processes(&mut profiles);
                for update in &updates {
                    info!("{update}");
                }
                let changed = current_status.sync_characters(&profiles);
                if changed || !updates.is_empty() {
                    if let Some(last) = updates.last() {
                        current_status.last_action = Some(last.clone());
                    }
                    status::write_status(&status_path, &mut current_status);
                }
            }

            event::DaemonEvent::LaunchRequested(request) => {
                let target = request.character.trim();
                let Some(index) = profiles
                    .iter()
                    .position(|p| p.name.trim().eq_ignore_ascii_case(target))
                else {
                    warn!("launch request for unknown character '{target}'");
                    current_status.error = Some(format!("Unknown character '{target}'."));
                    status::write_status(&status_path, &mut current_status);
                    continue;
                };

                if let Some(warning) = config::launch_input_error(&profiles[index], &config.global)
                {
                    warn!("launch request for '{target}' rejected: {warning}");
                    current_status.error = Some(warning);
                    status::write_status(&status_path, &mut current_status);
                    continue;
                }

                current_status.state = status::DaemonState::Launching;
                status::write_status(&status_path, &mut current_status);

                let mode = request.mode.unwrap_or(config.global.launch_mode);
                let game_path = PathBuf::from(&config.global.game_path);
                let outcome = coordinator
                    .launch_or_focus(&mut profiles[index], &game_path, mode)
                    .await;

                match outcome {
                    Ok(result) => {
                        info!("{}", result.message);
                        current_status.last_action = Some(result.message);
                        current_status.error = None;
                    }
                    Err(failure) => {
                        warn!("launch failed for '{target}': {failure}");
                        current_status.error = Some(format!("Launch failed: {failure}"));
                    }
                }
                current_status.state = status::DaemonState::Monitoring;
                current_status.sync_characters(&profiles);
                status::write_status(&status_path, &mut current_status);
            }

            event::DaemonEvent::ConfigReloaded(new_config) => {
                info!("config reloaded");
                profiles = coordinator.reconcile_profiles(&profiles, &new_config.characters);
                config = new_config;
                current_status.sync_characters(&profiles);
                status::write_status(&status_path, &mut current_status);
            }

            event::DaemonEvent::Shutdown => {
                info!("shutting down");
                current_status.state = status::DaemonState::Stopped;
                status::write_status(&status_path, &mut current_status);
                break;
            }
        }
    }
}
