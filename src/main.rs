use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use soundwatch::api::{ApiClient, ClientConfig, SoundClassifier};
use soundwatch::audio::{probe_input_device, CpalRecorder};
use soundwatch::controller::{ControllerConfig, ListeningController};
use soundwatch::feedback::{ConsoleMotor, FeedbackEngine, TerminalSurface};
use soundwatch::logger::{error, info, warn, Component};
use soundwatch::settings::SettingsManager;
use soundwatch::status::{CycleStatus, StatusTracker};

#[derive(Parser, Debug)]
#[command(
    name = "soundwatch",
    about = "Continuous environmental sound alert client",
    version
)]
struct Args {
    /// Classification server base URL (session override, not persisted)
    #[arg(long)]
    server_url: Option<String>,

    /// Directory holding settings.json and recorded clips
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Start continuous listening immediately
    #[arg(long)]
    listen: bool,

    /// Run a single record/classify cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = match args.config_dir.clone() {
        Some(dir) => dir,
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("could not resolve a config directory"))?
            .join("soundwatch"),
    };
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;

    let settings = SettingsManager::new(&config_dir).map_err(|e| anyhow!(e))?;
    let mut app_settings = settings.get().clone();
    if let Some(url) = args.server_url {
        app_settings.server.base_url = url;
    }

    // Microphone access is a hard gate: without it no recording state is
    // ever reachable, and there is no retry loop
    match probe_input_device() {
        Ok(name) => info(Component::Recording, &format!("Input device: {}", name)),
        Err(e) => {
            error(Component::Recording, &format!("Microphone unavailable: {}", e));
            bail!("microphone access denied or no input device present");
        }
    }

    let client = ApiClient::new(ClientConfig::from_settings(&app_settings.server))
        .map_err(|e| anyhow!(e))?;

    info(
        Component::Classification,
        &format!("Connecting to {}", app_settings.server.base_url),
    );
    match client.check_health().await {
        Ok(health) if health.is_ready() => {
            info(Component::Classification, "Connected - model loaded");
        }
        Ok(_) => {
            error(
                Component::Classification,
                "Server reachable but the model is not loaded",
            );
            bail!("classification service is not ready");
        }
        Err(e) => {
            error(Component::Classification, &format!("Connection failed: {}", e));
            bail!("could not reach the classification service");
        }
    }

    match client.supported_classes().await {
        Ok(classes) => info(
            Component::Classification,
            &format!(
                "{} supported classes: {}",
                classes.total_classes,
                classes.classes.join(", ")
            ),
        ),
        Err(e) => warn(
            Component::Classification,
            &format!("Could not fetch supported classes: {}", e),
        ),
    }

    let recordings_dir = config_dir.join("recordings");
    std::fs::create_dir_all(&recordings_dir)
        .with_context(|| format!("failed to create {}", recordings_dir.display()))?;

    let recorder = Arc::new(CpalRecorder::new(recordings_dir));
    let engine = Arc::new(FeedbackEngine::new(
        Arc::new(TerminalSurface::new()),
        Arc::new(ConsoleMotor::new()),
        &app_settings.feedback,
    ));
    let status = Arc::new(StatusTracker::new());

    let controller = ListeningController::spawn(
        recorder,
        Arc::new(client),
        engine,
        status.clone(),
        ControllerConfig::from_settings(&app_settings.listening),
    );

    spawn_status_printer(&status);

    if args.once {
        controller.start_listening().await.map_err(|e| anyhow!(e))?;
        wait_for_cycle_end(&status).await;
    } else {
        if args.listen || app_settings.listening.auto_record {
            let _ = controller.toggle_continuous().await;
        } else {
            info(
                Component::Controller,
                "Idle - start continuous listening with --listen or the auto_record setting",
            );
        }

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info(Component::Controller, "Shutting down");
    }

    controller.shutdown().await;
    Ok(())
}

fn spawn_status_printer(status: &StatusTracker) {
    let mut status_rx = status.subscribe();

    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let current = status_rx.borrow_and_update().clone();
            match current {
                CycleStatus::Idle => info(Component::Controller, "Listening idle"),
                CycleStatus::Recording { clip } => {
                    info(Component::Controller, &format!("Recording {}", clip))
                }
                CycleStatus::Processing { clip } => {
                    info(Component::Controller, &format!("Classifying {}", clip))
                }
                CycleStatus::Detection {
                    label,
                    confidence,
                    message,
                    level,
                } => info(
                    Component::Controller,
                    &format!(
                        "[{}] {} ({:.1}%): {}",
                        level.as_str(),
                        label,
                        confidence * 100.0,
                        message
                    ),
                ),
                CycleStatus::Error { message } => warn(Component::Controller, &message),
            }
        }
    });
}

/// Block until the cycle kicked off by `start_listening` has settled.
async fn wait_for_cycle_end(status: &StatusTracker) {
    let mut rx = status.subscribe();
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let current = rx.borrow_and_update().clone();
        if !matches!(
            current,
            CycleStatus::Recording { .. } | CycleStatus::Processing { .. }
        ) {
            break;
        }
    }
}
