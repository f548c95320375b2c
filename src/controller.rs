use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Sleep};

use crate::alert::AlertLevel;
use crate::api::client::{SoundClassifier, TransportError};
use crate::api::models::ClassificationResponse;
use crate::audio::recorder::AudioCapture;
use crate::feedback::engine::FeedbackEngine;
use crate::logger::{error, info, warn, Component};
use crate::settings::ListeningSettings;
use crate::status::{CycleStatus, StatusTracker};

const RECORDING_ERROR_MSG: &str = "Recording failed";
const CLASSIFICATION_ERROR_MSG: &str = "Classification failed";

/// How long a detection or error line stays up before the status returns to
/// its neutral resting text.
const STATUS_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Idle,
    Recording,
    Processing,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Length of each capture window.
    pub record_window: Duration,
    /// Settle time added to the record window before the next cycle.
    pub cycle_buffer: Duration,
}

impl ControllerConfig {
    pub fn from_settings(settings: &ListeningSettings) -> Self {
        Self {
            record_window: Duration::from_millis(settings.record_duration_ms),
            cycle_buffer: Duration::from_millis(settings.cycle_buffer_ms),
        }
    }

    fn idle_gap(&self) -> Duration {
        self.record_window + self.cycle_buffer
    }
}

#[derive(Debug)]
enum ControllerCommand {
    StartListening {
        response: oneshot::Sender<Result<(), String>>,
    },
    StopListening {
        response: oneshot::Sender<Result<(), String>>,
    },
    ToggleContinuous {
        response: oneshot::Sender<bool>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Handle to the single controller task driving the record → classify →
/// alert cycle.
pub struct ListeningController {
    command_tx: mpsc::Sender<ControllerCommand>,
}

impl ListeningController {
    pub fn spawn(
        recorder: Arc<dyn AudioCapture>,
        classifier: Arc<dyn SoundClassifier>,
        feedback: Arc<FeedbackEngine>,
        status: Arc<StatusTracker>,
        config: ControllerConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel::<ControllerCommand>(16);

        tokio::spawn(async move {
            let driver = CycleDriver {
                recorder,
                classifier,
                feedback,
                status,
                config,
                command_rx,
                state: ControllerState::Idle,
                continuous: false,
                classify_task: None,
                processing_clip: None,
                stop_timer: None,
                rearm_timer: None,
                linger_timer: None,
            };
            driver.run().await;
        });

        ListeningController { command_tx }
    }

    /// Begin one capture cycle. No-op while a cycle is already underway.
    pub async fn start_listening(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::StartListening {
                response: response_tx,
            })
            .await
            .map_err(|_| "Failed to send command".to_string())?;

        response_rx
            .await
            .map_err(|_| "Failed to receive response".to_string())?
    }

    /// External stop: clears continuous mode and forces the controller back
    /// to idle from any state.
    pub async fn stop_listening(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::StopListening {
                response: response_tx,
            })
            .await
            .map_err(|_| "Failed to send command".to_string())?;

        response_rx
            .await
            .map_err(|_| "Failed to receive response".to_string())?
    }

    /// Flip continuous mode; returns the new value. Turning it on starts a
    /// cycle immediately, turning it off forces idle even mid-recording.
    pub async fn toggle_continuous(&self) -> Result<bool, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ControllerCommand::ToggleContinuous {
                response: response_tx,
            })
            .await
            .map_err(|_| "Failed to send command".to_string())?;

        response_rx
            .await
            .map_err(|_| "Failed to receive response".to_string())
    }

    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command_tx
            .send(ControllerCommand::Shutdown {
                response: response_tx,
            })
            .await
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }
}

struct CycleDriver {
    recorder: Arc<dyn AudioCapture>,
    classifier: Arc<dyn SoundClassifier>,
    feedback: Arc<FeedbackEngine>,
    status: Arc<StatusTracker>,
    config: ControllerConfig,
    command_rx: mpsc::Receiver<ControllerCommand>,
    state: ControllerState,
    continuous: bool,
    classify_task: Option<JoinHandle<Result<ClassificationResponse, TransportError>>>,
    processing_clip: Option<PathBuf>,
    /// Auto-stop for the current capture window.
    stop_timer: Option<Pin<Box<Sleep>>>,
    /// Continuous-mode gap before the next cycle.
    rearm_timer: Option<Pin<Box<Sleep>>>,
    /// Clears a lingering detection/error status line.
    linger_timer: Option<Pin<Box<Sleep>>>,
}

impl CycleDriver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    match maybe_cmd {
                        Some(ControllerCommand::Shutdown { response }) => {
                            self.force_idle();
                            self.recorder.cleanup();
                            let _ = response.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            // All handles dropped: tear down like a shutdown
                            self.force_idle();
                            self.recorder.cleanup();
                            break;
                        }
                    }
                }
                _ = wait(&mut self.stop_timer), if self.stop_timer.is_some() => {
                    self.stop_timer = None;
                    self.finish_recording();
                }
                result = join_next(&mut self.classify_task), if self.classify_task.is_some() => {
                    self.classify_task = None;
                    self.complete_cycle(result);
                }
                _ = wait(&mut self.rearm_timer), if self.rearm_timer.is_some() => {
                    self.rearm_timer = None;
                    if self.continuous {
                        let _ = self.begin_recording();
                    }
                }
                _ = wait(&mut self.linger_timer), if self.linger_timer.is_some() => {
                    self.linger_timer = None;
                    if self.state == ControllerState::Idle {
                        self.status.update(CycleStatus::Idle);
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::StartListening { response } => {
                // Re-entrant start is a state-guarded no-op: never two
                // captures, never a capture racing a submission
                if self.state != ControllerState::Idle {
                    let _ = response.send(Ok(()));
                    return;
                }
                self.rearm_timer = None;
                let _ = response.send(self.begin_recording());
            }
            ControllerCommand::StopListening { response } => {
                self.continuous = false;
                self.force_idle();
                let _ = response.send(Ok(()));
            }
            ControllerCommand::ToggleContinuous { response } => {
                self.continuous = !self.continuous;
                info(
                    Component::Controller,
                    if self.continuous {
                        "Continuous listening on"
                    } else {
                        "Continuous listening off"
                    },
                );

                if self.continuous {
                    if self.state == ControllerState::Idle {
                        let _ = self.begin_recording();
                    }
                } else {
                    self.force_idle();
                }
                let _ = response.send(self.continuous);
            }
            ControllerCommand::Shutdown { .. } => unreachable!("handled in run loop"),
        }
    }

    fn begin_recording(&mut self) -> Result<(), String> {
        match self.recorder.start() {
            Ok(session) => {
                let clip = session
                    .file_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| session.file_path.display().to_string());

                self.state = ControllerState::Recording;
                self.linger_timer = None;
                self.status.update(CycleStatus::Recording { clip });
                self.stop_timer = Some(Box::pin(sleep(self.config.record_window)));
                Ok(())
            }
            Err(e) => {
                error(
                    Component::Recording,
                    &format!("Failed to start capture: {}", e),
                );
                self.report_error(RECORDING_ERROR_MSG);
                self.settle();
                Err(e.to_string())
            }
        }
    }

    /// Capture window elapsed: finalize the clip and hand it to the
    /// classifier.
    fn finish_recording(&mut self) {
        if self.state != ControllerState::Recording {
            return;
        }

        match self.recorder.stop() {
            Ok(path) if path.exists() => {
                let clip = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());

                self.state = ControllerState::Processing;
                self.status.update(CycleStatus::Processing { clip });
                self.processing_clip = Some(path.clone());

                let classifier = self.classifier.clone();
                self.classify_task =
                    Some(tokio::spawn(async move { classifier.classify(&path).await }));
            }
            Ok(path) => {
                warn(
                    Component::Recording,
                    &format!("Capture produced no clip at {}", path.display()),
                );
                self.state = ControllerState::Idle;
                self.report_error(RECORDING_ERROR_MSG);
                self.settle();
            }
            Err(e) => {
                error(
                    Component::Recording,
                    &format!("Failed to stop capture: {}", e),
                );
                self.state = ControllerState::Idle;
                self.report_error(RECORDING_ERROR_MSG);
                self.settle();
            }
        }
    }

    /// Classification settled: render the outcome and close the cycle. All
    /// failures are contained here; the controller always returns to idle.
    fn complete_cycle(
        &mut self,
        result: Result<Result<ClassificationResponse, TransportError>, JoinError>,
    ) {
        if let Some(clip) = self.processing_clip.take() {
            let _ = std::fs::remove_file(&clip);
        }

        match result {
            Ok(Ok(response)) => self.render_result(response),
            Ok(Err(e)) => {
                error(
                    Component::Classification,
                    &format!("Classification failed: {}", e),
                );
                self.report_error(CLASSIFICATION_ERROR_MSG);
            }
            Err(e) => {
                error(
                    Component::Controller,
                    &format!("Classification task died: {}", e),
                );
                self.report_error(CLASSIFICATION_ERROR_MSG);
            }
        }

        self.state = ControllerState::Idle;
        self.settle();
    }

    fn render_result(&mut self, response: ClassificationResponse) {
        match (response.success, response.prediction, response.feedback) {
            (true, Some(prediction), Some(feedback)) => {
                let label = prediction.label.replace('_', " ").to_uppercase();
                info(
                    Component::Controller,
                    &format!(
                        "Detected {} ({:.1}% confidence)",
                        label,
                        prediction.confidence * 100.0
                    ),
                );

                self.status.update(CycleStatus::Detection {
                    label,
                    confidence: prediction.confidence,
                    message: feedback.message.clone(),
                    level: AlertLevel::parse(&feedback.alert_level),
                });
                self.linger_timer = Some(Box::pin(sleep(STATUS_LINGER)));
                self.feedback.render(&feedback);
            }
            (_, _, _) => {
                // success:false, or a success flag with missing payloads:
                // either way this is an error, never a feedback render
                let message = response
                    .error
                    .unwrap_or_else(|| CLASSIFICATION_ERROR_MSG.to_string());
                self.report_error(&message);
            }
        }
    }

    fn report_error(&mut self, message: &str) {
        self.status.update(CycleStatus::Error {
            message: message.to_string(),
        });
        self.linger_timer = Some(Box::pin(sleep(STATUS_LINGER)));
    }

    /// Close out a finished cycle: schedule the next one when continuous
    /// mode is still on. A failed cycle re-arms like a successful one.
    fn settle(&mut self) {
        if self.continuous {
            self.rearm_timer = Some(Box::pin(sleep(self.config.idle_gap())));
        }
    }

    /// Force the controller to idle from any state, cancelling timers and
    /// in-flight feedback. An in-flight submission is detached rather than
    /// cancelled; its result is discarded when it completes.
    fn force_idle(&mut self) {
        self.stop_timer = None;
        self.rearm_timer = None;
        self.linger_timer = None;

        match self.state {
            ControllerState::Recording => {
                // Implicit stop: the partial clip is discarded, not submitted
                match self.recorder.stop() {
                    Ok(path) => {
                        let _ = std::fs::remove_file(path);
                    }
                    Err(e) => warn(
                        Component::Recording,
                        &format!("Stop during teardown failed: {}", e),
                    ),
                }
            }
            ControllerState::Processing => {
                // Dropping the handle detaches the task without aborting it
                self.classify_task = None;
                if let Some(clip) = self.processing_clip.take() {
                    let _ = std::fs::remove_file(clip);
                }
            }
            ControllerState::Idle => {}
        }

        self.state = ControllerState::Idle;
        self.feedback.cancel_all();
        self.status.update(CycleStatus::Idle);
    }
}

async fn wait(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot.as_mut() {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn join_next(
    slot: &mut Option<JoinHandle<Result<ClassificationResponse, TransportError>>>,
) -> Result<Result<ClassificationResponse, TransportError>, JoinError> {
    match slot.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
