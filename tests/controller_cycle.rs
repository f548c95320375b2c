use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::{advance, sleep};

use soundwatch::alert::{AlertLevel, Rgb};
use soundwatch::api::{
    ClassificationResponse, HealthResponse, Prediction, ServerFeedback, SoundClassifier,
    SupportedClassesResponse, TransportError,
};
use soundwatch::audio::{AudioCapture, RecordingError, RecordingSession};
use soundwatch::controller::{ControllerConfig, ListeningController};
use soundwatch::feedback::{FeedbackEngine, HapticMotor, VisualSurface};
use soundwatch::settings::FeedbackSettings;
use soundwatch::status::{CycleStatus, StatusTracker};

type ClassifyResult = Result<ClassificationResponse, TransportError>;

/// Capture mock writing real files so clip lifecycle can be observed.
struct MockCapture {
    dir: TempDir,
    active: Mutex<Option<PathBuf>>,
    attempts: AtomicUsize,
    fail_starts_remaining: AtomicUsize,
}

impl MockCapture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            active: Mutex::new(None),
            attempts: AtomicUsize::new(0),
            fail_starts_remaining: AtomicUsize::new(0),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn clip_count(&self) -> usize {
        std::fs::read_dir(self.dir.path()).map(|d| d.count()).unwrap_or(0)
    }
}

impl AudioCapture for MockCapture {
    fn start(&self) -> Result<RecordingSession, RecordingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_starts_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_starts_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(RecordingError::DeviceUnavailable("busy".to_string()));
        }

        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let path = self.dir.path().join(format!("clip_{}.wav", attempt));
        std::fs::write(&path, b"RIFF0000WAVE").unwrap();
        *active = Some(path.clone());

        Ok(RecordingSession {
            file_path: path,
            started_at: chrono::Utc::now(),
            active: true,
        })
    }

    fn stop(&self) -> Result<PathBuf, RecordingError> {
        self.active
            .lock()
            .unwrap()
            .take()
            .ok_or(RecordingError::NotRecording)
    }

    fn is_recording(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    fn cleanup(&self) {
        if let Some(path) = self.active.lock().unwrap().take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Classifier mock replaying a script of (delay_ms, result) entries.
struct MockClassifier {
    script: Mutex<VecDeque<(u64, ClassifyResult)>>,
    calls: AtomicUsize,
}

impl MockClassifier {
    fn new(script: Vec<(u64, ClassifyResult)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SoundClassifier for MockClassifier {
    async fn classify(&self, _clip: &Path) -> ClassifyResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay_ms, result) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((0, Ok(detection("low"))));

        sleep(Duration::from_millis(delay_ms)).await;
        result
    }

    async fn check_health(&self) -> Result<HealthResponse, TransportError> {
        Ok(HealthResponse {
            status: "healthy".to_string(),
            timestamp: "2024-05-01T12:00:00".to_string(),
            model_loaded: true,
        })
    }

    async fn supported_classes(&self) -> Result<SupportedClassesResponse, TransportError> {
        Ok(SupportedClassesResponse {
            success: true,
            classes: vec!["car_horn".to_string(), "siren".to_string()],
            total_classes: 2,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SurfaceEvent {
    Color(Rgb),
    Accent(Option<Rgb>),
    Reset,
    KeepAwake(bool),
}

#[derive(Default)]
struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl VisualSurface for RecordingSurface {
    fn set_color(&self, color: Rgb) {
        self.events.lock().unwrap().push(SurfaceEvent::Color(color));
    }

    fn set_accent(&self, color: Option<Rgb>) {
        self.events.lock().unwrap().push(SurfaceEvent::Accent(color));
    }

    fn reset(&self) {
        self.events.lock().unwrap().push(SurfaceEvent::Reset);
    }

    fn set_keep_awake(&self, keep: bool) {
        self.events.lock().unwrap().push(SurfaceEvent::KeepAwake(keep));
    }
}

#[derive(Default)]
struct RecordingMotor {
    patterns: Mutex<Vec<Vec<u64>>>,
}

impl RecordingMotor {
    fn patterns(&self) -> Vec<Vec<u64>> {
        self.patterns.lock().unwrap().clone()
    }
}

impl HapticMotor for RecordingMotor {
    fn has_vibrator(&self) -> bool {
        true
    }

    fn vibrate(&self, pattern: &[u64], _amplitude: Option<u8>) -> Result<(), String> {
        self.patterns.lock().unwrap().push(pattern.to_vec());
        Ok(())
    }

    fn vibrate_once(&self, _duration: Duration, _amplitude: Option<u8>) -> Result<(), String> {
        Ok(())
    }

    fn cancel(&self) {}
}

fn detection(level: &str) -> ClassificationResponse {
    ClassificationResponse {
        success: true,
        prediction: Some(Prediction {
            label: "car_horn".to_string(),
            confidence: 0.9,
            timestamp: "2024-05-01T12:00:00".to_string(),
        }),
        feedback: Some(ServerFeedback {
            alert_level: level.to_string(),
            color: "#4CAF50".to_string(),
            vibration_pattern: vec![0, 100],
            message: "Car horn nearby".to_string(),
            priority: 2,
        }),
        error: None,
    }
}

fn failure(message: &str) -> ClassificationResponse {
    ClassificationResponse {
        success: false,
        prediction: None,
        feedback: None,
        error: Some(message.to_string()),
    }
}

struct Harness {
    capture: Arc<MockCapture>,
    classifier: Arc<MockClassifier>,
    surface: Arc<RecordingSurface>,
    motor: Arc<RecordingMotor>,
    status: Arc<StatusTracker>,
    controller: ListeningController,
}

fn harness(script: Vec<(u64, ClassifyResult)>) -> Harness {
    let capture = Arc::new(MockCapture::new());
    let classifier = Arc::new(MockClassifier::new(script));
    let surface = Arc::new(RecordingSurface::default());
    let motor = Arc::new(RecordingMotor::default());
    let engine = Arc::new(FeedbackEngine::new(
        surface.clone(),
        motor.clone(),
        &FeedbackSettings::default(),
    ));
    let status = Arc::new(StatusTracker::new());

    let controller = ListeningController::spawn(
        capture.clone(),
        classifier.clone(),
        engine,
        status.clone(),
        ControllerConfig {
            record_window: Duration::from_millis(5000),
            cycle_buffer: Duration::from_millis(1000),
        },
    );

    Harness {
        capture,
        classifier,
        surface,
        motor,
        status,
        controller,
    }
}

/// Let the controller task drain its queued work without moving the clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_continuous_cycle_records_classifies_and_rearms() {
    let h = harness(vec![(50, Ok(detection("low")))]);

    assert!(h.controller.toggle_continuous().await.unwrap());
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Recording { .. }));
    assert!(h.capture.is_recording());

    // Capture window elapses, clip goes to the classifier
    advance(Duration::from_millis(5001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Processing { .. }));
    assert!(!h.capture.is_recording());

    // Classification lands: detection surfaces and feedback renders
    advance(Duration::from_millis(60)).await;
    settle().await;
    match h.status.current() {
        CycleStatus::Detection { label, level, .. } => {
            assert_eq!(label, "CAR HORN");
            assert_eq!(level, AlertLevel::Low);
        }
        other => panic!("expected detection, got {:?}", other),
    }
    assert_eq!(h.capture.clip_count(), 0, "clip must be deleted after the cycle");
    assert_eq!(h.motor.patterns(), vec![vec![0, 100]]);

    // Idle gap is record window + buffer, then the loop records again
    advance(Duration::from_millis(6001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Recording { .. }));
    assert_eq!(h.capture.attempts(), 2);

    // Toggling off mid-recording forces idle and discards the partial clip
    assert!(!h.controller.toggle_continuous().await.unwrap());
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Idle));
    assert!(!h.capture.is_recording());
    assert_eq!(h.capture.clip_count(), 0);

    let attempts = h.capture.attempts();
    advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(h.capture.attempts(), attempts, "loop must stay stopped");
}

#[tokio::test(start_paused = true)]
async fn test_start_is_a_noop_while_recording_or_processing() {
    let h = harness(vec![(5000, Ok(detection("low")))]);

    h.controller.start_listening().await.unwrap();
    settle().await;
    assert_eq!(h.capture.attempts(), 1);

    // Second start while recording: state unchanged, no second capture
    h.controller.start_listening().await.unwrap();
    settle().await;
    assert_eq!(h.capture.attempts(), 1);
    assert!(matches!(h.status.current(), CycleStatus::Recording { .. }));

    advance(Duration::from_millis(5001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Processing { .. }));

    // And again while processing
    h.controller.start_listening().await.unwrap();
    settle().await;
    assert_eq!(h.capture.attempts(), 1);
    assert!(matches!(h.status.current(), CycleStatus::Processing { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_shows_error_and_loop_rearms() {
    let h = harness(vec![
        (0, Err(TransportError::Timeout)),
        (50, Ok(detection("low"))),
    ]);

    assert!(h.controller.toggle_continuous().await.unwrap());
    settle().await;

    advance(Duration::from_millis(5001)).await;
    settle().await;
    match h.status.current() {
        CycleStatus::Error { message } => assert_eq!(message, "Classification failed"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(h.surface.events().is_empty(), "no feedback on failure");

    // A failed cycle re-arms like a successful one
    advance(Duration::from_millis(6001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Recording { .. }));
    assert_eq!(h.capture.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_reported_failure_never_reaches_the_feedback_engine() {
    let h = harness(vec![(0, Ok(failure("Unprocessable audio")))]);

    h.controller.start_listening().await.unwrap();
    advance(Duration::from_millis(5001)).await;
    settle().await;

    match h.status.current() {
        CycleStatus::Error { message } => assert_eq!(message, "Unprocessable audio"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(h.surface.events().is_empty());

    // The error line clears back to idle after its linger window
    advance(Duration::from_millis(5001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_success_flag_with_missing_payloads_is_an_error() {
    let mut bogus = detection("high");
    bogus.feedback = None;
    let h = harness(vec![(0, Ok(bogus))]);

    h.controller.start_listening().await.unwrap();
    advance(Duration::from_millis(5001)).await;
    settle().await;

    assert!(matches!(h.status.current(), CycleStatus::Error { .. }));
    assert!(h.surface.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_processing_discards_the_late_result() {
    let h = harness(vec![(10_000, Ok(detection("critical")))]);

    assert!(h.controller.toggle_continuous().await.unwrap());
    settle().await;
    advance(Duration::from_millis(5001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Processing { .. }));

    h.controller.stop_listening().await.unwrap();
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Idle));

    // The in-flight submission completes detached; its result goes nowhere
    advance(Duration::from_secs(20)).await;
    settle().await;
    assert_eq!(h.classifier.calls(), 1);
    assert!(matches!(h.status.current(), CycleStatus::Idle));
    assert!(h.surface.events().is_empty());
    assert_eq!(h.capture.attempts(), 1, "stop also clears continuous mode");
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_start_does_not_kill_the_loop() {
    let h = harness(vec![(0, Ok(detection("low")))]);
    h.capture.fail_starts_remaining.store(1, Ordering::SeqCst);

    assert!(h.controller.toggle_continuous().await.unwrap());
    settle().await;
    match h.status.current() {
        CycleStatus::Error { message } => assert_eq!(message, "Recording failed"),
        other => panic!("expected error, got {:?}", other),
    }

    // Next scheduled cycle still runs and succeeds
    advance(Duration::from_millis(6001)).await;
    settle().await;
    assert!(matches!(h.status.current(), CycleStatus::Recording { .. }));
    assert_eq!(h.capture.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_idle_is_safe() {
    let h = harness(vec![]);

    h.controller.stop_listening().await.unwrap();
    assert!(matches!(h.status.current(), CycleStatus::Idle));
    assert_eq!(h.capture.attempts(), 0);
}
