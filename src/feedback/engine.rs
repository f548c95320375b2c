use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::alert::{plan_feedback, FeedbackSpec};
use crate::api::models::ServerFeedback;
use crate::feedback::surface::{HapticMotor, VisualSurface};
use crate::logger::{info, warn, Component};
use crate::settings::FeedbackSettings;

/// Executes alert feedback: at most one visual animation and one haptic
/// pattern at a time, last result wins, everything cancellable.
pub struct FeedbackEngine {
    surface: Arc<dyn VisualSurface>,
    motor: Arc<dyn HapticMotor>,
    visual_enabled: bool,
    vibration_enabled: bool,
    animation: Mutex<Option<JoinHandle<()>>>,
    sustain: Mutex<Option<JoinHandle<()>>>,
    /// True once any feedback has touched the surface since the last hard
    /// stop; lets cancel_all be a true no-op on an untouched surface.
    engaged: AtomicBool,
}

impl FeedbackEngine {
    pub fn new(
        surface: Arc<dyn VisualSurface>,
        motor: Arc<dyn HapticMotor>,
        settings: &FeedbackSettings,
    ) -> Self {
        Self {
            surface,
            motor,
            visual_enabled: settings.visual_feedback_enabled,
            vibration_enabled: settings.vibration_enabled,
            animation: Mutex::new(None),
            sustain: Mutex::new(None),
            engaged: AtomicBool::new(false),
        }
    }

    /// Render one classification result's feedback. Any animation still
    /// running from a previous result is cancelled first; there is no queue.
    pub fn render(&self, feedback: &ServerFeedback) {
        let spec = plan_feedback(feedback);
        info(
            Component::Feedback,
            &format!("{} alert: {}", spec.level.as_str(), feedback.message),
        );

        self.halt_previous();
        self.engaged.store(true, Ordering::SeqCst);

        if self.visual_enabled {
            self.spawn_animation(&spec);
        }

        if self.vibration_enabled {
            self.run_haptics(&spec);
        }

        if let Some(window) = spec.sustain_display {
            self.arm_sustain(window);
        }
    }

    /// Hard stop: cancel animation and haptics, clear the sustain side
    /// effect, leave the surface neutral. Safe no-op when nothing is active.
    pub fn cancel_all(&self) {
        let animation = self.animation.lock().unwrap().take();
        if let Some(handle) = &animation {
            handle.abort();
        }
        let sustain = self.sustain.lock().unwrap().take();
        if let Some(handle) = &sustain {
            handle.abort();
        }

        if !self.engaged.swap(false, Ordering::SeqCst) {
            return;
        }

        self.motor.cancel();
        self.surface.reset();
        self.surface.set_accent(None);
        self.surface.set_keep_awake(false);
    }

    fn halt_previous(&self) {
        let animation = self.animation.lock().unwrap().take();
        if let Some(handle) = &animation {
            handle.abort();
        }

        // An aborted animation may have left the surface mid-flash
        if self.engaged.load(Ordering::SeqCst) {
            self.motor.cancel();
            self.surface.reset();
            self.surface.set_accent(None);
        }
    }

    fn spawn_animation(&self, spec: &FeedbackSpec) {
        let surface = self.surface.clone();
        let spec = spec.clone();

        let handle = tokio::spawn(async move {
            if !spec.animated {
                // Plain flash fallback when the server color was unusable
                surface.set_color(spec.flash_color);
                sleep(spec.cycle_duration).await;
                surface.reset();
                return;
            }

            let half = spec.cycle_duration / 2;
            for _ in 0..spec.repeat_count {
                surface.set_color(spec.flash_color);
                if spec.mirror_accent {
                    surface.set_accent(Some(spec.flash_color));
                }
                sleep(half).await;

                surface.reset();
                if spec.mirror_accent {
                    surface.set_accent(None);
                }
                sleep(half).await;
            }
        });

        *self.animation.lock().unwrap() = Some(handle);
    }

    fn run_haptics(&self, spec: &FeedbackSpec) {
        if !self.motor.has_vibrator() {
            return;
        }

        if let Err(e) = self.motor.vibrate(&spec.vibration_pattern, spec.amplitude) {
            warn(
                Component::Feedback,
                &format!("Waveform rejected ({}), falling back to one-shot", e),
            );
            if let Err(e) = self.motor.vibrate_once(spec.fallback_pulse, spec.amplitude) {
                warn(Component::Feedback, &format!("Fallback pulse failed: {}", e));
            }
        }
    }

    fn arm_sustain(&self, window: std::time::Duration) {
        // Re-arming replaces the previous timer so an old deadline cannot
        // cut a fresh sustain window short
        let previous = self.sustain.lock().unwrap().take();
        if let Some(handle) = &previous {
            handle.abort();
        }

        self.surface.set_keep_awake(true);

        let surface = self.surface.clone();
        let handle = tokio::spawn(async move {
            sleep(window).await;
            surface.set_keep_awake(false);
        });

        *self.sustain.lock().unwrap() = Some(handle);
    }
}
