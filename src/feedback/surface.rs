use std::time::Duration;

use crate::alert::Rgb;
use crate::logger::{debug, info, Component};

/// Display surface the feedback engine flashes. Implementations must treat
/// `reset` as idempotent: resetting a neutral surface changes nothing.
pub trait VisualSurface: Send + Sync {
    fn set_color(&self, color: Rgb);

    /// Secondary region (status strip) mirrored during high-severity
    /// flashes; `None` restores it.
    fn set_accent(&self, color: Option<Rgb>);

    /// Return the surface to its neutral resting state.
    fn reset(&self);

    /// Keep the display from dimming while a critical alert is sustained.
    fn set_keep_awake(&self, keep: bool);
}

/// Vibration motor seam.
pub trait HapticMotor: Send + Sync {
    fn has_vibrator(&self) -> bool;

    /// Play an alternating off/on waveform (millisecond durations).
    /// `amplitude` of `None` selects the motor's default strength.
    fn vibrate(&self, pattern: &[u64], amplitude: Option<u8>) -> Result<(), String>;

    /// Single pulse, used when a waveform is rejected.
    fn vibrate_once(&self, duration: Duration, amplitude: Option<u8>) -> Result<(), String>;

    fn cancel(&self);
}

/// Flashes the terminal with 24-bit background color bars.
pub struct TerminalSurface;

impl TerminalSurface {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualSurface for TerminalSurface {
    fn set_color(&self, color: Rgb) {
        println!(
            "\x1b[48;2;{};{};{}m{:width$}\x1b[0m",
            color.r,
            color.g,
            color.b,
            "",
            width = 48
        );
    }

    fn set_accent(&self, color: Option<Rgb>) {
        if let Some(color) = color {
            println!(
                "\x1b[48;2;{};{};{}m{:width$}\x1b[0m",
                color.r,
                color.g,
                color.b,
                "",
                width = 12
            );
        }
    }

    fn reset(&self) {
        // Neutral state is an unpainted terminal; nothing to draw
    }

    fn set_keep_awake(&self, keep: bool) {
        debug(
            Component::Feedback,
            if keep {
                "Display sustain on"
            } else {
                "Display sustain off"
            },
        );
    }
}

/// Logs haptic patterns; stands in for a motor on hosts without one.
pub struct ConsoleMotor;

impl ConsoleMotor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl HapticMotor for ConsoleMotor {
    fn has_vibrator(&self) -> bool {
        true
    }

    fn vibrate(&self, pattern: &[u64], amplitude: Option<u8>) -> Result<(), String> {
        let strength = amplitude
            .map(|a| a.to_string())
            .unwrap_or_else(|| "default".to_string());
        info(
            Component::Feedback,
            &format!("Vibrate {:?} (amplitude {})", pattern, strength),
        );
        Ok(())
    }

    fn vibrate_once(&self, duration: Duration, amplitude: Option<u8>) -> Result<(), String> {
        let strength = amplitude
            .map(|a| a.to_string())
            .unwrap_or_else(|| "default".to_string());
        info(
            Component::Feedback,
            &format!("Vibrate {}ms (amplitude {})", duration.as_millis(), strength),
        );
        Ok(())
    }

    fn cancel(&self) {}
}
