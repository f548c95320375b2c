use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::models::ServerFeedback;

/// How long the display is kept awake after a critical alert.
pub const SUSTAIN_WINDOW: Duration = Duration::from_secs(10);

/// Single flash used when the server color cannot be parsed.
const SIMPLE_FLASH: Duration = Duration::from_millis(500);

/// Server-assigned severity tier, ordered by urgency.
///
/// Parsing is total: unrecognized strings map to `Low`, so a server rolling
/// out a new tier degrades to the mildest feedback instead of none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "medium" => AlertLevel::Medium,
            "high" => AlertLevel::High,
            "critical" => AlertLevel::Critical,
            _ => AlertLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Low => "LOW",
            AlertLevel::Medium => "MEDIUM",
            AlertLevel::High => "HIGH",
            AlertLevel::Critical => "CRITICAL",
        }
    }

    /// Flash cycle duration and repeat count for the animated flash.
    fn flash_params(&self) -> (Duration, u32) {
        match self {
            AlertLevel::Critical => (Duration::from_millis(300), 6),
            AlertLevel::High => (Duration::from_millis(400), 4),
            AlertLevel::Medium => (Duration::from_millis(500), 3),
            AlertLevel::Low => (Duration::from_millis(600), 2),
        }
    }

    /// Palette used when the server-provided color is unusable.
    fn fallback_color(&self) -> Rgb {
        match self {
            AlertLevel::Critical => Rgb::new(0xFF, 0x00, 0x00),
            AlertLevel::High => Rgb::new(0xE9, 0x1E, 0x63),
            AlertLevel::Medium => Rgb::new(0xFF, 0x98, 0x00),
            AlertLevel::Low => Rgb::new(0x4C, 0xAF, 0x50),
        }
    }

    /// Vibration amplitude for motors without per-sample amplitude control.
    /// Critical uses the motor's default (strongest) amplitude.
    fn amplitude(&self) -> Option<u8> {
        match self {
            AlertLevel::Critical => None,
            AlertLevel::High => Some(200),
            AlertLevel::Medium => Some(150),
            AlertLevel::Low => Some(100),
        }
    }

    /// One-shot pulse length used when the motor rejects a waveform.
    fn fallback_pulse(&self) -> Duration {
        match self {
            AlertLevel::Critical => Duration::from_millis(1000),
            AlertLevel::High => Duration::from_millis(800),
            AlertLevel::Medium => Duration::from_millis(500),
            AlertLevel::Low => Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a "#RRGGBB" string.
    pub fn parse_hex(value: &str) -> Option<Self> {
        let digits = value.strip_prefix('#')?;
        if digits.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

/// Concrete feedback parameters for one alert, derived from the server
/// feedback by [`plan_feedback`]. Transient: computed and consumed within a
/// single render.
#[derive(Debug, Clone)]
pub struct FeedbackSpec {
    pub level: AlertLevel,
    pub flash_color: Rgb,
    pub cycle_duration: Duration,
    pub repeat_count: u32,
    /// False when the server color was unusable: a single plain flash
    /// replaces the full animation.
    pub animated: bool,
    /// Mirror the flash on the accent region (High and Critical only).
    pub mirror_accent: bool,
    /// Off/on millisecond durations, passed through from the server.
    pub vibration_pattern: Vec<u64>,
    pub amplitude: Option<u8>,
    pub fallback_pulse: Duration,
    pub sustain_display: Option<Duration>,
}

/// Map a server feedback payload to concrete flash/haptic parameters.
/// Pure: no clocks, no side effects.
pub fn plan_feedback(feedback: &ServerFeedback) -> FeedbackSpec {
    let level = AlertLevel::parse(&feedback.alert_level);

    let (flash_color, cycle_duration, repeat_count, animated) =
        match Rgb::parse_hex(&feedback.color) {
            Some(color) => {
                let (cycle, repeats) = level.flash_params();
                (color, cycle, repeats, true)
            }
            None => (level.fallback_color(), SIMPLE_FLASH, 1, false),
        };

    FeedbackSpec {
        level,
        flash_color,
        cycle_duration,
        repeat_count,
        animated,
        mirror_accent: animated && level >= AlertLevel::High,
        vibration_pattern: feedback.vibration_pattern.clone(),
        amplitude: level.amplitude(),
        fallback_pulse: level.fallback_pulse(),
        sustain_display: (level == AlertLevel::Critical).then_some(SUSTAIN_WINDOW),
    }
}
