pub mod engine;
pub mod surface;

pub use engine::FeedbackEngine;
pub use surface::{ConsoleMotor, HapticMotor, TerminalSurface, VisualSurface};
