pub mod recorder;

pub use recorder::{
    probe_input_device, AudioCapture, CpalRecorder, RecordingError, RecordingSession,
};
