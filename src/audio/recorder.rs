use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::logger::{error, info, Component};

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to write clip: {0}")]
    WriteFailure(String),
}

/// One bounded capture session. Owned by the recorder; never outlives a
/// single record/stop cycle.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub active: bool,
}

/// Capture seam the controller drives. At most one session is active per
/// recorder; mutation only ever happens from the controller's single task.
pub trait AudioCapture: Send + Sync {
    fn start(&self) -> Result<RecordingSession, RecordingError>;

    /// Finalize the active session and return the clip path. Calling this
    /// while idle is safe and reports `NotRecording`.
    fn stop(&self) -> Result<PathBuf, RecordingError>;

    fn is_recording(&self) -> bool;

    /// Release the device and delete any orphaned clip. Safe on every exit
    /// path, including when nothing is active.
    fn cleanup(&self);
}

/// Check once at startup that an input device can be acquired at all.
/// Failure here is terminal: recording is never reachable without it.
pub fn probe_input_device() -> Result<String, RecordingError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or_else(|| {
        RecordingError::DeviceUnavailable(
            "no input device available - check microphone permissions".to_string(),
        )
    })?;

    device
        .name()
        .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))
}

enum RecorderCommand {
    Start {
        path: PathBuf,
        response: mpsc::Sender<Result<(), RecordingError>>,
    },
    Stop {
        response: mpsc::Sender<Result<(), RecordingError>>,
    },
    Shutdown,
}

/// Microphone recorder writing WAV clips via cpal.
///
/// The cpal stream is not Send, so a dedicated worker thread owns the stream
/// and the WAV writer; this handle talks to it over a command channel.
pub struct CpalRecorder {
    control_tx: mpsc::Sender<RecorderCommand>,
    recordings_dir: PathBuf,
    is_recording: Arc<Mutex<bool>>,
    current_clip: Arc<Mutex<Option<PathBuf>>>,
}

impl CpalRecorder {
    pub fn new(recordings_dir: PathBuf) -> Self {
        let (control_tx, control_rx) = mpsc::channel::<RecorderCommand>();

        thread::spawn(move || {
            let mut worker = CaptureWorker::new();

            while let Ok(cmd) = control_rx.recv() {
                match cmd {
                    RecorderCommand::Start { path, response } => {
                        let _ = response.send(worker.start(&path));
                    }
                    RecorderCommand::Stop { response } => {
                        let _ = response.send(worker.stop());
                    }
                    RecorderCommand::Shutdown => break,
                }
            }
        });

        Self {
            control_tx,
            recordings_dir,
            is_recording: Arc::new(Mutex::new(false)),
            current_clip: Arc::new(Mutex::new(None)),
        }
    }

    fn send_and_wait(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<(), RecordingError>>) -> RecorderCommand,
    ) -> Result<(), RecordingError> {
        let (response_tx, response_rx) = mpsc::channel();
        self.control_tx
            .send(build(response_tx))
            .map_err(|_| RecordingError::DeviceUnavailable("capture worker is gone".to_string()))?;
        response_rx
            .recv()
            .map_err(|_| RecordingError::DeviceUnavailable("capture worker is gone".to_string()))?
    }
}

impl AudioCapture for CpalRecorder {
    fn start(&self) -> Result<RecordingSession, RecordingError> {
        if *self.is_recording.lock().unwrap() {
            return Err(RecordingError::AlreadyRecording);
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.recordings_dir.join(format!("clip_{}.wav", timestamp));

        self.send_and_wait(|response| RecorderCommand::Start {
            path: path.clone(),
            response,
        })?;

        *self.is_recording.lock().unwrap() = true;
        *self.current_clip.lock().unwrap() = Some(path.clone());
        info(
            Component::Recording,
            &format!("Recording to {}", path.display()),
        );

        Ok(RecordingSession {
            file_path: path,
            started_at: Utc::now(),
            active: true,
        })
    }

    fn stop(&self) -> Result<PathBuf, RecordingError> {
        if !*self.is_recording.lock().unwrap() {
            return Err(RecordingError::NotRecording);
        }

        let result = self.send_and_wait(|response| RecorderCommand::Stop { response });

        *self.is_recording.lock().unwrap() = false;
        let clip = self.current_clip.lock().unwrap().take();

        match (result, clip) {
            (Ok(()), Some(path)) => Ok(path),
            (Ok(()), None) => Err(RecordingError::NotRecording),
            (Err(e), clip) => {
                // A half-written clip is useless; drop it with the session.
                if let Some(path) = clip {
                    let _ = fs::remove_file(path);
                }
                Err(e)
            }
        }
    }

    fn is_recording(&self) -> bool {
        *self.is_recording.lock().unwrap()
    }

    fn cleanup(&self) {
        if *self.is_recording.lock().unwrap() {
            let _ = self.send_and_wait(|response| RecorderCommand::Stop { response });
            *self.is_recording.lock().unwrap() = false;
        }

        if let Some(path) = self.current_clip.lock().unwrap().take() {
            let _ = fs::remove_file(path);
        }
    }
}

impl Drop for CpalRecorder {
    fn drop(&mut self) {
        self.cleanup();
        let _ = self.control_tx.send(RecorderCommand::Shutdown);
    }
}

type WavWriterHandle = Arc<Mutex<Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>>>;

struct CaptureWorker {
    stream: Option<cpal::Stream>,
    writer: WavWriterHandle,
}

impl CaptureWorker {
    fn new() -> Self {
        Self {
            stream: None,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    fn start(&mut self, output_path: &Path) -> Result<(), RecordingError> {
        if self.stream.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            RecordingError::DeviceUnavailable(
                "no input device available - check microphone permissions".to_string(),
            )
        })?;

        let default_config = device
            .default_input_config()
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

        let config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        // Match the WAV spec to the device's native format
        let (bits_per_sample, sample_format) = match default_config.sample_format() {
            cpal::SampleFormat::I16 => (16, hound::SampleFormat::Int),
            cpal::SampleFormat::F32 => (32, hound::SampleFormat::Float),
            other => {
                return Err(RecordingError::DeviceUnavailable(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };

        let spec = hound::WavSpec {
            channels: config.channels,
            sample_rate: config.sample_rate.0,
            bits_per_sample,
            sample_format,
        };

        let writer = hound::WavWriter::create(output_path, spec)
            .map_err(|e| RecordingError::WriteFailure(e.to_string()))?;
        *self.writer.lock().unwrap() = Some(writer);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, self.writer.clone())
            }
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, self.writer.clone())
            }
            other => Err(RecordingError::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        writer: WavWriterHandle,
    ) -> Result<cpal::Stream, RecordingError>
    where
        T: cpal::SizedSample + hound::Sample,
    {
        let err_fn = |err| {
            error(
                Component::Recording,
                &format!("Audio stream error: {}", err),
            )
        };

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut guard) = writer.lock() {
                        if let Some(writer) = guard.as_mut() {
                            for &sample in data {
                                let _ = writer.write_sample(sample);
                            }
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        if self.stream.is_none() {
            return Err(RecordingError::NotRecording);
        }

        // Dropping the stream releases the device before the file is sealed
        drop(self.stream.take());

        match self.writer.lock().unwrap().take() {
            Some(writer) => writer
                .finalize()
                .map_err(|e| RecordingError::WriteFailure(e.to_string())),
            None => Err(RecordingError::NotRecording),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stop_while_idle_reports_not_recording() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let recorder = CpalRecorder::new(dir.path().to_path_buf());

        assert!(!recorder.is_recording());
        assert!(matches!(
            recorder.stop(),
            Err(RecordingError::NotRecording)
        ));
    }

    #[test]
    fn test_cleanup_is_safe_when_idle() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let recorder = CpalRecorder::new(dir.path().to_path_buf());

        recorder.cleanup();
        recorder.cleanup();
        assert!(!recorder.is_recording());
    }
}
