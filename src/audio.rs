//! Audio capture sequencing. The capture itself is done by an external
//! [`CapturePipeline`](crate::transport::CapturePipeline).

use crate::device::Device;
use crate::error::{no_capture_pipeline, Error, Result};
use crate::transport::CapturePipeline;
use log::debug;
use std::path::Path;
use std::rc::Rc;

/// Lowest accepted sample rate (Hz).
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest accepted sample rate (Hz).
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Recording state of the audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioState {
    /// Nothing recorded yet.
    #[default]
    Idle,
    /// Capture in progress.
    Recording,
    /// Capture stopped; the buffer can be saved or a new capture started.
    Captured,
}

impl Device {
    fn capture_pipeline(&self) -> Result<&Rc<dyn CapturePipeline>> {
        self.inner
            .capture
            .as_ref()
            .ok_or_else(|| no_capture_pipeline(self.serial_number()))
    }

    /// Current recording state.
    pub fn audio_state(&self) -> Result<AudioState> {
        self.ensure_valid()?;
        Ok(self.inner.audio.get())
    }

    /// Whether a capture is in progress.
    pub fn audio_is_recording(&self) -> Result<bool> {
        Ok(self.audio_state()? == AudioState::Recording)
    }

    /// Starts capturing at `sample_rate` Hz, discarding any previous capture.
    pub fn audio_start(&self, sample_rate: u32) -> Result<()> {
        self.ensure_valid()?;
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(Error::ArgumentOutOfRange(format!(
                "sample rate {} Hz outside {}..={} Hz",
                sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        let capture = self.capture_pipeline()?;
        if self.inner.audio.get() == AudioState::Recording {
            return Err(Error::AlreadyRecording);
        }
        capture.start(self.serial_number(), sample_rate)?;
        self.inner.audio.set(AudioState::Recording);
        debug!(
            "Audio capture started on {} at {} Hz",
            self.serial_number(),
            sample_rate
        );
        Ok(())
    }

    /// Stops the capture in progress.
    pub fn audio_stop(&self) -> Result<()> {
        self.ensure_valid()?;
        let capture = self.capture_pipeline()?;
        if self.inner.audio.get() != AudioState::Recording {
            return Err(Error::NotRecording);
        }
        capture.stop(self.serial_number())?;
        self.inner.audio.set(AudioState::Captured);
        debug!("Audio capture stopped on {}", self.serial_number());
        Ok(())
    }

    /// Writes the last stopped capture to `path`.
    pub fn audio_save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_valid()?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::ArgumentOutOfRange("empty audio file path".into()));
        }
        let capture = self.capture_pipeline()?;
        match self.inner.audio.get() {
            AudioState::Recording => Err(Error::StillRecording),
            AudioState::Idle => Err(Error::NothingCaptured),
            AudioState::Captured => {
                capture.save(self.serial_number(), path)?;
                debug!(
                    "Audio from {} saved to {}",
                    self.serial_number(),
                    path.display()
                );
                Ok(())
            }
        }
    }
}
