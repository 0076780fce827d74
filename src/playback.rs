//! Playback of decoded speech samples.

use crate::audio_toolkit::pcm::SAMPLE_RATE;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, warn};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Schedules one buffer of samples at a time onto an output device.
///
/// Each `play` call owns its output stream for exactly the duration of the
/// buffer; the stream is released when playback ends, on success and on
/// failure alike. The scheduler exposes an `is_active` flag for callers to
/// consult but does not serialize overlapping calls itself; that policy
/// lives at the call site.
pub struct PlaybackScheduler {
    active: Arc<AtomicBool>,
    output_device: Option<String>,
    volume: f32,
}

impl PlaybackScheduler {
    pub fn new(output_device: Option<String>, volume: f32) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            output_device,
            volume,
        }
    }

    /// Whether a buffer is currently playing.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Play a mono sample buffer to natural completion.
    ///
    /// Resolves exactly once, when the device has consumed the whole
    /// buffer. Playback is not cancelable mid-flight.
    pub async fn play(&self, samples: Vec<f32>) -> Result<(), AudioError> {
        if samples.is_empty() {
            debug!("Empty sample buffer, nothing to play");
            return Ok(());
        }

        self.active.store(true, Ordering::SeqCst);
        let device = self.output_device.clone();
        let volume = self.volume;

        // rodio playback blocks until the sink drains, so it runs on a
        // blocking task while the caller awaits completion.
        let result =
            tokio::task::spawn_blocking(move || play_samples(samples, device.as_deref(), volume))
                .await;
        self.active.store(false, Ordering::SeqCst);

        match result {
            Ok(result) => result,
            Err(e) => Err(AudioError::Output(format!("playback task failed: {}", e))),
        }
    }
}

fn play_samples(samples: Vec<f32>, output_device: Option<&str>, volume: f32) -> Result<(), AudioError> {
    // The stream handle lives for this call only; dropping it closes the
    // output context.
    let (_stream, stream_handle) = if let Some(device_name) = output_device {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| AudioError::Output(format!("failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map(|n| n == device_name).unwrap_or(false));

        match device {
            Some(dev) => OutputStream::try_from_device(&dev).map_err(|e| {
                AudioError::Output(format!("failed to open device '{}': {}", device_name, e))
            })?,
            None => {
                warn!("Device '{}' not found, using default device", device_name);
                OutputStream::try_default().map_err(|e| {
                    AudioError::Output(format!("failed to open default device: {}", e))
                })?
            }
        }
    } else {
        OutputStream::try_default()
            .map_err(|e| AudioError::Output(format!("failed to open default device: {}", e)))?
    };

    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| AudioError::Output(format!("failed to create sink: {}", e)))?;

    sink.set_volume(volume);
    sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));
    sink.sleep_until_end();

    Ok(())
}

/// Names of the available audio output devices.
pub fn list_output_devices() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Output(format!("failed to enumerate devices: {}", e)))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_buffer_completes_without_device() {
        // No output device is touched for an empty buffer, so this passes
        // in headless environments too.
        let scheduler = PlaybackScheduler::new(None, 1.0);
        scheduler.play(Vec::new()).await.unwrap();
        assert!(!scheduler.is_active());
    }
}
