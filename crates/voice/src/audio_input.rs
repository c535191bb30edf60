//! AudioInputDevice (C10 collaborator #1): fixed-rate, fixed-duration
//! microphone capture. See §4.10.
//!
//! Grounded on `cpal`'s standard input-stream idiom: build a device/config
//! pair, push samples arriving on cpal's callback thread into a bounded
//! channel, then collect them on the async side until the requested
//! duration has been captured.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use facegate_core::audio::{AudioBuffer, AudioFrame, Channels, SampleRate};

use crate::error::VoiceError;

/// Captures `duration` seconds of 16 kHz mono audio from the system's
/// default input device and reports the RMS energy of the result
/// (§4.10).
pub struct AudioInputDevice {
    sample_rate: SampleRate,
}

impl Default for AudioInputDevice {
    fn default() -> Self {
        AudioInputDevice::new()
    }
}

impl AudioInputDevice {
    pub fn new() -> Self {
        AudioInputDevice {
            sample_rate: SampleRate::Hz16000,
        }
    }

    /// Capture `duration` worth of audio. Blocking cpal work runs on a
    /// dedicated thread; the result is awaited without blocking the
    /// caller's async task.
    pub async fn capture(&self, duration: Duration) -> Result<AudioBuffer, VoiceError> {
        let sample_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || capture_blocking(sample_rate, duration))
            .await
            .map_err(|e| VoiceError::CaptureFailed(e.to_string()))?
    }
}

fn capture_blocking(sample_rate: SampleRate, duration: Duration) -> Result<AudioBuffer, VoiceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::CaptureFailed("no default input device".to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::CaptureFailed(format!("querying input config: {e}")))?;

    let (tx, rx) = std_mpsc::channel::<Vec<f32>>();
    let channels = config.channels() as usize;

    let stream = device
        .build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                let _ = tx.send(data.to_vec());
            },
            move |err| tracing::warn!(error = %err, "input stream error"),
            None,
        )
        .map_err(|e| VoiceError::CaptureFailed(format!("building input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::CaptureFailed(format!("starting input stream: {e}")))?;

    let mut buffer = AudioBuffer::new(sample_rate, Channels::Mono, duration);
    let deadline = std::time::Instant::now() + duration;
    let mut sequence = 0u64;

    while std::time::Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(remaining.min(Duration::from_millis(100))) {
            Ok(raw) => {
                let mono: Vec<f32> = if channels > 1 {
                    raw.chunks(channels)
                        .map(|c| c.iter().sum::<f32>() / channels as f32)
                        .collect()
                } else {
                    raw
                };
                let frame = AudioFrame::new(mono, sample_rate, Channels::Mono, sequence);
                sequence += 1;
                buffer.push(&frame);
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    Ok(buffer)
}

/// RMS energy of `buffer` in decibels, matching the convention
/// `AudioFrame::energy_db` already uses elsewhere in this workspace.
pub fn energy_db(buffer: &AudioBuffer) -> f32 {
    let samples = buffer.samples();
    if samples.is_empty() {
        return -96.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    20.0 * mean_square.sqrt().max(1e-9).log10()
}
