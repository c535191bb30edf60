//! TextToSpeechEngine (C10 collaborator #5). See §4.10: "synchronous
//! speak call that blocks until playback completes."
//!
//! The TTS acoustic model is a black box per §1, same as STT. Playback
//! uses `cpal` for the output stream and `hound` only for the optional
//! debug WAV dump (SPEC_FULL §4.10: `rubato` is unused by this system's
//! fixed-rate path and dropped).

use std::path::{Path, PathBuf};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ort::session::Session;
use parking_lot::Mutex;

use crate::error::VoiceError;

pub struct TextToSpeechEngine {
    session: Mutex<Session>,
    debug_wav_dir: Option<PathBuf>,
}

impl TextToSpeechEngine {
    pub fn load(model_path: impl AsRef<Path>, debug_wav_dir: Option<PathBuf>) -> Result<Self, VoiceError> {
        let session = Session::builder()
            .and_then(|b| b.commit_from_file(model_path.as_ref()))
            .map_err(|e| VoiceError::PlaybackFailed(format!("loading TTS model: {e}")))?;
        Ok(TextToSpeechEngine {
            session: Mutex::new(session),
            debug_wav_dir,
        })
    }

    /// Synthesize `text` and block until playback finishes. Must be called
    /// while holding a [`crate::arbiter::PlaybackGuard`] (§4.9).
    pub async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let samples = self.synthesize(text)?;
        if let Some(dir) = &self.debug_wav_dir {
            if let Err(e) = dump_wav(dir, text, &samples) {
                tracing::warn!(error = %e, "failed to write debug WAV dump");
            }
        }
        tokio::task::spawn_blocking(move || play_blocking(samples))
            .await
            .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?
    }

    fn synthesize(&self, text: &str) -> Result<Vec<f32>, VoiceError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let bytes: Vec<u8> = text.bytes().collect();
        let input = ort::value::Tensor::from_array(([1, bytes.len()], bytes))
            .map_err(|e| VoiceError::PlaybackFailed(format!("preparing TTS input: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs!["text" => input])
            .map_err(|e| VoiceError::PlaybackFailed(format!("running TTS model: {e}")))?;

        let (_, samples) = outputs["audio"]
            .try_extract_tensor::<f32>()
            .map_err(|e| VoiceError::PlaybackFailed(format!("decoding TTS output: {e}")))?;
        Ok(samples.to_vec())
    }
}

fn play_blocking(samples: Vec<f32>) -> Result<(), VoiceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::PlaybackFailed("no default output device".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| VoiceError::PlaybackFailed(format!("querying output config: {e}")))?;

    let channels = config.channels() as usize;
    let mut cursor = 0usize;
    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
    let done_tx = Mutex::new(Some(done_tx));

    let stream = device
        .build_output_stream(
            &config.into(),
            move |out: &mut [f32], _| {
                for frame in out.chunks_mut(channels) {
                    let sample = samples.get(cursor).copied().unwrap_or(0.0);
                    for s in frame {
                        *s = sample;
                    }
                    cursor += 1;
                }
                if cursor >= samples.len() {
                    if let Some(tx) = done_tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
            },
            move |err| tracing::warn!(error = %err, "output stream error"),
            None,
        )
        .map_err(|e| VoiceError::PlaybackFailed(format!("building output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::PlaybackFailed(format!("starting output stream: {e}")))?;

    let _ = done_rx.recv_timeout(std::time::Duration::from_secs(30));
    Ok(())
}

fn dump_wav(dir: &Path, text: &str, samples: &[f32]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let safe_name: String = text
        .chars()
        .take(32)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22_050,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(dir.join(format!("{safe_name}.wav")), spec)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    for sample in samples {
        writer
            .write_sample(*sample)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
