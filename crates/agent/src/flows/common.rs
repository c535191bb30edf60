//! Shared collaborators and prompt/listen primitives for the four Voice
//! Orchestrator flows (C12, §4.12).
//!
//! A [`FlowContext`] bundles one facade handle (C8) with the C9/C10/C11
//! components a flow needs, and exposes them as plain blocking calls: each
//! method drives the underlying async primitive to completion via
//! `SyncToolClient::block_on`, so the flows themselves read as ordinary
//! synchronous state machines (§9).

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use facegate_voice::{
    AudioArbiter, AudioInputDevice, Intent, IntentOracle, SilenceDetector, TextToSpeechEngine, TranscriptionEngine,
    WakeWordDetector,
};

use facegate_config::{OrchestratorConfig, VoiceConfig};

use crate::error::FlowError;
use crate::facade::SyncToolClient;

const MAX_FREE_FORM_ATTEMPTS: u32 = 3;

pub struct FlowContext {
    pub facade: SyncToolClient,
    pub arbiter: AudioArbiter,
    pub audio_input: AudioInputDevice,
    pub silence: SilenceDetector,
    pub free_form_stt: Arc<dyn TranscriptionEngine>,
    /// Grammar-constrained over the configured wake-word list.
    pub wake_stt: Arc<dyn TranscriptionEngine>,
    pub wake_word: WakeWordDetector,
    /// Grammar-constrained over the flow-selection command phrases
    /// (`recognize`/`register`/`update`/`delete`).
    pub command_stt: Arc<dyn TranscriptionEngine>,
    pub tts: TextToSpeechEngine,
    pub intent: IntentOracle,
    pub orchestrator: OrchestratorConfig,
    pub voice: VoiceConfig,
}

impl FlowContext {
    /// Speak `text` to completion, holding the playback guard for the
    /// duration (§4.9).
    pub fn speak(&self, text: &str) -> Result<(), FlowError> {
        tracing::info!(text, "speaking");
        let guard = self.facade.block_on(self.arbiter.acquire_for_playback())?;
        self.facade.block_on(self.tts.speak(text))?;
        drop(guard);
        Ok(())
    }

    /// Capture `duration` of audio and transcribe it with `stt`, unless
    /// the capture is silent, in which case the empty string is returned
    /// without running the decoder (§4.10: silent captures are dropped
    /// before transcription).
    fn capture_and_transcribe(&self, stt: &Arc<dyn TranscriptionEngine>, duration: Duration) -> Result<String, FlowError> {
        let guard = self.facade.block_on(self.arbiter.acquire_for_recording())?;
        let audio = self.facade.block_on(self.audio_input.capture(duration))?;
        drop(guard);

        if self.silence.is_silent(&audio) {
            return Ok(String::new());
        }
        let text = self.facade.block_on(stt.transcribe(&audio))?;
        Ok(text)
    }

    /// One free-form capture: acquire the microphone, record for the
    /// configured duration, and transcribe with the general decoder.
    /// Silent captures come back as an empty string rather than being
    /// retried here; callers that need a non-empty answer use
    /// [`Self::listen_non_empty`].
    pub fn listen_once(&self) -> Result<String, FlowError> {
        let duration = Duration::from_secs_f64(self.voice.free_form_capture_seconds);
        self.capture_and_transcribe(&self.free_form_stt, duration)
    }

    /// One fixed-duration wake-word listening capture (§4.10): `true` iff
    /// the grammar-constrained transcription exactly matches a configured
    /// wake word.
    pub fn listen_for_wake_word(&self) -> Result<bool, FlowError> {
        let duration = Duration::from_secs_f64(self.voice.wake_capture_seconds);
        let text = self.capture_and_transcribe(&self.wake_stt, duration)?;
        Ok(!text.is_empty() && self.wake_word.matches(&text))
    }

    /// One fixed-duration capture transcribed against the flow-selection
    /// command grammar.
    pub fn listen_for_command(&self) -> Result<String, FlowError> {
        let duration = Duration::from_secs_f64(self.voice.wake_capture_seconds);
        self.capture_and_transcribe(&self.command_stt, duration)
    }

    /// Retry [`Self::listen_once`] up to [`MAX_FREE_FORM_ATTEMPTS`] times,
    /// re-prompting with `reprompt` whenever the capture is silent.
    pub fn listen_non_empty(&self, reprompt: &str) -> Result<String, FlowError> {
        for attempt in 0..MAX_FREE_FORM_ATTEMPTS {
            let text = self.listen_once()?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
            if attempt + 1 < MAX_FREE_FORM_ATTEMPTS {
                self.speak(reprompt)?;
            }
        }
        Err(FlowError::Cancelled("no response after repeated prompts".to_string()))
    }

    /// Speak `prompt`, listen once, and classify the reply through the
    /// Intent Oracle (C11).
    pub fn ask_yes_no(&self, prompt: &str) -> Result<Intent, FlowError> {
        self.speak(prompt)?;
        let reply = self.listen_once()?;
        Ok(self.facade.block_on(self.intent.classify(&reply)))
    }

    /// Same as [`Self::ask_yes_no`] but collapses `Unclear` to `Negative`,
    /// the safety rule required before any destructive confirmation
    /// (§4.11).
    pub fn confirm_destructive(&self, prompt: &str) -> Result<bool, FlowError> {
        let intent = self.ask_yes_no(prompt)?.or_negative_if_unclear();
        Ok(intent == Intent::Affirmative)
    }

    /// Run the configured camera capture command and return its stdout as
    /// raw image bytes (§4.12, the camera-capture transition).
    pub fn capture_image(&self) -> Result<Vec<u8>, FlowError> {
        let mut parts = self.orchestrator.camera_capture_command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| FlowError::CameraFailed("camera_capture_command is empty".to_string()))?;
        let output = Command::new(program)
            .args(parts)
            .output()
            .map_err(|e| FlowError::CameraFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(FlowError::CameraFailed(format!(
                "camera command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        if output.stdout.is_empty() {
            return Err(FlowError::CameraFailed("camera command produced no output".to_string()));
        }
        Ok(output.stdout)
    }
}
