//! Crate-local error type for the voice orchestrator. See §4.9-§4.11.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("audio device busy: {0}")]
    DeviceBusy(String),

    #[error("audio capture failed: {0}")]
    CaptureFailed(String),

    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    /// The constrained-grammar decoder was constructed with a JSON object
    /// instead of an array of phrase strings (§4.10/§9/S4). Fatal at
    /// construction time, never at call time.
    #[error("grammar must be a JSON array of phrases, not an object: {0}")]
    InvalidGrammarShape(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("intent oracle call failed: {0}")]
    OracleFailed(String),
}
