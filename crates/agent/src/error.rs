//! Crate-local error type for the Sync Tool Facade (C8) and Voice
//! Orchestrators (C12). See §4.8, §4.12.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to spawn facegate-server: {0}")]
    ServerSpawnFailed(String),

    #[error("facegate-server process exited unexpectedly")]
    ServerGone,

    #[error("tool call transport error: {0}")]
    Transport(String),

    #[error("tool call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tool call failed: {kind}: {message}")]
    Tool { kind: String, message: String },

    #[error("camera capture failed: {0}")]
    CameraFailed(String),

    #[error(transparent)]
    Voice(#[from] facegate_voice::VoiceError),

    #[error("flow cancelled: {0}")]
    Cancelled(String),
}

impl FlowError {
    /// `true` for tool-level `unauthenticated` failures, the one case the
    /// facade retries by re-issuing a token rather than surfacing to the
    /// flow (§4.1's token refresh contract).
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, FlowError::Tool { kind, .. } if kind == "unauthenticated")
    }
}
