//! Centralized defaults for values that are also configurable via
//! [`crate::settings::Settings`]. Grouped by concern the way the upstream
//! constants module separated endpoints/timeouts/audio tuning; there is no
//! domain-specific business data here, only operational parameters.

/// Timeouts (milliseconds unless noted).
pub mod timeouts {
    /// Default deadline for a single tool call (§5 "Cancellation/timeouts").
    pub const TOOL_CALL_DEFAULT_MS: u64 = 30_000;

    /// Default deadline for an intent-oracle LLM call.
    pub const LLM_CALL_DEFAULT_MS: u64 = 5_000;

    /// Delay C9 enforces between releasing one audio mode and granting the next.
    pub const AUDIO_TRANSITION_DEFAULT_MS: u64 = 150;
}

/// Biometric tuning defaults.
pub mod biometric {
    /// Default cosine-distance acceptance threshold for `recognize_face`.
    pub const DISTANCE_THRESHOLD_DEFAULT: f32 = 0.35;

    /// Embedding dimensionality produced by the configured face embedder.
    pub const EMBEDDING_DIM_DEFAULT: usize = 512;
}

/// Speech pipeline tuning defaults.
pub mod voice {
    /// Energy floor (dBFS) below which a frame is classified as silence.
    pub const SILENCE_ENERGY_THRESHOLD_DB_DEFAULT: f32 = -40.0;

    /// Consecutive silent frames required to close an utterance.
    pub const SILENCE_FRAMES_TO_CLOSE_DEFAULT: u32 = 20;
}

/// Keystore/token defaults.
pub mod keystore {
    /// Access token lifetime in seconds.
    pub const TOKEN_TTL_SECONDS_DEFAULT: i64 = 3_600;
}

/// Audit sink defaults.
pub mod audit {
    /// Bounded channel capacity between producers and the writer task.
    pub const QUEUE_CAPACITY_DEFAULT: usize = 1_024;

    /// Days an uncompressed log file is kept before gzip rotation.
    pub const RETENTION_DAYS_DEFAULT: u32 = 30;
}

/// Voice orchestrator (C8/C12) defaults.
pub mod orchestrator {
    /// Duration of the fixed wake-word listening capture (§3
    /// "AudioBuffer": "default 3.0 s for wake").
    pub const WAKE_CAPTURE_SECONDS_DEFAULT: f64 = 3.0;

    /// Duration of a free-form capture (name capture, confirmations,
    /// field values). §3: "5-10 s for free-form".
    pub const FREE_FORM_CAPTURE_SECONDS_DEFAULT: f64 = 6.0;

    /// Implicit per-tool-call deadline applied by the facade on top of the
    /// tool server's own timeout (§5 "every tool call carries an
    /// implicit deadline (default 30 s)").
    pub const TOOL_CALL_DEFAULT_MS: u64 = 30_000;
}
