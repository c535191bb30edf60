//! Layered settings: `config/default.{toml,yaml}` -> `config/{env}.*` ->
//! `FACEGATE__<SECTION>__<FIELD>` environment variables, in that priority
//! order (lowest to highest), the same three-source precedence the upstream
//! `load_settings` built with `config::Config::builder()`.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{audit, biometric, keystore, orchestrator, timeouts, voice};
use crate::ConfigError;

/// Runtime environment. Production/staging apply stricter validation;
/// development only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Top-level settings for the whole workspace. Every binary (`facegate-server`,
/// `facegate-voice`) loads one of these at startup via [`load_settings`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub biometric: BiometricConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// On-disk locations. See §6 "On-disk layout".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root data directory; every other path defaults relative to this.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
    #[serde(default = "default_clients_file")]
    pub clients_file: String,
    #[serde(default = "default_vectors_dir")]
    pub vectors_dir: String,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: String,
}

fn default_data_dir() -> String {
    "/var/lib/facegate".to_string()
}
fn default_keys_dir() -> String {
    "/var/lib/facegate/keys".to_string()
}
fn default_clients_file() -> String {
    "/var/lib/facegate/clients.json".to_string()
}
fn default_vectors_dir() -> String {
    "/var/lib/facegate/vectors".to_string()
}
fn default_audit_dir() -> String {
    "/var/lib/facegate/audit".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keys_dir: default_keys_dir(),
            clients_file: default_clients_file(),
            vectors_dir: default_vectors_dir(),
            audit_dir: default_audit_dir(),
        }
    }
}

/// Tool server (C7) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deadline applied to every tool call. See §5.
    #[serde(default = "default_tool_call_timeout_ms")]
    pub tool_call_timeout_ms: u64,
    /// Port the Prometheus metrics exporter listens on.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_tool_call_timeout_ms() -> u64 {
    timeouts::TOOL_CALL_DEFAULT_MS
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tool_call_timeout_ms: default_tool_call_timeout_ms(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Keystore & Token Authority (C1) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// Access token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
}

fn default_token_ttl() -> i64 {
    keystore::TOKEN_TTL_SECONDS_DEFAULT
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
        }
    }
}

/// Audit Sink (C2) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
    /// When true, `user_name` is stripped from audit events before they are
    /// written (optional PII redaction).
    #[serde(default)]
    pub redact_user_name: bool,
}

fn default_audit_queue_capacity() -> usize {
    audit::QUEUE_CAPACITY_DEFAULT
}
fn default_audit_retention_days() -> u32 {
    audit::RETENTION_DAYS_DEFAULT
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_audit_queue_capacity(),
            retention_days: default_audit_retention_days(),
            redact_user_name: false,
        }
    }
}

/// Face Detector/Embedder (C4) and Vector Index (C5) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricConfig {
    /// Path to the ONNX face detector model (bounding boxes + score).
    #[serde(default = "default_detector_model_path")]
    pub detector_model_path: String,
    /// Path to the ONNX face embedding model (crop -> 512-d vector).
    #[serde(default = "default_embedder_model_path")]
    pub embedder_model_path: String,
    /// Default cosine-distance acceptance threshold for `recognize_face`
    /// when the caller doesn't supply `confidence_threshold`.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold_default: f32,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

fn default_detector_model_path() -> String {
    "models/face_detector.onnx".to_string()
}
fn default_embedder_model_path() -> String {
    "models/face_embedder.onnx".to_string()
}
fn default_distance_threshold() -> f32 {
    biometric::DISTANCE_THRESHOLD_DEFAULT
}
fn default_embedding_dim() -> usize {
    biometric::EMBEDDING_DIM_DEFAULT
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            detector_model_path: default_detector_model_path(),
            embedder_model_path: default_embedder_model_path(),
            distance_threshold_default: default_distance_threshold(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

/// Speech Pipeline (C10), Audio Arbiter (C9) and Intent Oracle (C11)
/// settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_silence_threshold_db")]
    pub silence_energy_threshold_db: f32,
    #[serde(default = "default_silence_frames_to_close")]
    pub silence_frames_to_close: u32,
    /// Delay C9 enforces between releasing one audio mode and granting the
    /// next (§9 "audio mutual exclusion").
    #[serde(default = "default_transition_delay_ms")]
    pub transition_delay_ms: u64,
    /// Phrases that wake the pipeline from idle listening.
    #[serde(default = "default_wake_words")]
    pub wake_words: Vec<String>,
    /// LLM endpoint used by the Intent Oracle (C11).
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
    /// Deterministic fallback keyword sets for the Intent Oracle (C11),
    /// used when the LLM is unreachable, times out, or replies with
    /// something unparseable (§4.11).
    #[serde(default = "default_yes_keywords")]
    pub yes_keywords: Vec<String>,
    #[serde(default = "default_no_keywords")]
    pub no_keywords: Vec<String>,
    /// Path to the STT acoustic model (black-box loader, §1).
    #[serde(default = "default_stt_model_path")]
    pub stt_model_path: String,
    /// Path to the TTS acoustic model.
    #[serde(default = "default_tts_model_path")]
    pub tts_model_path: String,
    /// Duration of the fixed wake-word listening capture.
    #[serde(default = "default_wake_capture_seconds")]
    pub wake_capture_seconds: f64,
    /// Duration of a free-form capture (name, confirmations, field values).
    #[serde(default = "default_free_form_capture_seconds")]
    pub free_form_capture_seconds: f64,
    /// Optional directory debug WAV dumps of synthesized speech are
    /// written to; `None` disables the dump.
    #[serde(default)]
    pub debug_wav_dir: Option<String>,
}

fn default_silence_threshold_db() -> f32 {
    voice::SILENCE_ENERGY_THRESHOLD_DB_DEFAULT
}
fn default_silence_frames_to_close() -> u32 {
    voice::SILENCE_FRAMES_TO_CLOSE_DEFAULT
}
fn default_transition_delay_ms() -> u64 {
    timeouts::AUDIO_TRANSITION_DEFAULT_MS
}
fn default_wake_words() -> Vec<String> {
    vec!["hey facegate".to_string(), "ok facegate".to_string()]
}
fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_timeout_ms() -> u64 {
    timeouts::LLM_CALL_DEFAULT_MS
}
fn default_yes_keywords() -> Vec<String> {
    vec![
        "yes".to_string(),
        "yeah".to_string(),
        "yep".to_string(),
        "correct".to_string(),
        "affirmative".to_string(),
        "sure".to_string(),
        "ok".to_string(),
        "okay".to_string(),
    ]
}
fn default_no_keywords() -> Vec<String> {
    vec![
        "no".to_string(),
        "nope".to_string(),
        "negative".to_string(),
        "cancel".to_string(),
        "stop".to_string(),
        "don't".to_string(),
        "incorrect".to_string(),
    ]
}
fn default_stt_model_path() -> String {
    "models/stt_small_en.onnx".to_string()
}
fn default_tts_model_path() -> String {
    "models/tts.onnx".to_string()
}
fn default_wake_capture_seconds() -> f64 {
    orchestrator::WAKE_CAPTURE_SECONDS_DEFAULT
}
fn default_free_form_capture_seconds() -> f64 {
    orchestrator::FREE_FORM_CAPTURE_SECONDS_DEFAULT
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_energy_threshold_db: default_silence_threshold_db(),
            silence_frames_to_close: default_silence_frames_to_close(),
            transition_delay_ms: default_transition_delay_ms(),
            wake_words: default_wake_words(),
            llm_endpoint: default_llm_endpoint(),
            llm_timeout_ms: default_llm_timeout_ms(),
            yes_keywords: default_yes_keywords(),
            no_keywords: default_no_keywords(),
            stt_model_path: default_stt_model_path(),
            tts_model_path: default_tts_model_path(),
            wake_capture_seconds: default_wake_capture_seconds(),
            free_form_capture_seconds: default_free_form_capture_seconds(),
            debug_wav_dir: None,
        }
    }
}

/// Sync Tool Facade (C8) settings: how the voice process finds and
/// authenticates to the tool server (C7) it spawns as a child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Path to the `facegate-server` executable the facade spawns.
    #[serde(default = "default_server_binary_path")]
    pub server_binary_path: String,
    /// OAuth client-credentials identity the voice process authenticates
    /// as (§3 "OAuthClient"), provisioned out-of-band by an admin.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Shell command invoked to capture one still image from the camera;
    /// its stdout is the raw image bytes (§4.12's camera-capture
    /// transition, treated as an external collaborator per §1).
    #[serde(default = "default_camera_capture_command")]
    pub camera_capture_command: String,
    /// Deadline applied to a single tool call from the facade's side, on
    /// top of the tool server's own per-call timeout (§5).
    #[serde(default = "default_tool_call_deadline_ms")]
    pub tool_call_deadline_ms: u64,
}

fn default_server_binary_path() -> String {
    "facegate-server".to_string()
}
fn default_camera_capture_command() -> String {
    "fswebcam --jpeg 90 --no-banner -".to_string()
}
fn default_tool_call_deadline_ms() -> u64 {
    orchestrator::TOOL_CALL_DEFAULT_MS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server_binary_path: default_server_binary_path(),
            client_id: String::new(),
            client_secret: String::new(),
            camera_capture_command: default_camera_capture_command(),
            tool_call_deadline_ms: default_tool_call_deadline_ms(),
        }
    }
}

/// Logging/metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_keystore()?;
        self.validate_biometric()?;
        self.validate_voice()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.tool_call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.tool_call_timeout_ms".to_string(),
                message: "must be at least 1ms".to_string(),
            });
        }
        Ok(())
    }

    fn validate_keystore(&self) -> Result<(), ConfigError> {
        if self.keystore.token_ttl_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "keystore.token_ttl_seconds".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn validate_biometric(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.biometric.distance_threshold_default) {
            return Err(ConfigError::InvalidValue {
                field: "biometric.distance_threshold_default".to_string(),
                message: format!(
                    "cosine distance must be in [0,2], got {}",
                    self.biometric.distance_threshold_default
                ),
            });
        }
        if self.biometric.embedding_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "biometric.embedding_dim".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_voice(&self) -> Result<(), ConfigError> {
        if self.voice.wake_words.is_empty() {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "voice.wake_words".to_string(),
                    message: "at least one wake word is required in production/staging"
                        .to_string(),
                });
            }
            tracing::warn!("voice.wake_words is empty; wake-word detection will never fire");
        }
        if self.voice.wake_capture_seconds <= 0.0 || self.voice.free_form_capture_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "voice.wake_capture_seconds/free_form_capture_seconds".to_string(),
                message: "capture durations must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from `config/default.*`, `config/{env}.*`, then
/// `FACEGATE__<SECTION>__<FIELD>` environment variables, highest priority
/// last.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("FACEGATE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.keystore.token_ttl_seconds, 3_600);
    }

    #[test]
    fn rejects_out_of_range_distance_threshold() {
        let mut settings = Settings::default();
        settings.biometric.distance_threshold_default = 5.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_token_ttl() {
        let mut settings = Settings::default();
        settings.keystore.token_ttl_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn production_requires_wake_words() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.voice.wake_words.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_settings_falls_back_to_defaults_without_files() {
        let settings = load_settings(None).expect("defaults alone must be valid");
        assert_eq!(
            settings.biometric.distance_threshold_default,
            constants_default_distance()
        );
    }

    fn constants_default_distance() -> f32 {
        crate::constants::biometric::DISTANCE_THRESHOLD_DEFAULT
    }
}
