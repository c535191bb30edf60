//! Voice Interaction State Machine: the Audio Device Arbiter (C9), Speech
//! Pipeline (C10), and Intent Oracle (C11). See §4.9-§4.11.
//!
//! `facegate-agent::flows` (C12) is the only consumer of this crate;
//! together with the Sync Tool Facade (C8) it drives the Recognize/
//! Register/Update/Delete flows described in §4.12.

pub mod arbiter;
pub mod audio_input;
pub mod error;
pub mod intent;
pub mod silence;
pub mod stt;
pub mod tts;
pub mod wake_word;

pub use arbiter::{AudioArbiter, PlaybackGuard, RecordingGuard};
pub use audio_input::AudioInputDevice;
pub use error::VoiceError;
pub use intent::{Intent, IntentOracle};
pub use silence::SilenceDetector;
pub use stt::{AcousticDecoder, FreeFormStt, GrammarConstrainedStt, TranscriptionEngine};
pub use tts::TextToSpeechEngine;
pub use wake_word::WakeWordDetector;
