//! TranscriptionEngine (C10 collaborator #3). See §4.10: grammar mode
//! constructed from a JSON array-of-phrases, rejecting any object wrapper
//! at construction (§9/S4); free-form mode returns a best hypothesis.
//!
//! The acoustic model itself is a black box per §1 ("the STT acoustic
//! model... treated as a black-box loader with defined inputs/outputs"):
//! [`AcousticDecoder`] wraps it the same way `OnnxFaceEmbedder` wraps the
//! face model in `facegate-biometric`, and both transcription modes share
//! one loaded decoder.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ort::session::Session;
use parking_lot::Mutex;
use serde_json::Value;

use facegate_core::audio::AudioBuffer;

use crate::error::VoiceError;

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, VoiceError>;
}

/// Loads the STT acoustic model once and runs it on demand. Treated as a
/// black box: input is a captured [`AudioBuffer`], output is a raw
/// hypothesis string, with whatever decoding strategy (beam search,
/// greedy CTC, ...) the underlying model calls for left opaque here.
pub struct AcousticDecoder {
    session: Mutex<Session>,
}

impl AcousticDecoder {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, VoiceError> {
        let session = Session::builder()
            .and_then(|b| b.commit_from_file(model_path.as_ref()))
            .map_err(|e| VoiceError::TranscriptionFailed(format!("loading STT model: {e}")))?;
        Ok(AcousticDecoder { session: Mutex::new(session) })
    }

    /// Best-effort hypothesis for `audio`. The concrete tensor layout is
    /// model-specific and out of scope here (§1 non-goal); only the
    /// call shape — lock the session, run it, decode text — is specified.
    fn decode(&self, audio: &AudioBuffer) -> Result<String, VoiceError> {
        let samples = audio.samples();
        if samples.is_empty() {
            return Ok(String::new());
        }
        let input = ort::value::Tensor::from_array(([1, samples.len()], samples.to_vec()))
            .map_err(|e| VoiceError::TranscriptionFailed(format!("preparing STT input: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs!["audio" => input])
            .map_err(|e| VoiceError::TranscriptionFailed(format!("running STT model: {e}")))?;

        let (_, text_bytes) = outputs["text"]
            .try_extract_raw_tensor::<u8>()
            .map_err(|e| VoiceError::TranscriptionFailed(format!("decoding STT output: {e}")))?;
        Ok(String::from_utf8_lossy(text_bytes).trim().to_string())
    }
}

/// Free-form mode: general decoder, returns the decoder's best hypothesis
/// directly (§4.10).
pub struct FreeFormStt {
    decoder: Arc<AcousticDecoder>,
}

impl FreeFormStt {
    pub fn new(decoder: Arc<AcousticDecoder>) -> Self {
        FreeFormStt { decoder }
    }
}

#[async_trait]
impl TranscriptionEngine for FreeFormStt {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, VoiceError> {
        let decoder = self.decoder.clone();
        let samples = audio_to_owned_buffer(audio);
        tokio::task::spawn_blocking(move || decoder.decode(&samples))
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(e.to_string()))?
    }
}

/// Grammar-constrained mode: the decoder's raw hypothesis is snapped to
/// the closest configured phrase by edit distance, or the empty string if
/// nothing is close enough. The grammar payload must be a JSON array of
/// phrase strings (§9's "wrapping this in any object form is a fatal
/// configuration error").
pub struct GrammarConstrainedStt {
    decoder: Arc<AcousticDecoder>,
    phrases: Vec<String>,
    max_edit_distance: usize,
}

impl GrammarConstrainedStt {
    pub fn new(decoder: Arc<AcousticDecoder>, grammar: Value) -> Result<Self, VoiceError> {
        let phrases = validate_grammar(&grammar)?;
        Ok(GrammarConstrainedStt {
            decoder,
            phrases,
            max_edit_distance: 2,
        })
    }

    fn snap_to_grammar(&self, hypothesis: &str) -> String {
        let lowered = hypothesis.trim().to_lowercase();
        self.phrases
            .iter()
            .map(|phrase| (phrase, levenshtein(&lowered, phrase)))
            .min_by_key(|(_, distance)| *distance)
            .filter(|(_, distance)| *distance <= self.max_edit_distance)
            .map(|(phrase, _)| phrase.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TranscriptionEngine for GrammarConstrainedStt {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, VoiceError> {
        let decoder = self.decoder.clone();
        let samples = audio_to_owned_buffer(audio);
        let hypothesis = tokio::task::spawn_blocking(move || decoder.decode(&samples))
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(e.to_string()))??;
        Ok(self.snap_to_grammar(&hypothesis))
    }
}

/// The grammar payload must be a JSON array of phrase strings, never an
/// object wrapper, per §9/S4. Validated once at construction so a
/// shape error is a typed, immediate construction failure rather than a
/// silent no-match at call time.
fn validate_grammar(grammar: &Value) -> Result<Vec<String>, VoiceError> {
    let Value::Array(items) = grammar else {
        return Err(VoiceError::InvalidGrammarShape(format!(
            "expected a JSON array of phrases, got: {grammar}"
        )));
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.to_lowercase()),
            other => Err(VoiceError::InvalidGrammarShape(format!(
                "expected a string phrase, got: {other}"
            ))),
        })
        .collect()
}

fn audio_to_owned_buffer(audio: &AudioBuffer) -> AudioBuffer {
    use facegate_core::audio::{Channels, SampleRate};
    let mut owned = AudioBuffer::new(SampleRate::Hz16000, Channels::Mono, audio.duration());
    let frame = facegate_core::audio::AudioFrame::new(audio.samples().to_vec(), SampleRate::Hz16000, Channels::Mono, 0);
    owned.push(&frame);
    owned
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let current = row[j];
            row[j] = (row[j] + 1).min(row[j - 1] + 1).min(prev + cost);
            prev = current;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_grammar_is_rejected() {
        let err = validate_grammar(&json!({"grammar": ["hey gemma"]})).unwrap_err();
        assert!(matches!(err, VoiceError::InvalidGrammarShape(_)));
    }

    #[test]
    fn array_of_strings_is_accepted() {
        let phrases = validate_grammar(&json!(["hey gemma", "ok gemma"])).unwrap();
        assert_eq!(phrases, vec!["hey gemma", "ok gemma"]);
    }

    #[test]
    fn array_grammar_rejects_non_string_elements() {
        let err = validate_grammar(&json!(["hello", 5])).unwrap_err();
        assert!(matches!(err, VoiceError::InvalidGrammarShape(_)));
    }

    #[test]
    fn levenshtein_basic_distances() {
        assert_eq!(levenshtein("hey gemma", "hey gemma"), 0);
        assert_eq!(levenshtein("hey gemma", "hey jemma"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }
}
