//! Intent Oracle (C11): LLM yes/no/unclear classification with a
//! deterministic keyword fallback. See §4.11.
//!
//! Built on a pluggable-backend trait with a timeout-wrapped call pattern,
//! generalized from open-ended generation down to a three-way
//! classification.

use std::time::Duration;

use serde::Deserialize;

use crate::error::VoiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Affirmative,
    Negative,
    Unclear,
}

impl Intent {
    /// Apply §4.11's safety rule: "in destructive flows..., `Unclear`
    /// is treated as `Negative`."
    pub fn or_negative_if_unclear(self) -> Intent {
        match self {
            Intent::Unclear => Intent::Negative,
            other => other,
        }
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Classifies a transcribed utterance as affirmative, negative, or
/// unclear. Tries the local LLM first; falls back to keyword matching on
/// any failure (unreachable, timeout, unparseable reply) per §4.11.
pub struct IntentOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    yes_keywords: Vec<String>,
    no_keywords: Vec<String>,
}

const SYSTEM_PROMPT: &str = "Classify the user's reply as exactly one word: YES, NO, or UNCLEAR. \
Reply with that single word and nothing else.";

impl IntentOracle {
    pub fn new(endpoint: String, timeout: Duration, yes_keywords: Vec<String>, no_keywords: Vec<String>) -> Self {
        IntentOracle {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
            yes_keywords: yes_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            no_keywords: no_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub async fn classify(&self, utterance: &str) -> Intent {
        match self.ask_llm(utterance).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                tracing::debug!(utterance, "LLM reply unparseable; falling back to keywords");
                self.classify_by_keywords(utterance)
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent oracle LLM call failed; falling back to keywords");
                self.classify_by_keywords(utterance)
            }
        }
    }

    async fn ask_llm(&self, utterance: &str) -> Result<Option<Intent>, VoiceError> {
        let body = serde_json::json!({
            "model": "qwen3:4b-instruct-2507-q4_K_M",
            "prompt": format!("{SYSTEM_PROMPT}\n\nUser reply: {utterance}"),
            "stream": false,
        });

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(format!("{}/api/generate", self.endpoint)).json(&body).send(),
        )
        .await
        .map_err(|_| VoiceError::OracleFailed("LLM call timed out".to_string()))?
        .map_err(|e| VoiceError::OracleFailed(e.to_string()))?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::OracleFailed(format!("parsing LLM response: {e}")))?;

        Ok(parse_first_token(&parsed.response))
    }

    fn classify_by_keywords(&self, utterance: &str) -> Intent {
        let lowered = utterance.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();

        if self.yes_keywords.iter().any(|k| words.contains(&k.as_str())) {
            return Intent::Affirmative;
        }
        if self.no_keywords.iter().any(|k| words.contains(&k.as_str())) {
            return Intent::Negative;
        }
        Intent::Unclear
    }
}

/// The first recognized token in `reply` wins (§4.11: "model output is
/// mapped to one of the three labels by a deterministic parser (first
/// recognized token wins)").
fn parse_first_token(reply: &str) -> Option<Intent> {
    let first = reply.split_whitespace().next()?.to_lowercase();
    match first.trim_matches(|c: char| !c.is_alphanumeric()) {
        "yes" => Some(Intent::Affirmative),
        "no" => Some(Intent::Negative),
        "unclear" => Some(Intent::Unclear),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> IntentOracle {
        IntentOracle::new(
            "http://localhost:1".to_string(),
            Duration::from_millis(50),
            vec!["yes".to_string(), "sure".to_string()],
            vec!["no".to_string(), "cancel".to_string()],
        )
    }

    #[test]
    fn parse_first_token_picks_leading_word() {
        assert_eq!(parse_first_token("YES, that's right."), Some(Intent::Affirmative));
        assert_eq!(parse_first_token("no way"), Some(Intent::Negative));
        assert_eq!(parse_first_token("hmm not sure"), None);
    }

    #[test]
    fn keyword_fallback_matches_configured_words() {
        let oracle = oracle();
        assert_eq!(oracle.classify_by_keywords("sure thing"), Intent::Affirmative);
        assert_eq!(oracle.classify_by_keywords("please cancel that"), Intent::Negative);
        assert_eq!(oracle.classify_by_keywords("maybe later"), Intent::Unclear);
    }

    #[tokio::test]
    async fn unreachable_llm_falls_back_to_keywords() {
        let oracle = oracle();
        let intent = oracle.classify("yes please").await;
        assert_eq!(intent, Intent::Affirmative);
    }

    #[test]
    fn unclear_becomes_negative_for_destructive_flows() {
        assert_eq!(Intent::Unclear.or_negative_if_unclear(), Intent::Negative);
        assert_eq!(Intent::Affirmative.or_negative_if_unclear(), Intent::Affirmative);
    }
}
