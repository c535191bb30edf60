//! WakeWordDetector (C10 collaborator #4). See §4.10: "exact
//! case-insensitive phrase match of transcription against a configured
//! wake-word list."

pub struct WakeWordDetector {
    wake_words: Vec<String>,
}

impl WakeWordDetector {
    pub fn new(wake_words: Vec<String>) -> Self {
        WakeWordDetector {
            wake_words: wake_words.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, transcription: &str) -> bool {
        let lowered = transcription.trim().to_lowercase();
        self.wake_words.iter().any(|w| *w == lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_exact_match() {
        let detector = WakeWordDetector::new(vec!["Hey Facegate".to_string()]);
        assert!(detector.matches("hey facegate"));
        assert!(detector.matches("HEY FACEGATE"));
        assert!(!detector.matches("hey facegate please"));
    }
}
