//! SilenceDetector (C10 collaborator #2). See §4.10: "returns true
//! iff `energy < energy_threshold`... silence captures are dropped without
//! transcription, saving CPU."

use facegate_core::audio::AudioBuffer;

use crate::audio_input::energy_db;

pub struct SilenceDetector {
    threshold_db: f32,
}

impl SilenceDetector {
    pub fn new(threshold_db: f32) -> Self {
        SilenceDetector { threshold_db }
    }

    pub fn is_silent(&self, buffer: &AudioBuffer) -> bool {
        energy_db(buffer) < self.threshold_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::audio::{Channels, SampleRate};
    use std::time::Duration;

    #[test]
    fn empty_buffer_is_silent() {
        let detector = SilenceDetector::new(-40.0);
        let buffer = AudioBuffer::new(SampleRate::Hz16000, Channels::Mono, Duration::from_secs(1));
        assert!(detector.is_silent(&buffer));
    }

    #[test]
    fn loud_signal_is_not_silent() {
        let detector = SilenceDetector::new(-40.0);
        let mut buffer = AudioBuffer::new(SampleRate::Hz16000, Channels::Mono, Duration::from_secs(1));
        let loud = facegate_core::audio::AudioFrame::new(
            vec![0.8; 1600],
            SampleRate::Hz16000,
            Channels::Mono,
            0,
        );
        buffer.push(&loud);
        assert!(!detector.is_silent(&buffer));
    }
}
