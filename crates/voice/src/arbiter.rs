//! Audio Device Arbiter (C9): mutual exclusion between microphone capture
//! and speaker playback, with a settle delay between transitions (§4.9,
//! §9). Replaces timed sleeps with explicit context-acquisition.
//!
//! Callers hold an RAII guard for the duration of their audio operation;
//! the guard's `Drop` returns the arbiter to `Idle` and stamps
//! `last_release`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::VoiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArbiterState {
    Idle,
    Recording,
    Playing,
}

struct Inner {
    state: ArbiterState,
    last_release: Option<Instant>,
}

/// Shared handle; cheap to clone. Exactly one `RecordingGuard` or
/// `PlaybackGuard` may be outstanding at a time.
#[derive(Clone)]
pub struct AudioArbiter {
    inner: Arc<Mutex<Inner>>,
    transition_delay: Duration,
}

impl AudioArbiter {
    pub fn new(transition_delay: Duration) -> Self {
        AudioArbiter {
            inner: Arc::new(Mutex::new(Inner {
                state: ArbiterState::Idle,
                last_release: None,
            })),
            transition_delay,
        }
    }

    /// Acquire the device for microphone capture. Fails `Busy` if a
    /// recording or playback is already in progress; otherwise waits out
    /// any remaining settle time from the previous release before granting
    /// the guard (§4.9 steps 1-2).
    pub async fn acquire_for_recording(&self) -> Result<RecordingGuard, VoiceError> {
        self.acquire(ArbiterState::Recording).await?;
        Ok(RecordingGuard { arbiter: self.clone() })
    }

    /// Acquire the device for speaker playback. Same contract as
    /// [`Self::acquire_for_recording`].
    pub async fn acquire_for_playback(&self) -> Result<PlaybackGuard, VoiceError> {
        self.acquire(ArbiterState::Playing).await?;
        Ok(PlaybackGuard { arbiter: self.clone() })
    }

    async fn acquire(&self, wanted: ArbiterState) -> Result<(), VoiceError> {
        let wait = {
            let mut inner = self.inner.lock();
            if inner.state != ArbiterState::Idle {
                return Err(VoiceError::DeviceBusy(format!(
                    "cannot enter {wanted:?}: arbiter is in {:?}",
                    inner.state
                )));
            }
            let wait = inner
                .last_release
                .map(|last| self.transition_delay.saturating_sub(last.elapsed()))
                .unwrap_or(Duration::ZERO);
            inner.state = wanted;
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.state = ArbiterState::Idle;
        inner.last_release = Some(Instant::now());
    }
}

/// Held for the duration of a microphone capture. Releases the arbiter on
/// drop, whether the capture succeeded, failed, or was cancelled.
pub struct RecordingGuard {
    arbiter: AudioArbiter,
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}

/// Held for the duration of speaker playback. Same release contract as
/// [`RecordingGuard`].
pub struct PlaybackGuard {
    arbiter: AudioArbiter,
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_busy_while_first_guard_is_held() {
        let arbiter = AudioArbiter::new(Duration::from_millis(0));
        let guard = arbiter.acquire_for_recording().await.unwrap();
        let err = arbiter.acquire_for_playback().await.unwrap_err();
        assert!(matches!(err, VoiceError::DeviceBusy(_)));
        drop(guard);
    }

    #[tokio::test]
    async fn releasing_one_guard_allows_the_next_acquire() {
        let arbiter = AudioArbiter::new(Duration::from_millis(0));
        let guard = arbiter.acquire_for_recording().await.unwrap();
        drop(guard);
        arbiter.acquire_for_playback().await.unwrap();
    }

    #[tokio::test]
    async fn transition_delay_is_honored_between_releases_and_next_acquire() {
        let arbiter = AudioArbiter::new(Duration::from_millis(80));
        let guard = arbiter.acquire_for_recording().await.unwrap();
        drop(guard);

        let start = Instant::now();
        arbiter.acquire_for_playback().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
