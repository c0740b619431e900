//! Utterance endpointing
//!
//! Decides when a spoken phrase starts and ends using RMS energy. Bounded
//! by a listen timeout (no speech at all) and a phrase limit (speech that
//! runs too long is cut off and submitted as-is).

use std::time::Duration;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before an utterance can complete (0.3 s)
const MIN_SPEECH_SECS: f32 = 0.3;

/// Trailing silence that ends an utterance (0.5 s)
const END_SILENCE_SECS: f32 = 0.5;

/// Where the detector is in the current phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// No speech yet
    Waiting,
    /// Speech started, accumulating samples
    Capturing,
}

/// Result of feeding one chunk to the detector
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Keep feeding audio
    Pending,
    /// A full phrase is available
    Complete(Vec<f32>),
    /// Nobody spoke before the listen timeout
    TimedOut,
}

/// Energy-based phrase detector
#[derive(Debug)]
pub struct UtteranceDetector {
    state: SegmentState,
    buffer: Vec<f32>,
    waited: usize,
    /// Samples in the current phrase that were above the energy threshold
    speech: usize,
    silence: usize,
    timeout_samples: usize,
    phrase_limit_samples: usize,
    min_speech_samples: usize,
    end_silence_samples: usize,
}

impl UtteranceDetector {
    /// Create a detector for audio at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32, timeout: Duration, phrase_limit: Duration) -> Self {
        let samples_for = |secs: f32| seconds_to_samples(sample_rate, secs);

        Self {
            state: SegmentState::Waiting,
            buffer: Vec::new(),
            waited: 0,
            speech: 0,
            silence: 0,
            timeout_samples: samples_for(timeout.as_secs_f32()),
            phrase_limit_samples: samples_for(phrase_limit.as_secs_f32()),
            min_speech_samples: samples_for(MIN_SPEECH_SECS),
            end_silence_samples: samples_for(END_SILENCE_SECS),
        }
    }

    /// Feed a chunk of mono samples
    pub fn process(&mut self, samples: &[f32]) -> Endpoint {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Waiting => {
                if is_speech {
                    self.state = SegmentState::Capturing;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.speech = samples.len();
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                } else {
                    self.waited += samples.len();
                    if self.waited >= self.timeout_samples {
                        tracing::debug!(waited = self.waited, "listen timeout");
                        return Endpoint::TimedOut;
                    }
                }
            }
            SegmentState::Capturing => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech += samples.len();
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.buffer.len() >= self.phrase_limit_samples {
                    tracing::debug!(samples = self.buffer.len(), "phrase limit reached");
                    return self.finish();
                }

                if self.silence > self.end_silence_samples {
                    if self.speech >= self.min_speech_samples {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        return self.finish();
                    }

                    // too little speech before the pause: a click, not a phrase
                    tracing::trace!(speech = self.speech, "discarding short noise burst");
                    self.waited += self.buffer.len();
                    self.state = SegmentState::Waiting;
                    self.buffer.clear();
                    self.speech = 0;
                    self.silence = 0;
                    if self.waited >= self.timeout_samples {
                        tracing::debug!(waited = self.waited, "listen timeout");
                        return Endpoint::TimedOut;
                    }
                }
            }
        }

        Endpoint::Pending
    }

    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    fn finish(&mut self) -> Endpoint {
        self.state = SegmentState::Waiting;
        self.speech = 0;
        self.silence = 0;
        self.waited = 0;
        Endpoint::Complete(std::mem::take(&mut self.buffer))
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn seconds_to_samples(sample_rate: u32, secs: f32) -> usize {
    (sample_rate as f32 * secs).max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;
    const CHUNK: usize = 1600;

    fn tone(chunks: usize) -> Vec<Vec<f32>> {
        vec![vec![0.3; CHUNK]; chunks]
    }

    fn silence(chunks: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; CHUNK]; chunks]
    }

    fn feed(detector: &mut UtteranceDetector, chunks: Vec<Vec<f32>>) -> Endpoint {
        let mut last = Endpoint::Pending;
        for chunk in chunks {
            last = detector.process(&chunk);
            if last != Endpoint::Pending {
                break;
            }
        }
        last
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&[0.0; 100]) < 0.001);
        assert!(calculate_energy(&[0.5; 100]) > 0.4);
        assert!(calculate_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn test_times_out_without_speech() {
        let mut detector =
            UtteranceDetector::new(RATE, Duration::from_secs(1), Duration::from_secs(10));

        // 1 s of silence is ten 100 ms chunks
        assert_eq!(feed(&mut detector, silence(9)), Endpoint::Pending);
        assert_eq!(feed(&mut detector, silence(1)), Endpoint::TimedOut);
    }

    #[test]
    fn test_completes_after_trailing_silence() {
        let mut detector =
            UtteranceDetector::new(RATE, Duration::from_secs(5), Duration::from_secs(10));

        assert_eq!(feed(&mut detector, tone(5)), Endpoint::Pending);
        assert_eq!(detector.state(), SegmentState::Capturing);

        match feed(&mut detector, silence(10)) {
            Endpoint::Complete(samples) => assert_eq!(samples.len(), CHUNK * 11),
            other => panic!("expected complete, got {other:?}"),
        }
        assert_eq!(detector.state(), SegmentState::Waiting);
    }

    #[test]
    fn test_short_burst_is_not_a_phrase() {
        let mut detector =
            UtteranceDetector::new(RATE, Duration::from_secs(5), Duration::from_secs(10));

        // 100 ms click, then a pause long enough to end a phrase
        assert_eq!(feed(&mut detector, tone(1)), Endpoint::Pending);
        assert_eq!(feed(&mut detector, silence(6)), Endpoint::Pending);
        assert_eq!(detector.state(), SegmentState::Waiting);

        let mut phrase = tone(5);
        phrase.extend(silence(6));
        match feed(&mut detector, phrase) {
            Endpoint::Complete(samples) => assert_eq!(samples.len(), CHUNK * 11),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn test_bursts_count_toward_listen_timeout() {
        let mut detector =
            UtteranceDetector::new(RATE, Duration::from_secs(1), Duration::from_secs(10));

        let mut clicks = tone(1);
        clicks.extend(silence(6));
        clicks.extend(silence(3));
        assert_eq!(feed(&mut detector, clicks), Endpoint::TimedOut);
    }

    #[test]
    fn test_phrase_limit_cuts_off() {
        let mut detector =
            UtteranceDetector::new(RATE, Duration::from_secs(5), Duration::from_secs(1));

        match feed(&mut detector, tone(20)) {
            Endpoint::Complete(samples) => assert_eq!(samples.len(), RATE as usize),
            other => panic!("expected complete, got {other:?}"),
        }
    }
}
