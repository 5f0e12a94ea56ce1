use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::classifier::DigitClassifier;
use crate::config::FrameAnalysisConfig;
use crate::error::ScanError;
use crate::frame::RawFrame;
use crate::gate::FrameGate;
use crate::histogram::HistogramAnalyzer;
use crate::inference::{InferenceRunner, PredictionResult};
use crate::pipeline::FramePipeline;
use crate::preprocess::ImagePreprocessor;
use crate::rate_limiter::FrameRateLimiter;

/// Externally observable output of the processor. Exactly one value is
/// current at any time.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorState {
    Idle,
    /// Stability progress in [0, 1].
    Loading(f32),
    Prediction(PredictionResult),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames offered to the processor.
    pub frames_seen: u64,
    /// Frames that survived the rate limiter and frame validation.
    pub frames_admitted: u64,
    pub predictions: u64,
}

/// Sequences rate limiting, frame normalization, stability gating and
/// inference, and enforces the post-prediction display cooldown.
///
/// Timing rules:
/// - inference runs on the first stable frame after `Loading(1.0)` has been
///   emitted, so the full progress bar is always an observable step;
/// - during the display cooldown the prediction stays current even when the
///   scene turns unstable; the cooldown wins over the instability-idle rule.
pub struct FrameProcessor {
    rate_limiter: FrameRateLimiter,
    pipeline: FramePipeline,
    gate: FrameGate,
    inference: InferenceRunner,
    stability_duration: Duration,
    display_duration: Duration,
    state: ProcessorState,
    stable_since: Option<Instant>,
    predicted_at: Option<Instant>,
    episode_predicted: bool,
    stats: ScanStats,
    subscribers: Vec<Sender<ProcessorState>>,
}

impl FrameProcessor {
    pub fn new(config: &FrameAnalysisConfig, classifier: Box<dyn DigitClassifier>) -> Self {
        Self {
            rate_limiter: FrameRateLimiter::new(config.target_fps),
            pipeline: FramePipeline::new(config.mask_size),
            gate: FrameGate::new(HistogramAnalyzer::new(config)),
            inference: InferenceRunner::new(ImagePreprocessor::new(config), classifier),
            stability_duration: Duration::from_millis(config.stability_duration_ms),
            display_duration: Duration::from_millis(config.prediction_display_duration_ms),
            state: ProcessorState::Idle,
            stable_since: None,
            predicted_at: None,
            episode_predicted: false,
            stats: ScanStats::default(),
            subscribers: Vec::new(),
        }
    }

    /// State transitions are delivered to every subscriber, once per change.
    pub fn subscribe(&mut self) -> Receiver<ProcessorState> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> &ProcessorState {
        &self.state
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn process(&mut self, frame: &RawFrame) -> Result<ProcessorState, ScanError> {
        self.process_at(frame, Instant::now())
    }

    pub fn process_at(
        &mut self,
        frame: &RawFrame,
        now: Instant,
    ) -> Result<ProcessorState, ScanError> {
        self.stats.frames_seen += 1;

        if !self.rate_limiter.can_process_at(now) {
            return Ok(self.state.clone());
        }

        let processed = match self.pipeline.process(frame) {
            Ok(processed) => processed,
            Err(ScanError::InvalidFrame { width, height, len }) => {
                // Malformed input is dropped exactly like a rate-limited
                // frame.
                debug!("dropping invalid frame: {}x{} with {} bytes", width, height, len);
                return Ok(self.state.clone());
            }
            Err(e) => return Err(e),
        };
        self.stats.frames_admitted += 1;

        let stable = self.gate.should_process(&processed.bytes);

        let in_cooldown = match self.predicted_at {
            Some(at) => now.saturating_duration_since(at) < self.display_duration,
            None => false,
        };
        if self.predicted_at.is_some() && !in_cooldown {
            // Cooldown expired: the episode may be evaluated again.
            self.predicted_at = None;
            self.episode_predicted = false;
        }

        if !stable {
            self.stable_since = None;
            self.episode_predicted = false;
            if !in_cooldown {
                self.set_state(ProcessorState::Idle);
            }
            return Ok(self.state.clone());
        }

        if self.episode_predicted || in_cooldown {
            // Either this episode already produced its prediction, or another
            // prediction is still on display; hold position.
            return Ok(self.state.clone());
        }

        let started = *self.stable_since.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);

        let at_full_progress = matches!(self.state, ProcessorState::Loading(p) if p >= 1.0);
        if at_full_progress && elapsed >= self.stability_duration {
            match self.inference.run(&processed.image) {
                Some(result) => {
                    info!("predicted digit {} ({:.0}%)", result.digit, result.confidence * 100.0);
                    self.stats.predictions += 1;
                    self.episode_predicted = true;
                    self.predicted_at = Some(now);
                    self.stable_since = None;
                    self.set_state(ProcessorState::Prediction(result));
                }
                None => {
                    debug!("classifier had no answer, episode failed");
                    self.stable_since = None;
                    self.set_state(ProcessorState::Idle);
                }
            }
        } else {
            let progress = (elapsed.as_secs_f32() / self.stability_duration.as_secs_f32()).min(1.0);
            self.set_state(ProcessorState::Loading(progress));
        }

        Ok(self.state.clone())
    }

    /// Back to `Idle` with every timer, flag and downstream component
    /// cleared. Safe at any point.
    pub fn reset(&mut self) {
        self.rate_limiter.reset();
        self.pipeline.reset();
        self.gate.reset();
        self.stable_since = None;
        self.predicted_at = None;
        self.episode_predicted = false;
        self.stats = ScanStats::default();
        self.set_state(ProcessorState::Idle);
    }

    /// Dispose the classifier resource. Failures are the caller's to log.
    pub fn release(&mut self) {
        self.inference.close();
    }

    fn set_state(&mut self, state: ProcessorState) {
        if self.state == state {
            return;
        }
        self.state = state;
        let current = self.state.clone();
        self.subscribers.retain(|tx| tx.send(current.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MockDigitClassifier;

    const FRAME_SIDE: u32 = 64;
    const FRAME_INTERVAL: Duration = Duration::from_millis(200);

    fn uniform_frame(value: u8) -> RawFrame {
        RawFrame::new(
            FRAME_SIDE,
            FRAME_SIDE,
            vec![value; (FRAME_SIDE * FRAME_SIDE) as usize],
        )
    }

    fn processor(classifier: MockDigitClassifier) -> FrameProcessor {
        FrameProcessor::new(&FrameAnalysisConfig::default(), Box::new(classifier))
    }

    /// Feeds identical frames at the rate-limiter cadence until the
    /// processor leaves `Loading`, or `max_frames` is hit.
    fn run_until_settled(
        processor: &mut FrameProcessor,
        frame: &RawFrame,
        start: Instant,
        max_frames: u32,
    ) -> Instant {
        let mut now = start;
        for _ in 0..max_frames {
            let state = processor.process_at(frame, now).unwrap();
            if matches!(state, ProcessorState::Prediction(_)) {
                return now;
            }
            now += FRAME_INTERVAL;
        }
        now
    }

    #[test]
    fn test_rate_limited_frame_changes_nothing() {
        let mut processor = processor(MockDigitClassifier::with_fixed(1, 0.9));
        let frame = uniform_frame(128);
        let t0 = Instant::now();

        processor.process_at(&frame, t0).unwrap();
        processor.process_at(&frame, t0 + Duration::from_millis(50)).unwrap();

        let stats = processor.stats();
        assert_eq!(stats.frames_seen, 2);
        assert_eq!(stats.frames_admitted, 1);
    }

    #[test]
    fn test_invalid_frame_dropped_without_state_change() {
        let mut processor = processor(MockDigitClassifier::with_fixed(1, 0.9));
        let bad = RawFrame::new(0, 0, vec![]);

        let state = processor.process_at(&bad, Instant::now()).unwrap();
        assert_eq!(state, ProcessorState::Idle);
        assert_eq!(processor.stats().frames_admitted, 0);
    }

    #[test]
    fn test_stable_scene_reaches_full_progress_then_prediction() {
        let mock = MockDigitClassifier::with_fixed(7, 0.93);
        let mut processor = processor(mock.clone());
        let states = processor.subscribe();
        let frame = uniform_frame(128);

        run_until_settled(&mut processor, &frame, Instant::now(), 30);

        let seen: Vec<ProcessorState> = states.try_iter().collect();
        let full = seen
            .iter()
            .position(|s| matches!(s, ProcessorState::Loading(p) if *p >= 1.0))
            .expect("full progress must be observable");
        let prediction = seen
            .iter()
            .position(|s| matches!(s, ProcessorState::Prediction(_)))
            .expect("prediction must follow");
        assert!(full < prediction);

        match &seen[prediction] {
            ProcessorState::Prediction(result) => {
                assert_eq!(result.digit, 7);
                assert_eq!(result.frame.width(), 28);
            }
            _ => unreachable!(),
        }
        assert_eq!(mock.calls(), 1);
        assert_eq!(processor.stats().predictions, 1);
    }

    #[test]
    fn test_progress_grows_monotonically_while_stable() {
        let mut processor = processor(MockDigitClassifier::with_fixed(1, 0.9));
        let states = processor.subscribe();
        let frame = uniform_frame(128);

        run_until_settled(&mut processor, &frame, Instant::now(), 30);

        let mut last = -1.0f32;
        for state in states.try_iter() {
            if let ProcessorState::Loading(p) = state {
                assert!(p >= last, "progress went backwards: {p} < {last}");
                last = p;
            }
        }
        assert!(last >= 1.0);
    }

    #[test]
    fn test_empty_model_answer_returns_to_idle_and_retries() {
        let mock = MockDigitClassifier::unavailable();
        let mut processor = processor(mock.clone());
        let frame = uniform_frame(128);
        let mut now = Instant::now();

        // Long enough for two full stability ramps.
        for _ in 0..20 {
            let state = processor.process_at(&frame, now).unwrap();
            assert!(!matches!(state, ProcessorState::Prediction(_)));
            now += FRAME_INTERVAL;
        }

        assert!(mock.calls() >= 2, "failed episodes must retry");
        assert_eq!(processor.stats().predictions, 0);
    }

    #[test]
    fn test_cooldown_outlives_instability() {
        let mock = MockDigitClassifier::with_fixed(3, 0.8);
        let mut processor = processor(mock.clone());
        let stable = uniform_frame(128);

        let predicted_at = run_until_settled(&mut processor, &stable, Instant::now(), 30);
        assert!(matches!(processor.state(), ProcessorState::Prediction(_)));

        // Alternating frames keep the gate unstable on every call. Within
        // the 3s display window the prediction must hold.
        let mut now = predicted_at + FRAME_INTERVAL;
        let mut value = 0u8;
        while now.saturating_duration_since(predicted_at) < Duration::from_millis(3000) {
            let state = processor.process_at(&uniform_frame(value), now).unwrap();
            assert!(
                matches!(state, ProcessorState::Prediction(_)),
                "state flipped before the display cooldown expired"
            );
            value = if value == 0 { 255 } else { 0 };
            now += FRAME_INTERVAL;
        }

        // First unstable frame past the cooldown releases the state.
        let state = processor.process_at(&uniform_frame(value), now).unwrap();
        assert_eq!(state, ProcessorState::Idle);
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_motionless_scene_predicts_once_per_cooldown() {
        let mock = MockDigitClassifier::with_fixed(5, 0.9);
        let mut processor = processor(mock.clone());
        let frame = uniform_frame(128);

        let predicted_at = run_until_settled(&mut processor, &frame, Instant::now(), 30);
        assert_eq!(mock.calls(), 1);

        // The scene never moves. No re-inference while the prediction is on
        // display; after expiry the episode re-arms and predicts again.
        // 25 frames cover one full cooldown plus one new stability ramp.
        let mut now = predicted_at + FRAME_INTERVAL;
        for _ in 0..25 {
            processor.process_at(&frame, now).unwrap();
            now += FRAME_INTERVAL;
        }
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_reset_returns_to_idle_and_clears_state() {
        let mut processor = processor(MockDigitClassifier::with_fixed(2, 0.9));
        let states = processor.subscribe();
        let frame = uniform_frame(128);

        run_until_settled(&mut processor, &frame, Instant::now(), 30);
        processor.reset();

        assert_eq!(*processor.state(), ProcessorState::Idle);
        assert_eq!(processor.stats(), ScanStats::default());
        assert_eq!(states.try_iter().last(), Some(ProcessorState::Idle));
    }

    #[test]
    fn test_release_closes_classifier() {
        let mock = MockDigitClassifier::with_fixed(0, 0.9);
        let mut processor = processor(mock.clone());
        processor.release();
        assert!(mock.is_closed());
    }
}
