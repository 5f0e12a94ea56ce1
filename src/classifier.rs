use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::preprocess::ModelInput;

/// One answer from the model: a digit class and how sure the model is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrediction {
    pub class_index: usize,
    pub confidence: f32,
}

/// Boundary to the external classification model.
///
/// `predict` returns `None` when the model is not ready or found no
/// confident class; that is an expected outcome, not an error.
pub trait DigitClassifier: Send {
    fn predict(&self, input: &ModelInput) -> Option<ModelPrediction>;

    /// Release the underlying model handle.
    fn close(&mut self) {}
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Option<ModelPrediction>>,
    fallback: Option<ModelPrediction>,
    calls: usize,
    closed: bool,
}

/// Scriptable classifier for tests and for wiring the pipeline before a real
/// model is attached. Clones share the same state so a test can keep a
/// handle after moving the mock into the processor.
#[derive(Clone, Default)]
pub struct MockDigitClassifier {
    state: Arc<Mutex<MockState>>,
}

impl MockDigitClassifier {
    /// Always answers with the same digit and confidence.
    pub fn with_fixed(class_index: usize, confidence: f32) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().fallback = Some(ModelPrediction {
            class_index,
            confidence,
        });
        mock
    }

    /// Never produces a prediction (model unavailable / nothing confident).
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Answers from a scripted sequence, then falls back to `None`.
    pub fn with_script(script: Vec<Option<ModelPrediction>>) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().script = script.into();
        mock
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl DigitClassifier for MockDigitClassifier {
    fn predict(&self, _input: &ModelInput) -> Option<ModelPrediction> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        match state.script.pop_front() {
            Some(answer) => answer,
            None => state.fallback,
        }
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ModelInput {
        ModelInput {
            width: 2,
            height: 2,
            values: vec![0.0; 4],
            preview: image::GrayImage::new(2, 2),
        }
    }

    #[test]
    fn test_fixed_mock_always_answers() {
        let mock = MockDigitClassifier::with_fixed(7, 0.92);
        let prediction = mock.predict(&input()).unwrap();
        assert_eq!(prediction.class_index, 7);
        assert!((prediction.confidence - 0.92).abs() < f32::EPSILON);
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_unavailable_mock_returns_none() {
        let mock = MockDigitClassifier::unavailable();
        assert!(mock.predict(&input()).is_none());
    }

    #[test]
    fn test_scripted_mock_plays_in_order() {
        let mock = MockDigitClassifier::with_script(vec![
            None,
            Some(ModelPrediction {
                class_index: 3,
                confidence: 0.8,
            }),
        ]);

        assert!(mock.predict(&input()).is_none());
        assert_eq!(mock.predict(&input()).unwrap().class_index, 3);
        assert!(mock.predict(&input()).is_none());
    }

    #[test]
    fn test_clone_shares_state() {
        let mock = MockDigitClassifier::with_fixed(1, 0.5);
        let mut moved = mock.clone();
        moved.predict(&input());
        moved.close();

        assert_eq!(mock.calls(), 1);
        assert!(mock.is_closed());
    }
}
