use std::io::Cursor;

use image::{GrayImage, ImageOutputFormat};
use log::{info, warn};

use crate::classifier::DigitClassifier;
use crate::preprocess::ImagePreprocessor;

/// A classified frame: the digit, the model's confidence, and the binarized
/// image the prediction was made from (kept for user feedback and audit).
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub digit: usize,
    pub confidence: f32,
    pub frame: GrayImage,
}

impl PredictionResult {
    /// PNG-encode the audit frame. Empty on encoder failure.
    pub fn frame_png(&self) -> Vec<u8> {
        self.encode(ImageOutputFormat::Png)
    }

    /// JPEG-encode the audit frame. Empty on encoder failure.
    pub fn frame_jpeg(&self, quality: u8) -> Vec<u8> {
        self.encode(ImageOutputFormat::Jpeg(quality))
    }

    fn encode(&self, format: ImageOutputFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        if let Err(e) = self.frame.write_to(&mut buffer, format) {
            warn!("failed to encode prediction frame: {}", e);
            return vec![];
        }
        buffer.into_inner()
    }
}

/// Thin adapter between the pipeline and the external model: preprocesses one
/// cropped frame into a tensor and maps the model's answer into a typed
/// result.
pub struct InferenceRunner {
    preprocessor: ImagePreprocessor,
    classifier: Box<dyn DigitClassifier>,
}

impl InferenceRunner {
    pub fn new(preprocessor: ImagePreprocessor, classifier: Box<dyn DigitClassifier>) -> Self {
        Self {
            preprocessor,
            classifier,
        }
    }

    /// `None` means the model had no confident answer; that is not an error.
    pub fn run(&self, frame: &GrayImage) -> Option<PredictionResult> {
        let input = self.preprocessor.pre_process_for_model(frame);
        let prediction = self.classifier.predict(&input)?;

        Some(PredictionResult {
            digit: prediction.class_index,
            confidence: prediction.confidence,
            frame: input.preview,
        })
    }

    pub fn close(&mut self) {
        info!("🗑️ InferenceRunner: releasing classifier");
        self.classifier.close();
    }
}
