//! Frame gating and preprocessing core for live handwritten-digit
//! recognition.
//!
//! Decides in real time when a camera scene is steady enough to be worth
//! classifying, and turns the winning frame into the normalized tensor the
//! digit model expects:
//! 1. Rate limiting - analysis runs at a fixed cadence, not the camera's
//! 2. Histogram gating - chi-square change detection plus a windowed
//!    stability vote
//! 3. Preprocessing - center crop, adaptive binarization, resample to the
//!    model input size
//! 4. A wall-clock state machine - observe, wait for stability, infer,
//!    cool down, observe again

pub mod classifier;
pub mod config;
pub mod error;
pub mod frame;
pub mod gate;
pub mod histogram;
pub mod inference;
pub mod pipeline;
pub mod preprocess;
pub mod processor;
pub mod rate_limiter;
pub mod worker;

pub use classifier::{DigitClassifier, MockDigitClassifier, ModelPrediction};
pub use config::{FrameAnalysisConfig, ThresholdMode};
pub use error::ScanError;
pub use frame::{ProcessedFrame, RawFrame};
pub use gate::FrameGate;
pub use histogram::{Histogram, HistogramAnalyzer};
pub use inference::{InferenceRunner, PredictionResult};
pub use pipeline::FramePipeline;
pub use preprocess::{CropMeasurements, ImagePreprocessor, ModelInput};
pub use processor::{FrameProcessor, ProcessorState, ScanStats};
pub use rate_limiter::FrameRateLimiter;
pub use worker::{ScanEvent, ScanWorker};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("inkscan"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // logging handled by android_logger on Android
        // hosts wire their own logger implementation
    }
}
