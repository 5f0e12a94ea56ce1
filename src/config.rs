use serde::Deserialize;

use crate::error::ScanError;

/// Binarization strategy for model preprocessing.
///
/// `Adaptive` (Bradley-Roth local mean) handles uneven lighting and is the
/// default. `Otsu` picks one global threshold from the luminance histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    Adaptive,
    Otsu,
}

/// Tuning knobs for the frame analysis pipeline.
///
/// All values are externally supplied; defaults match the shipped scanner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameAnalysisConfig {
    /// Maximum number of frames processed per second.
    /// Balances responsiveness with computational cost.
    pub target_fps: u32,

    /// Relative size of the center crop area (fraction of the shorter frame
    /// dimension). Focuses analysis on the region where digits are expected.
    pub mask_size: f32,

    /// Number of consecutive frames required for stability analysis.
    /// Reducing this makes the initial stability check faster.
    pub stability_window_size: usize,

    /// Maximum allowed normalized histogram variation between consecutive
    /// frames. 0.10 rather than 0.05 to be less sensitive to minor camera
    /// shake.
    pub stability_threshold: f64,

    /// Threshold for the chi-square-style histogram distance
    /// `Σ[(a-b)²/(a+b+ε)]`. Distances BELOW this mean "minimal scene change".
    pub difference_threshold: f64,

    /// Time in milliseconds the scene must remain stable before a prediction
    /// is attempted.
    pub stability_duration_ms: u64,

    /// Time in milliseconds a prediction stays on screen before a new capture
    /// is allowed. Gives the user time to read the result.
    pub prediction_display_duration_ms: u64,

    /// Number of luminance histogram bins (over 0-255).
    pub histogram_bins: usize,

    /// Side length of the local-mean window for adaptive thresholding.
    pub adaptive_window_size: u32,

    /// A pixel is ink when it is more than this percentage below its local
    /// mean luminance.
    pub adaptive_percentage: u32,

    pub threshold_mode: ThresholdMode,

    /// Model input width and height in pixels.
    pub model_input_width: u32,
    pub model_input_height: u32,
}

impl Default for FrameAnalysisConfig {
    fn default() -> Self {
        Self {
            target_fps: 5,
            mask_size: 0.4,
            stability_window_size: 5,
            stability_threshold: 0.10,
            difference_threshold: 8000.0,
            stability_duration_ms: 800,
            prediction_display_duration_ms: 3000,
            histogram_bins: 64,
            adaptive_window_size: 15,
            adaptive_percentage: 12,
            threshold_mode: ThresholdMode::Adaptive,
            model_input_width: 28,
            model_input_height: 28,
        }
    }
}

impl FrameAnalysisConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FrameAnalysisConfig::default();
        assert_eq!(config.target_fps, 5);
        assert_eq!(config.stability_window_size, 5);
        assert_eq!(config.histogram_bins, 64);
        assert_eq!(config.threshold_mode, ThresholdMode::Adaptive);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            FrameAnalysisConfig::from_json(r#"{"target_fps": 10, "threshold_mode": "otsu"}"#)
                .unwrap();
        assert_eq!(config.target_fps, 10);
        assert_eq!(config.threshold_mode, ThresholdMode::Otsu);
        assert_eq!(config.stability_window_size, 5);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(FrameAnalysisConfig::from_json("not json").is_err());
    }
}
