use image::imageops;

use crate::error::ScanError;
use crate::frame::{ProcessedFrame, RawFrame};
use crate::preprocess::{CropMeasurements, ImagePreprocessor};

/// Per-frame normalization: sensor-to-display rotation plus the session's
/// cached center crop.
pub struct FramePipeline {
    mask_size: f32,
    crop_measurements: Option<CropMeasurements>,
}

impl FramePipeline {
    pub fn new(mask_size: f32) -> Self {
        Self {
            mask_size,
            crop_measurements: None,
        }
    }

    /// Rotate 90 degrees, crop to the cached measurements, and extract the
    /// crop's flattened bytes. Measurements are computed from the first
    /// frame's post-rotation dimensions and reused for the whole session.
    pub fn process(&mut self, frame: &RawFrame) -> Result<ProcessedFrame, ScanError> {
        let gray = frame.to_gray()?;
        let rotated = imageops::rotate90(&gray);

        let mask_size = self.mask_size;
        let measurements = *self.crop_measurements.get_or_insert_with(|| {
            ImagePreprocessor::calculate_crop_measurements(
                rotated.width(),
                rotated.height(),
                mask_size,
            )
        });

        let cropped = ImagePreprocessor::crop(&rotated, &measurements);
        Ok(ProcessedFrame::new(cropped))
    }

    /// Required after an orientation or resolution change.
    pub fn reset(&mut self) {
        self.crop_measurements = None;
    }
}
