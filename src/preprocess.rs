use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;

use crate::config::{FrameAnalysisConfig, ThresholdMode};

/// Square region of interest, computed once per session from the first
/// frame's post-rotation dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropMeasurements {
    pub size: u32,
    pub top: u32,
    pub left: u32,
}

/// Normalized tensor for the classifier plus the binarized preview it was
/// derived from. The two always travel together: the preview is the audit
/// artifact for exactly the values the model saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// Row-major pixel values in [0, 1].
    pub values: Vec<f32>,
    pub preview: GrayImage,
}

/// Geometric cropping, binarization, and resampling into the fixed tensor
/// size the classifier expects.
pub struct ImagePreprocessor {
    target_width: u32,
    target_height: u32,
    window_size: u32,
    percentage: u32,
    threshold_mode: ThresholdMode,
}

impl ImagePreprocessor {
    pub fn new(config: &FrameAnalysisConfig) -> Self {
        Self {
            target_width: config.model_input_width,
            target_height: config.model_input_height,
            window_size: config.adaptive_window_size,
            percentage: config.adaptive_percentage,
            threshold_mode: config.threshold_mode,
        }
    }

    /// Centered square crop: `size = floor(min(w, h) * mask_size)`.
    pub fn calculate_crop_measurements(
        frame_width: u32,
        frame_height: u32,
        mask_size: f32,
    ) -> CropMeasurements {
        let size = (frame_width.min(frame_height) as f32 * mask_size) as u32;
        CropMeasurements {
            size,
            left: (frame_width - size) / 2,
            top: (frame_height - size) / 2,
        }
    }

    pub fn crop(image: &GrayImage, measurements: &CropMeasurements) -> GrayImage {
        imageops::crop_imm(
            image,
            measurements.left,
            measurements.top,
            measurements.size,
            measurements.size,
        )
        .to_image()
    }

    /// Turn a cropped frame into the classifier's input tensor.
    ///
    /// The crop is first upscaled to 4x the target size so binarization sees
    /// enough stroke detail, binarized, then downscaled with smoothing for
    /// soft anti-aliased edges, and finally normalized to [0, 1].
    pub fn pre_process_for_model(&self, cropped: &GrayImage) -> ModelInput {
        let intermediate_width = self.target_width * 4;
        let intermediate_height = self.target_height * 4;

        let intermediate = imageops::resize(
            cropped,
            intermediate_width,
            intermediate_height,
            FilterType::Triangle,
        );

        let binarized = match self.threshold_mode {
            ThresholdMode::Adaptive => apply_adaptive_threshold(
                intermediate.as_raw(),
                intermediate_width,
                intermediate_height,
                self.window_size,
                self.percentage,
            ),
            ThresholdMode::Otsu => apply_otsu_threshold(intermediate.as_raw()),
        };

        let binarized_image =
            GrayImage::from_raw(intermediate_width, intermediate_height, binarized)
                .unwrap_or_else(|| GrayImage::new(intermediate_width, intermediate_height));

        let final_image = imageops::resize(
            &binarized_image,
            self.target_width,
            self.target_height,
            FilterType::Triangle,
        );

        let values = final_image
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();

        ModelInput {
            width: self.target_width,
            height: self.target_height,
            values,
            preview: final_image,
        }
    }
}

/// Bradley-Roth adaptive threshold.
///
/// A summed-area table gives each pixel its local mean over a square window
/// in O(1); the pixel becomes ink (255) when it sits more than `percentage`%
/// below that mean, otherwise background (0). Ink is bright in the output,
/// matching the white-on-black format digit classifiers are trained on.
pub fn apply_adaptive_threshold(
    pixels: &[u8],
    width: u32,
    height: u32,
    window_size: u32,
    percentage: u32,
) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || pixels.len() < w * h {
        return vec![];
    }

    let integral = integral_image(pixels, w, h);

    let half = (window_size / 2) as usize;
    let mut output = vec![0u8; w * h];

    output
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, out_row)| {
            let y1 = y.saturating_sub(half);
            let y2 = (y + half).min(h - 1);

            for (x, out) in out_row.iter_mut().enumerate() {
                let x1 = x.saturating_sub(half);
                let x2 = (x + half).min(w - 1);

                let count = ((x2 - x1 + 1) * (y2 - y1 + 1)) as u64;
                let sum = window_sum(&integral, w, x1, y1, x2, y2);

                let pixel = u64::from(pixels[y * w + x]);
                if pixel * 100 < sum * 100u64.saturating_sub(u64::from(percentage)) / count {
                    *out = 255;
                }
            }
        });

    output
}

// integral[y * w + x] = sum of pixels in the rectangle (0,0)..=(x,y)
fn integral_image(pixels: &[u8], w: usize, h: usize) -> Vec<u64> {
    let mut integral = vec![0u64; w * h];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += u64::from(pixels[y * w + x]);
            integral[y * w + x] = row_sum + if y > 0 { integral[(y - 1) * w + x] } else { 0 };
        }
    }
    integral
}

fn window_sum(integral: &[u64], w: usize, x1: usize, y1: usize, x2: usize, y2: usize) -> u64 {
    let bottom_right = integral[y2 * w + x2];
    let left = if x1 > 0 { integral[y2 * w + x1 - 1] } else { 0 };
    let top = if y1 > 0 { integral[(y1 - 1) * w + x2] } else { 0 };
    let top_left = if x1 > 0 && y1 > 0 {
        integral[(y1 - 1) * w + x1 - 1]
    } else {
        0
    };
    (bottom_right + top_left) - (left + top)
}

/// Global-threshold fallback: Otsu's method over the 256-bin luminance
/// histogram, same ink-is-bright output convention as the adaptive path.
pub fn apply_otsu_threshold(pixels: &[u8]) -> Vec<u8> {
    let threshold = otsu_level(pixels);
    pixels
        .iter()
        .map(|&v| if v < threshold { 255 } else { 0 })
        .collect()
}

/// Threshold maximizing inter-class variance between foreground and
/// background.
fn otsu_level(pixels: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &v in pixels {
        histogram[v as usize] += 1;
    }

    let total = pixels.len() as u64;
    if total == 0 {
        return 0;
    }

    let weighted_total: u64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &count)| v as u64 * count)
        .sum();

    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;
    let mut background_count = 0u64;
    let mut background_sum = 0u64;

    for threshold in 0..256usize {
        background_count += histogram[threshold];
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }

        background_sum += threshold as u64 * histogram[threshold];
        let background_mean = background_sum as f64 / background_count as f64;
        let foreground_mean = (weighted_total - background_sum) as f64 / foreground_count as f64;

        let mean_diff = background_mean - foreground_mean;
        let variance =
            background_count as f64 * foreground_count as f64 * mean_diff * mean_diff;

        if variance > best_variance {
            best_variance = variance;
            best_threshold = threshold as u8;
        }
    }

    // Pixels at or below the level are background-class in Otsu's split;
    // ink starts strictly above it.
    best_threshold.saturating_add(1)
}
