use std::collections::VecDeque;

use crate::config::FrameAnalysisConfig;

const EPSILON: f64 = 1e-10;

/// Luminance distribution of one frame. Two histograms are only comparable
/// when they carry the same number of bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Histogram {
    /// Bucket a luminance buffer into `bins` counts over the 0-255 range.
    pub fn from_luma(data: &[u8], bins: usize) -> Self {
        let bins = bins.max(1);
        let bin_size = (256 / bins).max(1);
        let mut counts = vec![0u32; bins];

        for &value in data {
            let index = (value as usize / bin_size).min(bins - 1);
            counts[index] += 1;
        }

        Self { counts }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    #[cfg(test)]
    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }
}

/// Detects scene change and scene stability from successive luminance
/// histograms.
///
/// Owned by the single processing worker; `&mut self` receivers serialize all
/// access to the previous-histogram baseline, so overlapping calls cannot
/// corrupt it.
pub struct HistogramAnalyzer {
    bins: usize,
    difference_threshold: f64,
    stability_threshold: f64,
    stability_window_size: usize,
    previous: Option<Histogram>,
    stability_window: VecDeque<Histogram>,
}

impl HistogramAnalyzer {
    pub fn new(config: &FrameAnalysisConfig) -> Self {
        Self {
            bins: config.histogram_bins,
            difference_threshold: config.difference_threshold,
            stability_threshold: config.stability_threshold,
            stability_window_size: config.stability_window_size.max(2),
            previous: None,
            stability_window: VecDeque::with_capacity(config.stability_window_size),
        }
    }

    pub fn generate_histogram(&self, data: &[u8]) -> Histogram {
        Histogram::from_luma(data, self.bins)
    }

    /// True when the frame is CLOSE to its immediate predecessor (distance
    /// below the difference threshold). The first call has no baseline and
    /// reports maximal distance, so it is never a match. Always replaces the
    /// baseline with `histogram`.
    pub fn is_significant_change(&mut self, histogram: &Histogram) -> bool {
        let distance = self.change_distance(histogram);
        distance < self.difference_threshold
    }

    // Chi-square-style distance against the stored baseline.
    fn change_distance(&mut self, histogram: &Histogram) -> f64 {
        let distance = match &self.previous {
            None => f64::INFINITY,
            Some(previous) => {
                debug_assert_eq!(previous.bins(), histogram.bins());
                previous
                    .counts()
                    .iter()
                    .zip(histogram.counts())
                    .map(|(&b, &a)| {
                        let diff = f64::from(a) - f64::from(b);
                        diff * diff / (f64::from(a) + f64::from(b) + EPSILON)
                    })
                    .sum()
            }
        };
        self.previous = Some(histogram.clone());
        distance
    }

    pub fn add_to_stability_buffer(&mut self, histogram: Histogram) {
        if self.stability_window.len() >= self.stability_window_size {
            self.stability_window.pop_front();
        }
        self.stability_window.push_back(histogram);
    }

    /// True only when the window is at capacity and every consecutive pair of
    /// histograms is within the stability threshold. One volatile pair fails
    /// the whole window.
    pub fn is_stable(&self) -> bool {
        if self.stability_window.len() < self.stability_window_size {
            return false;
        }

        for pair in self
            .stability_window
            .iter()
            .zip(self.stability_window.iter().skip(1))
        {
            let diff = Self::normalized_difference(pair.0, pair.1);
            if diff > self.stability_threshold {
                return false;
            }
        }

        true
    }

    /// Normalized L1 distance `Σ|a-b| / Σ(a+b)`, in [0,1].
    /// Two entirely empty histograms are identical by definition.
    fn normalized_difference(left: &Histogram, right: &Histogram) -> f64 {
        debug_assert_eq!(left.bins(), right.bins());

        let mut total_diff = 0u64;
        let mut total_count = 0u64;

        for (&a, &b) in left.counts().iter().zip(right.counts()) {
            total_diff += u64::from(a.abs_diff(b));
            total_count += u64::from(a) + u64::from(b);
        }

        if total_count > 0 {
            total_diff as f64 / total_count as f64
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.stability_window.clear();
    }
}
