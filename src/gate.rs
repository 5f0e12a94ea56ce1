use crate::histogram::HistogramAnalyzer;

/// Single boolean decision over a cropped frame: is it part of a stable
/// sequence worth evaluating?
pub struct FrameGate {
    analyzer: HistogramAnalyzer,
}

impl FrameGate {
    pub fn new(analyzer: HistogramAnalyzer) -> Self {
        Self { analyzer }
    }

    /// True when the frame is close to its predecessor AND the whole recent
    /// window agrees. Either check failing short-circuits to false; the
    /// histogram is recorded in the window and baseline regardless.
    pub fn should_process(&mut self, cropped_bytes: &[u8]) -> bool {
        let histogram = self.analyzer.generate_histogram(cropped_bytes);

        self.analyzer.add_to_stability_buffer(histogram.clone());

        if !self.analyzer.is_significant_change(&histogram) {
            return false;
        }

        self.analyzer.is_stable()
    }

    pub fn reset(&mut self) {
        self.analyzer.reset();
    }
}
