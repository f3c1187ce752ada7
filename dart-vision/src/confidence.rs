/// Raw scores above this are treated as percentages.
pub const PERCENT_SCALE_CUTOFF: f64 = 1.0;

/// Maps a raw detector score onto the reporting scale.
///
/// The exported model sometimes emits percentages instead of probabilities.
/// Scores above 1.0 are divided by 100 exactly once; nothing is clamped, so a
/// raw 150 reports as 1.5.
pub fn normalize_confidence(raw: f32) -> f64 {
    let c = f64::from(raw);
    if c > PERCENT_SCALE_CUTOFF {
        c / 100.0
    } else {
        c
    }
}

/// Strict lower bound on normalized confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
    threshold: f64,
}

impl ConfidenceFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Normalizes `raw` and returns it if it clears the threshold.
    pub fn accept(&self, raw: f32) -> Option<f64> {
        let c = normalize_confidence(raw);
        (c > self.threshold).then_some(c)
    }
}
