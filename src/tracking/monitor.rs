use std::collections::BTreeMap;

use crate::detect::Detection;

/// Per-class presence counters for auxiliary classes during a session.
///
/// Each class counts at most once per frame. There is no hysteresis here;
/// every tracking frame is observed.
#[derive(Clone, Debug, Default)]
pub struct SecondaryClassMonitor {
    min_confidence: f32,
    counts: BTreeMap<String, u64>,
    total_frames: u64,
}

impl SecondaryClassMonitor {
    pub fn new<I, S>(classes: I, min_confidence: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            min_confidence,
            counts: classes.into_iter().map(|c| (c.into(), 0)).collect(),
            total_frames: 0,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn count(&self, class: &str) -> u64 {
        self.counts.get(class).copied().unwrap_or(0)
    }

    /// Record one active frame.
    pub fn observe(&mut self, detections: &[Detection]) {
        self.total_frames += 1;
        let min_confidence = self.min_confidence;
        for (class, count) in self.counts.iter_mut() {
            if detections.iter().any(|d| d.matches(class, min_confidence)) {
                *count += 1;
            }
        }
    }

    /// Share of observed frames containing `class`, 0..=100.
    pub fn percent(&self, class: &str) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.count(class) as f64 / self.total_frames as f64 * 100.0
    }

    pub fn percentages(&self) -> BTreeMap<String, f64> {
        self.counts
            .keys()
            .map(|class| (class.clone(), self.percent(class)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.total_frames = 0;
        for count in self.counts.values_mut() {
            *count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(0.1, 0.1, 0.2, 0.2))
    }

    #[test]
    fn counts_each_class_once_per_frame() {
        let mut monitor = SecondaryClassMonitor::new(["person", "dog"], 0.4);
        monitor.observe(&[det("dog", 0.9), det("dog", 0.8), det("cat", 0.9)]);
        monitor.observe(&[det("person", 0.5)]);
        monitor.observe(&[det("person", 0.3)]);
        monitor.observe(&[]);

        assert_eq!(monitor.total_frames(), 4);
        assert_eq!(monitor.count("dog"), 1);
        assert_eq!(monitor.count("person"), 1);
        assert_eq!(monitor.percent("dog"), 25.0);
        assert_eq!(monitor.percent("cat"), 0.0);
    }

    #[test]
    fn no_frames_means_zero_percent() {
        let monitor = SecondaryClassMonitor::new(["dog"], 0.4);
        assert_eq!(monitor.percent("dog"), 0.0);
    }

    #[test]
    fn reset_zeroes_counters_and_keeps_classes() {
        let mut monitor = SecondaryClassMonitor::new(["dog"], 0.4);
        monitor.observe(&[det("dog", 0.9)]);
        monitor.reset();
        assert_eq!(monitor.total_frames(), 0);
        assert_eq!(monitor.count("dog"), 0);
        assert_eq!(monitor.classes().collect::<Vec<_>>(), vec!["dog"]);
    }
}
