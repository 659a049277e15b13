use serde::Serialize;

use crate::shared::emotion::Emotion;

/// One cell of the confusion tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionEntry {
    pub predicted: Emotion,
    pub actual: Emotion,
    pub count: u32,
}

/// Snapshot of the benchmark engine's accumulated measurements.
///
/// All fields are finite. Empty aggregates are reported as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkMetrics {
    pub frame_count: usize,
    pub avg_processing_ms: f64,
    pub std_dev_processing_ms: f64,
    pub avg_detection_ms: f64,
    pub current_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub avg_memory_mb: f64,
    pub std_dev_memory_mb: f64,
    /// Process CPU time over wall time for the last evaluation. May exceed
    /// 1.0 when several threads are busy.
    pub cpu_utilization: f64,
    /// Percentage of labelled predictions that matched, 0 when none.
    pub accuracy: f64,
    pub total_predictions: u32,
    pub correct_predictions: u32,
    pub confusion: Vec<ConfusionEntry>,
}

impl BenchmarkMetrics {
    /// Human-readable multi-line summary.
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Frames evaluated: {}", self.frame_count),
            format!(
                "Processing time: {:.2} ms avg, {:.2} ms std dev",
                self.avg_processing_ms, self.std_dev_processing_ms
            ),
            format!("Detection time: {:.2} ms avg", self.avg_detection_ms),
            format!(
                "Memory: {:.1} MB current, {:.1} MB peak, {:.1} MB avg, {:.1} MB std dev",
                self.current_memory_mb,
                self.peak_memory_mb,
                self.avg_memory_mb,
                self.std_dev_memory_mb
            ),
            format!("CPU utilization: {:.1}%", self.cpu_utilization * 100.0),
            format!(
                "Accuracy: {:.1}% ({}/{})",
                self.accuracy, self.correct_predictions, self.total_predictions
            ),
        ];

        if !self.confusion.is_empty() {
            lines.push("Confusion (predicted -> actual):".to_string());
            lines.extend(
                self.confusion
                    .iter()
                    .map(|e| format!("  {} -> {}: {}", e.predicted, e.actual, e.count)),
            );
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_zero() {
        let m = BenchmarkMetrics::default();
        assert_eq!(m.frame_count, 0);
        assert_eq!(m.accuracy, 0.0);
        assert!(m.confusion.is_empty());
    }

    #[test]
    fn test_report_contains_key_figures() {
        let m = BenchmarkMetrics {
            frame_count: 3,
            avg_processing_ms: 12.5,
            accuracy: 66.666,
            total_predictions: 3,
            correct_predictions: 2,
            cpu_utilization: 1.5,
            confusion: vec![ConfusionEntry {
                predicted: Emotion::Happy,
                actual: Emotion::Sad,
                count: 1,
            }],
            ..Default::default()
        };
        let report = m.report();
        assert!(report.contains("Frames evaluated: 3"));
        assert!(report.contains("12.50 ms avg"));
        assert!(report.contains("Accuracy: 66.7% (2/3)"));
        assert!(report.contains("CPU utilization: 150.0%"));
        assert!(report.contains("happy -> sad: 1"));
    }

    #[test]
    fn test_report_omits_empty_confusion() {
        let report = BenchmarkMetrics::default().report();
        assert!(!report.contains("Confusion"));
        assert_eq!(report.lines().count(), 6);
        assert!(report.ends_with('\n'));
    }

    #[test]
    fn test_serializes_to_json() {
        let m = BenchmarkMetrics {
            frame_count: 1,
            confusion: vec![ConfusionEntry {
                predicted: Emotion::Fear,
                actual: Emotion::Fear,
                count: 4,
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["frame_count"], 1);
        assert_eq!(value["confusion"][0]["predicted"], "fear");
        assert_eq!(value["confusion"][0]["count"], 4);
    }
}
