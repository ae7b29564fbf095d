use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Fraction of positions where `predictions[i] == labels[i]`.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    correct as f64 / labels.len() as f64
}

/// Count table with true classes on rows and predicted classes on columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        ConfusionMatrix { counts: vec![vec![0; num_classes]; num_classes] }
    }

    pub fn from_predictions(num_classes: usize, predictions: &[usize], labels: &[usize]) -> Self {
        let mut cm = ConfusionMatrix::new(num_classes);
        cm.record_all(predictions, labels);
        cm
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    /// Out-of-range indices are ignored.
    pub fn record(&mut self, label: usize, prediction: usize) {
        if let Some(cell) = self.counts.get_mut(label).and_then(|row| row.get_mut(prediction)) {
            *cell += 1;
        }
    }

    pub fn record_all(&mut self, predictions: &[usize], labels: &[usize]) {
        for (&p, &l) in predictions.iter().zip(labels) {
            self.record(l, p);
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let diagonal: u64 = (0..self.num_classes()).map(|i| self.counts[i][i]).sum();
        diagonal as f64 / total as f64
    }

    /// Precision, recall, F1 and support per class; zero denominators give 0.
    pub fn class_scores(&self) -> Vec<ClassScores> {
        let n = self.num_classes();
        (0..n)
            .map(|c| {
                let tp = self.counts[c][c] as f64;
                let support: u64 = self.counts[c].iter().sum();
                let predicted: u64 = (0..n).map(|r| self.counts[r][c]).sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                let f1 = ratio(2.0 * precision * recall, precision + recall);
                ClassScores { precision, recall, f1, support }
            })
            .collect()
    }

    /// Accuracy plus macro-averaged precision, recall and F1.
    pub fn metrics(&self) -> ClassificationMetrics {
        let scores = self.class_scores();
        let n = scores.len().max(1) as f64;
        ClassificationMetrics {
            accuracy: self.accuracy(),
            precision: scores.iter().map(|s| s.precision).sum::<f64>() / n,
            recall: scores.iter().map(|s| s.recall).sum::<f64>() / n,
            f1: scores.iter().map(|s| s.f1).sum::<f64>() / n,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Macro-averaged summary of a confusion matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Renders a plain-text per-class report.
///
/// `class_names` shorter than the class count fall back to the class index.
pub fn classification_report(cm: &ConfusionMatrix, class_names: &[String]) -> String {
    let scores = cm.class_scores();
    let names: Vec<String> = (0..cm.num_classes())
        .map(|i| class_names.get(i).cloned().unwrap_or_else(|| i.to_string()))
        .collect();
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0).max("weighted avg".len());
    let total = cm.total();

    let mut out = String::new();
    let _ = writeln!(out, "Classification Report");
    let _ = writeln!(out, "{}", "=".repeat(80));
    let _ = writeln!(out);
    let _ = writeln!(out, "{:>width$} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support");
    let _ = writeln!(out);
    for (name, s) in names.iter().zip(&scores) {
        let _ = writeln!(
            out,
            "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            name, s.precision, s.recall, s.f1, s.support
        );
    }
    let _ = writeln!(out);

    let macro_avg = cm.metrics();
    let weighted = |f: fn(&ClassScores) -> f64| {
        if total == 0 {
            0.0
        } else {
            scores.iter().map(|s| f(s) * s.support as f64).sum::<f64>() / total as f64
        }
    };
    let _ = writeln!(out, "{:>width$} {:>10} {:>10} {:>10.4} {:>10}", "accuracy", "", "", macro_avg.accuracy, total);
    let _ = writeln!(
        out,
        "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
        "macro avg", macro_avg.precision, macro_avg.recall, macro_avg.f1, total
    );
    let _ = writeln!(
        out,
        "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
        "weighted avg",
        weighted(|s| s.precision),
        weighted(|s| s.recall),
        weighted(|s| s.f1),
        total
    );
    let _ = writeln!(out);
    let _ = writeln!(out);
    let _ = writeln!(out, "Overall Metrics");
    let _ = writeln!(out, "{}", "-".repeat(80));
    let _ = writeln!(out, "accuracy: {:.4}", macro_avg.accuracy);
    let _ = writeln!(out, "precision: {:.4}", macro_avg.precision);
    let _ = writeln!(out, "recall: {:.4}", macro_avg.recall);
    let _ = writeln!(out, "f1_score: {:.4}", macro_avg.f1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_one() {
        let labels = [0, 1, 2, 1, 0];
        let cm = ConfusionMatrix::from_predictions(3, &labels, &labels);
        let m = cm.metrics();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
    }

    #[test]
    fn partial_predictions() {
        let labels = [0, 0, 1, 1];
        let preds = [0, 1, 1, 1];
        assert_eq!(accuracy(&preds, &labels), 0.75);

        let cm = ConfusionMatrix::from_predictions(2, &preds, &labels);
        assert_eq!(cm.counts, vec![vec![1, 1], vec![0, 2]]);
        let scores = cm.class_scores();
        assert_eq!(scores[0].precision, 1.0);
        assert_eq!(scores[0].recall, 0.5);
        assert!((scores[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(scores[1].support, 2);
    }

    #[test]
    fn never_predicted_class_has_zero_precision() {
        let cm = ConfusionMatrix::from_predictions(3, &[0, 0], &[0, 1]);
        assert_eq!(cm.class_scores()[2].precision, 0.0);
        assert_eq!(cm.class_scores()[2].f1, 0.0);
    }

    #[test]
    fn report_lists_named_classes() {
        let cm = ConfusionMatrix::from_predictions(2, &[0, 1], &[0, 1]);
        let text = classification_report(&cm, &["cat".into(), "dog".into()]);
        assert!(text.contains("cat"));
        assert!(text.contains("dog"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("f1_score: 1.0000"));
    }
}
