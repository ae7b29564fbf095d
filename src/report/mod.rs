//! End-of-run reports written for people and external tooling; never read
//! back by the trainer.

pub mod plot;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::metrics::classification::{classification_report, ConfusionMatrix};
use crate::train::epoch_stats::TrainingHistory;

pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.png";
pub const CLASSIFICATION_REPORT_FILE: &str = "classification_report.txt";
pub const TRAINING_HISTORY_FILE: &str = "training_history.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPaths {
    pub confusion_matrix: PathBuf,
    pub classification_report: PathBuf,
    pub training_history: PathBuf,
}

/// Result of [`write_reports`]: where the files went, plus the encoded
/// plots so they can be forwarded without reading the files back.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub paths: ReportPaths,
    pub confusion_matrix_png: Vec<u8>,
    pub training_history_png: Vec<u8>,
}

/// Writes the confusion-matrix heatmap, the text report and the history
/// plot into `dir` (created if needed). Each file is written atomically.
pub fn write_reports(
    dir: &Path,
    history: &TrainingHistory,
    confusion: &ConfusionMatrix,
    class_names: &[String],
) -> Result<WrittenReports, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io { path: dir.to_path_buf(), source })?;

    let paths = ReportPaths {
        confusion_matrix: dir.join(CONFUSION_MATRIX_FILE),
        classification_report: dir.join(CLASSIFICATION_REPORT_FILE),
        training_history: dir.join(TRAINING_HISTORY_FILE),
    };

    let confusion_matrix_png = plot::confusion_matrix_png(confusion)?;
    let training_history_png = plot::training_history_png(history)?;

    write_atomic(&paths.confusion_matrix, &confusion_matrix_png)?;
    write_atomic(
        &paths.classification_report,
        classification_report(confusion, class_names).as_bytes(),
    )?;
    write_atomic(&paths.training_history, &training_history_png)?;

    Ok(WrittenReports { paths, confusion_matrix_png, training_history_png })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| ReportError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| ReportError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::epoch_stats::EpochResult;

    #[test]
    fn writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new();
        for epoch in 1..=3 {
            history.push(EpochResult {
                epoch,
                train_loss: 1.0 / epoch as f64,
                train_accuracy: 0.5 + 0.1 * epoch as f64,
                val_loss: 1.1 / epoch as f64,
                val_accuracy: 0.45 + 0.1 * epoch as f64,
                learning_rate: 0.001,
                skipped_batches: 0,
                elapsed_ms: 10,
            });
        }
        let cm = ConfusionMatrix::from_predictions(2, &[0, 1, 1], &[0, 1, 0]);
        let names = vec!["cat".to_string(), "dog".to_string()];

        let written = write_reports(&dir.path().join("reports"), &history, &cm, &names).unwrap();
        let paths = written.paths;
        assert!(paths.confusion_matrix.is_file());
        assert!(paths.training_history.is_file());
        let text = std::fs::read_to_string(&paths.classification_report).unwrap();
        assert!(text.contains("cat"));
        assert!(text.contains("dog"));
    }
}
