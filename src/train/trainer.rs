use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::data::batch::DataSource;
use crate::error::{ConfigError, EpochExhausted, Split, TrainError};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::metrics::classification::ConfusionMatrix;
use crate::network::model::{Gradients, Model};
use crate::optim::factory::{make_optimizer, make_scheduler};
use crate::report::{write_reports, ReportPaths};
use crate::tracking::{flatten_params, Tracker};
use crate::train::early_stopping::EarlyStopping;
use crate::train::epoch_stats::{EpochResult, TrainingHistory};
use crate::train::loop_fn::{evaluate, train_epoch, PassStats};
use crate::train::train_config::TrainingConfig;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why the epoch loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Ran all `max_epochs`.
    Completed,
    /// Early stopping fired after `epoch`.
    EarlyStopped { epoch: usize },
    /// The stop flag was raised; `epoch` is the last completed one.
    Interrupted { epoch: usize },
    /// An epoch pass produced no valid batches.
    Aborted(EpochExhausted),
}

/// Held-out test metrics of the restored best checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvaluation {
    /// Epoch of the checkpoint that was evaluated.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

impl TestEvaluation {
    fn new(epoch: usize, stats: &PassStats, confusion: ConfusionMatrix) -> Self {
        let macro_avg = confusion.metrics();
        TestEvaluation {
            epoch,
            loss: stats.loss,
            accuracy: stats.accuracy,
            precision: macro_avg.precision,
            recall: macro_avg.recall,
            f1: macro_avg.f1,
            confusion,
        }
    }

    pub fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("test_loss".to_string(), self.loss),
            ("test_accuracy".to_string(), self.accuracy),
            ("test_precision".to_string(), self.precision),
            ("test_recall".to_string(), self.recall),
            ("test_f1".to_string(), self.f1),
        ])
    }
}

/// Everything a run produced. Returned even when the run was aborted.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub history: TrainingHistory,
    pub best: Option<Checkpoint>,
    pub stop_reason: StopReason,
    pub test: Option<TestEvaluation>,
    pub reports: Option<ReportPaths>,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives the epoch loop for one run.
///
/// The tracker is borrowed for the whole run and finished when the run
/// ends. Optional hooks: a progress channel that receives every
/// [`EpochResult`] (a dropped receiver only stops the streaming) and a stop
/// flag checked between epochs.
pub struct Trainer<'a> {
    config: &'a TrainingConfig,
    tracker: &'a mut Tracker,
    progress_tx: Option<Sender<EpochResult>>,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a TrainingConfig, tracker: &'a mut Tracker) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Trainer { config, tracker, progress_tx: None, stop_flag: None })
    }

    pub fn with_progress(mut self, tx: Sender<EpochResult>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Trains `model` on `train`, selects the best epoch on `val`, then
    /// evaluates the best checkpoint once on `test`.
    ///
    /// Only configuration problems return `Err`. An exhausted epoch ends the
    /// loop with [`StopReason::Aborted`] and whatever was accumulated.
    pub fn run(
        mut self,
        model: &mut dyn Model,
        train: &mut dyn DataSource,
        val: &mut dyn DataSource,
        test: &mut dyn DataSource,
    ) -> Result<TrainingReport, TrainError> {
        let config = self.config;
        let mut optimizer = make_optimizer(&model.parameters(), config)?;
        let mut scheduler = make_scheduler(optimizer.as_ref(), config)?;
        let loss_fn = CrossEntropyLoss::new(config.label_smoothing);
        let mut early_stopping =
            EarlyStopping::new(config.early_stopping_patience).with_min_delta(config.early_stopping_min_delta);
        let mut store = CheckpointStore::new(config);
        let mut history = TrainingHistory::new();

        self.log_run_params(model);
        info!(
            optimizer = %config.optimizer,
            scheduler = %config.scheduler.kind,
            max_epochs = config.max_epochs,
            parameters = model.parameter_count(),
            "starting training"
        );

        let mut stop_reason = StopReason::Completed;
        for epoch in 1..=config.max_epochs {
            if self.stop_requested() {
                stop_reason = StopReason::Interrupted { epoch: epoch - 1 };
                break;
            }
            let started = Instant::now();

            // ── Train, then validate ──────────────────────────────────────
            let pass = match train_epoch(model, train, &loss_fn, optimizer.as_mut(), config.clip_grad_norm, epoch) {
                Ok(pass) => pass,
                Err(exhausted) => {
                    error!(error = %exhausted, "aborting run");
                    stop_reason = StopReason::Aborted(exhausted);
                    break;
                }
            };
            let val_stats = match evaluate(model, val, &loss_fn, Split::Validation, epoch, None) {
                Ok(stats) => stats,
                Err(exhausted) => {
                    error!(error = %exhausted, "aborting run");
                    stop_reason = StopReason::Aborted(exhausted);
                    break;
                }
            };

            if let Some(scheduler) = scheduler.as_mut() {
                scheduler.step(optimizer.as_mut(), val_stats.accuracy);
            }

            // ── Record ────────────────────────────────────────────────────
            let result = EpochResult {
                epoch,
                train_loss: pass.stats.loss,
                train_accuracy: pass.stats.accuracy,
                val_loss: val_stats.loss,
                val_accuracy: val_stats.accuracy,
                learning_rate: optimizer.learning_rate(),
                skipped_batches: pass.stats.skipped_batches,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            info!(
                epoch,
                train_loss = result.train_loss,
                train_accuracy = result.train_accuracy,
                val_loss = result.val_loss,
                val_accuracy = result.val_accuracy,
                learning_rate = result.learning_rate,
                skipped_batches = result.skipped_batches,
                "epoch complete"
            );
            self.tracker.log_metrics(&result.metrics(), epoch);
            history.push(result.clone());
            self.emit_progress(result);

            if store.consider(epoch, &*model, optimizer.as_ref(), val_stats.accuracy) {
                info!(epoch, val_accuracy = val_stats.accuracy, "new best model");
            }

            if config.histogram_every > 0 && epoch % config.histogram_every == 0 {
                self.log_histograms(&*model, pass.last_gradients.as_ref(), epoch);
            }

            if early_stopping.update(val_stats.accuracy) {
                info!(epoch, patience = early_stopping.patience(), "early stopping");
                stop_reason = StopReason::EarlyStopped { epoch };
                break;
            }
        }

        if stop_reason == StopReason::Completed && self.stop_requested() {
            stop_reason = StopReason::Interrupted { epoch: history.len() };
        }

        self.retry_unsaved_checkpoint(&store);

        let (test_eval, reports) = if matches!(stop_reason, StopReason::Aborted(_)) {
            (None, None)
        } else {
            self.evaluate_best(model, test, &loss_fn, &store, &history)
        };

        self.tracker.finish();
        info!(epochs = history.len(), stop_reason = ?stop_reason, "training finished");

        Ok(TrainingReport {
            history,
            best: store.into_best(),
            stop_reason,
            test: test_eval,
            reports,
        })
    }

    fn log_run_params(&mut self, model: &dyn Model) {
        match serde_json::to_value(self.config) {
            Ok(value) => {
                let mut params = flatten_params(&value);
                params.insert("model.parameters".into(), model.parameter_count().to_string());
                params.insert("model.num_classes".into(), model.num_classes().to_string());
                params.insert("model.architecture".into(), architecture(model));
                self.tracker.log_params(&params);
            }
            Err(err) => warn!(error = %err, "could not serialize config for tracking"),
        }
    }

    fn emit_progress(&mut self, result: EpochResult) {
        if let Some(tx) = &self.progress_tx {
            if tx.send(result).is_err() {
                debug!("progress receiver dropped, no longer streaming epochs");
                self.progress_tx = None;
            }
        }
    }

    fn log_histograms(&mut self, model: &dyn Model, gradients: Option<&Gradients>, epoch: usize) {
        for (name, tensor) in model.parameters() {
            self.tracker.log_histogram(&format!("weights/{name}"), tensor.iter(), epoch);
        }
        for (name, grad) in gradients.into_iter().flatten() {
            self.tracker.log_histogram(&format!("gradients/{name}"), grad.iter(), epoch);
        }
    }

    fn retry_unsaved_checkpoint(&mut self, store: &CheckpointStore) {
        let Some(path) = &self.config.checkpoint_path else { return };
        if store.has_unsaved_best() {
            if let Err(err) = store.persist(path) {
                warn!(path = %path.display(), error = %err, "best checkpoint could not be written");
                return;
            }
        }
        if store.best().is_some() {
            self.tracker.log_artifact(path);
        }
    }

    /// Restores the best checkpoint, evaluates it on `test`, and writes and
    /// forwards the reports. Every failure here is logged and skipped.
    fn evaluate_best(
        &mut self,
        model: &mut dyn Model,
        test: &mut dyn DataSource,
        loss_fn: &CrossEntropyLoss,
        store: &CheckpointStore,
        history: &TrainingHistory,
    ) -> (Option<TestEvaluation>, Option<ReportPaths>) {
        let Some(best) = store.best() else {
            warn!("no checkpoint was captured, skipping test evaluation");
            return (None, None);
        };
        if let Err(err) = best.restore_into(model) {
            warn!(error = %err, "could not restore best checkpoint, skipping test evaluation");
            return (None, None);
        }

        let mut confusion = ConfusionMatrix::new(model.num_classes());
        let stats = match evaluate(model, test, loss_fn, Split::Test, best.epoch, Some(&mut confusion)) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "test evaluation failed");
                return (None, None);
            }
        };
        let evaluation = TestEvaluation::new(best.epoch, &stats, confusion);
        info!(
            epoch = evaluation.epoch,
            test_loss = evaluation.loss,
            test_accuracy = evaluation.accuracy,
            test_f1 = evaluation.f1,
            "test evaluation"
        );
        self.tracker.log_metrics(&evaluation.metrics(), history.len());

        let reports = self.config.report_dir.as_ref().and_then(|dir| {
            match write_reports(dir, history, &evaluation.confusion, &self.config.class_names) {
                Ok(written) => Some(written),
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "could not write reports");
                    None
                }
            }
        });
        let paths = reports.map(|written| {
            self.tracker.log_artifact(&written.paths.confusion_matrix);
            self.tracker.log_artifact(&written.paths.classification_report);
            self.tracker.log_artifact(&written.paths.training_history);
            self.tracker.log_image("confusion_matrix", &written.confusion_matrix_png);
            self.tracker.log_image("training_history", &written.training_history_png);
            written.paths
        });

        (Some(evaluation), paths)
    }
}

/// Parameter shapes in order, e.g. `layers.0.weight=6x8, layers.0.bias=1x8`.
fn architecture(model: &dyn Model) -> String {
    model
        .parameters()
        .iter()
        .map(|(name, tensor)| format!("{name}={}x{}", tensor.rows, tensor.cols))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience wrapper: `Trainer::new(config, tracker)?.run(...)`.
pub fn run(
    model: &mut dyn Model,
    train: &mut dyn DataSource,
    val: &mut dyn DataSource,
    test: &mut dyn DataSource,
    config: &TrainingConfig,
    tracker: &mut Tracker,
) -> Result<TrainingReport, TrainError> {
    Trainer::new(config, tracker)?.run(model, train, val, test)
}
