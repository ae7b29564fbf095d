use tracing::warn;

use crate::data::batch::{Batch, DataSource};
use crate::error::{BatchError, EpochExhausted, Split};
use crate::loss::cross_entropy::{CrossEntropyLoss, LossOutput};
use crate::metrics::classification::ConfusionMatrix;
use crate::metrics::meter::AverageMeter;
use crate::network::model::{Gradients, Model};
use crate::optim::clip::{clip_grad_norm, global_norm};
use crate::optim::optimizer::Optimizer;

// ---------------------------------------------------------------------------
// Pass results
// ---------------------------------------------------------------------------

/// Aggregate statistics of one pass over a data source.
#[derive(Debug, Clone)]
pub struct PassStats {
    /// Sample-weighted mean loss over the valid batches.
    pub loss: f64,
    /// Fraction of correctly classified samples in [0, 1].
    pub accuracy: f64,
    pub samples: usize,
    pub valid_batches: usize,
    pub skipped_batches: usize,
}

/// Everything a training pass hands back to the controller.
#[derive(Debug, Clone)]
pub struct TrainPass {
    pub stats: PassStats,
    /// Gradients of the last applied batch, for histogram logging.
    pub last_gradients: Option<Gradients>,
}

#[derive(Default)]
struct Accumulator {
    loss: AverageMeter,
    correct: usize,
    valid: usize,
    skipped: usize,
}

impl Accumulator {
    fn record(&mut self, batch: &Batch, out: &LossOutput) {
        self.loss.update(out.loss, batch.len());
        self.correct += out
            .predictions
            .iter()
            .zip(&batch.labels)
            .filter(|(p, l)| p == l)
            .count();
        self.valid += 1;
    }

    fn finish(self, epoch: usize, split: Split) -> Result<PassStats, EpochExhausted> {
        if self.valid == 0 {
            return Err(EpochExhausted { epoch, split, skipped: self.skipped });
        }
        let samples = self.loss.count;
        Ok(PassStats {
            loss: self.loss.avg,
            accuracy: if samples == 0 { 0.0 } else { self.correct as f64 / samples as f64 },
            samples,
            valid_batches: self.valid,
            skipped_batches: self.skipped,
        })
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// One full pass of mini-batch updates over `data`.
///
/// A batch that fails (non-finite loss or gradient, shape or label errors)
/// is logged and skipped without touching the parameters. The pass fails
/// only if no batch at all could be used.
pub fn train_epoch(
    model: &mut dyn Model,
    data: &mut dyn DataSource,
    loss_fn: &CrossEntropyLoss,
    optimizer: &mut dyn Optimizer,
    clip_norm: Option<f64>,
    epoch: usize,
) -> Result<TrainPass, EpochExhausted> {
    model.set_training(true);
    let mut acc = Accumulator::default();
    let mut last_gradients = None;

    for (index, batch) in data.batches().enumerate() {
        match train_step(model, &batch, loss_fn, optimizer, clip_norm) {
            Ok((out, grads)) => {
                acc.record(&batch, &out);
                last_gradients = Some(grads);
            }
            Err(err) => {
                acc.skipped += 1;
                warn!(epoch, batch = index, split = %Split::Train, error = %err, "skipping batch");
            }
        }
    }

    let stats = acc.finish(epoch, Split::Train)?;
    Ok(TrainPass { stats, last_gradients })
}

/// Inference-only pass; parameters are never modified. When `confusion` is
/// given every valid prediction is recorded into it.
pub fn evaluate(
    model: &mut dyn Model,
    data: &mut dyn DataSource,
    loss_fn: &CrossEntropyLoss,
    split: Split,
    epoch: usize,
    mut confusion: Option<&mut ConfusionMatrix>,
) -> Result<PassStats, EpochExhausted> {
    model.set_training(false);
    let mut acc = Accumulator::default();

    for (index, batch) in data.batches().enumerate() {
        match eval_step(model, &batch, loss_fn) {
            Ok(out) => {
                acc.record(&batch, &out);
                if let Some(cm) = confusion.as_deref_mut() {
                    cm.record_all(&out.predictions, &batch.labels);
                }
            }
            Err(err) => {
                acc.skipped += 1;
                warn!(epoch, batch = index, split = %split, error = %err, "skipping batch");
            }
        }
    }

    acc.finish(epoch, split)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn forward_loss(model: &mut dyn Model, batch: &Batch, loss_fn: &CrossEntropyLoss) -> Result<LossOutput, BatchError> {
    if batch.is_empty() {
        return Err(BatchError::Empty);
    }
    if batch.inputs.rows != batch.len() || batch.inputs.data.len() != batch.len() {
        return Err(BatchError::ShapeMismatch {
            expected: format!("{} input rows", batch.len()),
            found: format!("{} input rows ({} stored)", batch.inputs.rows, batch.inputs.data.len()),
        });
    }
    let ragged = batch.inputs.data.iter().map(Vec::len).enumerate().find(|&(_, w)| w != batch.inputs.cols);
    if let Some((row, width)) = ragged {
        return Err(BatchError::ShapeMismatch {
            expected: format!("{} features in every row", batch.inputs.cols),
            found: format!("{width} features in row {row}"),
        });
    }
    let logits = model.forward(&batch.inputs)?;
    let out = loss_fn.forward(&logits, &batch.labels)?;
    if !out.loss.is_finite() {
        return Err(BatchError::NonFiniteLoss(out.loss));
    }
    Ok(out)
}

fn eval_step(model: &mut dyn Model, batch: &Batch, loss_fn: &CrossEntropyLoss) -> Result<LossOutput, BatchError> {
    forward_loss(model, batch, loss_fn)
}

/// Forward, backward, optional clipping, update. Every check happens before
/// the optimizer runs, so a failed batch leaves the parameters untouched.
fn train_step(
    model: &mut dyn Model,
    batch: &Batch,
    loss_fn: &CrossEntropyLoss,
    optimizer: &mut dyn Optimizer,
    clip_norm: Option<f64>,
) -> Result<(LossOutput, Gradients), BatchError> {
    let out = forward_loss(model, batch, loss_fn)?;
    let mut grads = model.backward(&out.grad_logits)?;

    match clip_norm {
        Some(max_norm) => {
            clip_grad_norm(&mut grads, max_norm)?;
        }
        None => {
            let norm = global_norm(&grads);
            if !norm.is_finite() {
                return Err(BatchError::NonFiniteGradient(norm));
            }
        }
    }

    optimizer.step(model.parameters_mut(), &grads);
    Ok((out, grads))
}
