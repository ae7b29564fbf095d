use crate::error::BatchError;
use crate::math::matrix::Matrix;

/// Softmax + categorical cross-entropy over a batch of logits, with optional
/// label smoothing.
///
/// With smoothing `ε` over `K` classes the target distribution is
/// `q = (1 - ε)·onehot(y) + ε / K`, and the combined gradient w.r.t. the
/// logits simplifies to `(softmax(z) - q) / batch`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrossEntropyLoss {
    pub label_smoothing: f64,
}

/// Mean batch loss, the gradient to feed into `Model::backward`, and the
/// argmax prediction per row.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: f64,
    pub grad_logits: Matrix,
    pub predictions: Vec<usize>,
}

impl CrossEntropyLoss {
    pub fn new(label_smoothing: f64) -> Self {
        CrossEntropyLoss { label_smoothing }
    }

    pub fn forward(&self, logits: &Matrix, labels: &[usize]) -> Result<LossOutput, BatchError> {
        if logits.rows == 0 {
            return Err(BatchError::Empty);
        }
        if logits.rows != labels.len() {
            return Err(BatchError::ShapeMismatch {
                expected: format!("{} labels", logits.rows),
                found: format!("{} labels", labels.len()),
            });
        }
        let classes = logits.cols;
        if let Some(&label) = labels.iter().find(|&&l| l >= classes) {
            return Err(BatchError::LabelOutOfRange { label, classes });
        }

        let batch = logits.rows as f64;
        let off_target = self.label_smoothing / classes as f64;
        let on_target = 1.0 - self.label_smoothing + off_target;

        let mut total = 0.0;
        let mut grad = Matrix::zeros(logits.rows, classes);
        let mut predictions = Vec::with_capacity(logits.rows);

        for (i, (row, &label)) in logits.data.iter().zip(labels.iter()).enumerate() {
            let probs = softmax(row);
            for (j, &p) in probs.iter().enumerate() {
                let q = if j == label { on_target } else { off_target };
                // log p computed from the shifted logits for stability
                if q > 0.0 {
                    total -= q * log_softmax_at(row, j);
                }
                grad.data[i][j] = (p - q) / batch;
            }
            predictions.push(argmax(row));
        }

        Ok(LossOutput { loss: total / batch, grad_logits: grad, predictions })
    }
}

/// Numerically stable softmax of one row.
pub fn softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = row.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn log_softmax_at(row: &[f64], j: usize) -> f64 {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f64>().ln();
    row[j] - max - log_sum
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
