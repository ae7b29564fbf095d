use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::batch::{Batch, DataSource};
use crate::error::BatchError;
use crate::math::matrix::Matrix;

/// Samples held in memory, chunked into batches on every pass.
///
/// With shuffling enabled the sample order is redrawn from a seeded RNG at
/// the start of each pass, so two datasets built with the same seed yield
/// identical batch sequences.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Vec<Vec<f64>>,
    labels: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl InMemoryDataset {
    /// Fails when inputs and labels disagree in count or rows differ in width.
    pub fn new(inputs: Vec<Vec<f64>>, labels: Vec<usize>, batch_size: usize) -> Result<Self, BatchError> {
        if inputs.len() != labels.len() {
            return Err(BatchError::ShapeMismatch {
                expected: format!("{} labels", inputs.len()),
                found: format!("{} labels", labels.len()),
            });
        }
        let width = inputs.first().map_or(0, Vec::len);
        if let Some(row) = inputs.iter().find(|row| row.len() != width) {
            return Err(BatchError::ShapeMismatch {
                expected: format!("{width} features"),
                found: format!("{} features", row.len()),
            });
        }
        Ok(InMemoryDataset {
            inputs,
            labels,
            batch_size: batch_size.max(1),
            shuffle: false,
            rng: StdRng::seed_from_u64(0),
        })
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.inputs.first().map_or(0, Vec::len)
    }

    /// Largest label plus one.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    /// Carves a random `fraction` of the samples off into an unshuffled
    /// second dataset (e.g. validation). `self` keeps the rest and its
    /// shuffle setting.
    pub fn split(self, fraction: f64, seed: u64) -> (InMemoryDataset, InMemoryDataset) {
        let n = self.len();
        let held_out = ((n as f64) * fraction.clamp(0.0, 1.0)).round() as usize;

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let InMemoryDataset { inputs, labels, batch_size, shuffle, rng } = self;
        let mut slots: Vec<Option<(Vec<f64>, usize)>> = inputs.into_iter().zip(labels).map(Some).collect();
        let mut take = |indices: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
            indices.iter().filter_map(|&i| slots[i].take()).unzip()
        };
        let (val_inputs, val_labels) = take(&order[..held_out]);
        let (train_inputs, train_labels) = take(&order[held_out..]);

        let train = InMemoryDataset { inputs: train_inputs, labels: train_labels, batch_size, shuffle, rng };
        let val = InMemoryDataset {
            inputs: val_inputs,
            labels: val_labels,
            batch_size,
            shuffle: false,
            rng: StdRng::seed_from_u64(seed),
        };
        (train, val)
    }
}

impl DataSource for InMemoryDataset {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }

        let this = &*self;
        let n = order.len();
        Box::new((0..n).step_by(this.batch_size).map(move |start| {
            let end = (start + this.batch_size).min(n);
            let chunk = &order[start..end];
            Batch {
                inputs: Matrix::from_data(chunk.iter().map(|&i| this.inputs[i].clone()).collect()),
                labels: chunk.iter().map(|&i| this.labels[i]).collect(),
            }
        }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}
