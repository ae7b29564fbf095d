use crate::math::matrix::Matrix;

/// One mini-batch: `inputs` is `(batch, features)`, one label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Matrix,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A finite, restartable sequence of batches.
///
/// Every call to [`batches`](DataSource::batches) starts a fresh pass over
/// the data; the training loop asks for one pass per epoch.
pub trait DataSource {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_>;

    /// Number of samples per pass, when known.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl DataSource for Vec<Batch> {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        Box::new(self.iter().cloned())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.iter().map(Batch::len).sum())
    }
}
