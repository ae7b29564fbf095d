use serde::{Deserialize, Serialize};

pub const DEFAULT_BINS: usize = 64;

/// Fixed-width value distribution over the observed `[min, max]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Builds the histogram in two streaming passes over `values`: one for
    /// the range, one for the counts. The values are never collected, so a
    /// large parameter tensor is only ever borrowed. Non-finite values are
    /// skipped.
    pub fn from_values<'a, I>(values: I, bins: usize) -> Histogram
    where
        I: Iterator<Item = &'a f64> + Clone,
    {
        let bins = bins.max(1);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0u64;
        for &v in values.clone().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }

        let mut counts = vec![0u64; bins];
        if count == 0 {
            return Histogram { min: 0.0, max: 0.0, sum: 0.0, count: 0, counts };
        }

        // Halved so the span stays finite even for values near ±f64::MAX.
        let half_span = max / 2.0 - min / 2.0;
        for &v in values.filter(|v| v.is_finite()) {
            let idx = if half_span > 0.0 {
                let fraction = (v / 2.0 - min / 2.0) / half_span;
                ((fraction * bins as f64) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }

        Histogram { min, max, sum, count, counts }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }

    /// `bins + 1` bucket boundaries from `min` to `max`.
    pub fn edges(&self) -> Vec<f64> {
        let bins = self.bins() as f64;
        (0..=self.bins())
            .map(|i| {
                let t = i as f64 / bins;
                self.min * (1.0 - t) + self.max * t
            })
            .collect()
    }
}
