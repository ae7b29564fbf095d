use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::matrix::Matrix;

/// Isotropic Gaussian clusters, one per class, with centres drawn uniformly
/// from `[-4, 4]^dims`. Samples are interleaved by class so any prefix is
/// roughly balanced. Deterministic for a given `seed`.
pub fn gaussian_blobs(
    samples_per_class: usize,
    num_classes: usize,
    dims: usize,
    spread: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let centres: Vec<Vec<f64>> = (0..num_classes)
        .map(|_| (0..dims).map(|_| rng.gen_range(-4.0..4.0)).collect())
        .collect();

    let mut inputs = Vec::with_capacity(samples_per_class * num_classes);
    let mut labels = Vec::with_capacity(samples_per_class * num_classes);
    for _ in 0..samples_per_class {
        for (class, centre) in centres.iter().enumerate() {
            inputs.push(
                centre
                    .iter()
                    .map(|c| c + spread * Matrix::sample_standard_normal(&mut rng))
                    .collect(),
            );
            labels.push(class);
        }
    }
    (inputs, labels)
}
