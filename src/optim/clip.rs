use crate::error::BatchError;
use crate::network::model::Gradients;

/// Rescales `grads` in place so their global L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping. A non-finite norm is reported
/// as an error and the gradients are left untouched.
pub fn clip_grad_norm(grads: &mut Gradients, max_norm: f64) -> Result<f64, BatchError> {
    let total = global_norm(grads);
    if !total.is_finite() {
        return Err(BatchError::NonFiniteGradient(total));
    }
    if total > max_norm {
        let scale = max_norm / (total + 1e-6);
        for g in grads.values_mut() {
            g.scale_in_place(scale);
        }
    }
    Ok(total)
}

pub fn global_norm(grads: &Gradients) -> f64 {
    grads.values().map(|g| g.squared_norm()).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::Matrix;

    #[test]
    fn clips_large_gradients_to_max_norm() {
        let mut grads = Gradients::from([
            ("a".to_string(), Matrix::from_data(vec![vec![3.0]])),
            ("b".to_string(), Matrix::from_data(vec![vec![4.0]])),
        ]);
        let before = clip_grad_norm(&mut grads, 1.0).unwrap();
        assert!((before - 5.0).abs() < 1e-12);
        assert!((global_norm(&grads) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn leaves_small_gradients_alone() {
        let mut grads = Gradients::from([("a".to_string(), Matrix::from_data(vec![vec![0.1]]))]);
        clip_grad_norm(&mut grads, 1.0).unwrap();
        assert_eq!(grads["a"].data[0][0], 0.1);
    }

    #[test]
    fn non_finite_norm_is_an_error() {
        let mut grads = Gradients::from([("a".to_string(), Matrix::from_data(vec![vec![f64::NAN]]))]);
        assert!(clip_grad_norm(&mut grads, 1.0).is_err());
    }
}
