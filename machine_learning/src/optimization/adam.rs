use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Adaptive moment estimation with bias-corrected first and second moments.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    betas: (f32, f32),
    epsilon: f32,
    steps: i32,
    mean: Box<[f32]>,
    variance: Box<[f32]>,
}

impl Adam {
    /// Creates a new `Adam` optimizer with zeroed moments.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1` - Decay of the running gradient mean.
    /// * `beta2` - Decay of the running squared gradient mean.
    /// * `epsilon` - Added to the denominator of every update.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            betas: (beta1, beta2),
            epsilon,
            steps: 0,
            mean: vec![0.; len].into_boxed_slice(),
            variance: vec![0.; len].into_boxed_slice(),
        }
    }

    /// How many updates this optimizer has applied.
    pub fn steps(&self) -> usize {
        self.steps as usize
    }

    pub fn moments(&self) -> (&[f32], &[f32]) {
        (&self.mean, &self.variance)
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(grad, &self.mean)?;

        self.steps = self.steps.saturating_add(1);

        let (b1, b2) = self.betas;
        let correction1 = 1. - b1.powi(self.steps);
        let correction2 = 1. - b2.powi(self.steps);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        for (i, (p, &g)) in params.iter_mut().zip(grad).enumerate() {
            let m = &mut self.mean[i];
            let v = &mut self.variance[i];

            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;

            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlErr;

    #[test]
    fn test_first_adam_step_moves_by_learning_rate() {
        let mut adam = Adam::new(2, 0.1, 0.5, 0.999, 1e-8);
        let mut params = [1., -1.];

        adam.update_params(&[3., -0.2], &mut params).unwrap();

        assert!((params[0] - 0.9).abs() < 1e-4);
        assert!((params[1] + 0.9).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_moments_track_gradients() {
        let mut adam = Adam::new(1, 0.01, 0.5, 0.5, 1e-8);
        let mut params = [0.];

        adam.update_params(&[2.], &mut params).unwrap();
        adam.update_params(&[4.], &mut params).unwrap();

        // m: 1 then 2.5, v: 2 then 9
        let (mean, variance) = adam.moments();
        assert!((mean[0] - 2.5).abs() < 1e-6);
        assert!((variance[0] - 9.).abs() < 1e-6);
        assert_eq!(adam.steps(), 2);
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let mut adam = Adam::new(2, 0.1, 0.5, 0.999, 1e-8);
        let mut params = [1., -1., 0.];

        let err = adam.update_params(&[1., 1., 1.], &mut params).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { .. }));
        assert_eq!(adam.steps(), 0);
    }
}
