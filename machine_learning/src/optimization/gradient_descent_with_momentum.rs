use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Gradient descent with a velocity buffer, optionally looking ahead along it (Nesterov).
#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    nesterov: bool,
    velocity: Box<[f32]>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - How much of the previous velocity carries over to the next step.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            nesterov: false,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }

    /// Steps along `grad + momentum * velocity` instead of the velocity itself.
    pub fn with_nesterov(mut self, nesterov: bool) -> Self {
        self.nesterov = nesterov;
        self
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(grad, &self.velocity)?;

        let Self {
            learning_rate: lr,
            momentum: mu,
            nesterov,
            ..
        } = *self;

        for ((p, &g), v) in params.iter_mut().zip(grad).zip(self.velocity.iter_mut()) {
            *v = mu * *v + g;
            let direction = if nesterov { g + mu * *v } else { *v };
            *p -= lr * direction;
        }

        Ok(())
    }
}
