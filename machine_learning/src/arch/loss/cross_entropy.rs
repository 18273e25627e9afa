use ndarray::Axis;

use super::LossFn;
use crate::{Result, autograd::Var};

/// Softmax cross entropy between logits and one-hot targets.
#[derive(Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    /// Row-wise `log(softmax(logits))`, shifted by the row maximum so no exponential overflows.
    pub fn log_softmax(logits: &Var) -> Result<Var> {
        let max = logits
            .value()
            .map_axis(Axis(1), |row| row.fold(f32::NEG_INFINITY, |m, &v| m.max(v)))
            .insert_axis(Axis(1));

        let shifted = logits.sub(&Var::constant(max).broadcast(logits.shape())?)?;
        let lse = shifted.exp().sum_cols().ln();

        shifted.sub(&lse.broadcast(logits.shape())?)
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: &Var, y: &Var) -> Result<Var> {
        let log_probs = Self::log_softmax(y_pred)?;
        let nrows = y_pred.nrows().max(1) as f32;

        Ok(log_probs.mul(y)?.sum().scale(-1. / nrows))
    }
}
