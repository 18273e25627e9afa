use super::LossFn;
use crate::{Result, autograd::Var};

/// Mean squared error loss function.
#[derive(Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: &Var, y: &Var) -> Result<Var> {
        Ok(y_pred.sub(y)?.square().mean())
    }
}
