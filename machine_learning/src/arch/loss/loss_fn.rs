use crate::{Result, autograd::Var};

pub trait LossFn {
    /// Computes the mean loss of a batch of predictions, as a `1x1` variable.
    fn loss(&self, y_pred: &Var, y: &Var) -> Result<Var>;
}
