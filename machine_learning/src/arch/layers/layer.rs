use rand::Rng;

use super::Dense;
use crate::{
    Result,
    arch::activations::ActFn,
    autograd::{Param, Var},
};

#[derive(Clone)]
pub enum Layer {
    Dense(Dense),
    Activation(ActFn),
}

impl Layer {
    pub fn dense<R: Rng>(dim: (usize, usize), act_fn: Option<ActFn>, rng: &mut R) -> Result<Self> {
        Ok(Layer::Dense(Dense::new(dim, act_fn, rng)?))
    }

    pub fn activation(act_fn: ActFn) -> Self {
        Layer::Activation(act_fn)
    }

    pub fn forward(&self, x: &Var) -> Result<Var> {
        match self {
            Layer::Dense(l) => l.forward(x),
            Layer::Activation(a) => Ok(a.apply(x)),
        }
    }

    pub fn params(&self) -> Vec<Param> {
        match self {
            Layer::Dense(l) => l.params().to_vec(),
            Layer::Activation(_) => Vec::new(),
        }
    }
}
