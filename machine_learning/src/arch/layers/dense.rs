use rand::Rng;

use crate::{
    Result,
    arch::activations::ActFn,
    autograd::{Param, Var},
    initialization,
};

/// A fully connected layer: `act_fn(x · w + b)`.
#[derive(Clone)]
pub struct Dense {
    dim: (usize, usize),
    weights: Param,
    biases: Param,
    act_fn: Option<ActFn>,
}

impl Dense {
    /// Creates a new `Dense` layer with Xavier uniform weights and zero biases.
    ///
    /// # Arguments
    /// * `dim` - The `(inputs, outputs)` dimensions of the layer.
    /// * `act_fn` - An optional activation applied to the affine output.
    /// * `rng` - The source of randomness for the weights.
    ///
    /// # Returns
    /// A new `Dense` instance or an error if `dim` has a zero component.
    pub fn new<R: Rng>(dim: (usize, usize), act_fn: Option<ActFn>, rng: &mut R) -> Result<Self> {
        let weights = initialization::xavier_uniform(dim, rng)?;

        Ok(Self {
            dim,
            weights: Param::new(weights),
            biases: Param::new(ndarray::Array2::zeros((1, dim.1))),
            act_fn,
        })
    }

    /// Returns the `(inputs, outputs)` dimensions of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    pub fn forward(&self, x: &Var) -> Result<Var> {
        let z = x.matmul(&self.weights.var())?;
        let b = self.biases.var().broadcast(z.shape())?;
        let z = z.add(&b)?;

        let Some(act_fn) = self.act_fn else {
            return Ok(z);
        };

        Ok(act_fn.apply(&z))
    }

    /// The weights and the biases, in that order.
    pub fn params(&self) -> [Param; 2] {
        [self.weights.clone(), self.biases.clone()]
    }
}
