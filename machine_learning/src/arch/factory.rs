use rand::rngs::StdRng;

use super::{Network, Sequential, activations::ActFn, layers::Layer};
use crate::Result;

/// Builds networks given their input and output widths.
pub trait NetworkFactory {
    /// Builds a new network.
    ///
    /// # Arguments
    /// * `dim_in` - The width of the input.
    /// * `dim_out` - The width of the output.
    /// * `rng` - The source of randomness for the initial parameters.
    fn build(&self, dim_in: usize, dim_out: usize, rng: &mut StdRng) -> Result<Box<dyn Network>>;
}

/// A multilayer perceptron factory.
#[derive(Debug, Clone)]
pub struct FullyConnected {
    hidden: Vec<usize>,
    act_fn: ActFn,
    output_act_fn: Option<ActFn>,
}

impl FullyConnected {
    /// Creates a new `FullyConnected` factory.
    ///
    /// # Arguments
    /// * `hidden` - The widths of the hidden layers.
    /// * `act_fn` - The activation after every hidden layer.
    pub fn new<I>(hidden: I, act_fn: ActFn) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self {
            hidden: hidden.into_iter().collect(),
            act_fn,
            output_act_fn: None,
        }
    }

    /// Sets an activation for the output layer.
    pub fn with_output(mut self, act_fn: ActFn) -> Self {
        self.output_act_fn = Some(act_fn);
        self
    }
}

impl NetworkFactory for FullyConnected {
    fn build(&self, dim_in: usize, dim_out: usize, rng: &mut StdRng) -> Result<Box<dyn Network>> {
        let mut widths = Vec::with_capacity(self.hidden.len() + 2);
        widths.push(dim_in);
        widths.extend_from_slice(&self.hidden);
        widths.push(dim_out);

        let nlayers = widths.len() - 1;
        let mut layers = Vec::with_capacity(nlayers);

        for (i, pair) in widths.windows(2).enumerate() {
            let act_fn = if i + 1 == nlayers {
                self.output_act_fn
            } else {
                Some(self.act_fn)
            };

            layers.push(Layer::dense((pair[0], pair[1]), act_fn, rng)?);
        }

        Ok(Box::new(Sequential::new(layers)))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::SeedableRng;

    use super::*;
    use crate::autograd::Var;

    #[test]
    fn test_fully_connected_widths() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = FullyConnected::new([8, 4], ActFn::leaky_relu())
            .build(6, 1, &mut rng)
            .unwrap();

        assert_eq!(net.size(), 7 * 8 + 9 * 4 + 5);

        let y = net.forward(&Var::constant(Array2::zeros((3, 6)))).unwrap();
        assert_eq!(y.shape(), (3, 1));
    }

    #[test]
    fn test_output_activation_bounds_output() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = FullyConnected::new([], ActFn::Relu)
            .with_output(ActFn::Tanh)
            .build(2, 3, &mut rng)
            .unwrap();

        let y = net
            .forward(&Var::constant(Array2::from_elem((4, 2), 100.)))
            .unwrap();
        assert!(y.value().iter().all(|v| v.abs() <= 1.));
    }
}
