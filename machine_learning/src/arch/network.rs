use super::Device;
use crate::{
    Result,
    autograd::{Param, Var},
};

/// A parametric function approximator.
pub trait Network {
    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The output batch or an error if the input doesn't fit the network.
    fn forward(&self, x: &Var) -> Result<Var>;

    /// Returns handles to every trainable parameter, in a stable order.
    fn params(&self) -> Vec<Param>;

    /// Moves the parameters to `device`.
    ///
    /// # Returns
    /// An error if the device is not available.
    fn to_device(&mut self, device: Device) -> Result<()>;

    /// The device currently holding the parameters.
    fn device(&self) -> Device;

    /// Returns the amount of parameters in the network.
    fn size(&self) -> usize {
        self.params().iter().map(Param::len).sum()
    }
}

impl<N: Network + ?Sized> Network for Box<N> {
    fn forward(&self, x: &Var) -> Result<Var> {
        (**self).forward(x)
    }

    fn params(&self) -> Vec<Param> {
        (**self).params()
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        (**self).to_device(device)
    }

    fn device(&self) -> Device {
        (**self).device()
    }
}
