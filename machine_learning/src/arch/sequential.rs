use super::{Device, Network, layers::Layer};
use crate::{
    MlErr, Result,
    autograd::{Param, Var},
};

/// A sequential model: information flows forward through its layers in order.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
    device: Device,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance living on the cpu.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
            device: Device::Cpu,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Network for Sequential {
    fn forward(&self, x: &Var) -> Result<Var> {
        let mut x = x.clone();

        for layer in &self.layers {
            x = layer.forward(&x)?;
        }

        Ok(x)
    }

    fn params(&self) -> Vec<Param> {
        self.layers.iter().flat_map(Layer::params).collect()
    }

    fn to_device(&mut self, device: Device) -> Result<()> {
        if !device.is_available() {
            return Err(MlErr::DeviceUnavailable { device });
        }

        self.device = device;
        Ok(())
    }

    fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::activations::ActFn;

    fn model() -> Sequential {
        let mut rng = StdRng::seed_from_u64(7);

        Sequential::new([
            Layer::dense((3, 4), Some(ActFn::Relu), &mut rng).unwrap(),
            Layer::dense((4, 2), None, &mut rng).unwrap(),
            Layer::activation(ActFn::Sigmoid),
        ])
    }

    #[test]
    fn test_forward_shape_and_size() {
        let model = model();
        let y = model.forward(&Var::constant(Array2::ones((5, 3)))).unwrap();

        assert_eq!(y.shape(), (5, 2));
        assert_eq!(model.size(), (3 + 1) * 4 + (4 + 1) * 2);
        assert_eq!(model.params().len(), 4);
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let model = model();
        let err = model.forward(&Var::constant(Array2::ones((5, 2))));

        assert!(matches!(err, Err(MlErr::ShapeMismatch { op: "matmul", .. })));
    }

    #[test]
    fn test_to_device_fails_for_unavailable_devices() {
        let mut model = model();

        assert!(model.to_device(Device::Cpu).is_ok());
        assert!(matches!(
            model.to_device(Device::Accelerator(0)),
            Err(MlErr::DeviceUnavailable { .. })
        ));
        assert_eq!(model.device(), Device::Cpu);
    }
}
