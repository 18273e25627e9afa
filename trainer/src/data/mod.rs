mod batch;
mod memory;
mod noise_vars;
mod provider;

pub use batch::{Batch, Dims, Mode};
pub use memory::InMemoryProvider;
pub use noise_vars::{NoiseDist, NoiseVariable, inference_noise, interpolation_noise};
pub use provider::DataProvider;
