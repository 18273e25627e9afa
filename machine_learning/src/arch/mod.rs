pub mod activations;
mod device;
mod factory;
pub mod layers;
pub mod loss;
mod network;
mod sequential;

pub use device::Device;
pub use factory::{FullyConnected, NetworkFactory};
pub use network::Network;
pub use sequential::Sequential;
