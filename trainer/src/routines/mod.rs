mod auxiliary;
pub mod featnet;
mod gan;

pub use auxiliary::AuxiliaryRoutine;
pub use featnet::{DiscriminatorRoutine, EncoderRoutine};
pub use gan::GanRoutine;
