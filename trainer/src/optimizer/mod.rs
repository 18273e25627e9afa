mod algorithm;
mod manager;

pub use algorithm::{
    ADAM_BETAS, ADAM_EPSILON, Algorithm, BuildOptimizer, OptimizerOptions, SGD_MOMENTUM,
};
pub use manager::{OptimizerEntry, OptimizerManager};
