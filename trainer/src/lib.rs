//! Orchestration of adversarial training: divergences, gradient penalties, noise shaping,
//! per-group optimizers and the routines that tie them to a training loop.

pub mod config;
pub mod context;
pub mod data;
pub mod divergence;
mod error;
pub mod group;
pub mod loop_;
pub mod metrics;
pub mod noise;
pub mod optimizer;
pub mod penalty;
pub mod routine;
pub mod routines;
pub mod viz;

pub use error::{ConfigErr, Result, StructuralErr, TrainErr};
