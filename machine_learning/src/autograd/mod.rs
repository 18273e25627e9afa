//! Reverse-mode automatic differentiation over two dimensional `f32` arrays.
//!
//! Every value is an `Array2<f32>` (row per sample, column per feature; scalars are `1x1`).
//! Gradients are themselves computed with the same operations, so a gradient obtained through
//! [`grad`] can be differentiated again. This is what gradient penalties rely on.

mod backprop;
mod mode;
mod ops;
mod param;
mod var;


pub use backprop::{Gradients, grad};
pub use mode::{GradModeGuard, enable_grad, is_grad_enabled, no_grad};
pub use param::Param;
pub use var::Var;
