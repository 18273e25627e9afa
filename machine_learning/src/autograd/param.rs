use std::{cell::RefCell, rc::Rc};

use ndarray::Array2;

use super::var::Var;
use crate::{MlErr, Result};

/// A trainable tensor.
///
/// A `Param` is a shared handle to the graph leaf currently holding its value: every forward
/// pass reads the same leaf, and updates swap in a fresh leaf so graphs built before the update
/// keep seeing the values they were built with.
#[derive(Clone)]
pub struct Param {
    leaf: Rc<RefCell<Var>>,
}

impl Param {
    /// Creates a new `Param` that tracks gradients.
    pub fn new(value: Array2<f32>) -> Self {
        Self {
            leaf: Rc::new(RefCell::new(Var::leaf(value, true))),
        }
    }

    /// The leaf to use in forward passes.
    pub fn var(&self) -> Var {
        self.leaf.borrow().clone()
    }

    /// A copy of the current value.
    pub fn value(&self) -> Array2<f32> {
        self.leaf.borrow().value().clone()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.leaf.borrow().shape()
    }

    /// The amount of scalars held.
    pub fn len(&self) -> usize {
        self.leaf.borrow().value().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn requires_grad(&self) -> bool {
        self.leaf.borrow().requires_grad()
    }

    /// Turns gradient tracking on or off for future forward passes.
    pub fn set_requires_grad(&self, requires_grad: bool) {
        if self.requires_grad() == requires_grad {
            return;
        }

        let value = self.value();
        self.leaf.replace(Var::leaf(value, requires_grad));
    }

    /// Replaces the value, keeping the shape and the tracking flag.
    ///
    /// # Returns
    /// An error if `value` doesn't have the current shape.
    pub fn assign(&self, value: Array2<f32>) -> Result<()> {
        if value.dim() != self.shape() {
            return Err(MlErr::ShapeMismatch {
                op: "assign",
                lhs: self.shape(),
                rhs: value.dim(),
            });
        }

        let requires_grad = self.requires_grad();
        self.leaf.replace(Var::leaf(value, requires_grad));
        Ok(())
    }

    /// Updates the value in place through `f`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Array2<f32>),
    {
        let mut value = self.value();
        f(&mut value);

        let requires_grad = self.requires_grad();
        self.leaf.replace(Var::leaf(value, requires_grad));
    }

    /// Whether two handles point to the same parameter.
    pub fn same(&self, other: &Param) -> bool {
        Rc::ptr_eq(&self.leaf, &other.leaf)
    }
}
