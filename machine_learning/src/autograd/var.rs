use std::{
    fmt,
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::Array2;

use super::{mode::is_grad_enabled, ops::Op};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

struct Node {
    id: usize,
    value: Array2<f32>,
    requires_grad: bool,
    op: Op,
}

/// A node of the computation graph.
///
/// Cloning a `Var` is cheap: clones share the same node.
#[derive(Clone)]
pub struct Var(Rc<Node>);

impl Var {
    fn with_op(value: Array2<f32>, requires_grad: bool, op: Op) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        Self(Rc::new(Node {
            id,
            value,
            requires_grad,
            op,
        }))
    }

    /// Creates a graph leaf.
    ///
    /// # Arguments
    /// * `value` - The value held by the leaf.
    /// * `requires_grad` - Whether gradients with respect to this leaf are tracked.
    pub fn leaf(value: Array2<f32>, requires_grad: bool) -> Self {
        Self::with_op(value, requires_grad, Op::Leaf)
    }

    /// Creates a leaf that never tracks gradients.
    pub fn constant(value: Array2<f32>) -> Self {
        Self::leaf(value, false)
    }

    /// Creates a `1x1` constant.
    pub fn scalar(value: f32) -> Self {
        Self::constant(Array2::from_elem((1, 1), value))
    }

    /// Records the result of an operation, keeping the edge to its operands only when
    /// gradients are enabled and at least one operand tracks them.
    pub(super) fn from_op(value: Array2<f32>, op: Op) -> Self {
        let requires_grad = is_grad_enabled() && op.parents().iter().any(|p| p.requires_grad());

        if requires_grad {
            Self::with_op(value, true, op)
        } else {
            Self::with_op(value, false, Op::Leaf)
        }
    }

    /// The unique identifier of this node.
    pub fn id(&self) -> usize {
        self.0.id
    }

    /// The value held by this node.
    pub fn value(&self) -> &Array2<f32> {
        &self.0.value
    }

    /// The `(rows, cols)` shape of the value.
    pub fn shape(&self) -> (usize, usize) {
        self.0.value.dim()
    }

    pub fn nrows(&self) -> usize {
        self.0.value.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.0.value.ncols()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.op, Op::Leaf)
    }

    pub(super) fn op(&self) -> &Op {
        &self.0.op
    }

    /// Returns a constant holding a copy of this value, cut from the graph.
    pub fn detach(&self) -> Self {
        Self::constant(self.0.value.clone())
    }

    /// Returns the first element of the value, meant for `1x1` variables.
    pub fn item(&self) -> f32 {
        self.0.value.first().copied().unwrap_or(f32::NAN)
    }

    /// Whether every element of the value is finite.
    pub fn is_finite(&self) -> bool {
        self.0.value.iter().all(|v| v.is_finite())
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.0.id)
            .field("shape", &self.shape())
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}
