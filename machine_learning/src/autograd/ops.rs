use ndarray::{Array2, Axis, concatenate, s};

use super::var::Var;
use crate::{MlErr, Result};

/// The operation that produced a node, holding its operands.
pub(super) enum Op {
    Leaf,
    Add(Var, Var),
    Sub(Var, Var),
    Mul(Var, Var),
    MatMul(Var, Var),
    Neg(Var),
    Scale(Var, f32),
    Shift(Var),
    Transpose(Var),
    Broadcast(Var),
    SumTo(Var),
    Exp(Var),
    Log(Var),
    Sigmoid(Var),
    Softplus(Var),
    Tanh(Var),
    Sqrt(Var),
    Square(Var),
    Recip(Var),
    /// Piecewise linear operations: the local derivative is a constant mask.
    Gate(Var, Array2<f32>),
    Concat(Var, Var),
    Slice(Var, usize),
    Pad(Var, usize),
}

impl Op {
    pub(super) fn parents(&self) -> Vec<&Var> {
        use Op::*;

        match self {
            Leaf => Vec::new(),
            Add(a, b) | Sub(a, b) | Mul(a, b) | MatMul(a, b) | Concat(a, b) => vec![a, b],
            Neg(a) | Scale(a, _) | Shift(a) | Transpose(a) | Broadcast(a) | SumTo(a) | Exp(a)
            | Log(a) | Sigmoid(a) | Softplus(a) | Tanh(a) | Sqrt(a) | Square(a) | Recip(a)
            | Gate(a, _) | Slice(a, _) | Pad(a, _) => vec![a],
        }
    }

    /// Computes the gradient flowing into every operand given the gradient `g` of the output
    /// `out`. The returned gradients are built from graph operations, so they are themselves
    /// differentiable whenever gradient recording is enabled.
    pub(super) fn backward(&self, out: &Var, g: &Var) -> Result<Vec<(Var, Var)>> {
        use Op::*;

        let grads = match self {
            Leaf => Vec::new(),
            Add(a, b) => vec![(a.clone(), g.clone()), (b.clone(), g.clone())],
            Sub(a, b) => vec![(a.clone(), g.clone()), (b.clone(), g.neg())],
            Mul(a, b) => vec![(a.clone(), g.mul(b)?), (b.clone(), g.mul(a)?)],
            MatMul(a, b) => vec![
                (a.clone(), g.matmul(&b.t())?),
                (b.clone(), a.t().matmul(g)?),
            ],
            Neg(a) => vec![(a.clone(), g.neg())],
            Scale(a, c) => vec![(a.clone(), g.scale(*c))],
            Shift(a) => vec![(a.clone(), g.clone())],
            Transpose(a) => vec![(a.clone(), g.t())],
            Broadcast(a) => vec![(a.clone(), g.sum_to(a.shape())?)],
            SumTo(a) => vec![(a.clone(), g.broadcast(a.shape())?)],
            Exp(a) => vec![(a.clone(), g.mul(out)?)],
            Log(a) => vec![(a.clone(), g.mul(&a.recip())?)],
            Sigmoid(a) => {
                let local = out.mul(&out.neg().shift(1.))?;
                vec![(a.clone(), g.mul(&local)?)]
            }
            Softplus(a) => vec![(a.clone(), g.mul(&a.sigmoid())?)],
            Tanh(a) => vec![(a.clone(), g.mul(&out.square().neg().shift(1.))?)],
            Sqrt(a) => vec![(a.clone(), g.mul(&out.recip().scale(0.5))?)],
            Square(a) => vec![(a.clone(), g.mul(&a.scale(2.))?)],
            Recip(a) => vec![(a.clone(), g.mul(&out.square())?.neg())],
            Gate(a, mask) => vec![(a.clone(), g.mul(&Var::constant(mask.clone()))?)],
            Concat(a, b) => {
                let split = a.ncols();
                vec![
                    (a.clone(), g.slice_cols(0, split)?),
                    (b.clone(), g.slice_cols(split, split + b.ncols())?),
                ]
            }
            Slice(a, start) => vec![(a.clone(), g.pad_cols(*start, a.ncols()))],
            Pad(a, start) => vec![(a.clone(), g.slice_cols(*start, *start + a.ncols())?)],
        };

        Ok(grads)
    }
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

fn softplus(x: f32) -> f32 {
    x.max(0.) + (-x.abs()).exp().ln_1p()
}

fn reduce_to(value: &Array2<f32>, (rows, cols): (usize, usize)) -> Array2<f32> {
    let mut out = value.to_owned();

    if rows == 1 && out.nrows() != 1 {
        out = out.sum_axis(Axis(0)).insert_axis(Axis(0));
    }

    if cols == 1 && out.ncols() != 1 {
        out = out.sum_axis(Axis(1)).insert_axis(Axis(1));
    }

    out
}

impl Var {
    fn same_shape(&self, rhs: &Var, op: &'static str) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(MlErr::ShapeMismatch {
                op,
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }

        Ok(())
    }

    fn unary<F>(&self, f: F, op: Op) -> Var
    where
        F: Fn(f32) -> f32,
    {
        Var::from_op(self.value().mapv(f), op)
    }

    fn gate<F>(&self, f: F) -> Var
    where
        F: Fn(f32) -> (f32, f32),
    {
        let value = self.value().mapv(|x| f(x).0);
        let mask = self.value().mapv(|x| f(x).1);
        Var::from_op(value, Op::Gate(self.clone(), mask))
    }

    /// A constant of ones with the given shape.
    pub fn ones(shape: (usize, usize)) -> Var {
        Var::constant(Array2::ones(shape))
    }

    /// A constant of zeros with the given shape.
    pub fn zeros(shape: (usize, usize)) -> Var {
        Var::constant(Array2::zeros(shape))
    }

    /// Element-wise sum.
    pub fn add(&self, rhs: &Var) -> Result<Var> {
        self.same_shape(rhs, "add")?;
        let value = self.value() + rhs.value();
        Ok(Var::from_op(value, Op::Add(self.clone(), rhs.clone())))
    }

    /// Element-wise difference.
    pub fn sub(&self, rhs: &Var) -> Result<Var> {
        self.same_shape(rhs, "sub")?;
        let value = self.value() - rhs.value();
        Ok(Var::from_op(value, Op::Sub(self.clone(), rhs.clone())))
    }

    /// Element-wise product.
    pub fn mul(&self, rhs: &Var) -> Result<Var> {
        self.same_shape(rhs, "mul")?;
        let value = self.value() * rhs.value();
        Ok(Var::from_op(value, Op::Mul(self.clone(), rhs.clone())))
    }

    /// Matrix product.
    pub fn matmul(&self, rhs: &Var) -> Result<Var> {
        if self.ncols() != rhs.nrows() {
            return Err(MlErr::ShapeMismatch {
                op: "matmul",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }

        let value = self.value().dot(rhs.value());
        Ok(Var::from_op(value, Op::MatMul(self.clone(), rhs.clone())))
    }

    pub fn neg(&self) -> Var {
        self.unary(|x| -x, Op::Neg(self.clone()))
    }

    /// Multiplies every element by `c`.
    pub fn scale(&self, c: f32) -> Var {
        self.unary(|x| x * c, Op::Scale(self.clone(), c))
    }

    /// Adds `c` to every element.
    pub fn shift(&self, c: f32) -> Var {
        self.unary(|x| x + c, Op::Shift(self.clone()))
    }

    /// Transpose.
    pub fn t(&self) -> Var {
        let value = self.value().t().to_owned();
        Var::from_op(value, Op::Transpose(self.clone()))
    }

    /// Repeats a `1xN`, `Nx1` or `1x1` value up to `shape`.
    pub fn broadcast(&self, shape: (usize, usize)) -> Result<Var> {
        if self.shape() == shape {
            return Ok(self.clone());
        }

        let value = self
            .value()
            .broadcast(shape)
            .ok_or(MlErr::ShapeMismatch {
                op: "broadcast",
                lhs: self.shape(),
                rhs: shape,
            })?
            .to_owned();

        Ok(Var::from_op(value, Op::Broadcast(self.clone())))
    }

    /// Sums over every axis whose target length is one. The inverse of [`Var::broadcast`].
    pub fn sum_to(&self, shape: (usize, usize)) -> Result<Var> {
        if self.shape() == shape {
            return Ok(self.clone());
        }

        let (rows, cols) = self.shape();
        if !(shape.0 == rows || shape.0 == 1) || !(shape.1 == cols || shape.1 == 1) {
            return Err(MlErr::ShapeMismatch {
                op: "sum_to",
                lhs: self.shape(),
                rhs: shape,
            });
        }

        let value = reduce_to(self.value(), shape);
        Ok(Var::from_op(value, Op::SumTo(self.clone())))
    }

    /// Sum of every element, as a `1x1` variable.
    pub fn sum(&self) -> Var {
        if self.shape() == (1, 1) {
            return self.clone();
        }

        let value = reduce_to(self.value(), (1, 1));
        Var::from_op(value, Op::SumTo(self.clone()))
    }

    /// Mean of every element, as a `1x1` variable.
    pub fn mean(&self) -> Var {
        let len = self.value().len().max(1);
        self.sum().scale(1. / len as f32)
    }

    /// Per-row sum, as a `Nx1` variable.
    pub fn sum_cols(&self) -> Var {
        if self.ncols() == 1 {
            return self.clone();
        }

        let value = reduce_to(self.value(), (self.nrows(), 1));
        Var::from_op(value, Op::SumTo(self.clone()))
    }

    pub fn exp(&self) -> Var {
        self.unary(f32::exp, Op::Exp(self.clone()))
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Var {
        self.unary(f32::ln, Op::Log(self.clone()))
    }

    pub fn sigmoid(&self) -> Var {
        self.unary(sigmoid, Op::Sigmoid(self.clone()))
    }

    /// `ln(1 + e^x)`, evaluated without overflowing for large `x`.
    pub fn softplus(&self) -> Var {
        self.unary(softplus, Op::Softplus(self.clone()))
    }

    pub fn tanh(&self) -> Var {
        self.unary(f32::tanh, Op::Tanh(self.clone()))
    }

    pub fn sqrt(&self) -> Var {
        self.unary(f32::sqrt, Op::Sqrt(self.clone()))
    }

    pub fn square(&self) -> Var {
        self.unary(|x| x * x, Op::Square(self.clone()))
    }

    /// Element-wise reciprocal.
    pub fn recip(&self) -> Var {
        self.unary(f32::recip, Op::Recip(self.clone()))
    }

    pub fn relu(&self) -> Var {
        self.gate(|x| if x > 0. { (x, 1.) } else { (0., 0.) })
    }

    pub fn leaky_relu(&self, slope: f32) -> Var {
        self.gate(|x| if x > 0. { (x, 1.) } else { (slope * x, slope) })
    }

    pub fn abs(&self) -> Var {
        self.gate(|x| {
            if x > 0. {
                (x, 1.)
            } else if x < 0. {
                (-x, -1.)
            } else {
                (0., 0.)
            }
        })
    }

    /// Clamps every element into `[lo, hi]`; no gradient flows through clamped elements.
    pub fn clamp(&self, lo: f32, hi: f32) -> Var {
        self.gate(|x| {
            if x < lo {
                (lo, 0.)
            } else if x > hi {
                (hi, 0.)
            } else {
                (x, 1.)
            }
        })
    }

    /// Concatenates along the feature axis.
    pub fn concat_cols(&self, rhs: &Var) -> Result<Var> {
        if self.nrows() != rhs.nrows() {
            return Err(MlErr::ShapeMismatch {
                op: "concat_cols",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }

        let value = concatenate(Axis(1), &[self.value().view(), rhs.value().view()]).map_err(
            |_| MlErr::ShapeMismatch {
                op: "concat_cols",
                lhs: self.shape(),
                rhs: rhs.shape(),
            },
        )?;

        Ok(Var::from_op(value, Op::Concat(self.clone(), rhs.clone())))
    }

    /// Selects the feature columns in `start..end`.
    pub fn slice_cols(&self, start: usize, end: usize) -> Result<Var> {
        if start > end || end > self.ncols() {
            return Err(MlErr::SizeMismatch {
                what: "slice_cols",
                got: end,
                expected: self.ncols(),
            });
        }

        if start == 0 && end == self.ncols() {
            return Ok(self.clone());
        }

        let value = self.value().slice(s![.., start..end]).to_owned();
        Ok(Var::from_op(value, Op::Slice(self.clone(), start)))
    }

    /// Embeds this value into `total` zero columns starting at `start`.
    fn pad_cols(&self, start: usize, total: usize) -> Var {
        if start == 0 && total == self.ncols() {
            return self.clone();
        }

        let mut value = Array2::zeros((self.nrows(), total));
        value
            .slice_mut(s![.., start..start + self.ncols()])
            .assign(self.value());

        Var::from_op(value, Op::Pad(self.clone(), start))
    }
}
