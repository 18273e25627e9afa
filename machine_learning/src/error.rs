use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::arch::Device;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
    NotTracked {
        id: usize,
    },
    NonScalarBackward {
        shape: (usize, usize),
    },
    DeviceUnavailable {
        device: Device,
    },
    InvalidDistribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch { op, lhs, rhs } => write!(
                f,
                "Incompatible shapes for `{op}`: {}x{} and {}x{}",
                lhs.0, lhs.1, rhs.0, rhs.1
            ),
            MlErr::NotTracked { id } => write!(
                f,
                "Requested a gradient with respect to variable {id}, which does not track gradients"
            ),
            MlErr::NonScalarBackward { shape } => write!(
                f,
                "Backward can only start from a scalar, got a {}x{} variable",
                shape.0, shape.1
            ),
            MlErr::DeviceUnavailable { device } => {
                write!(f, "Device {device} is not available on this host")
            }
            MlErr::InvalidDistribution(detail) => write!(f, "Invalid distribution: {detail}"),
        }
    }
}

impl Error for MlErr {}
