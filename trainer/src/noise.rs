//! Shapes raw noise samples into the geometric priors used by the inference routines.

use std::{fmt, str::FromStr};

use machine_learning::{MlErr, autograd::Var};
use ndarray::{Array2, ArrayView2, Axis};

use crate::{ConfigErr, Result};

/// Lower bound on the norm noise rows are divided by.
pub const NORM_EPSILON: f32 = 1e-12;

/// Added to the norm when normalizing network outputs, keeping the division differentiable.
pub const OUTPUT_EPSILON: f32 = 1e-6;

/// The prior the noise is shaped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseType {
    /// The noise is used as sampled.
    #[default]
    Hypercubes,
    /// Every sample is projected onto the unit sphere.
    Unitsphere,
    /// Every sample is projected onto the unit sphere and scaled by a uniform radius.
    Unitball,
}

impl NoiseType {
    /// Whether the raw noise must come from a normal distribution for the shaped prior to be
    /// uniform over its support.
    pub fn needs_normal_noise(&self) -> bool {
        matches!(self, NoiseType::Unitsphere | NoiseType::Unitball)
    }
}

impl FromStr for NoiseType {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hypercubes" => Ok(NoiseType::Hypercubes),
            "unitsphere" => Ok(NoiseType::Unitsphere),
            "unitball" => Ok(NoiseType::Unitball),
            _ => Err(ConfigErr::InvalidNoiseType(s.to_string())),
        }
    }
}

impl fmt::Display for NoiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoiseType::Hypercubes => "hypercubes",
            NoiseType::Unitsphere => "unitsphere",
            NoiseType::Unitball => "unitball",
        };

        write!(f, "{s}")
    }
}

fn row_norms(y: ArrayView2<f32>) -> Array2<f32> {
    y.map_axis(Axis(1), |row| row.dot(&row).sqrt())
        .insert_axis(Axis(1))
}

fn project_to_sphere(y: ArrayView2<f32>) -> Array2<f32> {
    let norms = row_norms(y).mapv(|n| n.max(NORM_EPSILON));
    &y / &norms
}

/// Shapes a batch of noise.
///
/// # Arguments
/// * `y` - The raw noise, one sample per row.
/// * `u` - The auxiliary uniform variable, one radius per row; required by `Unitball`.
/// * `noise_type` - The prior to shape into.
///
/// # Returns
/// The shaped noise, or an error if `Unitball` is requested without `u` or `u` can't be
/// broadcast over `y`.
pub fn shape_noise(
    y: ArrayView2<f32>,
    u: Option<ArrayView2<f32>>,
    noise_type: NoiseType,
) -> Result<Array2<f32>> {
    match noise_type {
        NoiseType::Hypercubes => Ok(y.to_owned()),
        NoiseType::Unitsphere => Ok(project_to_sphere(y)),
        NoiseType::Unitball => {
            let u = u.ok_or(ConfigErr::MissingAuxVariable { name: "u" })?;
            let radii = u.broadcast(y.dim()).ok_or(MlErr::ShapeMismatch {
                op: "shape_noise",
                lhs: y.dim(),
                rhs: u.dim(),
            })?;

            Ok(project_to_sphere(y) * radii)
        }
    }
}

/// Normalizes every row of `z` to (almost) unit norm, differentiably.
pub fn normalize_rows(z: &Var) -> Result<Var> {
    let norms = z.square().sum_cols().sqrt().shift(OUTPUT_EPSILON);
    let scale = norms.recip().broadcast(z.shape())?;
    Ok(z.mul(&scale)?)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::TrainErr;

    fn norms(a: &Array2<f32>) -> Vec<f32> {
        a.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect()
    }

    #[test]
    fn test_hypercubes_passes_noise_through() {
        let y = array![[0.3, -2.], [5., 0.1]];
        let out = shape_noise(y.view(), None, NoiseType::Hypercubes).unwrap();

        assert_eq!(out, y);
    }

    #[test]
    fn test_unitsphere_has_unit_norm() {
        let y = array![[3., 4.], [-1e-3, 2e-3], [100., -250.], [0.5, 0.]];
        let out = shape_noise(y.view(), None, NoiseType::Unitsphere).unwrap();

        for n in norms(&out) {
            assert!((n - 1.).abs() <= 1e-5, "norm {n}");
        }
    }

    #[test]
    fn test_unitsphere_zero_input_stays_finite() {
        let y = Array2::zeros((2, 3));
        let out = shape_noise(y.view(), None, NoiseType::Unitsphere).unwrap();

        assert!(out.iter().all(|v| v.is_finite()));
        assert_eq!(out, y);
    }

    #[test]
    fn test_unitball_norm_is_bounded_and_monotone_in_radius() {
        let y = array![[3., -4., 12.]];
        let radii = [0., 0.1, 0.25, 0.5, 0.9, 1.];

        let mut prev = -1.;
        for r in radii {
            let u = array![[r]];
            let out = shape_noise(y.view(), Some(u.view()), NoiseType::Unitball).unwrap();
            let n = norms(&out)[0];

            assert!((0. ..=1.).contains(&n), "norm {n}");
            assert!(n >= prev);
            prev = n;
        }
    }

    #[test]
    fn test_unitball_requires_uniform_variable() {
        let y = array![[1., 1.]];
        let err = shape_noise(y.view(), None, NoiseType::Unitball).unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Config(ConfigErr::MissingAuxVariable { name: "u" })
        ));
    }

    #[test]
    fn test_unknown_noise_type_fails() {
        assert!(matches!(
            "hyperspheres".parse::<NoiseType>(),
            Err(ConfigErr::InvalidNoiseType(_))
        ));
        assert_eq!("UnitBall".parse::<NoiseType>().unwrap(), NoiseType::Unitball);
    }

    #[test]
    fn test_normalize_rows_is_differentiable() {
        let z = Var::leaf(array![[3., 4.]], true);
        let out = normalize_rows(&z).unwrap();

        assert!((out.value()[[0, 0]] - 0.6).abs() < 1e-5);
        assert!(out.requires_grad());
    }
}
