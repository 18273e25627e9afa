use std::str::FromStr;

use machine_learning::initialization::{normal, uniform};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ConfigErr, Result, noise::NoiseType};

/// The distribution a noise variable is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseDist {
    /// Standard normal.
    Normal,
    /// Uniform over `[0, 1)`.
    Uniform,
}

impl FromStr for NoiseDist {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(NoiseDist::Normal),
            "uniform" => Ok(NoiseDist::Uniform),
            _ => Err(ConfigErr::InvalidDistribution(s.to_string())),
        }
    }
}

/// A named input sampled fresh for every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseVariable {
    pub name: String,
    pub dist: NoiseDist,
    pub dim: usize,
}

impl NoiseVariable {
    pub fn new(name: impl Into<String>, dist: NoiseDist, dim: usize) -> Self {
        Self {
            name: name.into(),
            dist,
            dim,
        }
    }

    /// Samples `rows` values of the variable.
    pub fn sample<R: Rng>(&self, rows: usize, rng: &mut R) -> Result<Array2<f32>> {
        let shape = (rows, self.dim);

        let sample = match self.dist {
            NoiseDist::Normal => normal(shape, 0., 1., rng)?,
            NoiseDist::Uniform => uniform(shape, 0., 1., rng)?,
        };

        Ok(sample)
    }
}

/// The noise variables of an adversarially learned inference model.
///
/// The prior `y` is drawn from `dist`, unless the noise is shaped onto a sphere or a ball,
/// which needs normal noise. The radius `u` is always added.
///
/// # Arguments
/// * `dist` - The configured distribution of the prior.
/// * `noise_type` - How the prior is shaped.
/// * `dim` - The width of the prior.
pub fn inference_noise(dist: NoiseDist, noise_type: NoiseType, dim: usize) -> Vec<NoiseVariable> {
    let dist = if noise_type.needs_normal_noise() {
        NoiseDist::Normal
    } else {
        dist
    };

    vec![
        NoiseVariable::new("y", dist, dim),
        NoiseVariable::new("u", NoiseDist::Uniform, 1),
    ]
}

/// The mixing weights used by the interpolating gradient penalty.
pub fn interpolation_noise() -> NoiseVariable {
    NoiseVariable::new("e", NoiseDist::Uniform, 1)
}
