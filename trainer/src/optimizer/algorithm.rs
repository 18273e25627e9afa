use std::{fmt, rc::Rc, str::FromStr};

use machine_learning::optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer};
use serde::{Deserialize, Serialize};

use crate::ConfigErr;

pub const ADAM_BETAS: (f32, f32) = (0.5, 0.999);
pub const ADAM_EPSILON: f32 = 1e-8;
pub const SGD_MOMENTUM: f32 = 0.9;

/// Builds an optimizer given the amount of parameters, the learning rate and the options.
pub type BuildOptimizer = Rc<dyn Fn(usize, f32, &OptimizerOptions) -> Box<dyn Optimizer>>;

/// Tunables of the optimization algorithms, unset ones take the algorithm's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OptimizerOptions {
    pub betas: Option<(f32, f32)>,
    pub epsilon: Option<f32>,
    pub momentum: Option<f32>,
    pub nesterov: Option<bool>,
}

impl OptimizerOptions {
    /// Returns these options with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &OptimizerOptions) -> OptimizerOptions {
        OptimizerOptions {
            betas: overrides.betas.or(self.betas),
            epsilon: overrides.epsilon.or(self.epsilon),
            momentum: overrides.momentum.or(self.momentum),
            nesterov: overrides.nesterov.or(self.nesterov),
        }
    }
}

/// The optimization algorithm every group is trained with.
#[derive(Clone)]
pub enum Algorithm {
    Adam,
    /// Gradient descent with momentum.
    Sgd,
    GradientDescent,
    /// A directly supplied optimizer constructor.
    Custom { name: String, build: BuildOptimizer },
}

impl Algorithm {
    /// Wraps a constructor as an algorithm.
    pub fn custom<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(usize, f32, &OptimizerOptions) -> Box<dyn Optimizer> + 'static,
    {
        Algorithm::Custom {
            name: name.into(),
            build: Rc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Algorithm::Adam => "adam",
            Algorithm::Sgd => "sgd",
            Algorithm::GradientDescent => "gradient_descent",
            Algorithm::Custom { name, .. } => name,
        }
    }

    /// The options the algorithm runs with when none are configured.
    pub fn default_options(&self) -> OptimizerOptions {
        match self {
            Algorithm::Adam => OptimizerOptions {
                betas: Some(ADAM_BETAS),
                epsilon: Some(ADAM_EPSILON),
                ..Default::default()
            },
            Algorithm::Sgd => OptimizerOptions {
                momentum: Some(SGD_MOMENTUM),
                ..Default::default()
            },
            Algorithm::GradientDescent | Algorithm::Custom { .. } => OptimizerOptions::default(),
        }
    }

    /// Builds an optimizer for `len` parameters.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters the optimizer updates.
    /// * `learning_rate` - The learning rate.
    /// * `options` - Overrides of the default options.
    pub fn build(
        &self,
        len: usize,
        learning_rate: f32,
        options: &OptimizerOptions,
    ) -> Box<dyn Optimizer> {
        let options = self.default_options().merged(options);

        match self {
            Algorithm::Adam => {
                let (beta1, beta2) = options.betas.unwrap_or(ADAM_BETAS);
                let epsilon = options.epsilon.unwrap_or(ADAM_EPSILON);
                Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon))
            }
            Algorithm::Sgd => {
                let momentum = options.momentum.unwrap_or(SGD_MOMENTUM);
                let nesterov = options.nesterov.unwrap_or(false);
                Box::new(
                    GradientDescentWithMomentum::new(len, learning_rate, momentum)
                        .with_nesterov(nesterov),
                )
            }
            Algorithm::GradientDescent => Box::new(GradientDescent::new(learning_rate)),
            Algorithm::Custom { build, .. } => build(len, learning_rate, &options),
        }
    }
}

impl FromStr for Algorithm {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Algorithm::Adam),
            "sgd" => Ok(Algorithm::Sgd),
            "gradient_descent" | "gd" => Ok(Algorithm::GradientDescent),
            _ => Err(ConfigErr::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Algorithm({})", self.name())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
