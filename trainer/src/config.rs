//! Setup-time configuration.
//!
//! Every string-valued setting is resolved into its typed form before training starts, so an
//! unknown name fails at setup rather than in the middle of an epoch.

use std::{collections::BTreeMap, num::NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::{
    ConfigErr,
    optimizer::{Algorithm, OptimizerOptions},
    penalty::PenaltySpec,
    routine::Hyperparams,
};

pub const DEFAULT_LEARNING_RATE: f32 = 1e-4;
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(63);

/// A setting given either once for every group or group by group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerGroup<T> {
    All(T),
    Each(BTreeMap<String, T>),
}

impl<T> PerGroup<T> {
    /// The value of `group`, if any.
    pub fn get(&self, group: &str) -> Option<&T> {
        match self {
            PerGroup::All(value) => Some(value),
            PerGroup::Each(values) => values.get(group),
        }
    }
}

impl<T> Default for PerGroup<T> {
    fn default() -> Self {
        PerGroup::Each(BTreeMap::new())
    }
}

/// Bounds parameters are clipped into after every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClipBounds {
    /// Clips into `[-c, c]`.
    Symmetric(f32),
    Range(f32, f32),
}

impl ClipBounds {
    /// The `(low, high)` pair.
    pub fn bounds(&self) -> (f32, f32) {
        match *self {
            ClipBounds::Symmetric(c) => (-c.abs(), c.abs()),
            ClipBounds::Range(lo, hi) if lo <= hi => (lo, hi),
            ClipBounds::Range(lo, hi) => (hi, lo),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct OptimizerConfig {
    pub algorithm: String,
    pub learning_rate: PerGroup<f32>,
    pub weight_decay: PerGroup<f32>,
    pub l1_decay: PerGroup<f32>,
    pub clipping: PerGroup<ClipBounds>,
    pub optimizer_options: OptimizerOptions,
    pub model_optimizer_options: BTreeMap<String, OptimizerOptions>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            algorithm: "adam".to_string(),
            learning_rate: PerGroup::All(DEFAULT_LEARNING_RATE),
            weight_decay: PerGroup::default(),
            l1_decay: PerGroup::default(),
            clipping: PerGroup::default(),
            optimizer_options: OptimizerOptions::default(),
            model_optimizer_options: BTreeMap::new(),
        }
    }
}

impl OptimizerConfig {
    /// Resolves the algorithm name.
    ///
    /// # Returns
    /// The typed settings or an error if the algorithm is not supported.
    pub fn resolve(&self) -> Result<OptimizerSettings, ConfigErr> {
        Ok(OptimizerSettings {
            algorithm: self.algorithm.parse()?,
            learning_rate: self.learning_rate.clone(),
            weight_decay: self.weight_decay.clone(),
            l1_decay: self.l1_decay.clone(),
            clipping: self.clipping.clone(),
            options: self.optimizer_options,
            group_options: self.model_optimizer_options.clone(),
        })
    }
}

/// Resolved optimizer settings.
#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub algorithm: Algorithm,
    pub learning_rate: PerGroup<f32>,
    pub weight_decay: PerGroup<f32>,
    pub l1_decay: PerGroup<f32>,
    pub clipping: PerGroup<ClipBounds>,
    pub options: OptimizerOptions,
    pub group_options: BTreeMap<String, OptimizerOptions>,
}

/// The settings of one group's optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupSettings {
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub l1_decay: Option<f32>,
    pub clip_bounds: Option<(f32, f32)>,
    pub options: OptimizerOptions,
}

impl OptimizerSettings {
    /// Settings with the defaults of `algorithm` and a single learning rate.
    pub fn new(algorithm: Algorithm, learning_rate: f32) -> Self {
        Self {
            algorithm,
            learning_rate: PerGroup::All(learning_rate),
            weight_decay: PerGroup::default(),
            l1_decay: PerGroup::default(),
            clipping: PerGroup::default(),
            options: OptimizerOptions::default(),
            group_options: BTreeMap::new(),
        }
    }

    /// Picks the settings that apply to `group`.
    ///
    /// # Returns
    /// The group settings or an error if no learning rate applies to the group.
    pub fn group(&self, group: &str) -> Result<GroupSettings, ConfigErr> {
        let learning_rate =
            *self
                .learning_rate
                .get(group)
                .ok_or_else(|| ConfigErr::MissingLearningRate {
                    group: group.to_string(),
                })?;

        let options = match self.group_options.get(group) {
            Some(overrides) => self.options.merged(overrides),
            None => self.options,
        };

        let settings = GroupSettings {
            learning_rate,
            weight_decay: self.weight_decay.get(group).copied().unwrap_or(0.),
            l1_decay: self.l1_decay.get(group).copied(),
            clip_bounds: self.clipping.get(group).map(ClipBounds::bounds),
            options,
        };

        settings.check_finite(group)?;
        Ok(settings)
    }
}

impl GroupSettings {
    /// Fails on the first setting that is NaN or infinite.
    fn check_finite(&self, group: &str) -> Result<(), ConfigErr> {
        let (lo, hi) = self.clip_bounds.unzip();
        let checks = [
            ("learning_rate", Some(self.learning_rate)),
            ("weight_decay", Some(self.weight_decay)),
            ("l1_decay", self.l1_decay),
            ("clipping", lo),
            ("clipping", hi),
        ];

        match checks
            .into_iter()
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        {
            Some((setting, _)) => Err(ConfigErr::NonFiniteSetting {
                group: group.to_string(),
                setting,
            }),
            None => Ok(()),
        }
    }
}

/// The string-valued hyperparameters of a routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RoutineConfig {
    pub measure: String,
    pub boundary_seek: bool,
    pub penalty_amount: f32,
    pub penalty_type: String,
    pub noise_type: String,
    pub output_nonlin: bool,
    pub generator_loss_type: Option<String>,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            measure: "gan".to_string(),
            boundary_seek: false,
            penalty_amount: 0.,
            penalty_type: "gradient_norm".to_string(),
            noise_type: "hypercubes".to_string(),
            output_nonlin: false,
            generator_loss_type: None,
        }
    }
}

impl RoutineConfig {
    /// Resolves every name into its typed form.
    ///
    /// # Returns
    /// The hyperparameters or the first unknown name found.
    pub fn resolve(&self) -> Result<Hyperparams, ConfigErr> {
        let penalty = if self.penalty_amount > 0. {
            Some(PenaltySpec {
                kind: self.penalty_type.parse()?,
                amount: self.penalty_amount,
            })
        } else {
            None
        };

        Ok(Hyperparams {
            measure: self.measure.parse()?,
            boundary_seek: self.boundary_seek,
            penalty,
            noise_type: self.noise_type.parse()?,
            output_nonlin: self.output_nonlin,
            generator_loss: match &self.generator_loss_type {
                Some(name) => name.parse()?,
                None => Default::default(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSize {
    pub train: NonZeroUsize,
    pub test: NonZeroUsize,
}

impl Default for BatchSize {
    fn default() -> Self {
        Self {
            train: DEFAULT_BATCH_SIZE,
            test: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DataConfig {
    pub batch_size: BatchSize,
    /// Drops the trailing batch of an epoch when it is smaller than the batch size.
    pub skip_last_batch: bool,
    /// Seeds the noise variables.
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TrainConfig {
    pub epochs: usize,
    /// The archive hook runs every this many epochs; zero disables it.
    pub archive_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            archive_every: 10,
        }
    }
}
