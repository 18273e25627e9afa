use std::collections::BTreeMap;

use log::debug;
use machine_learning::{arch::Network, autograd::Var};
use ndarray::Array2;

use crate::{
    Result, StructuralErr,
    data::{Batch, Dims, Mode},
    divergence::{GeneratorLossType, Measure},
    group::{NetworkGroup, Networks},
    noise::NoiseType,
    optimizer::OptimizerManager,
    penalty::PenaltySpec,
    viz::Visualizer,
};

/// The typed hyperparameters a routine runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparams {
    pub measure: Measure,
    pub boundary_seek: bool,
    pub penalty: Option<PenaltySpec>,
    pub noise_type: NoiseType,
    /// Whether encoder outputs are squashed into the support of the prior.
    pub output_nonlin: bool,
    pub generator_loss: GeneratorLossType,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            measure: Measure::Gan,
            boundary_seek: false,
            penalty: None,
            noise_type: NoiseType::Hypercubes,
            output_nonlin: false,
            generator_loss: GeneratorLossType::default(),
        }
    }
}

/// A loss waiting to be stepped.
#[derive(Debug, Clone)]
pub struct LossEntry {
    /// The group the loss trains.
    pub key: String,
    pub loss: Var,
    /// The measure the loss was computed with, if any.
    pub measure: Option<Measure>,
}

/// Losses keyed by the group they train, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LossSet {
    entries: Vec<LossEntry>,
}

impl LossSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the loss of `key`, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, loss: Var, measure: Option<Measure>) {
        let key = key.into();

        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.loss = loss;
                entry.measure = measure;
            }
            None => self.entries.push(LossEntry { key, loss, measure }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Var> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.loss)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LossEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves the losses of `other` into this set.
    ///
    /// # Returns
    /// A structural error if both sets hold a loss for the same group.
    pub fn merge(&mut self, other: LossSet, step: usize) -> Result<()> {
        if let Some(key) = other.keys().find(|key| self.contains(key)) {
            return Err(StructuralErr::LossKeyCollision {
                key: key.to_string(),
                step,
            }
            .into());
        }

        self.entries.extend(other.entries);
        Ok(())
    }
}

impl IntoIterator for LossSet {
    type Item = LossEntry;
    type IntoIter = std::vec::IntoIter<LossEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A value reported by a routine.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Scalar(f32),
    Array(Array2<f32>),
}

/// Named values reported by the routines of a step.
#[derive(Debug, Clone, Default)]
pub struct ResultSet(BTreeMap<String, ResultValue>);

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f32) {
        self.0.insert(name.into(), ResultValue::Scalar(value));
    }

    pub fn insert_array(&mut self, name: impl Into<String>, value: Array2<f32>) {
        self.0.insert(name.into(), ResultValue::Array(value));
    }

    pub fn get(&self, name: &str) -> Option<&ResultValue> {
        self.0.get(name)
    }

    /// The value of `name`, if it's a scalar.
    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.0.get(name) {
            Some(ResultValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().filter_map(|(name, value)| match value {
            ResultValue::Scalar(v) => Some((name.as_str(), *v)),
            ResultValue::Array(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a routine gets to work with.
///
/// Routines can read the networks and compute with them; parameters only change through the
/// optimizers, after every routine of the step has run.
pub struct RoutineCtx<'a> {
    pub batch: &'a Batch,
    pub results: &'a mut ResultSet,
    pub viz: &'a mut dyn Visualizer,
    pub mode: Mode,
    pub dims: Dims,
    networks: &'a Networks,
    losses: LossSet,
    routine: &'a str,
    measure: Measure,
}

impl<'a> RoutineCtx<'a> {
    /// The group `name`.
    ///
    /// # Returns
    /// The group or a structural error if there's no group with that name.
    pub fn group(&self, name: &str) -> Result<&'a NetworkGroup> {
        self.networks.get(name, self.routine)
    }

    /// The `i`-th network of the group `name`.
    ///
    /// # Returns
    /// The network or a structural error if the group doesn't exist or is too short.
    pub fn network(&self, name: &str, i: usize) -> Result<&'a dyn Network> {
        self.group(name)?.get(i).ok_or_else(|| {
            StructuralErr::UnregisteredGroup {
                group: format!("{name}[{i}]"),
                routine: self.routine.to_string(),
            }
            .into()
        })
    }

    /// Checks that `out`, produced by `group`, is `expected` columns wide.
    ///
    /// A zero `expected` means the dataset doesn't know the width, so anything passes.
    ///
    /// # Returns
    /// A structural error naming the group if the widths differ.
    pub fn check_width(&self, group: &str, out: &Var, expected: usize) -> Result<()> {
        let got = out.ncols();
        if expected == 0 || got == expected {
            return Ok(());
        }

        Err(StructuralErr::OutputWidth {
            group: group.to_string(),
            got,
            expected,
        }
        .into())
    }

    /// Sets the loss that trains `group`.
    pub fn add_loss(&mut self, group: &str, loss: Var) {
        self.losses.insert(group, loss, Some(self.measure));
    }

    pub fn losses(&self) -> &LossSet {
        &self.losses
    }

    pub fn routine(&self) -> &str {
        self.routine
    }
}

/// A named unit of work over one or more network groups.
pub trait Routine {
    /// The groups the routine reads.
    fn groups(&self) -> Vec<String>;

    /// Runs the routine on the current batch.
    ///
    /// # Returns
    /// An error if an input, a group or a setting is missing, or a computation fails.
    fn run(&self, ctx: &mut RoutineCtx<'_>, hp: &Hyperparams) -> Result<()>;
}

struct RoutineEntry {
    name: String,
    routine: Box<dyn Routine>,
    hyperparams: Hyperparams,
}

/// The routines of a model, run in registration order.
#[derive(Default)]
pub struct RoutineRegistry {
    entries: Vec<RoutineEntry>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a routine under `name`.
    ///
    /// # Returns
    /// An error if another routine already has that name.
    pub fn register<R>(&mut self, name: impl Into<String>, routine: R, hp: Hyperparams) -> Result<()>
    where
        R: Routine + 'static,
    {
        let name = name.into();

        if self.contains(&name) {
            return Err(StructuralErr::DuplicateRoutine { name }.into());
        }

        self.entries.push(RoutineEntry {
            name,
            routine: Box::new(routine),
            hyperparams: hp,
        });

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn hyperparams(&self, name: &str) -> Option<&Hyperparams> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.hyperparams)
    }

    pub fn hyperparams_mut(&mut self, name: &str) -> Option<&mut Hyperparams> {
        self.entries
            .iter_mut()
            .find(|entry| entry.name == name)
            .map(|entry| &mut entry.hyperparams)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every group a routine reads exists and has an optimizer.
    ///
    /// # Returns
    /// A structural error naming the first unregistered group.
    pub fn validate(&self, networks: &Networks, optimizers: &OptimizerManager) -> Result<()> {
        for entry in &self.entries {
            for group in entry.routine.groups() {
                if !networks.contains(&group) || !optimizers.contains(&group) {
                    return Err(StructuralErr::UnregisteredGroup {
                        group,
                        routine: entry.name.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Runs every routine on `batch`, in order.
    ///
    /// # Returns
    /// The losses of every routine, or an error if two routines produce a loss for the same
    /// group or any routine fails.
    #[allow(clippy::too_many_arguments)]
    pub fn run_all(
        &self,
        batch: &Batch,
        networks: &Networks,
        results: &mut ResultSet,
        viz: &mut dyn Visualizer,
        mode: Mode,
        dims: Dims,
        step: usize,
    ) -> Result<LossSet> {
        let mut losses = LossSet::new();

        for entry in &self.entries {
            let mut ctx = RoutineCtx {
                batch,
                results: &mut *results,
                viz: &mut *viz,
                mode,
                dims,
                networks,
                losses: LossSet::new(),
                routine: &entry.name,
                measure: entry.hyperparams.measure,
            };

            entry.routine.run(&mut ctx, &entry.hyperparams)?;
            debug!(routine = entry.name.as_str(), step = step; "routine finished");

            losses.merge(ctx.losses, step)?;
        }

        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{FullyConnected, NetworkFactory, activations::ActFn},
        autograd::Var,
    };
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        TrainErr,
        config::OptimizerSettings,
        optimizer::Algorithm,
        viz::NoopVisualizer,
    };

    /// Reports the mean output of a group as its loss.
    struct MeanOutput {
        group: &'static str,
        key: &'static str,
    }

    impl Routine for MeanOutput {
        fn groups(&self) -> Vec<String> {
            vec![self.group.to_string()]
        }

        fn run(&self, ctx: &mut RoutineCtx<'_>, _hp: &Hyperparams) -> Result<()> {
            let x = ctx.batch.var("x")?;
            let net = ctx.network(self.group, 0)?;

            let loss = net.forward(&x)?.mean();
            ctx.results.insert_scalar(self.key, loss.item());
            ctx.add_loss(self.key, loss);
            Ok(())
        }
    }

    fn networks() -> Networks {
        let mut rng = StdRng::seed_from_u64(1);
        let mut networks = Networks::new();

        for name in ["discriminator", "generator"] {
            let net = FullyConnected::new([3], ActFn::Tanh)
                .build(2, 1, &mut rng)
                .unwrap();
            networks.insert(name, NetworkGroup::Single(net)).unwrap();
        }

        networks
    }

    fn batch() -> Batch {
        let mut batch = Batch::new();
        batch.insert("x", array![[0.1, 0.2], [0.3, -0.4]]).unwrap();
        batch
    }

    #[test]
    fn test_losses_of_every_routine_are_collected_in_order() {
        let networks = networks();
        let mut registry = RoutineRegistry::new();
        registry
            .register(
                "d",
                MeanOutput {
                    group: "discriminator",
                    key: "discriminator",
                },
                Hyperparams::default(),
            )
            .unwrap();
        registry
            .register(
                "g",
                MeanOutput {
                    group: "generator",
                    key: "generator",
                },
                Hyperparams {
                    measure: Measure::W,
                    ..Default::default()
                },
            )
            .unwrap();

        let mut results = ResultSet::new();
        let losses = registry
            .run_all(
                &batch(),
                &networks,
                &mut results,
                &mut NoopVisualizer,
                Mode::Train,
                Dims::default(),
                0,
            )
            .unwrap();

        let keys: Vec<&str> = losses.keys().collect();
        assert_eq!(keys, ["discriminator", "generator"]);
        assert_eq!(losses.iter().nth(1).unwrap().measure, Some(Measure::W));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_loss_key_collision_across_routines_is_structural() {
        let networks = networks();
        let mut registry = RoutineRegistry::new();

        for name in ["first", "second"] {
            registry
                .register(
                    name,
                    MeanOutput {
                        group: "discriminator",
                        key: "discriminator",
                    },
                    Hyperparams::default(),
                )
                .unwrap();
        }

        let err = registry
            .run_all(
                &batch(),
                &networks,
                &mut ResultSet::new(),
                &mut NoopVisualizer,
                Mode::Train,
                Dims::default(),
                4,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::LossKeyCollision { step: 4, .. })
        ));
    }

    #[test]
    fn test_duplicate_routine_names_are_rejected() {
        let mut registry = RoutineRegistry::new();
        let routine = || MeanOutput {
            group: "generator",
            key: "generator",
        };

        registry
            .register("gan", routine(), Hyperparams::default())
            .unwrap();

        assert!(matches!(
            registry.register("gan", routine(), Hyperparams::default()),
            Err(TrainErr::Structural(StructuralErr::DuplicateRoutine { .. }))
        ));
    }

    #[test]
    fn test_validation_requires_optimizers_for_every_group() {
        let networks = networks();
        let optimizers = OptimizerManager::setup(
            &networks,
            &OptimizerSettings::new(Algorithm::GradientDescent, 0.1),
        )
        .unwrap();

        let mut registry = RoutineRegistry::new();
        registry
            .register(
                "critic",
                MeanOutput {
                    group: "critic",
                    key: "critic",
                },
                Hyperparams::default(),
            )
            .unwrap();

        assert!(matches!(
            registry.validate(&networks, &optimizers),
            Err(TrainErr::Structural(StructuralErr::UnregisteredGroup { group, .. })) if group == "critic"
        ));
    }

    #[test]
    fn test_merge_keeps_both_sets() {
        let mut a = LossSet::new();
        a.insert("encoder", Var::scalar(1.), None);
        let mut b = LossSet::new();
        b.insert("nets", Var::scalar(2.), None);

        a.merge(b, 0).unwrap();

        assert_eq!(a.len(), 2);
        assert_eq!(a.get("nets").unwrap().item(), 2.);
    }
}
