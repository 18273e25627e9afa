use std::collections::BTreeMap;

use log::{debug, info, warn};
use machine_learning::{autograd::Param, optimization::Optimizer};

use crate::{
    Result, StructuralErr, TrainErr,
    config::{GroupSettings, OptimizerSettings},
    group::Networks,
    routine::{LossEntry, LossSet},
};

/// The optimizer of one network group.
pub struct OptimizerEntry {
    group: String,
    algorithm: String,
    settings: GroupSettings,
    optimizer: Box<dyn Optimizer>,
    params: Vec<Param>,
    flat_params: Vec<f32>,
    flat_grads: Vec<f32>,
    steps: usize,
}

impl OptimizerEntry {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    /// The amount of steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Backpropagates `loss` into the gradient buffer, leaving the parameters untouched.
    fn prepare(&mut self, loss: &LossEntry) -> Result<()> {
        let grads = loss.loss.backward()?;
        let wd = self.settings.weight_decay;

        self.flat_params.clear();
        self.flat_grads.clear();

        for param in &self.params {
            let value = param.value();
            self.flat_params.extend(value.iter());

            match grads.get(&param.var()) {
                Some(g) => self
                    .flat_grads
                    .extend(g.iter().zip(value.iter()).map(|(g, p)| g + wd * p)),
                None => self.flat_grads.extend(value.iter().map(|p| wd * p)),
            }
        }

        Ok(())
    }

    /// Takes one optimizer step with the prepared gradient and writes the result back.
    fn apply(&mut self) -> Result<()> {
        self.optimizer
            .update_params(&self.flat_grads, &mut self.flat_params)?;

        let mut offset = 0;
        for param in &self.params {
            let chunk = &self.flat_params[offset..offset + param.len()];
            param.update(|value| {
                value
                    .iter_mut()
                    .zip(chunk)
                    .for_each(|(v, updated)| *v = *updated);
            });
            offset += param.len();
        }

        self.steps += 1;
        Ok(())
    }
}

/// Owns one optimizer per network group and the losses waiting to be stepped.
pub struct OptimizerManager {
    entries: BTreeMap<String, OptimizerEntry>,
    pending: Vec<LossEntry>,
}

impl OptimizerManager {
    /// Builds one optimizer per group of `networks`.
    ///
    /// Gradient tracking is turned back on for every parameter, so a model restored with frozen
    /// parameters trains again.
    ///
    /// # Arguments
    /// * `networks` - The groups to train.
    /// * `settings` - The algorithm and the per group settings.
    ///
    /// # Returns
    /// The manager or a configuration error if a group has no learning rate.
    pub fn setup(networks: &Networks, settings: &OptimizerSettings) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (name, group) in networks.iter() {
            info!(group = name; "building optimizer");

            let group_settings = settings.group(name)?;
            let params = group.params();
            params.iter().for_each(|p| p.set_requires_grad(true));

            let len = params.iter().map(Param::len).sum();
            let optimizer =
                settings
                    .algorithm
                    .build(len, group_settings.learning_rate, &group_settings.options);

            info!(
                group = name,
                algorithm = settings.algorithm.name(),
                learning_rate = group_settings.learning_rate,
                weight_decay = group_settings.weight_decay,
                params = len;
                "training group"
            );

            if let Some((lo, hi)) = group_settings.clip_bounds {
                info!(group = name; "clipping parameters into [{lo}, {hi}]");
            }

            if let Some(l1) = group_settings.l1_decay {
                info!(group = name, l1_decay = l1; "l1 decay enabled");
            }

            let entry = OptimizerEntry {
                group: name.to_string(),
                algorithm: settings.algorithm.name().to_string(),
                settings: group_settings,
                optimizer,
                params,
                flat_params: Vec::with_capacity(len),
                flat_grads: Vec::with_capacity(len),
                steps: 0,
            };

            entries.insert(name.to_string(), entry);
        }

        Ok(Self {
            entries,
            pending: Vec::new(),
        })
    }

    pub fn contains(&self, group: &str) -> bool {
        self.entries.contains_key(group)
    }

    pub fn get(&self, group: &str) -> Option<&OptimizerEntry> {
        self.entries.get(group)
    }

    /// The amount of steps taken by `group`, zero for unknown groups.
    pub fn steps(&self, group: &str) -> usize {
        self.entries.get(group).map_or(0, OptimizerEntry::steps)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The groups with a loss waiting to be stepped, in the order their losses were produced.
    pub fn pending(&self) -> Vec<String> {
        self.pending.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Queues the losses of a step.
    ///
    /// Nothing is queued unless every loss names a group with an optimizer and is finite.
    ///
    /// # Arguments
    /// * `losses` - The losses of the step.
    /// * `step` - The index of the step, for error reports.
    ///
    /// # Returns
    /// A structural error for unknown groups or losses already queued, a numerical error for
    /// non-finite losses.
    pub fn submit(&mut self, losses: LossSet, step: usize) -> Result<()> {
        for entry in losses.iter() {
            if !self.contains(&entry.key) {
                return Err(StructuralErr::UnknownLossKey {
                    key: entry.key.clone(),
                }
                .into());
            }

            if self.pending.iter().any(|p| p.key == entry.key) {
                return Err(StructuralErr::LossKeyCollision {
                    key: entry.key.clone(),
                    step,
                }
                .into());
            }
        }

        if let Some(entry) = losses.iter().find(|entry| !entry.loss.is_finite()) {
            let value = entry
                .loss
                .value()
                .iter()
                .copied()
                .find(|v| !v.is_finite())
                .unwrap_or(f32::NAN);

            warn!(group = entry.key.as_str(), step = step; "non-finite loss, step aborted");

            return Err(TrainErr::Numerical {
                measure: entry.measure,
                group: entry.key.clone(),
                step,
                value,
            });
        }

        self.pending.extend(losses);
        Ok(())
    }

    /// Drops every queued loss.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Steps the optimizer of `group` on its queued loss, consuming it.
    ///
    /// # Returns
    /// A structural error if there's no queued loss for the group, which is the case when the
    /// group has already been stepped on it.
    pub fn step(&mut self, group: &str) -> Result<()> {
        let idx = self
            .pending
            .iter()
            .position(|entry| entry.key == group)
            .ok_or_else(|| StructuralErr::DoubleStep {
                group: group.to_string(),
            })?;

        let loss = self.pending.remove(idx);
        let entry = self.entry_mut(group)?;

        entry.prepare(&loss)?;
        entry.apply()?;
        debug!(group = group, step = entry.steps; "optimizer step");

        Ok(())
    }

    /// Steps, clips and decays every group with a queued loss, in the order the losses were
    /// produced.
    ///
    /// Every gradient is computed before any parameter changes, so a failing backward pass
    /// leaves every group as it was. The queue is empty afterwards either way.
    ///
    /// # Returns
    /// The stepped groups, or the first error.
    pub fn step_pending(&mut self) -> Result<Vec<String>> {
        let pending = std::mem::take(&mut self.pending);

        for loss in &pending {
            self.entry_mut(&loss.key)?.prepare(loss)?;
        }

        let mut stepped = Vec::with_capacity(pending.len());
        for loss in pending {
            let entry = self.entry_mut(&loss.key)?;
            entry.apply()?;
            debug!(group = loss.key.as_str(), step = entry.steps; "optimizer step");

            self.clip(&loss.key);
            self.l1_decay(&loss.key);
            stepped.push(loss.key);
        }

        Ok(stepped)
    }

    fn entry_mut(&mut self, group: &str) -> Result<&mut OptimizerEntry> {
        self.entries.get_mut(group).ok_or_else(|| {
            StructuralErr::UnknownLossKey {
                key: group.to_string(),
            }
            .into()
        })
    }

    /// Clips every parameter of `group` into its configured bounds, if any.
    pub fn clip(&mut self, group: &str) {
        let Some(entry) = self.entries.get(group) else {
            return;
        };

        if let Some((lo, hi)) = entry.settings.clip_bounds {
            for param in &entry.params {
                param.update(|value| value.mapv_inplace(|v| v.clamp(lo, hi)));
            }
        }
    }

    /// Shrinks every parameter of `group` towards zero by its configured L1 decay, if any.
    ///
    /// Parameters closer to zero than the decay are set to zero.
    pub fn l1_decay(&mut self, group: &str) {
        let Some(entry) = self.entries.get(group) else {
            return;
        };

        if let Some(amount) = entry.settings.l1_decay {
            for param in &entry.params {
                param.update(|value| {
                    value.mapv_inplace(|v| v.signum() * (v.abs() - amount).max(0.))
                });
            }
        }
    }
}
