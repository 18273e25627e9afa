use std::collections::BTreeMap;

use crate::{data::Mode, routine::ResultSet};

/// What an epoch did, averaged over its batches.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub mode: Mode,
    pub batches: usize,
    /// Optimizer steps taken per group.
    pub steps: BTreeMap<String, usize>,
    /// Mean of every scalar result.
    pub results: BTreeMap<String, f32>,
    /// Mean loss per group.
    pub losses: BTreeMap<String, f32>,
}

impl EpochSummary {
    pub fn steps(&self, group: &str) -> usize {
        self.steps.get(group).copied().unwrap_or(0)
    }

    pub fn result(&self, name: &str) -> Option<f32> {
        self.results.get(name).copied()
    }

    pub fn loss(&self, group: &str) -> Option<f32> {
        self.losses.get(group).copied()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    #[inline]
    fn add(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
    }

    fn get(&self) -> f32 {
        (self.sum / self.count.max(1) as f64) as f32
    }
}

/// Running means over the batches of an epoch.
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    epoch: usize,
    mode: Mode,
    batches: usize,
    steps: BTreeMap<String, usize>,
    results: BTreeMap<String, Mean>,
    losses: BTreeMap<String, Mean>,
}

impl EpochMetrics {
    pub fn new(epoch: usize, mode: Mode) -> Self {
        Self {
            epoch,
            mode,
            batches: 0,
            steps: BTreeMap::new(),
            results: BTreeMap::new(),
            losses: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn bump_batch(&mut self) {
        self.batches += 1;
    }

    #[inline]
    pub fn bump_step(&mut self, group: &str) {
        *self.steps.entry(group.to_string()).or_default() += 1;
    }

    pub fn add_results(&mut self, results: &ResultSet) {
        for (name, value) in results.scalars() {
            self.results.entry(name.to_string()).or_default().add(value);
        }
    }

    pub fn add_loss(&mut self, group: &str, value: f32) {
        self.losses.entry(group.to_string()).or_default().add(value);
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn finish(self) -> EpochSummary {
        let means = |m: BTreeMap<String, Mean>| {
            m.into_iter()
                .map(|(name, mean)| (name, mean.get()))
                .collect()
        };

        EpochSummary {
            epoch: self.epoch,
            mode: self.mode,
            batches: self.batches,
            steps: self.steps,
            results: means(self.results),
            losses: means(self.losses),
        }
    }
}
