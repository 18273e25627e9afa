use std::fmt;

use log::{debug, info, warn};
use machine_learning::autograd::no_grad;

use crate::{
    Result, StructuralErr,
    config::TrainConfig,
    context::TrainingContext,
    data::{Batch, DataProvider, Mode},
    metrics::{EpochMetrics, EpochSummary},
    routine::ResultSet,
    viz::Visualizer,
};

/// Where a training loop stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Complete,
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Complete => "complete",
            LoopState::Failed => "failed",
        };

        write!(f, "{s}")
    }
}

/// Persists the model every few epochs.
pub trait Archiver {
    /// Called after `epoch` epochs have been trained and evaluated.
    fn archive(&mut self, epoch: usize, ctx: &TrainingContext) -> Result<()>;
}

/// An archiver that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArchiver;

impl Archiver for NoopArchiver {
    fn archive(&mut self, _epoch: usize, _ctx: &TrainingContext) -> Result<()> {
        Ok(())
    }
}

/// Drives the routines of a `TrainingContext` over the batches of a `DataProvider`.
pub struct TrainingLoop<P: DataProvider, V: Visualizer> {
    ctx: TrainingContext,
    provider: P,
    viz: V,
    state: LoopState,
    epoch: usize,
    step: usize,
}

impl<P: DataProvider, V: Visualizer> TrainingLoop<P, V> {
    /// Creates a new idle `TrainingLoop`.
    ///
    /// # Arguments
    /// * `ctx` - The networks, optimizers and routines to drive.
    /// * `provider` - Where batches come from.
    /// * `viz` - Where routines send their payloads.
    pub fn new(ctx: TrainingContext, provider: P, viz: V) -> Self {
        Self {
            ctx,
            provider,
            viz,
            state: LoopState::Idle,
            epoch: 0,
            step: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn context(&self) -> &TrainingContext {
        &self.ctx
    }

    pub fn viz(&self) -> &V {
        &self.viz
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The amount of epochs `train` has completed.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// The amount of training steps completed.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn into_context(self) -> TrainingContext {
        self.ctx
    }

    /// Runs one epoch over the split of `mode`.
    ///
    /// In `Train` mode every group with a loss is stepped, clipped and decayed once per batch.
    /// In `Test` mode the routines run without gradient tracking and nothing is stepped.
    ///
    /// A failing step applies nothing: losses are checked before they are queued and every
    /// gradient is computed before any group is updated. Steps before it in the epoch stay
    /// applied.
    ///
    /// # Returns
    /// The summary of the epoch, or the first error. Any error leaves the loop `Failed`, after
    /// which every call fails.
    pub async fn run_epoch(&mut self, mode: Mode) -> Result<EpochSummary> {
        if self.state == LoopState::Failed {
            return Err(StructuralErr::InvalidState {
                state: "failed",
                action: "run an epoch",
            }
            .into());
        }

        self.state = LoopState::Running;

        match self.epoch_inner(mode).await {
            Ok(summary) => {
                self.state = LoopState::Complete;
                Ok(summary)
            }
            Err(e) => {
                self.state = LoopState::Failed;
                self.ctx.optimizers.clear_pending();
                warn!(epoch = self.epoch, step = self.step; "{mode} epoch failed: {e}");
                Err(e)
            }
        }
    }

    /// Trains for `cfg.epochs` epochs, evaluating after each one and archiving every
    /// `cfg.archive_every` epochs.
    ///
    /// # Returns
    /// The summaries of every epoch, train and test interleaved.
    pub async fn train<A: Archiver>(
        &mut self,
        cfg: &TrainConfig,
        archiver: &mut A,
    ) -> Result<Vec<EpochSummary>> {
        let mut summaries = Vec::with_capacity(cfg.epochs * 2);

        for _ in 0..cfg.epochs {
            summaries.push(self.run_epoch(Mode::Train).await?);
            summaries.push(self.run_epoch(Mode::Test).await?);
            self.epoch += 1;

            if cfg.archive_every > 0 && self.epoch.is_multiple_of(cfg.archive_every) {
                archiver.archive(self.epoch, &self.ctx)?;
                info!(epoch = self.epoch; "archived model");
            }
        }

        Ok(summaries)
    }

    async fn epoch_inner(&mut self, mode: Mode) -> Result<EpochSummary> {
        self.provider.reset(mode);
        let mut metrics = EpochMetrics::new(self.epoch, mode);

        while let Some(batch) = self.provider.next_batch().await? {
            match mode {
                Mode::Train => self.train_step(&batch, &mut metrics)?,
                Mode::Test => self.eval_step(&batch, &mut metrics)?,
            }
            metrics.bump_batch();
        }

        let summary = metrics.finish();
        info!(
            epoch = summary.epoch,
            batches = summary.batches;
            "{mode} epoch complete"
        );

        Ok(summary)
    }

    fn train_step(&mut self, batch: &Batch, metrics: &mut EpochMetrics) -> Result<()> {
        let mut results = ResultSet::new();
        let losses = self.ctx.routines.run_all(
            batch,
            &self.ctx.networks,
            &mut results,
            &mut self.viz,
            Mode::Train,
            self.provider.dims(),
            self.step,
        )?;

        let values: Vec<_> = losses
            .iter()
            .map(|entry| (entry.key.clone(), entry.loss.item()))
            .collect();

        self.ctx.optimizers.submit(losses, self.step)?;

        for group in self.ctx.optimizers.step_pending()? {
            metrics.bump_step(&group);
        }

        for (group, value) in values {
            metrics.add_loss(&group, value);
        }
        metrics.add_results(&results);

        debug!(step = self.step; "training step done");
        self.step += 1;

        Ok(())
    }

    fn eval_step(&mut self, batch: &Batch, metrics: &mut EpochMetrics) -> Result<()> {
        let _guard = no_grad();

        let mut results = ResultSet::new();
        let losses = self.ctx.routines.run_all(
            batch,
            &self.ctx.networks,
            &mut results,
            &mut self.viz,
            Mode::Test,
            self.provider.dims(),
            self.step,
        )?;

        for entry in losses.iter() {
            metrics.add_loss(&entry.key, entry.loss.item());
        }
        metrics.add_results(&results);

        Ok(())
    }
}
