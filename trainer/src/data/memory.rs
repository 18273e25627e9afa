use rand::{SeedableRng, rngs::StdRng};
use tokio::task;

use super::{Batch, DataProvider, Dims, Mode, NoiseVariable};
use crate::{Result, config::DataConfig};

/// Serves batches out of datasets held in memory, with freshly sampled noise variables.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    train: Batch,
    test: Batch,
    dims: Dims,
    cfg: DataConfig,
    noise: Vec<NoiseVariable>,
    rng: StdRng,
    mode: Mode,
    cursor: usize,
}

impl InMemoryProvider {
    /// Creates a new `InMemoryProvider` positioned at the start of the training split.
    ///
    /// # Arguments
    /// * `train` - Every training sample, as one batch.
    /// * `test` - Every evaluation sample, as one batch.
    /// * `dims` - The dimensions of the samples.
    /// * `cfg` - Batch sizes and the noise seed.
    pub fn new(train: Batch, test: Batch, dims: Dims, cfg: DataConfig) -> Self {
        Self {
            train,
            test,
            dims,
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            noise: Vec::new(),
            mode: Mode::Train,
            cursor: 0,
        }
    }

    /// Adds noise variables to every batch.
    pub fn with_noise<I>(mut self, noise: I) -> Self
    where
        I: IntoIterator<Item = NoiseVariable>,
    {
        self.noise.extend(noise);
        self
    }

    pub fn noise(&self) -> &[NoiseVariable] {
        &self.noise
    }

    fn split(&self) -> &Batch {
        match self.mode {
            Mode::Train => &self.train,
            Mode::Test => &self.test,
        }
    }

    fn batch_size(&self) -> usize {
        match self.mode {
            Mode::Train => self.cfg.batch_size.train.get(),
            Mode::Test => self.cfg.batch_size.test.get(),
        }
    }

    /// The amount of batches one epoch of the current split yields.
    pub fn batches_per_epoch(&self) -> usize {
        let rows = self.split().rows();
        let size = self.batch_size();

        if self.cfg.skip_last_batch {
            rows / size
        } else {
            rows.div_ceil(size)
        }
    }
}

impl DataProvider for InMemoryProvider {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        task::yield_now().await;

        let rows = self.split().rows();
        let size = self.batch_size();

        if self.cursor >= rows {
            return Ok(None);
        }

        let end = (self.cursor + size).min(rows);
        if self.cfg.skip_last_batch && end - self.cursor < size {
            self.cursor = rows;
            return Ok(None);
        }

        let mut batch = self.split().select_rows(self.cursor, end);
        self.cursor = end;

        for var in &self.noise {
            let sample = var.sample(batch.rows(), &mut self.rng)?;
            batch.insert(var.name.clone(), sample)?;
        }

        Ok(Some(batch))
    }

    fn reset(&mut self, mode: Mode) {
        self.mode = mode;
        self.cursor = 0;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn dims(&self) -> Dims {
        self.dims
    }
}
