use super::{Batch, Dims, Mode};
use crate::Result;

/// A source of batches.
///
/// Fetching the next batch is the only point where the training loop yields.
#[allow(async_fn_in_trait)]
pub trait DataProvider {
    /// Fetches the next batch of the current epoch.
    ///
    /// # Returns
    /// The next batch, `None` once the epoch is exhausted, or an error if it couldn't be built.
    async fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Rewinds the cursor and switches to the split of `mode`.
    fn reset(&mut self, mode: Mode);

    /// The split batches are currently drawn from.
    fn mode(&self) -> Mode;

    /// The dimensions of the dataset.
    fn dims(&self) -> Dims;
}
