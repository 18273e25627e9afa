use std::{collections::BTreeMap, fmt};

use machine_learning::autograd::Var;
use ndarray::{Array2, s};

use crate::{Result, StructuralErr};

/// Whether the model is being trained or evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Train,
    Test,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Test => write!(f, "test"),
        }
    }
}

/// Dimensions of the dataset, computed once and handed to every factory and routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dims {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// The amount of distinct labels, zero if the dataset is unlabeled.
    pub labels: usize,
}

impl Dims {
    /// The flattened length of one image.
    pub fn image_len(&self) -> usize {
        self.width * self.height * self.channels
    }
}

/// Named, row-aligned inputs of one step.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    inputs: BTreeMap<String, Array2<f32>>,
    rows: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input, replacing any previous one with the same name.
    ///
    /// # Returns
    /// An error if `value` doesn't have as many rows as the inputs already in the batch.
    pub fn insert(&mut self, name: impl Into<String>, value: Array2<f32>) -> Result<()> {
        let name = name.into();

        if !self.inputs.is_empty() && value.nrows() != self.rows {
            return Err(StructuralErr::MisalignedBatch {
                name,
                got: value.nrows(),
                expected: self.rows,
            }
            .into());
        }

        self.rows = value.nrows();
        self.inputs.insert(name, value);
        Ok(())
    }

    /// The amount of samples in the batch.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Returns the input `name`.
    ///
    /// # Returns
    /// The input or a structural error if the batch has no such input.
    pub fn get(&self, name: &str) -> Result<&Array2<f32>> {
        self.inputs.get(name).ok_or_else(|| {
            StructuralErr::MissingInput {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn try_get(&self, name: &str) -> Option<&Array2<f32>> {
        self.inputs.get(name)
    }

    /// Copies the samples in `start..end` of every input into a new batch.
    pub fn select_rows(&self, start: usize, end: usize) -> Batch {
        let end = end.min(self.rows);
        let start = start.min(end);

        let inputs = self
            .inputs
            .iter()
            .map(|(name, value)| (name.clone(), value.slice(s![start..end, ..]).to_owned()))
            .collect();

        Batch {
            inputs,
            rows: end - start,
        }
    }

    /// Returns the input `name` as an untracked variable.
    pub fn var(&self, name: &str) -> Result<Var> {
        self.get(name).map(|value| Var::constant(value.clone()))
    }

    /// Returns several inputs at once, in request order.
    ///
    /// # Returns
    /// The aligned inputs or an error naming the first missing one.
    pub fn get_batch<const N: usize>(&self, names: [&str; N]) -> Result<[Var; N]> {
        for name in names {
            self.get(name)?;
        }

        Ok(names.map(|name| Var::constant(self.inputs.get(name).cloned().unwrap_or_default())))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::TrainErr;

    #[test]
    fn test_get_batch_returns_inputs_in_request_order() {
        let mut batch = Batch::new();
        batch.insert("images", array![[1., 2.], [3., 4.]]).unwrap();
        batch.insert("z", array![[9.], [8.]]).unwrap();

        let [z, x] = batch.get_batch(["z", "images"]).unwrap();

        assert_eq!(z.value(), &array![[9.], [8.]]);
        assert_eq!(x.shape(), (2, 2));
        assert_eq!(batch.rows(), 2);
    }

    #[test]
    fn test_missing_input_is_structural() {
        let mut batch = Batch::new();
        batch.insert("images", array![[1.]]).unwrap();

        let err = batch.get_batch(["images", "u"]).unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::MissingInput { name }) if name == "u"
        ));
    }

    #[test]
    fn test_select_rows_slices_every_input() {
        let mut batch = Batch::new();
        batch.insert("images", array![[1.], [2.], [3.]]).unwrap();
        batch.insert("targets", array![[0.], [1.], [0.]]).unwrap();

        let tail = batch.select_rows(1, 10);

        assert_eq!(tail.rows(), 2);
        assert_eq!(tail.get("images").unwrap(), &array![[2.], [3.]]);
        assert_eq!(tail.get("targets").unwrap(), &array![[1.], [0.]]);
    }

    #[test]
    fn test_inputs_must_be_aligned() {
        let mut batch = Batch::new();
        batch.insert("images", array![[1.], [2.]]).unwrap();

        assert!(matches!(
            batch.insert("z", array![[1.]]),
            Err(TrainErr::Structural(StructuralErr::MisalignedBatch { got: 1, expected: 2, .. }))
        ));
    }
}
