use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Normal, Uniform};

use crate::{MlErr, Result};

/// Samples an array from a uniform distribution.
///
/// # Arguments
/// * `shape` - The shape of the array.
/// * `low` - The inclusive lower limit.
/// * `high` - The exclusive upper limit.
/// * `rng` - The source of randomness.
///
/// # Returns
/// An error if the range is invalid (low >= high).
pub fn uniform<R: Rng>(shape: (usize, usize), low: f32, high: f32, rng: &mut R) -> Result<Array2<f32>> {
    let distribution =
        Uniform::new(low, high).map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

    Ok(Array2::random_using(shape, distribution, rng))
}

/// Samples an array from a normal distribution.
///
/// # Returns
/// An error if `std` is negative or not finite.
pub fn normal<R: Rng>(shape: (usize, usize), mean: f32, std: f32, rng: &mut R) -> Result<Array2<f32>> {
    let distribution =
        Normal::new(mean, std).map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

    Ok(Array2::random_using(shape, distribution, rng))
}

/// Samples a `(fan_in, fan_out)` weight matrix using Xavier uniform initialization.
///
/// # Returns
/// An error if the calculated range is invalid.
pub fn xavier_uniform<R: Rng>(dim: (usize, usize), rng: &mut R) -> Result<Array2<f32>> {
    let (fan_in, fan_out) = dim;
    let range = (6. / (fan_in + fan_out) as f32).sqrt();
    uniform(dim, -range, range, rng)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_xavier_uniform_respects_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let w = xavier_uniform((10, 14), &mut rng).unwrap();
        let range = 0.5;

        assert_eq!(w.dim(), (10, 14));
        assert!(w.iter().all(|v| v.abs() <= range));
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let mut rng = StdRng::seed_from_u64(3);

        assert!(matches!(
            uniform((1, 1), 1., 1., &mut rng),
            Err(MlErr::InvalidDistribution(_))
        ));
        assert!(matches!(
            normal((1, 1), 0., -1., &mut rng),
            Err(MlErr::InvalidDistribution(_))
        ));
        assert!(xavier_uniform((0, 0), &mut rng).is_err());
    }
}
