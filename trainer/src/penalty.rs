//! Gradient penalties that keep the critic smooth.

use std::{fmt, str::FromStr};

use machine_learning::{
    arch::Network,
    autograd::{Var, enable_grad, grad},
};
use ndarray::{ArrayView2, s};

use crate::{ConfigErr, Result, StructuralErr, divergence::Measure};

/// Keeps the square root of the squared gradient norm differentiable at zero.
const NORM_EPSILON: f32 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PenaltyType {
    /// Penalizes the squared input gradient norm at real and generated samples.
    #[default]
    GradientNorm,
    /// Penalizes input gradient norms away from one, between real and generated samples.
    Interpolate,
}

impl FromStr for PenaltyType {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gradient_norm" => Ok(PenaltyType::GradientNorm),
            "interpolate" => Ok(PenaltyType::Interpolate),
            _ => Err(ConfigErr::InvalidPenaltyType(s.to_string())),
        }
    }
}

impl fmt::Display for PenaltyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PenaltyType::GradientNorm => write!(f, "gradient_norm"),
            PenaltyType::Interpolate => write!(f, "interpolate"),
        }
    }
}

/// A penalty attached to a critic routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltySpec {
    pub kind: PenaltyType,
    /// The scale of the penalty within the critic loss.
    pub amount: f32,
}

/// Differentiates `critic` at `x`, returning its scores and their per-sample squared input
/// gradient norms.
fn scores_and_sq_norms(critic: &dyn Network, x: &Var) -> Result<(Var, Var)> {
    let out = critic.forward(x)?;
    let g = grad(&out, &[x], None)?.remove(0);
    Ok((out, g.square().sum_cols()))
}

/// Computes the gradient penalty of a critic.
///
/// The inputs are detached and tracked anew, so the penalty only reaches the critic's
/// parameters, through the graph of the input gradients.
///
/// # Arguments
/// * `critic` - The network being regularized.
/// * `real` - Real samples.
/// * `fake` - Generated samples.
/// * `measure` - The divergence the critic estimates.
/// * `kind` - The penalty to compute.
/// * `e` - The uniform mixing weights, one per generated sample; required by `Interpolate`.
///
/// # Returns
/// The unscaled penalty as a `1x1` variable.
pub fn apply_penalty(
    critic: &dyn Network,
    real: &Var,
    fake: &Var,
    measure: Measure,
    kind: PenaltyType,
    e: Option<ArrayView2<f32>>,
) -> Result<Var> {
    let _guard = enable_grad();

    match kind {
        PenaltyType::GradientNorm => {
            let real = Var::leaf(real.value().clone(), true);
            let fake = Var::leaf(fake.value().clone(), true);

            let (real_out, mut g_r) = scores_and_sq_norms(critic, &real)?;
            let (fake_out, mut g_f) = scores_and_sq_norms(critic, &fake)?;

            if measure.is_bounded() {
                g_r = real_out.sigmoid().neg().shift(1.).square().mul(&g_r)?;
                g_f = fake_out.sigmoid().square().mul(&g_f)?;
            }

            Ok(g_r.mean().add(&g_f.mean())?.scale(0.5))
        }
        PenaltyType::Interpolate => {
            let e = e.ok_or(ConfigErr::MissingAuxVariable { name: "e" })?;
            let n = fake.nrows();

            if real.nrows() < n {
                return Err(StructuralErr::MisalignedBatch {
                    name: "real".to_string(),
                    got: real.nrows(),
                    expected: n,
                }
                .into());
            }

            if e.nrows() != n {
                return Err(StructuralErr::MisalignedBatch {
                    name: "e".to_string(),
                    got: e.nrows(),
                    expected: n,
                }
                .into());
            }

            let e = e.column(0).insert_axis(ndarray::Axis(1));
            let real = real.value().slice(s![..n, ..]);
            let mixed = &real * &e + fake.value() * &e.mapv(|v| 1. - v);

            let x = Var::leaf(mixed, true);
            let (_, sq_norms) = scores_and_sq_norms(critic, &x)?;

            Ok(sq_norms.shift(NORM_EPSILON).sqrt().shift(-1.).square().mean())
        }
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        MlErr,
        arch::Device,
        autograd::{Param, no_grad},
    };
    use ndarray::{Array2, array};

    use super::*;
    use crate::TrainErr;

    /// `x -> x w`
    struct Linear {
        w: Param,
    }

    impl Network for Linear {
        fn forward(&self, x: &Var) -> machine_learning::Result<Var> {
            x.matmul(&self.w.var())
        }

        fn params(&self) -> Vec<Param> {
            vec![self.w.clone()]
        }

        fn to_device(&mut self, device: Device) -> machine_learning::Result<()> {
            match device {
                Device::Cpu => Ok(()),
                _ => Err(MlErr::DeviceUnavailable { device }),
            }
        }

        fn device(&self) -> Device {
            Device::Cpu
        }
    }

    fn critic() -> Linear {
        Linear {
            w: Param::new(array![[1.], [2.]]),
        }
    }

    fn batches() -> (Var, Var) {
        let real = Var::constant(array![[1., 0.], [0., 1.], [3., 3.]]);
        let fake = Var::constant(array![[-1., 2.], [0.5, 0.5]]);
        (real, fake)
    }

    #[test]
    fn test_gradient_norm_of_linear_critic() {
        let critic = critic();
        let (real, fake) = batches();

        let p = apply_penalty(&critic, &real, &fake, Measure::W, PenaltyType::GradientNorm, None)
            .unwrap();

        assert!((p.item() - 5.).abs() < 1e-5);
    }

    #[test]
    fn test_penalty_gradient_reaches_critic_parameters() {
        let critic = critic();
        let (real, fake) = batches();

        let p = apply_penalty(&critic, &real, &fake, Measure::W, PenaltyType::GradientNorm, None)
            .unwrap();
        let grads = p.backward().unwrap();

        assert_eq!(grads.get(&critic.w.var()).unwrap(), &array![[2.], [4.]]);
    }

    #[test]
    fn test_bounded_measures_weight_the_norms() {
        let critic = critic();
        let real = Var::constant(Array2::zeros((1, 2)));
        let fake = Var::constant(Array2::zeros((1, 2)));

        // sigmoid(0) = 0.5 on both sides, so each term is weighted by 1/4
        let p = apply_penalty(&critic, &real, &fake, Measure::Jsd, PenaltyType::GradientNorm, None)
            .unwrap();

        assert!((p.item() - 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_interpolate_is_one_centered() {
        let critic = critic();
        let (real, fake) = batches();
        let e = array![[0.2], [0.9]];

        let p = apply_penalty(
            &critic,
            &real,
            &fake,
            Measure::Gan,
            PenaltyType::Interpolate,
            Some(e.view()),
        )
        .unwrap();

        let expected = (5f32.sqrt() - 1.).powi(2);
        assert!((p.item() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_interpolate_requires_uniform_variable() {
        let critic = critic();
        let (real, fake) = batches();

        let err = apply_penalty(&critic, &real, &fake, Measure::Gan, PenaltyType::Interpolate, None)
            .unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Config(ConfigErr::MissingAuxVariable { name: "e" })
        ));
    }

    #[test]
    fn test_penalty_is_computed_when_recording_is_off() {
        let critic = critic();
        let (real, fake) = batches();

        let _guard = no_grad();
        let p = apply_penalty(&critic, &real, &fake, Measure::W, PenaltyType::GradientNorm, None)
            .unwrap();

        assert!((p.item() - 5.).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_penalty_type_fails() {
        assert!(matches!(
            "spectral".parse::<PenaltyType>(),
            Err(ConfigErr::InvalidPenaltyType(_))
        ));
    }
}
