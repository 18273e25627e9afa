//! The f-divergence family of adversarial losses.
//!
//! Every measure maps critic scores through a pair of transforms: `r` for scores of real
//! (positive) samples and `f` for scores of generated (negative) samples. The critic minimizes
//! `mean(f) - mean(r)`, the generator plays against it.

use std::{f32::consts::LN_2, fmt, str::FromStr};

use machine_learning::autograd::Var;

use crate::{ConfigErr, Result};

/// Scores are clamped into `[-MAX_EXPONENT, MAX_EXPONENT]` before exponentiating.
pub const MAX_EXPONENT: f32 = 50.;

/// Guards the reciprocal in the chi-squared importance weights.
pub const WEIGHT_EPSILON: f32 = 1e-6;

/// A divergence between the real and generated distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Gan,
    Jsd,
    /// Pearson chi-squared.
    Xs,
    Kl,
    /// Reverse KL.
    Rkl,
    /// Donsker-Varadhan.
    Dv,
    /// Squared Hellinger.
    Sh,
    /// Wasserstein.
    W,
    /// The GAN measure with the non-saturating generator loss.
    ProxyGan,
}

impl Measure {
    pub const ALL: [Measure; 9] = [
        Measure::Gan,
        Measure::Jsd,
        Measure::Xs,
        Measure::Kl,
        Measure::Rkl,
        Measure::Dv,
        Measure::Sh,
        Measure::W,
        Measure::ProxyGan,
    ];

    /// Whether the critic output of this measure goes through a sigmoid, which the gradient
    /// penalty takes into account.
    pub fn is_bounded(&self) -> bool {
        matches!(self, Measure::Gan | Measure::ProxyGan | Measure::Jsd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Measure::Gan => "gan",
            Measure::Jsd => "jsd",
            Measure::Xs => "xs",
            Measure::Kl => "kl",
            Measure::Rkl => "rkl",
            Measure::Dv => "dv",
            Measure::Sh => "sh",
            Measure::W => "w",
            Measure::ProxyGan => "proxy_gan",
        }
    }
}

impl FromStr for Measure {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Measure::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| ConfigErr::InvalidMeasure(s.to_string()))
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a generator (or encoder) is trained against the critic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorLossType {
    /// `-mean(f(Q))`, the negated critic objective.
    #[default]
    Minimax,
    /// `-mean(r(Q))`, pushing generated scores towards the real side.
    NonSaturating,
    /// `mean(b(Q))`, pulling generated scores towards the decision boundary.
    BoundarySeek,
}

impl FromStr for GeneratorLossType {
    type Err = ConfigErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "minimax" => Ok(GeneratorLossType::Minimax),
            "non_saturating" => Ok(GeneratorLossType::NonSaturating),
            "boundary_seek" => Ok(GeneratorLossType::BoundarySeek),
            _ => Err(ConfigErr::InvalidGeneratorLoss(s.to_string())),
        }
    }
}

/// The losses and diagnostics of one critic evaluation.
#[derive(Debug, Clone)]
pub struct Divergence {
    /// The critic loss, `mean(f) - mean(r)`.
    pub d_loss: Var,
    /// The generator loss.
    pub g_loss: Var,
    /// The transformed real scores.
    pub r: Var,
    /// The transformed generated scores.
    pub f: Var,
    /// Importance weights of the generated samples.
    pub w: Var,
    /// Distance of the generated scores to the decision boundary.
    pub b: Var,
}

fn safe_exp(x: &Var) -> Var {
    x.clamp(-MAX_EXPONENT, MAX_EXPONENT).exp()
}

/// `log(mean(exp(x)))` over every element, broadcast back to the shape of `x`.
///
/// The maximum is subtracted before exponentiating and added back after the log.
fn log_mean_exp(x: &Var) -> Result<Var> {
    let max = x.value().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let max = if max.is_finite() { max } else { 0. };

    let lme = x.shift(-max).exp().mean().ln().shift(max);
    Ok(lme.broadcast(x.shape())?)
}

/// Transforms the scores of real samples, element-wise.
pub fn positive_expectation(p: &Var, measure: Measure) -> Result<Var> {
    let r = match measure {
        Measure::Gan | Measure::ProxyGan => p.neg().softplus().neg(),
        Measure::Jsd => p.neg().softplus().neg().shift(LN_2),
        Measure::Xs => p.square(),
        Measure::Kl => p.shift(1.),
        Measure::Rkl => safe_exp(&p.neg()).neg(),
        Measure::Dv | Measure::W => p.clone(),
        Measure::Sh => safe_exp(&p.neg()).neg().shift(1.),
    };

    Ok(r)
}

/// Transforms the scores of generated samples, element-wise.
///
/// `dv` is the exception: every element holds the Donsker-Varadhan term
/// `log(mean(exp(q)))` of the whole batch, computed with the max-shifted log-mean-exp rather
/// than by exponentiating the scores directly.
pub fn negative_expectation(q: &Var, measure: Measure) -> Result<Var> {
    let f = match measure {
        Measure::Gan | Measure::ProxyGan => q.neg().softplus().add(q)?,
        Measure::Jsd => q.neg().softplus().add(q)?.shift(LN_2),
        Measure::Xs => q.abs().shift(1.).square().scale(-0.5),
        Measure::Kl => safe_exp(q),
        Measure::Rkl => q.shift(-1.),
        Measure::Dv => log_mean_exp(q)?,
        Measure::Sh => safe_exp(q).shift(-1.),
        Measure::W => q.clone(),
    };

    Ok(f)
}

fn importance_weights(q: &Var, measure: Measure) -> Var {
    match measure {
        Measure::Xs => q.abs().shift(WEIGHT_EPSILON).recip().neg().shift(1.).scale(0.5),
        Measure::W => q.clone(),
        _ => safe_exp(q),
    }
}

fn boundary(q: &Var, measure: Measure) -> Var {
    match measure {
        Measure::Xs => q.scale(0.5).square(),
        Measure::W => Var::zeros(q.shape()),
        _ => q.square(),
    }
}

/// The generator loss of `loss_type` given the critic scores of generated samples.
pub fn generator_loss(q: &Var, measure: Measure, loss_type: GeneratorLossType) -> Result<Var> {
    let loss = match loss_type {
        GeneratorLossType::Minimax => negative_expectation(q, measure)?.mean().neg(),
        GeneratorLossType::NonSaturating => positive_expectation(q, measure)?.mean().neg(),
        GeneratorLossType::BoundarySeek => boundary(q, measure).mean(),
    };

    Ok(loss)
}

/// Computes the adversarial losses of a critic evaluation.
///
/// # Arguments
/// * `measure` - The divergence to estimate.
/// * `real_out` - The critic scores of real samples.
/// * `fake_out` - The critic scores of generated samples.
/// * `boundary_seek` - Whether the generator loss pulls towards the decision boundary.
///
/// # Returns
/// The critic and generator losses with the per-sample diagnostics they are built from.
pub fn f_divergence(
    measure: Measure,
    real_out: &Var,
    fake_out: &Var,
    boundary_seek: bool,
) -> Result<Divergence> {
    let r = positive_expectation(real_out, measure)?;
    let f = negative_expectation(fake_out, measure)?;
    let w = importance_weights(fake_out, measure);
    let b = boundary(fake_out, measure);

    let d_loss = f.mean().sub(&r.mean())?;

    let g_loss = if boundary_seek {
        b.mean()
    } else if measure == Measure::ProxyGan {
        fake_out.neg().softplus().mean()
    } else {
        f.mean().neg()
    };

    Ok(Divergence {
        d_loss,
        g_loss,
        r,
        f,
        w,
        b,
    })
}
