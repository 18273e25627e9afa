//! Adversarially learned inference over encoded features.
//!
//! An encoder maps images onto codes, a discriminator tells those codes apart from samples
//! of a shaped noise prior. With a composite `[encoder, topnet, revnet]` group, the critic
//! sees the concatenation of top level and intermediate codes instead.

use machine_learning::{arch::Network, autograd::Var};

use crate::{
    Result, StructuralErr,
    divergence::{Measure, generator_loss, negative_expectation, positive_expectation},
    group::NetworkGroup,
    noise::{NoiseType, normalize_rows, shape_noise},
    penalty::apply_penalty,
    routine::{Hyperparams, ResultSet, Routine, RoutineCtx},
    viz::Visualizer,
};

/// The codes of one batch.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Intermediate codes of the prior samples.
    pub z_p: Var,
    /// Intermediate codes of the images.
    pub z_q: Var,
    /// Top level codes of the images, for composite encoders.
    pub y_q: Option<Var>,
}

/// The critic's view of one batch.
#[derive(Debug, Clone)]
pub struct Scores {
    /// `mean(r(P))`.
    pub e_pos: Var,
    /// `mean(f(Q))`.
    pub e_neg: Var,
    pub p_samples: Var,
    pub q_samples: Var,
}

/// Squashes encoder outputs into the support of the prior.
pub(crate) fn squash(z: &Var, noise_type: NoiseType) -> Result<Var> {
    match noise_type {
        NoiseType::Hypercubes => Ok(z.sigmoid()),
        NoiseType::Unitsphere => normalize_rows(z),
        NoiseType::Unitball => Ok(z.tanh()),
    }
}

/// Encodes `x` and, for composite encoders, maps the prior samples back to intermediate codes.
///
/// # Arguments
/// * `encoder` - A single encoder or an `[encoder, topnet, revnet]` group.
/// * `x` - The images.
/// * `y_p` - The shaped prior samples.
/// * `output_nonlin` - Whether to squash the encoder output.
/// * `noise_type` - The shape of the prior.
pub fn encode(
    encoder: &NetworkGroup,
    x: &Var,
    y_p: &Var,
    output_nonlin: bool,
    noise_type: NoiseType,
) -> Result<Encoded> {
    let net = encoder.get(0).ok_or_else(|| StructuralErr::MissingInput {
        name: "encoder".to_string(),
    })?;

    let mut z_q = net.forward(x)?;
    if output_nonlin {
        z_q = squash(&z_q, noise_type)?;
    }

    let encoded = match (encoder.len(), encoder.get(1), encoder.get(2)) {
        (3, Some(topnet), Some(revnet)) => Encoded {
            y_q: Some(topnet.forward(&z_q)?),
            z_p: revnet.forward(y_p)?,
            z_q,
        },
        _ => Encoded {
            z_p: y_p.clone(),
            z_q,
            y_q: None,
        },
    };

    Ok(encoded)
}

/// The inputs of the critic, `(positive, negative)`.
pub fn critic_inputs(encoded: &Encoded, y_p: &Var) -> Result<(Var, Var)> {
    match &encoded.y_q {
        Some(y_q) => Ok((y_p.concat_cols(&encoded.z_p)?, y_q.concat_cols(&encoded.z_q)?)),
        None => Ok((encoded.z_p.clone(), encoded.z_q.clone())),
    }
}

/// Scores the prior codes as positive samples and the image codes as negative ones.
pub fn score(
    critic: &dyn Network,
    encoded: &Encoded,
    y_p: &Var,
    measure: Measure,
) -> Result<Scores> {
    let (pos, neg) = critic_inputs(encoded, y_p)?;

    let q_samples = critic.forward(&neg)?;
    let p_samples = critic.forward(&pos)?;

    Ok(Scores {
        e_pos: positive_expectation(&p_samples, measure)?.mean(),
        e_neg: negative_expectation(&q_samples, measure)?.mean(),
        p_samples,
        q_samples,
    })
}

fn report(results: &mut ResultSet, scores: &Scores, measure: Measure) {
    results.insert_scalar("Scores.Ep", scores.p_samples.mean().item());
    results.insert_scalar("Scores.Eq", scores.q_samples.mean().item());
    results.insert_scalar(
        format!("{measure} distance"),
        scores.e_pos.item() - scores.e_neg.item(),
    );
}

fn visualize(
    viz: &mut dyn Visualizer,
    encoded: &Encoded,
    scores: &Scores,
    x: &Var,
    targets: Option<&ndarray::Array2<f32>>,
) {
    match &encoded.y_q {
        Some(y_q) => {
            viz.add_scatter("intermediate values", encoded.z_q.value(), targets);
            viz.add_scatter("latent values", y_q.value(), targets);
        }
        None => viz.add_scatter("latent values", encoded.z_q.value(), targets),
    }

    viz.add_image("ground truth", x.value());
    viz.add_histogram(
        "discriminator output",
        &[
            ("fake", scores.q_samples.value().iter().copied().collect()),
            ("real", scores.p_samples.value().iter().copied().collect()),
        ],
    );
}

/// Reads `images`, the prior `y` and the radius `u`, returning the images and the shaped prior.
fn inputs(ctx: &RoutineCtx<'_>, noise_type: NoiseType) -> Result<(Var, Var)> {
    let x = ctx.batch.var("images")?;
    let y = ctx.batch.get("y")?;
    let u = ctx.batch.get("u")?;

    let y_p = shape_noise(y.view(), Some(u.view()), noise_type)?;
    Ok((x, Var::constant(y_p)))
}

/// Trains the encoder to fool the discriminator. Its loss key is the encoder group.
#[derive(Debug, Clone)]
pub struct EncoderRoutine {
    encoder: String,
    discriminator: String,
}

impl Default for EncoderRoutine {
    fn default() -> Self {
        Self::new("encoder", "discriminator")
    }
}

impl EncoderRoutine {
    pub fn new(encoder: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            encoder: encoder.into(),
            discriminator: discriminator.into(),
        }
    }
}

impl Routine for EncoderRoutine {
    fn groups(&self) -> Vec<String> {
        vec![self.encoder.clone(), self.discriminator.clone()]
    }

    fn run(&self, ctx: &mut RoutineCtx<'_>, hp: &Hyperparams) -> Result<()> {
        let (x, y_p) = inputs(ctx, hp.noise_type)?;
        let encoder = ctx.group(&self.encoder)?;
        let critic = ctx.network(&self.discriminator, 0)?;

        let encoded = encode(encoder, &x, &y_p, hp.output_nonlin, hp.noise_type)?;
        let scores = score(critic, &encoded, &y_p, hp.measure)?;

        report(ctx.results, &scores, hp.measure);
        visualize(ctx.viz, &encoded, &scores, &x, ctx.batch.try_get("targets"));

        let loss = generator_loss(&scores.q_samples, hp.measure, hp.generator_loss)?;
        ctx.add_loss(&self.encoder, loss);

        Ok(())
    }
}

/// Trains the discriminator to tell prior codes from image codes. Its loss key is the
/// discriminator group.
#[derive(Debug, Clone)]
pub struct DiscriminatorRoutine {
    encoder: String,
    discriminator: String,
}

impl Default for DiscriminatorRoutine {
    fn default() -> Self {
        Self::new("encoder", "discriminator")
    }
}

impl DiscriminatorRoutine {
    pub fn new(encoder: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            encoder: encoder.into(),
            discriminator: discriminator.into(),
        }
    }
}

impl Routine for DiscriminatorRoutine {
    fn groups(&self) -> Vec<String> {
        vec![self.encoder.clone(), self.discriminator.clone()]
    }

    fn run(&self, ctx: &mut RoutineCtx<'_>, hp: &Hyperparams) -> Result<()> {
        let (x, y_p) = inputs(ctx, hp.noise_type)?;
        let encoder = ctx.group(&self.encoder)?;
        let critic = ctx.network(&self.discriminator, 0)?;

        let encoded = encode(encoder, &x, &y_p, hp.output_nonlin, hp.noise_type)?;
        let scores = score(critic, &encoded, &y_p, hp.measure)?;

        let mut loss = scores.e_neg.sub(&scores.e_pos)?;

        if let Some(penalty) = hp.penalty {
            let (pos, neg) = critic_inputs(&encoded, &y_p)?;
            let e = ctx.batch.try_get("e").map(|e| e.view());
            let p = apply_penalty(critic, &pos, &neg, hp.measure, penalty.kind, e)?;

            loss = loss.add(&p.scale(penalty.amount))?;
            ctx.results.insert_scalar("gradient penalty", p.item());
        }

        ctx.add_loss(&self.discriminator, loss);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{FullyConnected, NetworkFactory, activations::ActFn};
    use ndarray::{Array2, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        TrainErr,
        data::{Batch, Dims, Mode, NoiseDist, inference_noise},
        group::Networks,
        penalty::{PenaltySpec, PenaltyType},
        routine::RoutineRegistry,
        viz::{NoopVisualizer, RecordingVisualizer},
    };

    const DIM_X: usize = 6;
    const DIM_NOISE: usize = 3;
    const DIM_EMBEDDING: usize = 2;

    fn fc(rng: &mut StdRng, dim_in: usize, dim_out: usize) -> Box<dyn Network> {
        FullyConnected::new([8], ActFn::Relu)
            .build(dim_in, dim_out, rng)
            .unwrap()
    }

    fn networks(use_topnet: bool) -> Networks {
        let mut rng = StdRng::seed_from_u64(21);
        let mut networks = Networks::new();

        let (encoder, dim_d) = if use_topnet {
            let group = NetworkGroup::Composite(vec![
                fc(&mut rng, DIM_X, DIM_EMBEDDING),
                fc(&mut rng, DIM_EMBEDDING, DIM_NOISE),
                fc(&mut rng, DIM_NOISE, DIM_EMBEDDING),
            ]);
            (group, DIM_NOISE + DIM_EMBEDDING)
        } else {
            (NetworkGroup::Single(fc(&mut rng, DIM_X, DIM_NOISE)), DIM_NOISE)
        };

        networks.insert("encoder", encoder).unwrap();
        networks
            .insert("discriminator", NetworkGroup::Single(fc(&mut rng, dim_d, 1)))
            .unwrap();
        networks
    }

    fn batch(noise_type: NoiseType) -> Batch {
        let mut rng = StdRng::seed_from_u64(4);
        let mut batch = Batch::new();
        batch
            .insert(
                "images",
                Array2::from_shape_fn((4, DIM_X), |(i, j)| ((i + j) % 3) as f32 - 1.),
            )
            .unwrap();

        for var in inference_noise(NoiseDist::Uniform, noise_type, DIM_NOISE) {
            batch
                .insert(var.name.clone(), var.sample(4, &mut rng).unwrap())
                .unwrap();
        }

        batch
    }

    fn run_both(use_topnet: bool, hp: Hyperparams) -> (ResultSet, Vec<String>) {
        let networks = networks(use_topnet);
        let mut registry = RoutineRegistry::new();
        registry
            .register("discriminator", DiscriminatorRoutine::default(), hp)
            .unwrap();
        registry
            .register("encoder", EncoderRoutine::default(), hp)
            .unwrap();

        let mut results = ResultSet::new();
        let losses = registry
            .run_all(
                &batch(hp.noise_type),
                &networks,
                &mut results,
                &mut NoopVisualizer,
                Mode::Train,
                Dims::default(),
                0,
            )
            .unwrap();

        (results, losses.keys().map(str::to_string).collect())
    }

    #[test]
    fn test_single_encoder_codes_are_scored_directly() {
        let networks = networks(false);
        let encoder = networks.get("encoder", "test").unwrap();
        let x = Var::constant(Array2::zeros((4, DIM_X)));
        let y_p = Var::constant(Array2::ones((4, DIM_NOISE)));

        let encoded = encode(encoder, &x, &y_p, true, NoiseType::Unitsphere).unwrap();

        assert!(encoded.y_q.is_none());
        assert_eq!(encoded.z_p.value(), y_p.value());
        for row in encoded.z_q.value().rows() {
            assert!(row.dot(&row).sqrt() <= 1.);
        }
    }

    #[test]
    fn test_composite_encoder_concatenates_codes() {
        let networks = networks(true);
        let encoder = networks.get("encoder", "test").unwrap();
        let x = Var::constant(Array2::zeros((4, DIM_X)));
        let y_p = Var::constant(Array2::ones((4, DIM_NOISE)));

        let encoded = encode(encoder, &x, &y_p, false, NoiseType::Hypercubes).unwrap();
        let (pos, neg) = critic_inputs(&encoded, &y_p).unwrap();

        assert_eq!(encoded.y_q.as_ref().unwrap().shape(), (4, DIM_NOISE));
        assert_eq!(encoded.z_p.shape(), (4, DIM_EMBEDDING));
        assert_eq!(pos.shape(), (4, DIM_NOISE + DIM_EMBEDDING));
        assert_eq!(neg.shape(), (4, DIM_NOISE + DIM_EMBEDDING));
    }

    #[test]
    fn test_both_routines_produce_their_losses() {
        for use_topnet in [false, true] {
            let hp = Hyperparams {
                measure: Measure::Jsd,
                noise_type: NoiseType::Unitball,
                penalty: Some(PenaltySpec {
                    kind: PenaltyType::GradientNorm,
                    amount: 1.,
                }),
                ..Default::default()
            };

            let (results, keys) = run_both(use_topnet, hp);

            assert_eq!(keys, ["discriminator", "encoder"]);
            assert!(results.scalar("jsd distance").unwrap().is_finite());
            assert!(results.scalar("Scores.Ep").is_some());
            assert!(results.scalar("gradient penalty").unwrap() >= 0.);
        }
    }

    #[test]
    fn test_encoder_routine_visualizes_codes() {
        let networks = networks(false);
        let mut registry = RoutineRegistry::new();
        registry
            .register("encoder", EncoderRoutine::default(), Hyperparams::default())
            .unwrap();

        let mut b = batch(NoiseType::Hypercubes);
        b.insert("targets", array![[1., 0.], [0., 1.], [1., 0.], [0., 1.]])
            .unwrap();

        let mut viz = RecordingVisualizer::new();
        registry
            .run_all(
                &b,
                &networks,
                &mut ResultSet::new(),
                &mut viz,
                Mode::Test,
                Dims::default(),
                0,
            )
            .unwrap();

        let names: Vec<&str> = viz.names().collect();
        assert_eq!(
            names,
            ["discriminator output", "ground truth", "latent values"]
        );
    }

    #[test]
    fn test_missing_radius_is_structural() {
        let networks = networks(false);
        let mut registry = RoutineRegistry::new();
        registry
            .register(
                "discriminator",
                DiscriminatorRoutine::default(),
                Hyperparams::default(),
            )
            .unwrap();

        let mut b = Batch::new();
        b.insert("images", Array2::zeros((2, DIM_X))).unwrap();
        b.insert("y", Array2::zeros((2, DIM_NOISE))).unwrap();

        let err = registry
            .run_all(
                &b,
                &networks,
                &mut ResultSet::new(),
                &mut NoopVisualizer,
                Mode::Train,
                Dims::default(),
                0,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::MissingInput { name }) if name == "u"
        ));
    }
}
