use machine_learning::{arch::NetworkFactory, autograd::Var};
use rand::rngs::StdRng;

use crate::{
    Result,
    data::Dims,
    divergence::f_divergence,
    group::{NetworkGroup, Networks},
    penalty::apply_penalty,
    routine::{Hyperparams, Routine, RoutineCtx},
};

/// Maps `[-1, 1]` images into `[0, 1]`.
pub(crate) fn to_unit_range(x: &Var) -> ndarray::Array2<f32> {
    x.value().mapv(|v| 0.5 * (v + 1.))
}

/// Trains a generator against a discriminator on `z` noise and `images`.
///
/// Reports `g_loss`, `d_loss`, `boundary`, `real`, `fake`, `w` and, when a penalty is set,
/// `gradient penalty`.
#[derive(Debug, Clone)]
pub struct GanRoutine {
    generator: String,
    discriminator: String,
}

impl Default for GanRoutine {
    fn default() -> Self {
        Self::new("generator", "discriminator")
    }
}

impl GanRoutine {
    pub fn new(generator: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Builds both groups for the images of `dims`.
    ///
    /// # Arguments
    /// * `generator` - Builds the generator, `dim_z` wide in and one image wide out.
    /// * `discriminator` - Builds the discriminator, one image wide in and one score out.
    /// * `dims` - The dimensions of the dataset.
    /// * `dim_z` - The width of the `z` noise.
    /// * `rng` - The source of randomness for the initial parameters.
    pub fn build_networks(
        &self,
        generator: &dyn NetworkFactory,
        discriminator: &dyn NetworkFactory,
        dims: Dims,
        dim_z: usize,
        rng: &mut StdRng,
    ) -> Result<Networks> {
        let image_len = dims.image_len();
        let mut networks = Networks::new();

        networks.insert(
            self.generator.clone(),
            NetworkGroup::Single(generator.build(dim_z, image_len, rng)?),
        )?;
        networks.insert(
            self.discriminator.clone(),
            NetworkGroup::Single(discriminator.build(image_len, 1, rng)?),
        )?;

        Ok(networks)
    }
}

impl Routine for GanRoutine {
    fn groups(&self) -> Vec<String> {
        vec![self.generator.clone(), self.discriminator.clone()]
    }

    fn run(&self, ctx: &mut RoutineCtx<'_>, hp: &Hyperparams) -> Result<()> {
        let [z, x] = ctx.batch.get_batch(["z", "images"])?;

        let generator = ctx.network(&self.generator, 0)?;
        let discriminator = ctx.network(&self.discriminator, 0)?;

        let gen_out = generator.forward(&z)?.tanh();
        ctx.check_width(&self.generator, &gen_out, ctx.dims.image_len())?;

        let real_out = discriminator.forward(&x)?;
        let fake_out = discriminator.forward(&gen_out)?;

        let div = f_divergence(hp.measure, &real_out, &fake_out, hp.boundary_seek)?;
        let mut d_loss = div.d_loss;

        ctx.results.insert_scalar("g_loss", div.g_loss.item());
        ctx.results.insert_scalar("d_loss", d_loss.item());
        ctx.results.insert_scalar("boundary", div.b.mean().item());
        ctx.results.insert_scalar("real", div.r.mean().item());
        ctx.results.insert_scalar("fake", div.f.mean().item());
        ctx.results.insert_scalar("w", div.w.mean().item());

        ctx.viz.add_image("generated", &to_unit_range(&gen_out));
        ctx.viz.add_image("real", &to_unit_range(&x));

        if let Some(penalty) = hp.penalty {
            let e = ctx.batch.try_get("e").map(|e| e.view());
            let p = apply_penalty(discriminator, &x, &gen_out, hp.measure, penalty.kind, e)?;

            d_loss = d_loss.add(&p.scale(penalty.amount))?;
            ctx.results.insert_scalar("gradient penalty", p.item());
        }

        ctx.add_loss(&self.generator, div.g_loss);
        ctx.add_loss(&self.discriminator, d_loss);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{FullyConnected, NetworkFactory, activations::ActFn};
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        StructuralErr, TrainErr,
        data::{Batch, Mode, NoiseDist, NoiseVariable},
        divergence::Measure,
        group::{NetworkGroup, Networks},
        penalty::{PenaltySpec, PenaltyType},
        routine::{ResultSet, RoutineRegistry},
        viz::{Payload, RecordingVisualizer},
    };

    const IMAGES: Dims = Dims {
        width: 2,
        height: 2,
        channels: 1,
        labels: 0,
    };

    fn setup() -> (Networks, Batch) {
        let mut rng = StdRng::seed_from_u64(9);
        let mut networks = Networks::new();

        let generator = FullyConnected::new([8], ActFn::Relu)
            .build(3, 4, &mut rng)
            .unwrap();
        let discriminator = FullyConnected::new([8], ActFn::leaky_relu())
            .build(4, 1, &mut rng)
            .unwrap();

        networks
            .insert("generator", NetworkGroup::Single(generator))
            .unwrap();
        networks
            .insert("discriminator", NetworkGroup::Single(discriminator))
            .unwrap();

        (networks, batch(4, &mut rng))
    }

    fn batch(image_len: usize, rng: &mut StdRng) -> Batch {
        let mut batch = Batch::new();
        batch
            .insert("images", Array2::from_elem((5, image_len), 0.5))
            .unwrap();
        for var in [
            NoiseVariable::new("z", NoiseDist::Normal, 3),
            NoiseVariable::new("e", NoiseDist::Uniform, 1),
        ] {
            batch
                .insert(var.name.clone(), var.sample(5, rng).unwrap())
                .unwrap();
        }

        batch
    }

    fn run_with(
        networks: &Networks,
        batch: &Batch,
        dims: Dims,
        hp: Hyperparams,
    ) -> Result<(ResultSet, RecordingVisualizer, Vec<String>)> {
        let mut registry = RoutineRegistry::new();
        registry.register("gan", GanRoutine::default(), hp)?;

        let mut results = ResultSet::new();
        let mut viz = RecordingVisualizer::new();
        let losses = registry.run_all(
            batch,
            networks,
            &mut results,
            &mut viz,
            Mode::Train,
            dims,
            0,
        )?;

        let keys = losses.keys().map(str::to_string).collect();
        Ok((results, viz, keys))
    }

    fn run(hp: Hyperparams) -> (ResultSet, RecordingVisualizer, Vec<String>) {
        let (networks, batch) = setup();
        run_with(&networks, &batch, IMAGES, hp).unwrap()
    }

    #[test]
    fn test_gan_routine_reports_both_losses() {
        let (results, viz, keys) = run(Hyperparams {
            measure: Measure::ProxyGan,
            ..Default::default()
        });

        assert_eq!(keys, ["generator", "discriminator"]);
        for name in ["g_loss", "d_loss", "boundary", "real", "fake", "w"] {
            assert!(results.scalar(name).unwrap().is_finite(), "{name}");
        }
        assert!(results.get("gradient penalty").is_none());

        let Some(Payload::Image(generated)) = viz.get("generated") else {
            panic!("no generated images");
        };
        assert!(generated.iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_gan_routine_adds_penalty() {
        for kind in [PenaltyType::GradientNorm, PenaltyType::Interpolate] {
            let (results, _, _) = run(Hyperparams {
                measure: Measure::Jsd,
                penalty: Some(PenaltySpec { kind, amount: 10. }),
                ..Default::default()
            });

            assert!(results.scalar("gradient penalty").unwrap() >= 0.);
        }
    }

    #[test]
    fn test_networks_are_sized_from_dims() {
        let dims = Dims {
            width: 3,
            height: 2,
            channels: 1,
            labels: 0,
        };
        let mut rng = StdRng::seed_from_u64(4);
        let fc = FullyConnected::new([8], ActFn::leaky_relu());

        let networks = GanRoutine::default()
            .build_networks(&fc, &fc, dims, 3, &mut rng)
            .unwrap();
        let batch = batch(dims.image_len(), &mut rng);

        let (results, viz, _) = run_with(&networks, &batch, dims, Hyperparams::default()).unwrap();

        let Some(Payload::Image(generated)) = viz.get("generated") else {
            panic!("no generated images");
        };
        assert_eq!(generated.dim(), (5, 6));
        assert!(results.scalar("d_loss").unwrap().is_finite());
    }

    #[test]
    fn test_generator_narrower_than_images_is_structural() {
        let (networks, batch) = setup();
        let dims = Dims {
            width: 5,
            ..IMAGES
        };

        let err = run_with(&networks, &batch, dims, Hyperparams::default()).unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::OutputWidth {
                ref group,
                got: 4,
                expected: 10,
            }) if group == "generator"
        ));
    }
}
