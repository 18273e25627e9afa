use machine_learning::arch::{
    NetworkFactory,
    loss::{CrossEntropy, LossFn, Mse},
};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;

use super::{featnet::squash, gan::to_unit_range};
use crate::{
    Result,
    data::Dims,
    group::NetworkGroup,
    routine::{Hyperparams, Routine, RoutineCtx},
};

/// Fraction of rows whose largest logit matches the one-hot target.
fn accuracy(logits: &Array2<f32>, targets: &Array2<f32>) -> f32 {
    let argmax = |row: ndarray::ArrayView1<f32>| {
        row.iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 { (i, v) } else { best }
            })
            .0
    };

    let hits = logits
        .axis_iter(Axis(0))
        .zip(targets.axis_iter(Axis(0)))
        .filter(|(l, t)| argmax(l.view()) == argmax(t.view()))
        .count();

    hits as f32 / logits.nrows().max(1) as f32
}

/// Trains networks that read the encoder's codes without training the encoder.
///
/// The first member of the group decodes the codes back into images; an optional second
/// member classifies them against the one-hot `targets`. The loss key is the group itself.
#[derive(Debug, Clone)]
pub struct AuxiliaryRoutine {
    encoder: String,
    nets: String,
}

impl Default for AuxiliaryRoutine {
    fn default() -> Self {
        Self::new("encoder", "nets")
    }
}

impl AuxiliaryRoutine {
    pub fn new(encoder: impl Into<String>, nets: impl Into<String>) -> Self {
        Self {
            encoder: encoder.into(),
            nets: nets.into(),
        }
    }

    /// Builds the decoder, and a classifier when `dims` is labeled, both reading `dim_code` wide
    /// codes.
    pub fn build_nets(
        &self,
        factory: &dyn NetworkFactory,
        dims: Dims,
        dim_code: usize,
        rng: &mut StdRng,
    ) -> Result<NetworkGroup> {
        let decoder = factory.build(dim_code, dims.image_len(), rng)?;
        if dims.labels == 0 {
            return Ok(NetworkGroup::Single(decoder));
        }

        let classifier = factory.build(dim_code, dims.labels, rng)?;
        Ok(NetworkGroup::Composite(vec![decoder, classifier]))
    }
}

impl Routine for AuxiliaryRoutine {
    fn groups(&self) -> Vec<String> {
        vec![self.encoder.clone(), self.nets.clone()]
    }

    fn run(&self, ctx: &mut RoutineCtx<'_>, hp: &Hyperparams) -> Result<()> {
        let x = ctx.batch.var("images")?;
        let encoder = ctx.network(&self.encoder, 0)?;
        let decoder = ctx.network(&self.nets, 0)?;

        let mut z_q = encoder.forward(&x)?;
        if hp.output_nonlin {
            z_q = squash(&z_q, hp.noise_type)?;
        }
        let z_q = z_q.detach();

        let x_hat = decoder.forward(&z_q)?;
        ctx.check_width(&self.nets, &x_hat, ctx.dims.image_len())?;
        let reconstruction = Mse.loss(&x_hat, &x)?;

        ctx.results
            .insert_scalar("reconstruction loss", reconstruction.item());
        ctx.viz.add_image("reconstruction", &to_unit_range(&x_hat.clamp(-1., 1.)));

        let mut loss = reconstruction;

        if let Some(classifier) = ctx.group(&self.nets)?.get(1) {
            let targets = ctx.batch.var("targets")?;
            let logits = classifier.forward(&z_q)?;
            ctx.check_width(&self.nets, &logits, ctx.dims.labels)?;
            let ce = CrossEntropy.loss(&logits, &targets)?;

            ctx.results.insert_scalar("classifier loss", ce.item());
            ctx.results
                .insert_scalar("accuracy", accuracy(logits.value(), targets.value()));

            loss = loss.add(&ce)?;
        }

        ctx.add_loss(&self.nets, loss);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{FullyConnected, NetworkFactory, activations::ActFn};
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        StructuralErr, TrainErr,
        data::{Batch, Mode},
        group::{NetworkGroup, Networks},
        routine::{ResultSet, RoutineRegistry},
        viz::NoopVisualizer,
    };

    fn networks(classify: bool) -> Networks {
        let mut rng = StdRng::seed_from_u64(8);
        let fc = FullyConnected::new([4], ActFn::Relu);
        let mut networks = Networks::new();

        let encoder = fc.build(4, 2, &mut rng).unwrap();
        let decoder = fc.build(2, 4, &mut rng).unwrap();

        let nets = if classify {
            NetworkGroup::Composite(vec![decoder, fc.build(2, 3, &mut rng).unwrap()])
        } else {
            NetworkGroup::Single(decoder)
        };

        networks
            .insert("encoder", NetworkGroup::Single(encoder))
            .unwrap();
        networks.insert("nets", nets).unwrap();
        networks
    }

    fn batch() -> Batch {
        let mut batch = Batch::new();
        batch
            .insert("images", array![[0.1, -0.2, 0.3, 0.], [0.5, 0.5, -0.5, 1.]])
            .unwrap();
        batch
            .insert("targets", array![[1., 0., 0.], [0., 0., 1.]])
            .unwrap();
        batch
    }

    fn dims(labels: usize) -> Dims {
        Dims {
            width: 4,
            height: 1,
            channels: 1,
            labels,
        }
    }

    fn run_with(networks: &Networks, dims: Dims) -> Result<(ResultSet, Vec<String>)> {
        let mut registry = RoutineRegistry::new();
        registry.register("nets", AuxiliaryRoutine::default(), Hyperparams::default())?;

        let mut results = ResultSet::new();
        let losses = registry.run_all(
            &batch(),
            networks,
            &mut results,
            &mut NoopVisualizer,
            Mode::Train,
            dims,
            0,
        )?;

        Ok((results, losses.keys().map(str::to_string).collect()))
    }

    fn run(classify: bool) -> (ResultSet, Vec<String>) {
        let labels = if classify { 3 } else { 0 };
        run_with(&networks(classify), dims(labels)).unwrap()
    }

    #[test]
    fn test_decoder_only() {
        let (results, keys) = run(false);

        assert_eq!(keys, ["nets"]);
        assert!(results.scalar("reconstruction loss").unwrap() >= 0.);
        assert!(results.scalar("accuracy").is_none());
    }

    #[test]
    fn test_classifier_reports_accuracy() {
        let (results, _) = run(true);

        let acc = results.scalar("accuracy").unwrap();
        assert!((0. ..=1.).contains(&acc));
        assert!(results.scalar("classifier loss").unwrap() > 0.);
    }

    #[test]
    fn test_accuracy_counts_argmax_hits() {
        let logits = array![[2., 1.], [0., 3.], [5., -1.]];
        let targets = array![[1., 0.], [1., 0.], [1., 0.]];

        assert!((accuracy(&logits, &targets) - 2. / 3.).abs() < 1e-6);
    }

    #[test]
    fn test_nets_are_sized_from_dims() {
        let mut rng = StdRng::seed_from_u64(2);
        let fc = FullyConnected::new([4], ActFn::Relu);
        let routine = AuxiliaryRoutine::default();

        let unlabeled = routine.build_nets(&fc, dims(0), 2, &mut rng).unwrap();
        assert_eq!(unlabeled.len(), 1);

        let nets = routine.build_nets(&fc, dims(3), 2, &mut rng).unwrap();
        assert_eq!(nets.len(), 2);

        let mut networks = Networks::new();
        networks
            .insert("encoder", NetworkGroup::Single(fc.build(4, 2, &mut rng).unwrap()))
            .unwrap();
        networks.insert("nets", nets).unwrap();

        let (results, _) = run_with(&networks, dims(3)).unwrap();
        assert!(results.scalar("classifier loss").is_some());
    }

    #[test]
    fn test_classifier_wider_than_labels_is_structural() {
        let err = run_with(&networks(true), dims(2)).unwrap_err();

        assert!(matches!(
            err,
            TrainErr::Structural(StructuralErr::OutputWidth {
                got: 3,
                expected: 2,
                ..
            })
        ));
    }
}
