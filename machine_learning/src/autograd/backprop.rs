use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use super::{
    mode::{enable_grad, no_grad},
    var::Var,
};
use crate::{MlErr, Result};

/// Detached gradients of a scalar with respect to the graph leaves it depends on.
#[derive(Debug, Default)]
pub struct Gradients(HashMap<usize, Array2<f32>>);

impl Gradients {
    /// Returns the gradient accumulated for `var`, if it took part in the graph.
    pub fn get(&self, var: &Var) -> Option<&Array2<f32>> {
        self.0.get(&var.id())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Orders the tracked nodes reachable from `root` so that every node comes after its operands.
fn topological_order(root: &Var) -> Vec<Var> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((var, expanded)) = stack.pop() {
        if expanded {
            order.push(var);
            continue;
        }

        if !var.requires_grad() || !visited.insert(var.id()) {
            continue;
        }

        stack.push((var.clone(), true));
        for parent in var.op().parents() {
            if parent.requires_grad() && !visited.contains(&parent.id()) {
                stack.push((parent.clone(), false));
            }
        }
    }

    order
}

/// Propagates `seed` (the gradient of `root`) back through the graph.
fn propagate(root: &Var, seed: Var) -> Result<HashMap<usize, Var>> {
    let mut grads = HashMap::new();
    grads.insert(root.id(), seed);

    for node in topological_order(root).iter().rev() {
        let Some(g) = grads.get(&node.id()).cloned() else {
            continue;
        };

        for (parent, pg) in node.op().backward(node, &g)? {
            if !parent.requires_grad() {
                continue;
            }

            let acc = match grads.remove(&parent.id()) {
                Some(prev) => prev.add(&pg)?,
                None => pg,
            };
            grads.insert(parent.id(), acc);
        }
    }

    Ok(grads)
}

impl Var {
    /// Computes the gradient of this scalar with respect to every tracked leaf.
    ///
    /// # Returns
    /// The detached gradients, or an error if this variable is not `1x1`.
    pub fn backward(&self) -> Result<Gradients> {
        if self.shape() != (1, 1) {
            return Err(MlErr::NonScalarBackward {
                shape: self.shape(),
            });
        }

        if !self.requires_grad() {
            return Ok(Gradients::default());
        }

        let _guard = no_grad();
        let grads = propagate(self, Var::ones((1, 1)))?;

        let leaves = grads
            .into_iter()
            .map(|(id, g)| (id, g.value().clone()))
            .collect();

        Ok(Gradients(leaves))
    }
}

/// Computes the gradients of `output` with respect to `inputs`, keeping them differentiable.
///
/// # Arguments
/// * `output` - The variable to differentiate.
/// * `inputs` - The variables to differentiate with respect to, all of them must track gradients.
/// * `grad_output` - The gradient of some outer objective with respect to `output`, ones if `None`.
///
/// # Returns
/// One gradient per input, in the same order. Inputs `output` does not depend on get zeros.
pub fn grad(output: &Var, inputs: &[&Var], grad_output: Option<Var>) -> Result<Vec<Var>> {
    if let Some(input) = inputs.iter().find(|input| !input.requires_grad()) {
        return Err(MlErr::NotTracked { id: input.id() });
    }

    let seed = match grad_output {
        Some(seed) if seed.shape() != output.shape() => {
            return Err(MlErr::ShapeMismatch {
                op: "grad",
                lhs: output.shape(),
                rhs: seed.shape(),
            });
        }
        Some(seed) => seed,
        None => Var::ones(output.shape()),
    };

    let _guard = enable_grad();
    let mut grads = propagate(output, seed)?;

    let grads = inputs
        .iter()
        .map(|input| {
            grads
                .remove(&input.id())
                .unwrap_or_else(|| Var::zeros(input.shape()))
        })
        .collect();

    Ok(grads)
}
