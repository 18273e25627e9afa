use crate::autograd::Var;

/// The activation functions available to layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFn {
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu { slope: f32 },
}
use ActFn::*;

impl ActFn {
    /// The usual `0.2` slope leaky rectifier used by critics.
    pub fn leaky_relu() -> Self {
        LeakyRelu { slope: 0.2 }
    }

    /// Applies the activation element-wise.
    pub fn apply(&self, z: &Var) -> Var {
        match self {
            Sigmoid => z.sigmoid(),
            Tanh => z.tanh(),
            Relu => z.relu(),
            LeakyRelu { slope } => z.leaky_relu(*slope),
        }
    }
}
