use std::{error::Error, fmt};

use machine_learning::MlErr;

use crate::divergence::Measure;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Training failures, grouped by how they should be handled.
#[derive(Debug)]
pub enum TrainErr {
    /// Invalid settings, surfaced at setup or at the first step that uses them.
    Config(ConfigErr),
    /// The routines, groups and losses don't fit together.
    Structural(StructuralErr),
    /// A loss turned non-finite; the step it belongs to was not applied.
    Numerical {
        measure: Option<Measure>,
        group: String,
        step: usize,
        value: f32,
    },
    /// A network could not be placed on its device.
    Resource(MlErr),
    /// Any other tensor level failure.
    Ml(MlErr),
}

#[derive(Debug)]
pub enum ConfigErr {
    InvalidMeasure(String),
    InvalidNoiseType(String),
    InvalidPenaltyType(String),
    InvalidGeneratorLoss(String),
    InvalidDistribution(String),
    UnsupportedAlgorithm(String),
    MissingAuxVariable { name: &'static str },
    MissingLearningRate { group: String },
    NonFiniteSetting { group: String, setting: &'static str },
}

#[derive(Debug)]
pub enum StructuralErr {
    LossKeyCollision { key: String, step: usize },
    UnregisteredGroup { group: String, routine: String },
    UnknownLossKey { key: String },
    DoubleStep { group: String },
    DuplicateRoutine { name: String },
    DuplicateGroup { group: String },
    MissingInput { name: String },
    MisalignedBatch { name: String, got: usize, expected: usize },
    InvalidState { state: &'static str, action: &'static str },
    OutputWidth { group: String, got: usize, expected: usize },
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::InvalidMeasure(m) => write!(f, "unknown measure `{m}`"),
            ConfigErr::InvalidNoiseType(t) => write!(f, "unknown noise type `{t}`"),
            ConfigErr::InvalidPenaltyType(t) => write!(f, "unknown penalty type `{t}`"),
            ConfigErr::InvalidGeneratorLoss(t) => write!(f, "unknown generator loss `{t}`"),
            ConfigErr::InvalidDistribution(d) => write!(f, "invalid noise distribution: {d}"),
            ConfigErr::UnsupportedAlgorithm(a) => write!(f, "optimizer not supported `{a}`"),
            ConfigErr::MissingAuxVariable { name } => {
                write!(f, "the uniform random variable `{name}` must be provided")
            }
            ConfigErr::MissingLearningRate { group } => {
                write!(f, "no learning rate given for group `{group}`")
            }
            ConfigErr::NonFiniteSetting { group, setting } => {
                write!(f, "`{setting}` of group `{group}` is not a finite number")
            }
        }
    }
}

impl fmt::Display for StructuralErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralErr::LossKeyCollision { key, step } => {
                write!(f, "loss `{key}` produced by two routines at step {step}")
            }
            StructuralErr::UnregisteredGroup { group, routine } => write!(
                f,
                "routine `{routine}` references group `{group}`, which has no optimizer"
            ),
            StructuralErr::UnknownLossKey { key } => {
                write!(f, "loss `{key}` doesn't name a trainable group")
            }
            StructuralErr::DoubleStep { group } => {
                write!(f, "group `{group}` has no pending loss to step")
            }
            StructuralErr::DuplicateRoutine { name } => {
                write!(f, "routine `{name}` registered twice")
            }
            StructuralErr::DuplicateGroup { group } => write!(f, "group `{group}` added twice"),
            StructuralErr::MissingInput { name } => write!(f, "batch has no input `{name}`"),
            StructuralErr::MisalignedBatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "input `{name}` has {got} rows but the batch has {expected}"
            ),
            StructuralErr::InvalidState { state, action } => {
                write!(f, "cannot {action} while the loop is {state}")
            }
            StructuralErr::OutputWidth {
                group,
                got,
                expected,
            } => write!(
                f,
                "group `{group}` outputs {got} columns but the dataset needs {expected}"
            ),
        }
    }
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Config(e) => write!(f, "configuration error: {e}"),
            TrainErr::Structural(e) => write!(f, "structural error: {e}"),
            TrainErr::Numerical {
                measure,
                group,
                step,
                value,
            } => {
                write!(f, "numerical error at step {step}: loss of `{group}` is {value}")?;
                if let Some(measure) = measure {
                    write!(f, " (measure {measure})")?;
                }
                Ok(())
            }
            TrainErr::Resource(e) => write!(f, "resource error: {e}"),
            TrainErr::Ml(e) => write!(f, "tensor error: {e}"),
        }
    }
}

impl Error for ConfigErr {}

impl Error for StructuralErr {}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Config(e) => Some(e),
            TrainErr::Structural(e) => Some(e),
            TrainErr::Resource(e) | TrainErr::Ml(e) => Some(e),
            TrainErr::Numerical { .. } => None,
        }
    }
}

impl From<ConfigErr> for TrainErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<StructuralErr> for TrainErr {
    fn from(value: StructuralErr) -> Self {
        Self::Structural(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        match value {
            MlErr::DeviceUnavailable { .. } => Self::Resource(value),
            other => Self::Ml(other),
        }
    }
}
