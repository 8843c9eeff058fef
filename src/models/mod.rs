//! Models module.
use std::fmt;
use std::str::FromStr;

use crate::BuildError;

pub mod embedding;
pub mod gru;
pub mod gru4rec;
pub mod loss;
pub mod sampler;

/// The loss used for training the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LossKind {
    /// Full softmax cross-entropy over every item (`vanilla-sm`).
    VanillaSoftmax,
    /// Sampled softmax with frequency-weighted negatives (`sampled-sm`).
    SampledSoftmax,
}

impl LossKind {
    /// The identifier used in configuration.
    pub fn name(&self) -> &'static str {
        match *self {
            LossKind::VanillaSoftmax => "vanilla-sm",
            LossKind::SampledSoftmax => "sampled-sm",
        }
    }
}

impl FromStr for LossKind {
    type Err = BuildError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "vanilla-sm" => Ok(LossKind::VanillaSoftmax),
            "sampled-sm" => Ok(LossKind::SampledSoftmax),
            _ => Err(BuildError::UnknownLossKind(name.to_owned())),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optimizer used to train the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Optimizer {
    /// Adagrad.
    Adagrad,
    /// Adam.
    Adam,
}
