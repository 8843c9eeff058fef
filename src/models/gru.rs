//! Gated recurrent unit encoder.
//!
//! For an input `x` and previous state `h` the cell computes
//!
//! ```text
//! z  = sigmoid(x W_z + h U_z + b_z)
//! r  = sigmoid(x W_r + h U_r + b_r)
//! c  = tanh(x W_c + (r * h) U_c + b_c)
//! h' = (1 - z) * h + z * c
//! ```
//!
//! starting from an all-zero state. Only the final state is used by the
//! recommender, but every intermediate state is returned.
use std::sync::Arc;

use rand::distributions::{Distribution, Normal};
use rand::Rng;

use wyrm;
use wyrm::{Arr, BoxedNode, Variable};

fn dense_init<T: Rng>(rows: usize, cols: usize, rng: &mut T) -> wyrm::Arr {
    let normal = Normal::new(0.0, (2.0 / (rows + cols) as f64).sqrt());
    Arr::zeros((rows, cols)).map(|_| normal.sample(rng) as f32)
}

#[derive(Debug)]
struct GateParameters {
    input: Arc<wyrm::HogwildParameter>,
    hidden: Arc<wyrm::HogwildParameter>,
    bias: Arc<wyrm::HogwildParameter>,
}

impl GateParameters {
    fn new<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        GateParameters {
            input: Arc::new(wyrm::HogwildParameter::new(dense_init(
                input_dim, hidden_dim, rng,
            ))),
            hidden: Arc::new(wyrm::HogwildParameter::new(dense_init(
                hidden_dim, hidden_dim, rng,
            ))),
            bias: Arc::new(wyrm::HogwildParameter::new(Arr::zeros((1, hidden_dim)))),
        }
    }

    fn build(&self) -> Gate {
        Gate {
            input: wyrm::ParameterNode::shared(self.input.clone()),
            hidden: wyrm::ParameterNode::shared(self.hidden.clone()),
            bias: wyrm::ParameterNode::shared(self.bias.clone()),
        }
    }
}

struct Gate {
    input: Variable<wyrm::ParameterNode>,
    hidden: Variable<wyrm::ParameterNode>,
    bias: Variable<wyrm::ParameterNode>,
}

/// Trainable GRU weights.
#[derive(Debug)]
pub struct Parameters {
    input_dim: usize,
    hidden_dim: usize,
    update: GateParameters,
    reset: GateParameters,
    candidate: GateParameters,
}

impl Parameters {
    /// Initialise the weights of a cell mapping `input_dim` inputs onto a
    /// `hidden_dim` state.
    pub fn new<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        Parameters {
            input_dim,
            hidden_dim,
            update: GateParameters::new(input_dim, hidden_dim, rng),
            reset: GateParameters::new(input_dim, hidden_dim, rng),
            candidate: GateParameters::new(input_dim, hidden_dim, rng),
        }
    }

    /// Input dimensionality.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Hidden state dimensionality.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Build a layer whose nodes share these weights.
    pub fn build(&self) -> Layer {
        Layer {
            hidden_dim: self.hidden_dim,
            update: self.update.build(),
            reset: self.reset.build(),
            candidate: self.candidate.build(),
        }
    }
}

/// A GRU layer ready to be wired into a graph.
pub struct Layer {
    hidden_dim: usize,
    update: Gate,
    reset: Gate,
    candidate: Gate,
}

impl Layer {
    fn step(&self, input: &Variable<BoxedNode>, state: &Variable<BoxedNode>) -> Variable<BoxedNode> {
        let update = (input.dot(&self.update.input)
            + state.dot(&self.update.hidden)
            + self.update.bias.clone())
            .sigmoid();
        let reset = (input.dot(&self.reset.input)
            + state.dot(&self.reset.hidden)
            + self.reset.bias.clone())
            .sigmoid();
        let candidate = (input.dot(&self.candidate.input)
            + (reset * state.clone()).dot(&self.candidate.hidden)
            + self.candidate.bias.clone())
            .tanh();

        ((1.0 - update.clone()) * state.clone() + update * candidate).boxed()
    }

    /// Run the cell over `inputs` (each `1 × input_dim`), returning the
    /// state after every step.
    pub fn forward(&self, inputs: &[Variable<BoxedNode>]) -> Vec<Variable<BoxedNode>> {
        let mut state = wyrm::InputNode::new(Arr::zeros((1, self.hidden_dim))).boxed();
        let mut states = Vec::with_capacity(inputs.len());

        for input in inputs {
            state = self.step(input, &state);
            states.push(state.clone());
        }

        states
    }
}
