//! GRU4Rec: a GRU sequence encoder trained to predict the next item.
//!
//! The model embeds each item of a context sequence, runs the embeddings
//! through a [`gru`](super::gru) layer and scores the final hidden state
//! against every known item. The embedding table doubles as the output
//! projection of the loss.
//!
//! Models are configured through [`Hyperparameters`]:
//!
//! ```rust
//! # extern crate gru4rec;
//! use gru4rec::models::gru4rec::Hyperparameters;
//! use gru4rec::models::{LossKind, Optimizer};
//!
//! let model = Hyperparameters::new(16)
//!     .loss(LossKind::VanillaSoftmax)
//!     .optimizer(Optimizer::Adagrad)
//!     .learning_rate(0.05)
//!     .from_seed([7; 16])
//!     .build(vec![("item-1", 3), ("item-2", 1)])
//!     .unwrap();
//!
//! assert_eq!(model.vocabulary().len(), 2);
//! ```
use std::collections::BTreeMap;
use std::fmt;

use rand;
use rand::distributions::{Distribution, Uniform};
use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};

use tracing::{debug, info};

use wyrm;
use wyrm::optim::{Optimizer as Optim, Optimizers};
use wyrm::{BoxedNode, DataInput, Variable};

use super::embedding::ItemEmbeddings;
use super::gru;
use super::loss::{LossInputs, LossStrategy};
use super::{LossKind, Optimizer};
use crate::config::Config;
use crate::data::{minibatches, Batch, Example};
use crate::evaluation::{ranking_metrics, recommend, RankingMetric, TOP_K};
use crate::vocabulary::Vocabulary;
use crate::{BatchError, BuildError, FittingError, ItemId, ItemIndex, PredictionError};

/// Hyperparameters describing the GRU4Rec model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    embedding_dim: usize,
    loss: LossKind,
    learning_rate: f32,
    l2_penalty: f32,
    optimizer: Optimizer,
    num_negatives: usize,
    num_epochs: usize,
    batch_size: usize,
    top_k: usize,
    rng: XorShiftRng,
}

impl Hyperparameters {
    /// Build new hyperparameters for items embedded in `embedding_dim`
    /// dimensions.
    pub fn new(embedding_dim: usize) -> Self {
        Hyperparameters {
            embedding_dim,
            loss: LossKind::VanillaSoftmax,
            learning_rate: 0.01,
            l2_penalty: 0.0,
            optimizer: Optimizer::Adam,
            num_negatives: 100,
            num_epochs: 10,
            batch_size: 32,
            top_k: TOP_K,
            rng: XorShiftRng::from_seed(rand::thread_rng().gen()),
        }
    }

    /// Set the loss function.
    pub fn loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the L2 penalty.
    pub fn l2_penalty(mut self, l2_penalty: f32) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    /// Set the optimizer type.
    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the number of negatives drawn per example by the sampled softmax.
    pub fn num_negatives(mut self, num_negatives: usize) -> Self {
        self.num_negatives = num_negatives;
        self
    }

    /// Set the number of epochs to run per each `fit` call.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the number of examples per training step.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of candidates ranking metrics are computed on.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the random number generator.
    pub fn rng(mut self, rng: XorShiftRng) -> Self {
        self.rng = rng;
        self
    }

    /// Set the random number generator from seed.
    pub fn from_seed(mut self, seed: [u8; 16]) -> Self {
        self.rng = XorShiftRng::from_seed(seed);
        self
    }

    /// Apply the fields set in `config`, failing on an unknown loss name.
    pub fn from_config(mut self, config: &Config) -> Result<Self, BuildError> {
        if let Some(ref loss) = config.loss {
            self.loss = loss.parse()?;
        }
        if let Some(num_epochs) = config.nb_epochs {
            self.num_epochs = num_epochs;
        }
        if let Some(batch_size) = config.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(embedding_dim) = config.embedding_dimension {
            self.embedding_dim = embedding_dim;
        }

        Ok(self)
    }

    /// Set hyperparameters randomly: useful for hyperparameter search.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Hyperparameters {
            embedding_dim: 2_usize.pow(Uniform::new(3, 7).sample(rng)),
            loss: if Uniform::new(0.0, 1.0).sample(rng) < 0.5 {
                LossKind::VanillaSoftmax
            } else {
                LossKind::SampledSoftmax
            },
            learning_rate: (10.0_f32).powf(Uniform::new(-3.0, -0.5).sample(rng)),
            l2_penalty: (10.0_f32).powf(Uniform::new(-7.0, -3.0).sample(rng)),
            optimizer: if Uniform::new(0.0, 1.0).sample(rng) < 0.5 {
                Optimizer::Adam
            } else {
                Optimizer::Adagrad
            },
            num_negatives: 2_usize.pow(Uniform::new(4, 9).sample(rng)),
            num_epochs: 2_usize.pow(Uniform::new(1, 5).sample(rng)),
            batch_size: 2_usize.pow(Uniform::new(4, 8).sample(rng)),
            top_k: TOP_K,
            rng: XorShiftRng::from_seed(rng.gen()),
        }
    }

    /// Embedding dimensionality.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Number of passes `fit` makes over its examples.
    pub fn epochs(&self) -> usize {
        self.num_epochs
    }

    fn validate(&self) -> Result<(), BuildError> {
        let positive = [
            ("embedding_dim", self.embedding_dim),
            ("num_negatives", self.num_negatives),
            ("num_epochs", self.num_epochs),
            ("batch_size", self.batch_size),
            ("top_k", self.top_k),
        ];

        for &(name, value) in &positive {
            if value == 0 {
                return Err(BuildError::InvalidHyperparameter {
                    name,
                    reason: "must be positive".to_owned(),
                });
            }
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(BuildError::InvalidHyperparameter {
                name: "learning_rate",
                reason: format!("must be positive and finite, got {}", self.learning_rate),
            });
        }

        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(BuildError::InvalidHyperparameter {
                name: "l2_penalty",
                reason: format!("must be non-negative and finite, got {}", self.l2_penalty),
            });
        }

        Ok(())
    }

    fn build_optimizer(&self) -> Optimizers {
        match self.optimizer {
            Optimizer::Adagrad => Optimizers::Adagrad(
                wyrm::optim::Adagrad::new()
                    .learning_rate(self.learning_rate)
                    .l2_penalty(self.l2_penalty),
            ),

            Optimizer::Adam => Optimizers::Adam(
                wyrm::optim::Adam::new()
                    .learning_rate(self.learning_rate)
                    .l2_penalty(self.l2_penalty),
            ),
        }
    }

    /// Build the model over the items in `item_counts`.
    ///
    /// Items receive model indices in the order given, starting at 1.
    pub fn build<I, K>(mut self, item_counts: I) -> Result<Gru4RecModel, BuildError>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<ItemId>,
    {
        self.validate()?;

        let vocabulary = Vocabulary::new(item_counts)?;

        let item_embeddings =
            ItemEmbeddings::new(vocabulary.num_rows(), self.embedding_dim, &mut self.rng);
        let gru = gru::Parameters::new(self.embedding_dim, self.embedding_dim, &mut self.rng);
        let loss = LossStrategy::new(
            self.loss,
            &item_embeddings,
            &vocabulary,
            self.num_negatives,
        );

        let k = self.top_k.min(vocabulary.len());
        let optimizer = self.build_optimizer();

        info!(
            num_items = vocabulary.len(),
            loss = %self.loss,
            embedding_dim = self.embedding_dim,
            "Built GRU4Rec model"
        );

        Ok(Gru4RecModel {
            hyper: self,
            vocabulary,
            params: Parameters {
                item_embeddings,
                gru,
            },
            loss,
            metrics: RankingMetric::defaults(k),
            optimizer,
            graph: None,
        })
    }
}

#[derive(Debug)]
struct Parameters {
    item_embeddings: ItemEmbeddings,
    gru: gru::Parameters,
}

impl Parameters {
    fn build(
        &self,
        loss: &LossStrategy,
        batch_size: usize,
        sequence_length: usize,
    ) -> Result<Graph, BatchError> {
        // A single node for the table and a single layer, shared by every
        // example, so each parameter is stepped exactly once.
        let item_embeddings = self.item_embeddings.node();
        let layer = self.gru.build();

        let mut examples = Vec::with_capacity(batch_size);
        let mut losses = Vec::with_capacity(batch_size);

        for _ in 0..batch_size {
            let inputs: Vec<_> = (0..sequence_length)
                .map(|_| wyrm::IndexInputNode::new(&[0]))
                .collect();
            let input_embeddings: Vec<_> = inputs
                .iter()
                .map(|input| item_embeddings.index(input).boxed())
                .collect();

            let hidden = layer
                .forward(&input_embeddings)
                .pop()
                .ok_or(BatchError::EmptyContext)?;
            let (loss_inputs, example_loss) = loss.build(&item_embeddings, &hidden);

            losses.push(example_loss);
            examples.push(ExampleGraph {
                inputs,
                hidden,
                loss_inputs,
            });
        }

        let mut losses = losses.into_iter();
        let first = losses.next().ok_or(BatchError::EmptyBatch)?;
        let loss = losses.fold(first, |total, example_loss| (total + example_loss).boxed());

        Ok(Graph {
            sequence_length,
            examples,
            loss,
        })
    }
}

struct ExampleGraph {
    inputs: Vec<Variable<wyrm::IndexInputNode>>,
    hidden: Variable<BoxedNode>,
    loss_inputs: LossInputs,
}

/// Graph for a fixed batch shape, its loss summed over the batch.
struct Graph {
    sequence_length: usize,
    examples: Vec<ExampleGraph>,
    loss: Variable<BoxedNode>,
}

impl Graph {
    fn shape(&self) -> (usize, usize) {
        (self.examples.len(), self.sequence_length)
    }

    fn mean_loss(&mut self) -> f32 {
        self.loss.forward();

        self.loss.value().scalar_sum() / self.examples.len() as f32
    }

    fn hidden_values(&self) -> Vec<Vec<f32>> {
        self.examples
            .iter()
            .map(|example| example.hidden.value().iter().cloned().collect())
            .collect()
    }
}

/// A GRU4Rec model.
pub struct Gru4RecModel {
    hyper: Hyperparameters,
    vocabulary: Vocabulary,
    params: Parameters,
    loss: LossStrategy,
    metrics: Vec<RankingMetric>,
    optimizer: Optimizers,
    graph: Option<Graph>,
}

impl fmt::Debug for Gru4RecModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Gru4RecModel")
            .field("hyper", &self.hyper)
            .field("num_items", &self.vocabulary.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl Gru4RecModel {
    /// Build a model with default hyperparameters from a loss name.
    ///
    /// The loss name is checked before anything else is built.
    pub fn new<I, K>(
        item_counts: I,
        loss_name: &str,
        embedding_dim: usize,
    ) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<ItemId>,
    {
        let loss = loss_name.parse()?;

        Hyperparameters::new(embedding_dim)
            .loss(loss)
            .build(item_counts)
    }

    /// The item vocabulary.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// The hyperparameters the model was built with.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// The training loss.
    pub fn loss_kind(&self) -> LossKind {
        self.loss.kind()
    }

    /// Names of the ranking metrics reported by `test_step`.
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|metric| metric.name()).collect()
    }

    /// Take the cached training graph, rebuilding it if the batch shape
    /// changed, and load `batch` into it.
    fn training_graph(&mut self, batch: &Batch) -> Result<Graph, BatchError> {
        let shape = (batch.len(), batch.sequence_length());

        let graph = match self.graph.take() {
            Some(graph) if graph.shape() == shape => graph,
            _ => {
                debug!(
                    batch_size = shape.0,
                    sequence_length = shape.1,
                    "Building training graph"
                );
                self.params.build(&self.loss, shape.0, shape.1)?
            }
        };

        self.load(&graph, batch, true);

        Ok(graph)
    }

    /// Build a throwaway graph for a forward-only pass over `batch`.
    ///
    /// The cached graph must only ever see complete forward and backward
    /// passes, so inference never touches it.
    fn inference_graph(&mut self, batch: &Batch, with_labels: bool) -> Result<Graph, BatchError> {
        let graph = self
            .params
            .build(&self.loss, batch.len(), batch.sequence_length())?;

        self.load(&graph, batch, with_labels);

        Ok(graph)
    }

    /// Set the context inputs of `graph` and, if `with_labels`, the labels
    /// and any sampled negatives.
    fn load(&mut self, graph: &Graph, batch: &Batch, with_labels: bool) {
        for (context, label, example) in izip!(
            batch.context_movie_id(),
            batch.label_movie_id(),
            &graph.examples
        ) {
            for (item, input) in izip!(context, &example.inputs) {
                input.set_value(self.vocabulary.lookup(item));
            }

            if with_labels {
                self.loss.prepare(
                    &example.loss_inputs,
                    self.vocabulary.lookup(label),
                    &mut self.hyper.rng,
                );
            }
        }
    }

    /// Take one optimizer step on `batch`, returning its mean loss under
    /// `"loss"`.
    pub fn train_step(&mut self, batch: &Batch) -> Result<BTreeMap<String, f32>, FittingError> {
        let mut graph = self.training_graph(batch)?;
        let loss_value = graph.mean_loss();

        // A graph left without its backward pass cannot be reused.
        if !loss_value.is_finite() {
            return Err(FittingError::NonFiniteLoss);
        }

        graph.loss.backward(1.0 / batch.len() as f32);
        self.optimizer.step(graph.loss.parameters());
        self.graph = Some(graph);

        debug!(loss = loss_value, "Training step");

        let mut metrics = BTreeMap::new();
        metrics.insert("loss".to_owned(), loss_value);

        Ok(metrics)
    }

    /// Mean loss on `batch`, without updating the parameters.
    pub fn loss(&mut self, batch: &Batch) -> Result<f32, PredictionError> {
        let loss_value = self.inference_graph(batch, true)?.mean_loss();

        if loss_value.is_finite() {
            Ok(loss_value)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }

    /// Final encoder state of every context in `batch`.
    pub fn hidden_states(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>, PredictionError> {
        let graph = self.inference_graph(batch, false)?;

        for example in &graph.examples {
            example.hidden.forward();
        }

        let hidden = graph.hidden_values();

        if hidden.iter().flat_map(|state| state.iter()).all(|x| x.is_finite()) {
            Ok(hidden)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }

    /// Scores of every known item for a hidden state, in candidate index
    /// order.
    pub fn score(&self, hidden: &[f32]) -> Vec<f32> {
        self.loss.score(hidden)
    }

    /// Scores of every model index for a hidden state, the unknown slot
    /// included.
    pub fn logits(&self, hidden: &[f32]) -> Vec<f32> {
        self.loss.logits(hidden)
    }

    fn rank(&self, hidden: &[Vec<f32>], k: usize) -> Result<Vec<Vec<ItemIndex>>, PredictionError> {
        hidden
            .iter()
            .map(|state| {
                let scores = self.score(state);

                if scores.iter().all(|x| x.is_finite()) {
                    Ok(recommend(&scores, k))
                } else {
                    Err(PredictionError::InvalidPredictionValue)
                }
            })
            .collect()
    }

    /// The `k` best next items for every context in `batch`, as model
    /// indices, best first.
    pub fn recommend(
        &mut self,
        batch: &Batch,
        k: usize,
    ) -> Result<Vec<Vec<ItemIndex>>, PredictionError> {
        let hidden = self.hidden_states(batch)?;

        self.rank(&hidden, k.min(self.vocabulary.len()))
    }

    /// Evaluate on `batch`: the mean loss plus ranking metrics on the top
    /// candidates.
    pub fn test_step(&mut self, batch: &Batch) -> Result<BTreeMap<String, f32>, PredictionError> {
        let mut graph = self.inference_graph(batch, true)?;
        let loss_value = graph.mean_loss();
        let hidden = graph.hidden_values();

        if !loss_value.is_finite() {
            return Err(PredictionError::InvalidPredictionValue);
        }

        let k = self.hyper.top_k.min(self.vocabulary.len());
        let ranked = self.rank(&hidden, k)?;
        let labels = self.vocabulary.lookup_all(batch.label_movie_id());

        let mut metrics = ranking_metrics(&self.metrics, &labels, &ranked);
        metrics.insert("loss".to_owned(), loss_value);

        Ok(metrics)
    }

    /// Fit the model, returning the mean loss of the final epoch.
    pub fn fit(&mut self, examples: &[Example]) -> Result<f32, FittingError> {
        if examples.is_empty() {
            return Err(FittingError::NoExamples);
        }

        let mut examples = examples.to_vec();
        let mut loss_value = 0.0;

        for epoch in 0..self.hyper.num_epochs {
            self.hyper.rng.shuffle(&mut examples);

            let mut total = 0.0;
            for batch in minibatches(&examples, self.hyper.batch_size) {
                let batch = batch?;
                total += self.train_step(&batch)?["loss"] * batch.len() as f32;
            }

            loss_value = total / examples.len() as f32;
            info!(epoch, loss = loss_value, "Finished epoch");
        }

        Ok(loss_value)
    }

    /// Evaluate on `examples`, averaging every metric weighted by batch size.
    pub fn evaluate(&mut self, examples: &[Example]) -> Result<BTreeMap<String, f32>, PredictionError> {
        if examples.is_empty() {
            return Err(PredictionError::NoExamples);
        }

        let mut totals: BTreeMap<String, f32> = BTreeMap::new();

        for batch in minibatches(examples, self.hyper.batch_size) {
            let batch = batch?;
            let weight = batch.len() as f32;

            for (name, value) in self.test_step(&batch)? {
                *totals.entry(name).or_insert(0.0) += value * weight;
            }
        }

        let num_examples = examples.len() as f32;

        Ok(totals
            .into_iter()
            .map(|(name, total)| (name, total / num_examples))
            .collect())
    }
}
