#![deny(missing_docs)]
//! # gru4rec
//!
//! `gru4rec` implements a GRU4Rec-style sequential recommender: given the
//! items a user has interacted with so far, a gated recurrent encoder
//! summarises the sequence and the model ranks every known item as a
//! candidate for the next interaction.
//!
//! Two losses are available. `vanilla-sm` computes the exact softmax
//! cross-entropy over the whole item vocabulary, reusing the input
//! embeddings as the output projection. `sampled-sm` approximates it with a
//! handful of frequency-weighted negatives per example, which is what makes
//! training on large catalogues tractable.
//!
//! ## Example
//!
//! ```rust
//! # extern crate gru4rec;
//! use gru4rec::data::Batch;
//! use gru4rec::models::gru4rec::Hyperparameters;
//! use gru4rec::models::LossKind;
//!
//! let item_counts = vec![("A", 10), ("B", 5), ("C", 1)];
//!
//! let mut model = Hyperparameters::new(8)
//!     .loss(LossKind::SampledSoftmax)
//!     .num_negatives(4)
//!     .from_seed([42; 16])
//!     .build(item_counts)
//!     .unwrap();
//!
//! let batch = Batch::new(
//!     vec![vec!["A".to_owned(), "B".to_owned()]],
//!     vec!["C".to_owned()],
//! ).unwrap();
//!
//! let metrics = model.train_step(&batch).unwrap();
//! assert!(metrics["loss"].is_finite());
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[cfg(feature = "datasets")]
extern crate csv;
extern crate failure;
extern crate ndarray;
extern crate rand;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate siphasher;
extern crate tracing;

extern crate wyrm;

pub mod config;
pub mod data;
#[cfg(feature = "datasets")]
pub mod datasets;
pub mod evaluation;
pub mod models;
pub mod vocabulary;

use failure::Fail;

/// Alias for raw item identifiers, as found in the data.
pub type ItemId = String;
/// Alias for item indices in the model index space (0 is the unknown item).
pub type ItemIndex = usize;
/// Alias for user identifiers.
pub type UserId = usize;
/// Alias for timestamps.
pub type Timestamp = usize;

/// Errors raised while constructing a model.
#[derive(Debug, Fail)]
pub enum BuildError {
    /// The configured loss is not one of the recognised kinds.
    #[fail(
        display = "Unknown loss kind {:?}: expected \"vanilla-sm\" or \"sampled-sm\".",
        _0
    )]
    UnknownLossKind(String),
    /// No item counts were supplied.
    #[fail(display = "Cannot build a vocabulary from no items.")]
    EmptyVocabulary,
    /// The same item identifier was supplied twice.
    #[fail(display = "Item {:?} appears more than once in the item counts.", _0)]
    DuplicateItem(String),
    /// A hyperparameter is out of its valid range.
    #[fail(display = "Invalid hyperparameter {}: {}.", name, reason)]
    InvalidHyperparameter {
        /// Name of the offending hyperparameter.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Batch shape errors.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum BatchError {
    /// The batch has no examples.
    #[fail(display = "Batch must contain at least one example.")]
    EmptyBatch,
    /// The number of contexts and labels differ.
    #[fail(
        display = "Batch has {} contexts but {} labels.",
        contexts, labels
    )]
    LengthMismatch {
        /// Number of context sequences.
        contexts: usize,
        /// Number of labels.
        labels: usize,
    },
    /// A context sequence is empty.
    #[fail(display = "Context sequences must not be empty.")]
    EmptyContext,
    /// Context sequences have differing lengths.
    #[fail(
        display = "Context {} has length {}, expected {}.",
        position, found, expected
    )]
    RaggedContext {
        /// Position of the offending example in the batch.
        position: usize,
        /// Length of the first context in the batch.
        expected: usize,
        /// Length of the offending context.
        found: usize,
    },
}

/// Fitting error types.
#[derive(Debug, Fail)]
pub enum FittingError {
    /// The examples could not be batched.
    #[fail(display = "Invalid training batch: {}", _0)]
    InvalidBatch(#[cause] BatchError),
    /// There is nothing to fit on.
    #[fail(display = "No examples to fit the model on.")]
    NoExamples,
    /// The training loss diverged.
    #[fail(display = "Training loss is non-finite or not a number.")]
    NonFiniteLoss,
}

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// The examples could not be batched.
    #[fail(display = "Invalid evaluation batch: {}", _0)]
    InvalidBatch(#[cause] BatchError),
    /// There is nothing to evaluate on.
    #[fail(display = "No examples to evaluate the model on.")]
    NoExamples,
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

impl From<BatchError> for FittingError {
    fn from(error: BatchError) -> Self {
        FittingError::InvalidBatch(error)
    }
}

impl From<BatchError> for PredictionError {
    fn from(error: BatchError) -> Self {
        PredictionError::InvalidBatch(error)
    }
}
