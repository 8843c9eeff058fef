//! Item embedding table.
//!
//! The table has one row per model index, row 0 being the unknown item.
//! Clones share the same underlying storage: the encoder reads its inputs
//! from the table and the losses use it as their output projection, so
//! there is exactly one copy of the weights and one set of optimizer
//! accumulators.
use std::sync::Arc;

use rand::distributions::{Distribution, Normal};
use rand::Rng;

use ndarray::Axis;

use wyrm;
use wyrm::{Arr, Variable};

use crate::ItemIndex;

fn embedding_init<T: Rng>(rows: usize, cols: usize, rng: &mut T) -> wyrm::Arr {
    let normal = Normal::new(0.0, 1.0 / cols as f64);
    Arr::zeros((rows, cols)).map(|_| normal.sample(rng) as f32)
}

/// A learnable `num_rows × dim` embedding table.
#[derive(Clone, Debug)]
pub struct ItemEmbeddings {
    parameter: Arc<wyrm::HogwildParameter>,
    num_rows: usize,
    dim: usize,
}

impl ItemEmbeddings {
    /// Randomly initialise a new table.
    pub fn new<R: Rng>(num_rows: usize, dim: usize, rng: &mut R) -> Self {
        ItemEmbeddings {
            parameter: Arc::new(wyrm::HogwildParameter::new(embedding_init(
                num_rows, dim, rng,
            ))),
            num_rows,
            dim,
        }
    }

    /// Number of rows, including the unknown slot.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// A graph node backed by this table.
    ///
    /// Build one node per graph and share it between every path that reads
    /// the table; separate nodes would each carry their own gradient.
    pub fn node(&self) -> Variable<wyrm::ParameterNode> {
        wyrm::ParameterNode::shared(self.parameter.clone())
    }

    /// Copy out the embedding at `index`.
    ///
    /// # Panics
    /// If `index` is not below `num_rows`.
    pub fn row(&self, index: ItemIndex) -> Vec<f32> {
        let embeddings = self.parameter.value();

        embeddings.subview(Axis(0), index).iter().cloned().collect()
    }

    /// Dot `hidden` against every row of the table.
    pub fn dot_all(&self, hidden: &[f32]) -> Vec<f32> {
        let embeddings = self.parameter.value();

        embeddings
            .outer_iter()
            .map(|row| row.iter().zip(hidden).map(|(&x, &y)| x * y).sum())
            .collect()
    }

    /// Whether both handles point at the same storage.
    pub fn shares_storage(&self, other: &ItemEmbeddings) -> bool {
        Arc::ptr_eq(&self.parameter, &other.parameter)
    }
}

#[cfg(test)]
mod tests {
    use rand::prng::XorShiftRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn shape_and_shared_storage() {
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let embeddings = ItemEmbeddings::new(4, 3, &mut rng);
        let tied = embeddings.clone();

        assert_eq!(embeddings.num_rows(), 4);
        assert_eq!(embeddings.dim(), 3);
        assert_eq!(embeddings.row(3).len(), 3);
        assert!(tied.shares_storage(&embeddings));

        let other = ItemEmbeddings::new(4, 3, &mut rng);
        assert!(!other.shares_storage(&embeddings));
    }

    #[test]
    fn dot_all_matches_rows() {
        let mut rng = XorShiftRng::from_seed([7; 16]);
        let embeddings = ItemEmbeddings::new(5, 4, &mut rng);
        let hidden = vec![0.5, -1.0, 2.0, 0.25];

        let scores = embeddings.dot_all(&hidden);
        assert_eq!(scores.len(), 5);

        for (idx, &score) in scores.iter().enumerate() {
            let expected: f32 = embeddings
                .row(idx)
                .iter()
                .zip(&hidden)
                .map(|(x, y)| x * y)
                .sum();
            assert!((score - expected).abs() < 1e-6);
        }
    }
}
