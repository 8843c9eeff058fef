//! Ranking metrics.
//!
//! Candidates are ranked in candidate index space and converted back to
//! model indices before being compared with labels, so the unknown item can
//! never be recommended, and a label that maps to the unknown item never
//! counts as a hit.
use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::vocabulary::{to_model_index, UNKNOWN_INDEX};
use crate::ItemIndex;

/// Default number of candidates retrieved per example.
pub const TOP_K: usize = 1000;

/// A ranking metric evaluated on the top-ranked candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingMetric {
    /// Whether the label is among the top `k` candidates.
    Recall(usize),
    /// Fraction of the top `k` candidates that are the label.
    Precision(usize),
    /// Reciprocal rank of the label if it is among the top `k`, else zero.
    ReciprocalRank(usize),
}

impl RankingMetric {
    /// The standard metrics at cut-off `k`.
    pub fn defaults(k: usize) -> Vec<RankingMetric> {
        vec![
            RankingMetric::Recall(k),
            RankingMetric::Precision(k),
            RankingMetric::ReciprocalRank(k),
        ]
    }

    /// Name the metric is reported under.
    pub fn name(&self) -> String {
        match *self {
            RankingMetric::Recall(k) => format!("recall@{}", k),
            RankingMetric::Precision(k) => format!("precision@{}", k),
            RankingMetric::ReciprocalRank(k) => format!("mrr@{}", k),
        }
    }

    fn cutoff(&self) -> usize {
        match *self {
            RankingMetric::Recall(k)
            | RankingMetric::Precision(k)
            | RankingMetric::ReciprocalRank(k) => k,
        }
    }

    /// Evaluate on one example: `ranked` holds model indices, best first.
    pub fn compute(&self, label: ItemIndex, ranked: &[ItemIndex]) -> f32 {
        let ranked = &ranked[..ranked.len().min(self.cutoff())];
        let position = if label == UNKNOWN_INDEX {
            None
        } else {
            ranked.iter().position(|&candidate| candidate == label)
        };

        match (*self, position) {
            (_, None) => 0.0,
            (RankingMetric::Recall(_), Some(_)) => 1.0,
            (RankingMetric::Precision(k), Some(_)) => 1.0 / k.max(1) as f32,
            (RankingMetric::ReciprocalRank(_), Some(rank)) => 1.0 / (rank + 1) as f32,
        }
    }
}

/// Indices of the `k` highest `scores`, best first, ties broken towards
/// the lower index.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();

    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(k);

    indices
}

/// Top `k` candidates for `scores` (candidate index order), as model indices.
pub fn recommend(scores: &[f32], k: usize) -> Vec<ItemIndex> {
    top_k(scores, k).into_iter().map(to_model_index).collect()
}

/// Average `metrics` over a batch of labels and their ranked candidates.
pub fn ranking_metrics(
    metrics: &[RankingMetric],
    labels: &[ItemIndex],
    ranked: &[Vec<ItemIndex>],
) -> BTreeMap<String, f32> {
    let num_examples = labels.len().max(1) as f32;

    metrics
        .iter()
        .map(|metric| {
            let total: f32 = labels
                .par_iter()
                .zip(ranked.par_iter())
                .map(|(&label, candidates)| metric.compute(label, candidates))
                .sum();

            (metric.name(), total / num_examples)
        })
        .collect()
}
