//! Softmax losses over the item vocabulary.
//!
//! Both strategies score a hidden state `h` against item embeddings `e_j`
//! with `s_j = h · e_j`, using the same embedding table the encoder reads
//! its inputs from.
//!
//! - [`VanillaSoftmax`] is the exact cross-entropy
//!   `ln Σ_j exp(s_j) - s_label` over every row of the table.
//! - [`SampledSoftmax`] draws `m` negatives with replacement from the
//!   smoothed unigram distribution `q` of [`UnigramSampler`] and replaces
//!   the partition sum with `exp(s_label) + Σ_k exp(s_k - ln(m q_k))`.
//!   The label and its negatives are scored as one candidate row with the
//!   label in position 0.
//!   Each negative's weight `1 / (m q_k)` is its inverse expected count, so
//!   the estimate is unbiased for the full partition sum. A negative equal
//!   to the label (an accidental hit) is masked out, which keeps the label
//!   from being counted twice.
//!
//! Accidental hits receive a logit of [`ACCIDENTAL_HIT_LOGIT`]; they then
//! contribute nothing to the partition sum and receive no gradient.
//!
//! Both losses are computed with wyrm's sparse categorical cross-entropy,
//! which shifts by the largest logit before exponentiating.
use rand::distributions::Distribution;
use rand::Rng;

use wyrm;
use wyrm::nn::losses::sparse_categorical_crossentropy;
use wyrm::{Arr, BoxedNode, DataInput, Variable};

use super::embedding::ItemEmbeddings;
use super::sampler::UnigramSampler;
use super::LossKind;
use crate::vocabulary::{Vocabulary, UNKNOWN_INDEX};
use crate::{BuildError, ItemIndex};

/// Logit assigned to sampled negatives that coincide with the label.
pub const ACCIDENTAL_HIT_LOGIT: f32 = -1.0e9;

/// The per-example input nodes of a loss graph.
pub enum LossInputs {
    /// Inputs of the full softmax.
    Vanilla {
        /// Model index of the label.
        label: Variable<wyrm::IndexInputNode>,
    },
    /// Inputs of the sampled softmax.
    Sampled {
        /// Model indices of the label followed by the sampled negatives.
        candidates: Variable<wyrm::IndexInputNode>,
        /// Logit corrections of the candidates; zero for the label.
        correction: Variable<wyrm::InputNode>,
    },
}

/// Full softmax with the output projection tied to the item embeddings.
#[derive(Clone, Debug)]
pub struct VanillaSoftmax {
    embeddings: ItemEmbeddings,
}

impl VanillaSoftmax {
    /// Tie the loss to `embeddings`.
    pub fn new(embeddings: &ItemEmbeddings) -> Self {
        VanillaSoftmax {
            embeddings: embeddings.clone(),
        }
    }

    fn build(
        &self,
        item_embeddings: &Variable<wyrm::ParameterNode>,
        hidden: &Variable<BoxedNode>,
    ) -> (LossInputs, Variable<BoxedNode>) {
        let label = wyrm::IndexInputNode::new(&[0]);

        let logits = hidden.dot(&item_embeddings.t()).boxed();
        let loss = sparse_categorical_crossentropy(&logits, &label).boxed();

        (LossInputs::Vanilla { label }, loss)
    }
}

/// Sampled softmax with log expected-count correction.
#[derive(Clone, Debug)]
pub struct SampledSoftmax {
    embeddings: ItemEmbeddings,
    sampler: UnigramSampler,
    num_negatives: usize,
}

impl SampledSoftmax {
    /// Build a sampled softmax drawing `num_negatives` negatives per example
    /// according to `item_counts` (candidate index order).
    pub fn new(item_counts: &[u64], embeddings: &ItemEmbeddings, num_negatives: usize) -> Self {
        SampledSoftmax {
            embeddings: embeddings.clone(),
            sampler: UnigramSampler::new(item_counts),
            num_negatives,
        }
    }

    /// Number of negatives drawn per example.
    pub fn num_negatives(&self) -> usize {
        self.num_negatives
    }

    /// The negative sampling distribution.
    pub fn sampler(&self) -> &UnigramSampler {
        &self.sampler
    }

    /// Draw a fresh set of negatives.
    pub fn draw_negatives<R: Rng>(&self, rng: &mut R) -> Vec<ItemIndex> {
        (0..self.num_negatives)
            .map(|_| self.sampler.sample(rng))
            .collect()
    }

    /// Logit corrections for `negatives`: `-ln(m q_k)`, or
    /// [`ACCIDENTAL_HIT_LOGIT`] where the negative is the label.
    pub fn correction(&self, label: ItemIndex, negatives: &[ItemIndex]) -> Vec<f32> {
        let num_draws = negatives.len() as f64;

        negatives
            .iter()
            .map(|&negative| {
                if negative == label {
                    ACCIDENTAL_HIT_LOGIT
                } else {
                    -(num_draws * self.sampler.probability(negative)).ln() as f32
                }
            })
            .collect()
    }

    fn build(
        &self,
        item_embeddings: &Variable<wyrm::ParameterNode>,
        hidden: &Variable<BoxedNode>,
    ) -> (LossInputs, Variable<BoxedNode>) {
        let num_candidates = self.num_negatives + 1;
        let candidates = wyrm::IndexInputNode::new(&vec![0; num_candidates]);
        let correction = wyrm::InputNode::new(Arr::zeros((1, num_candidates)));
        // The label always sits in the first candidate slot.
        let target = wyrm::IndexInputNode::new(&[0]);

        let logits = (hidden.dot(&item_embeddings.index(&candidates).t()) + correction.clone())
            .boxed();
        let loss = sparse_categorical_crossentropy(&logits, &target).boxed();

        (
            LossInputs::Sampled {
                candidates,
                correction,
            },
            loss,
        )
    }
}

/// A loss strategy, selected by [`LossKind`].
#[derive(Clone, Debug)]
pub enum LossStrategy {
    /// Full softmax.
    Vanilla(VanillaSoftmax),
    /// Sampled softmax.
    Sampled(SampledSoftmax),
}

impl LossStrategy {
    /// Build the strategy for `kind`, scoring against `embeddings`.
    ///
    /// `num_negatives` is only used by the sampled softmax.
    pub fn new(
        kind: LossKind,
        embeddings: &ItemEmbeddings,
        vocabulary: &Vocabulary,
        num_negatives: usize,
    ) -> Self {
        match kind {
            LossKind::VanillaSoftmax => LossStrategy::Vanilla(VanillaSoftmax::new(embeddings)),
            LossKind::SampledSoftmax => LossStrategy::Sampled(SampledSoftmax::new(
                vocabulary.counts(),
                embeddings,
                num_negatives,
            )),
        }
    }

    /// Build the strategy from its configuration name, failing on names
    /// other than `vanilla-sm` and `sampled-sm`.
    pub fn from_name(
        name: &str,
        embeddings: &ItemEmbeddings,
        vocabulary: &Vocabulary,
        num_negatives: usize,
    ) -> Result<Self, BuildError> {
        let kind = name.parse()?;

        Ok(Self::new(kind, embeddings, vocabulary, num_negatives))
    }

    /// Which loss this is.
    pub fn kind(&self) -> LossKind {
        match *self {
            LossStrategy::Vanilla(_) => LossKind::VanillaSoftmax,
            LossStrategy::Sampled(_) => LossKind::SampledSoftmax,
        }
    }

    fn embeddings(&self) -> &ItemEmbeddings {
        match *self {
            LossStrategy::Vanilla(ref loss) => &loss.embeddings,
            LossStrategy::Sampled(ref loss) => &loss.embeddings,
        }
    }

    /// Add the loss of one example to the graph.
    ///
    /// `item_embeddings` must be the node the encoder inputs were indexed
    /// from, so that the tied weights accumulate a single gradient.
    pub fn build(
        &self,
        item_embeddings: &Variable<wyrm::ParameterNode>,
        hidden: &Variable<BoxedNode>,
    ) -> (LossInputs, Variable<BoxedNode>) {
        match *self {
            LossStrategy::Vanilla(ref loss) => loss.build(item_embeddings, hidden),
            LossStrategy::Sampled(ref loss) => loss.build(item_embeddings, hidden),
        }
    }

    /// Set the label of an example, drawing new negatives if sampling.
    pub fn prepare<R: Rng>(&self, inputs: &LossInputs, label: ItemIndex, rng: &mut R) {
        match *self {
            LossStrategy::Vanilla(_) => self.prepare_with_negatives(inputs, label, &[]),
            LossStrategy::Sampled(ref loss) => {
                let negatives = loss.draw_negatives(rng);
                self.prepare_with_negatives(inputs, label, &negatives)
            }
        }
    }

    /// Set the label of an example together with an explicit set of
    /// negatives. Negatives are ignored by the full softmax.
    ///
    /// # Panics
    /// If the number of negatives differs from the configured number for the
    /// sampled softmax, or if `inputs` were built by the other strategy.
    pub fn prepare_with_negatives(
        &self,
        inputs: &LossInputs,
        label: ItemIndex,
        negative_indices: &[ItemIndex],
    ) {
        match (self, inputs) {
            (
                &LossStrategy::Sampled(ref loss),
                &LossInputs::Sampled {
                    ref candidates,
                    ref correction,
                },
            ) => {
                assert_eq!(negative_indices.len(), loss.num_negatives);

                let mut candidate_indices = Vec::with_capacity(negative_indices.len() + 1);
                candidate_indices.push(label);
                candidate_indices.extend_from_slice(negative_indices);

                // The label's own slot (position 0) stays uncorrected.
                let mut correction_value = Arr::zeros((1, candidate_indices.len()));
                for (dst, src) in correction_value
                    .iter_mut()
                    .skip(1)
                    .zip(loss.correction(label, negative_indices))
                {
                    *dst = src;
                }

                candidates.set_value(&candidate_indices[..]);
                correction.set_value(&correction_value);
            }
            (_, &LossInputs::Vanilla { label: ref target }) => target.set_value(label),
            (_, &LossInputs::Sampled { .. }) => {
                panic!("Sampled loss inputs passed to the full softmax")
            }
        }
    }

    /// Scores of every model index, the unknown slot included.
    pub fn logits(&self, hidden: &[f32]) -> Vec<f32> {
        self.embeddings().dot_all(hidden)
    }

    /// Scores of every known item, in candidate index order.
    pub fn score(&self, hidden: &[f32]) -> Vec<f32> {
        let mut scores = self.logits(hidden);
        scores.remove(UNKNOWN_INDEX);

        scores
    }
}

#[cfg(test)]
mod tests {
    use rand::prng::XorShiftRng;
    use rand::SeedableRng;

    use super::*;

    fn setup(kind: LossKind, num_negatives: usize) -> (Vocabulary, ItemEmbeddings, LossStrategy) {
        let vocabulary = Vocabulary::new(vec![("A", 10), ("B", 5), ("C", 1)]).unwrap();
        let mut rng = XorShiftRng::from_seed([42; 16]);
        let embeddings = ItemEmbeddings::new(vocabulary.num_rows(), 4, &mut rng);
        let loss = LossStrategy::new(kind, &embeddings, &vocabulary, num_negatives);

        (vocabulary, embeddings, loss)
    }

    fn hidden_node(hidden: &[f32]) -> Variable<BoxedNode> {
        let mut value = Arr::zeros((1, hidden.len()));
        for (dst, &src) in value.iter_mut().zip(hidden) {
            *dst = src;
        }

        wyrm::InputNode::new(value).boxed()
    }

    fn log_sum_exp(xs: &[f32]) -> f32 {
        let max = xs.iter().cloned().fold(::std::f32::NEG_INFINITY, f32::max);

        max + xs.iter().map(|x| (x - max).exp()).sum::<f32>().ln()
    }

    #[test]
    fn factory_rejects_unknown_names() {
        let (vocabulary, embeddings, _) = setup(LossKind::VanillaSoftmax, 1);

        match LossStrategy::from_name("bogus-loss", &embeddings, &vocabulary, 1) {
            Err(BuildError::UnknownLossKind(ref name)) if name == "bogus-loss" => {}
            other => panic!("Unexpected result {:?}", other),
        }

        let loss = LossStrategy::from_name("sampled-sm", &embeddings, &vocabulary, 3).unwrap();
        assert_eq!(loss.kind(), LossKind::SampledSoftmax);
    }

    #[test]
    fn vanilla_loss_is_full_cross_entropy() {
        let (_, embeddings, loss) = setup(LossKind::VanillaSoftmax, 0);
        let hidden = vec![0.3, -0.7, 0.2, 0.9];
        let label = 3;

        let item_embeddings = embeddings.node();
        let (inputs, mut loss_node) = loss.build(&item_embeddings, &hidden_node(&hidden));
        loss.prepare_with_negatives(&inputs, label, &[]);
        loss_node.forward();

        let logits = loss.logits(&hidden);
        let expected = log_sum_exp(&logits) - logits[label];
        let label_score: f32 = embeddings
            .row(label)
            .iter()
            .zip(&hidden)
            .map(|(x, y)| x * y)
            .sum();

        assert_eq!(logits.len(), 4);
        assert!((logits[label] - label_score).abs() < 1e-6);
        assert!((loss_node.value().scalar_sum() - expected).abs() < 1e-4);

        loss_node.backward(1.0);
    }

    #[test]
    fn score_drops_the_unknown_slot() {
        let (_, _, loss) = setup(LossKind::VanillaSoftmax, 0);
        let hidden = vec![1.0, 0.5, -0.5, 0.0];

        let logits = loss.logits(&hidden);
        let scores = loss.score(&hidden);

        assert_eq!(scores.len(), logits.len() - 1);
        assert_eq!(&scores[..], &logits[1..]);
    }

    #[test]
    fn correction_matches_sampling_distribution() {
        let (_, _, loss) = setup(LossKind::SampledSoftmax, 4);

        if let LossStrategy::Sampled(ref sampled) = loss {
            let negatives = vec![0, 1, 2, 1];
            let correction = sampled.correction(2, &negatives);

            let expected_zero = -(4.0 * sampled.sampler().probability(0)).ln() as f32;
            let expected_one = -(4.0 * sampled.sampler().probability(1)).ln() as f32;

            assert!((correction[0] - expected_zero).abs() < 1e-6);
            assert!((correction[1] - expected_one).abs() < 1e-6);
            assert_eq!(correction[2], ACCIDENTAL_HIT_LOGIT);
            assert!((correction[3] - expected_one).abs() < 1e-6);
        } else {
            panic!("Expected a sampled softmax");
        }
    }

    #[test]
    fn sampled_loss_matches_hand_computation() {
        let (_, embeddings, loss) = setup(LossKind::SampledSoftmax, 3);
        let hidden = vec![0.1, 0.4, -0.3, 0.8];
        let label = 1;
        let negatives = vec![2, 1, 0];

        let item_embeddings = embeddings.node();
        let (inputs, mut loss_node) = loss.build(&item_embeddings, &hidden_node(&hidden));
        loss.prepare_with_negatives(&inputs, label, &negatives);
        loss_node.forward();

        let sampler = UnigramSampler::new(&[10, 5, 1]);
        let logits = loss.logits(&hidden);
        let partition = logits[label].exp()
            + negatives
                .iter()
                .filter(|&&negative| negative != label)
                .map(|&negative| logits[negative].exp() / (3.0 * sampler.probability(negative)) as f32)
                .sum::<f32>();
        let expected = partition.ln() - logits[label];

        assert!((loss_node.value().scalar_sum() - expected).abs() < 1e-4);
    }

    #[test]
    fn all_accidental_hits_give_zero_finite_loss() {
        let (_, embeddings, loss) = setup(LossKind::SampledSoftmax, 3);
        let hidden = vec![0.5, 0.5, -0.5, 0.25];
        let label = 2;

        let item_embeddings = embeddings.node();
        let (inputs, mut loss_node) = loss.build(&item_embeddings, &hidden_node(&hidden));
        loss.prepare_with_negatives(&inputs, label, &[label, label, label]);
        loss_node.forward();

        let value = loss_node.value().scalar_sum();
        assert!(value.is_finite());
        assert!(value.abs() < 1e-5);

        loss_node.backward(1.0);
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let hidden = vec![400.0; 4];

        let (_, embeddings, vanilla) = setup(LossKind::VanillaSoftmax, 0);
        let logits = vanilla.logits(&hidden);
        assert!(logits.iter().any(|x| x.abs() > 100.0));

        for label in 1..logits.len() {
            let item_embeddings = embeddings.node();
            let (inputs, mut loss_node) = vanilla.build(&item_embeddings, &hidden_node(&hidden));
            vanilla.prepare_with_negatives(&inputs, label, &[]);
            loss_node.forward();

            let value = loss_node.value().scalar_sum();
            let expected = log_sum_exp(&logits) - logits[label];

            assert!(value.is_finite());
            assert!((value - expected).abs() < 1e-3 * expected.abs().max(1.0));
        }

        let (_, embeddings, sampled) = setup(LossKind::SampledSoftmax, 3);
        let label = 1;
        let negatives = vec![2, 3, 0];

        let item_embeddings = embeddings.node();
        let (inputs, mut loss_node) = sampled.build(&item_embeddings, &hidden_node(&hidden));
        sampled.prepare_with_negatives(&inputs, label, &negatives);
        loss_node.forward();

        let sampler = UnigramSampler::new(&[10, 5, 1]);
        let corrected: Vec<f32> = ::std::iter::once(logits[label])
            .chain(
                negatives
                    .iter()
                    .map(|&negative| logits[negative] - (3.0 * sampler.probability(negative)).ln() as f32),
            )
            .collect();
        let expected = log_sum_exp(&corrected) - logits[label];
        let value = loss_node.value().scalar_sum();

        assert!(value.is_finite());
        assert!((value - expected).abs() < 1e-3 * expected.abs().max(1.0));
    }
}
