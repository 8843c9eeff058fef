//! Frequency-weighted negative sampling.
use rand::distributions::Distribution;
use rand::Rng;

use crate::ItemIndex;

/// Add-one smoothing applied to every row, so that the unknown slot and
/// zero-count items keep non-zero mass.
pub const SMOOTHING: f64 = 1.0;

/// Samples model indices with probability proportional to their smoothed
/// training frequency.
#[derive(Clone, Debug)]
pub struct UnigramSampler {
    probabilities: Vec<f64>,
    cumulative: Vec<f64>,
}

impl UnigramSampler {
    /// Build a sampler from the frequencies of the known items (candidate
    /// index order). The unknown slot is given a count of zero before
    /// smoothing.
    pub fn new(item_counts: &[u64]) -> Self {
        let weights: Vec<f64> = ::std::iter::once(0)
            .chain(item_counts.iter().cloned())
            .map(|count| count as f64 + SMOOTHING)
            .collect();
        let total: f64 = weights.iter().sum();

        let probabilities: Vec<f64> = weights.iter().map(|weight| weight / total).collect();

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut running = 0.0;
        for weight in &weights {
            running += weight;
            cumulative.push(running / total);
        }

        UnigramSampler {
            probabilities,
            cumulative,
        }
    }

    /// Number of model indices the sampler draws from.
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// Whether there is nothing to sample; never true for a built sampler.
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Probability of drawing `index` in a single draw.
    pub fn probability(&self, index: ItemIndex) -> f64 {
        self.probabilities[index]
    }
}

impl Distribution<ItemIndex> for UnigramSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ItemIndex {
        let draw: f64 = rng.gen();
        let position = self.cumulative.partition_point(|&threshold| threshold <= draw);

        position.min(self.cumulative.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use rand::prng::XorShiftRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn probabilities_are_smoothed_and_normalised() {
        let sampler = UnigramSampler::new(&[10, 5, 1]);

        assert_eq!(sampler.len(), 4);
        assert!((sampler.probability(0) - 1.0 / 20.0).abs() < 1e-12);
        assert!((sampler.probability(1) - 11.0 / 20.0).abs() < 1e-12);
        assert!((sampler.probability(3) - 2.0 / 20.0).abs() < 1e-12);

        let total: f64 = (0..sampler.len()).map(|idx| sampler.probability(idx)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn frequent_items_are_drawn_more_often() {
        let sampler = UnigramSampler::new(&[10, 5, 1]);
        let mut rng = XorShiftRng::from_seed([42; 16]);

        let num_draws = 50_000;
        let mut counts = vec![0usize; sampler.len()];
        for _ in 0..num_draws {
            counts[sampler.sample(&mut rng)] += 1;
        }

        for (idx, &count) in counts.iter().enumerate() {
            let empirical = count as f64 / num_draws as f64;
            assert!((empirical - sampler.probability(idx)).abs() < 0.01);
        }

        assert!(counts[1] > counts[2]);
        assert!(counts[2] > counts[3]);
    }
}
