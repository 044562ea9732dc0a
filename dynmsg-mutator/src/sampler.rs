use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One-pass weighted selection of a single item from a stream of
/// `(weight, item)` pairs, without materialising the stream.
pub trait WeightedReservoirSampler<T> {
    fn new(seed: u64) -> Self
    where
        Self: Sized;

    /// Offers one candidate. Zero-weight items are ignored.
    fn offer(&mut self, weight: u64, item: T);

    fn is_empty(&self) -> bool;

    /// The selected item, with probability proportional to its weight.
    fn into_selected(self) -> Option<T>;
}

// https://en.wikipedia.org/wiki/Reservoir_sampling#Algorithm_A-Chao
pub struct ChaoSampler<T> {
    rng: StdRng,
    selected: Option<T>,
    total_weight: u64,
}

impl<T> WeightedReservoirSampler<T> for ChaoSampler<T> {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            selected: None,
            total_weight: 0,
        }
    }

    fn offer(&mut self, weight: u64, item: T) {
        if weight == 0 {
            return;
        }

        self.total_weight += weight;

        if weight == self.total_weight
            || self.rng.gen_range(1..=self.total_weight) <= weight
        {
            self.selected = Some(item);
        }
    }

    fn is_empty(&self) -> bool {
        self.selected.is_none()
    }

    fn into_selected(self) -> Option<T> {
        self.selected
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Records every offered candidate and deterministically selects the
    /// first one; lets tests assert the full candidate stream.
    pub struct TestSampler<T> {
        offers: Vec<(u64, T)>,
    }

    impl<T: Clone> TestSampler<T> {
        pub fn offers(&self) -> &[(u64, T)] {
            &self.offers
        }

        pub fn items(&self) -> Vec<T> {
            self.offers.iter().map(|(_, item)| item.clone()).collect()
        }
    }

    impl<T: Clone> WeightedReservoirSampler<T> for TestSampler<T> {
        fn new(_seed: u64) -> Self {
            Self { offers: Vec::new() }
        }

        fn offer(&mut self, weight: u64, item: T) {
            if weight > 0 {
                self.offers.push((weight, item));
            }
        }

        fn is_empty(&self) -> bool {
            self.offers.is_empty()
        }

        fn into_selected(self) -> Option<T> {
            self.offers.into_iter().next().map(|(_, item)| item)
        }
    }

    #[test]
    fn test_chao_sampler_basic() {
        let mut sampler = ChaoSampler::new(42);
        sampler.offer(1, 1);
        sampler.offer(1, 2);
        sampler.offer(1, 3);
        assert!(!sampler.is_empty());
        assert!(sampler.into_selected().is_some());
    }

    #[test]
    fn test_chao_sampler_zero_weight() {
        let mut sampler = ChaoSampler::new(42);
        sampler.offer(0, 1);
        assert!(sampler.is_empty());
        assert_eq!(sampler.into_selected(), None);
    }

    #[test]
    fn test_chao_sampler_single_item() {
        let mut sampler = ChaoSampler::new(42);
        sampler.offer(1, 7);
        assert_eq!(sampler.into_selected(), Some(7));
    }

    #[test]
    fn test_chao_sampler_empty() {
        let sampler = ChaoSampler::<i32>::new(42);
        assert_eq!(sampler.into_selected(), None);
    }

    #[test]
    fn test_chao_sampler_weight_proportionality() {
        // Empirical frequencies over many independently seeded streams
        // should track weight / total.
        const TRIALS: usize = 100_000;
        let weights: [u64; 4] = [1, 2, 3, 4];
        let total: u64 = weights.iter().sum();

        let mut counts = [0usize; 4];
        for seed in 0..TRIALS {
            let mut sampler = ChaoSampler::new(seed as u64);
            for (item, &weight) in weights.iter().enumerate() {
                sampler.offer(weight, item);
            }
            counts[sampler.into_selected().unwrap()] += 1;
        }

        for (item, &weight) in weights.iter().enumerate() {
            let expected = TRIALS as f64 * weight as f64 / total as f64;
            let observed = counts[item] as f64;
            let deviation = (observed - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "item {} selected {} times, expected ~{}",
                item,
                observed,
                expected
            );
        }
    }
}
