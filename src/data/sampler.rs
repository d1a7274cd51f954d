// ============================================================
// Layer 4 — Batch Planning and Loading
// ============================================================
// Shuffles a dataset's row indices and cuts them into batches:
//
//   rows:    0 1 2 3 4 5 6
//   shuffle: 4 0 6 2 5 1 3
//   plan:    [4 0 6] [2 5 1] [3]      (batch_size = 3)
//
// A partial final batch is kept. The shuffle draws from the
// run's single seeded generator, so a given seed always yields
// the same batch order for every source in every epoch.
//
// BatchLoader then turns one planned index group into an
// EncodedBatch on the loader's device.

use rand::seq::SliceRandom;
use rand::Rng;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

use crate::data::batcher::{EncodedBatch, TaskBatcher};
use crate::data::dataset::TaskDataset;
use crate::domain::example::TaskKind;

/// Shuffle `0..len` and split into groups of `batch_size`.
pub fn plan_batches<R: Rng + ?Sized>(len: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order.chunks(batch_size.max(1)).map(<[usize]>::to_vec).collect()
}

/// Split `0..len` into groups of `batch_size` without shuffling.
pub fn sequential_batches(len: usize, batch_size: usize) -> Vec<Vec<usize>> {
    let order: Vec<usize> = (0..len).collect();
    order.chunks(batch_size.max(1)).map(<[usize]>::to_vec).collect()
}

/// A dataset paired with a batcher for one backend.
pub struct BatchLoader<B: Backend> {
    dataset:    TaskDataset,
    batcher:    TaskBatcher<B>,
    batch_size: usize,
}

impl<B: Backend> BatchLoader<B> {
    pub fn new(dataset: TaskDataset, device: B::Device, batch_size: usize) -> Self {
        Self { dataset, batcher: TaskBatcher::new(device), batch_size: batch_size.max(1) }
    }

    pub fn task(&self) -> TaskKind {
        self.dataset.task()
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.batch_count(self.batch_size)
    }

    /// A fresh shuffled batch order for one epoch.
    pub fn shuffled_plan<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Vec<usize>> {
        plan_batches(self.dataset.len(), self.batch_size, rng)
    }

    pub fn sequential_plan(&self) -> Vec<Vec<usize>> {
        sequential_batches(self.dataset.len(), self.batch_size)
    }

    /// Stack the rows at `indices` into one batch.
    pub fn load(&self, indices: &[usize]) -> EncodedBatch<B> {
        let items = indices
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        self.batcher.batch(items)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_plan_covers_every_row_once() {
        let mut rng  = StdRng::seed_from_u64(0);
        let plan     = plan_batches(7, 3, &mut rng);
        let sizes: Vec<usize> = plan.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let mut all: Vec<usize> = plan.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_plan() {
        let a = plan_batches(50, 4, &mut StdRng::seed_from_u64(7));
        let b = plan_batches(50, 4, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset_has_no_batches() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(plan_batches(0, 16, &mut rng).is_empty());
    }

    #[test]
    fn test_sequential_plan_keeps_order() {
        assert_eq!(sequential_batches(5, 2), vec![vec![0, 1], vec![2, 3], vec![4]]);
    }
}
