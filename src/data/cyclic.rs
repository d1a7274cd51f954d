// ============================================================
// Layer 4 — Cyclic Batch Stream
// ============================================================
// The scaffold datasets are much smaller than the primary one,
// yet the orchestrator draws from them in fixed bursts for the
// whole epoch. A CyclicBatches stream turns a finite sequence
// of batches into an endless one:
//
//   source: [a, b, c]
//   draws:   a b c a b c a ...
//
// Exhaustion is not an error — the cursor rewinds to the start
// and the same order is replayed. Each rewind bumps `laps` so
// callers can log how often a scaffold source wrapped.

use crate::domain::errors::DataError;

#[derive(Debug, Clone)]
pub struct CyclicBatches<T> {
    items:  Vec<T>,
    cursor: usize,
    laps:   usize,
}

impl<T: Clone> CyclicBatches<T> {
    /// An empty source can't be cycled, so it is rejected up front.
    pub fn new(task: &'static str, items: Vec<T>) -> Result<Self, DataError> {
        if items.is_empty() {
            return Err(DataError::EmptySource { task });
        }
        Ok(Self { items, cursor: 0, laps: 0 })
    }

    /// Next item, rewinding to the first one when the source runs out.
    pub fn draw(&mut self) -> T {
        if self.cursor == self.items.len() {
            self.cursor = 0;
            self.laps  += 1;
            tracing::debug!("Cyclic source rewound (lap {})", self.laps);
        }
        let item = self.items[self.cursor].clone();
        self.cursor += 1;
        item
    }

    /// Completed rewinds so far.
    pub fn laps(&self) -> usize {
        self.laps
    }
}

impl<T: Clone> Iterator for CyclicBatches<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        Some(self.draw())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_longer_than_source_rewinds() {
        let mut stream = CyclicBatches::new("section", vec!['a', 'b', 'c']).unwrap();
        let burst: Vec<char> = (0..5).map(|_| stream.draw()).collect();
        assert_eq!(burst, vec!['a', 'b', 'c', 'a', 'b']);
        assert_eq!(burst[3], burst[0]);
        assert_eq!(burst[4], burst[1]);
        assert_eq!(stream.laps(), 1);
    }

    #[test]
    fn test_position_carries_across_bursts() {
        let mut stream = CyclicBatches::new("citation", vec![1, 2, 3]).unwrap();
        let first: Vec<i32>  = stream.by_ref().take(2).collect();
        let second: Vec<i32> = stream.by_ref().take(2).collect();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3, 1]);
    }

    #[test]
    fn test_no_rewind_until_exhausted() {
        let mut stream = CyclicBatches::new("section", vec![0u8; 4]).unwrap();
        for _ in 0..4 {
            stream.draw();
        }
        assert_eq!(stream.laps(), 0);
        stream.draw();
        assert_eq!(stream.laps(), 1);
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let err = CyclicBatches::<u8>::new("citation", Vec::new()).unwrap_err();
        assert_eq!(err, DataError::EmptySource { task: "citation" });
    }
}
