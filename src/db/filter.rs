use bloom::{BloomFilter, ASMS};

/// Per-transaction probabilistic set of triple ids soft-deleted during the
/// current transaction.
///
/// A hit routes a re-added triple through UNDELETE instead of INSERT. A
/// false positive only costs a harmless extra UNDELETE of an already
/// active row, never corruption, which is what bounds the acceptable
/// error rate. Reset re-derives a brand-new filter at the original fixed
/// capacity on every commit and rollback.
pub(crate) struct DeletionFilter {
    filter: BloomFilter,
    capacity: u32,
    rate: f32,
}

impl DeletionFilter {
    pub fn new(capacity: u32, rate: f32) -> DeletionFilter {
        let capacity = capacity.max(1);
        DeletionFilter {
            filter: BloomFilter::with_rate(rate, capacity),
            capacity,
            rate,
        }
    }

    /// Records a deleted triple id.
    pub fn record(&mut self, id: i64) {
        self.filter.insert(&id);
    }

    /// Whether the id may have been deleted this transaction. No false
    /// negatives.
    pub fn maybe_contains(&self, id: i64) -> bool {
        self.filter.contains(&id)
    }

    /// Fresh filter for the next transaction.
    pub fn reset(&mut self) {
        self.filter = BloomFilter::with_rate(self.rate, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_ids_are_always_reported() {
        let mut filter = DeletionFilter::new(100_000, 0.01);
        for id in 0..1000i64 {
            filter.record(id);
        }
        for id in 0..1000i64 {
            assert!(filter.maybe_contains(id));
        }
    }

    #[test]
    fn reset_forgets_the_previous_transaction() {
        let mut filter = DeletionFilter::new(100_000, 0.01);
        filter.record(42);
        assert!(filter.maybe_contains(42));
        filter.reset();
        assert!(!filter.maybe_contains(42));
    }
}
