use std::time::Duration;

/// Tuning knobs for the store. Capacities bound the process-wide caches;
/// the rest govern batching, retries, and the garbage collector.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Entries in the node-by-id cache.
    pub node_cache_capacity: usize,
    /// Entries in the triple-by-id cache.
    pub triple_cache_capacity: usize,
    /// Entries in the URI-by-string cache.
    pub uri_cache_capacity: usize,
    /// Entries in the blank-node cache.
    pub blank_cache_capacity: usize,
    /// Entries in the literal cache.
    pub literal_cache_capacity: usize,
    /// Entries in each namespace cache.
    pub namespace_cache_capacity: usize,
    /// Whether triple writes are staged and flushed in batches.
    pub batching: bool,
    /// Staged triples per automatic flush.
    pub batch_size: usize,
    /// Attempts per retried unit of backend work.
    pub retry_attempts: u32,
    /// Base backoff between retries; jittered by ±25%.
    pub retry_backoff: Duration,
    /// Capacity of the per-transaction deletion filter.
    pub deletion_filter_capacity: u32,
    /// Target false-positive rate of the deletion filter.
    pub deletion_filter_rate: f32,
    /// Whether the background garbage collector runs.
    pub gc_enabled: bool,
    /// Interval between collector cycles.
    pub gc_interval: Duration,
    /// Node cleanup runs every this many collector cycles.
    pub gc_node_cycle: u32,
    /// Rows fetched per cursor page.
    pub fetch_page_size: usize,
    /// Idle sessions kept in the pool.
    pub max_idle_sessions: usize,
    /// Ids claimed per sequence round trip.
    pub sequence_block: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            node_cache_capacity: 8192,
            triple_cache_capacity: 8192,
            uri_cache_capacity: 4096,
            blank_cache_capacity: 1024,
            literal_cache_capacity: 4096,
            namespace_cache_capacity: 256,
            batching: true,
            batch_size: 1024,
            retry_attempts: 4,
            retry_backoff: Duration::from_millis(50),
            deletion_filter_capacity: 100_000,
            deletion_filter_rate: 0.01,
            gc_enabled: true,
            gc_interval: Duration::from_secs(60),
            gc_node_cycle: 3,
            fetch_page_size: 256,
            max_idle_sessions: 8,
            sequence_block: 64,
        }
    }
}

impl StoreConfig {
    /// Larger caches and batches for sustained mixed workloads.
    pub fn balanced() -> Self {
        Self {
            node_cache_capacity: 32_768,
            triple_cache_capacity: 32_768,
            uri_cache_capacity: 16_384,
            literal_cache_capacity: 16_384,
            batch_size: 4096,
            ..Self::default()
        }
    }

    /// Tuned for one-shot imports: big batches, lazy collection.
    pub fn bulk_load() -> Self {
        Self {
            batch_size: 8192,
            gc_interval: Duration::from_secs(300),
            gc_node_cycle: 10,
            sequence_block: 1024,
            ..Self::balanced()
        }
    }
}
