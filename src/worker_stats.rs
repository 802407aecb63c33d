/// Point-in-time copy of a loader's counters, returned by [`crate::Loader::stats`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoaderStats {
    /// Number of `LoaderOp::Load` that were received by the worker.
    pub load_requests: u32,
    /// The total number of keys that were requested for loading (not necessarily unique).
    pub keys_requested: u32,
    /// The number of keys that were found in the cache, either resolved or already pending.
    pub cache_hits: u32,
    /// Number of times the batch function was invoked.
    pub dispatches: u32,
    /// Number of dispatches that ended in an error or a length mismatch.
    pub failed_dispatches: u32,
    /// The average number of unique keys per dispatch.
    pub average_batch_size: f32,
    /// The max number of unique keys fetched during a single dispatch.
    pub max_batch_size: u32,
    /// The min number of unique keys fetched during a single dispatch. Zero until the first
    /// dispatch.
    pub min_batch_size: u32,
    /// The total number of keys that resolved successfully.
    pub keys_loaded: u32,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    counters: LoaderStats,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, counters: LoaderStats::default() }
    }

    pub fn record_load_request(&mut self, keys_requested: u32) {
        self.counters.load_requests += 1;
        self.counters.keys_requested += keys_requested;
    }

    pub fn record_cache_hits(&mut self, hits: u32) {
        self.counters.cache_hits += hits;
    }

    pub fn record_dispatch(&mut self, batch_size: u32) {
        let c = &mut self.counters;
        let new_total = c.dispatches + 1;
        c.average_batch_size = (((c.average_batch_size as f64 * c.dispatches as f64)
            + batch_size as f64)
            / new_total as f64) as f32;
        if c.dispatches == 0 || batch_size < c.min_batch_size {
            c.min_batch_size = batch_size;
        }
        if batch_size > c.max_batch_size {
            c.max_batch_size = batch_size;
        }
        c.dispatches = new_total;
    }

    pub fn record_dispatch_completed(&mut self, loaded_key_count: u32) {
        self.counters.keys_loaded += loaded_key_count;
    }

    pub fn record_dispatch_failed(&mut self) {
        self.counters.failed_dispatches += 1;
    }

    pub fn snapshot(&self) -> LoaderStats {
        self.counters.clone()
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(tag = self.tag, worker_stats = ?self.counters);
    }
}
