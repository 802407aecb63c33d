use std::sync::Arc;

use crate::error::{RowSourceError, RowSourceResult};
use crate::model::{
    Candidate, CandidateFilter, Developer, Disease, Page, Phase, Priority, Product, Snapshot,
    SummaryBucket, SummaryDimension, Technology,
};

pub mod memory;
pub mod sqlite;

pub use memory::{Dataset, InMemoryRowSource, RowSourceCall};
pub use sqlite::{ChangeToken, SqliteRowSource};

/// Synchronous access to the pipeline dataset.
///
/// Relationship lookups take a key list and return rows in no particular order; reindexing them
/// by key is the loaders' job. Root queries are answered directly.
pub trait RowSource: Send + Sync {
    // Root queries.
    /// One page of the filtered list together with the total match count, both read from the
    /// same version of the dataset.
    fn candidate_page(
        &self,
        filter: &CandidateFilter,
        page: Page,
    ) -> RowSourceResult<(Vec<Candidate>, u64)>;
    fn candidates(&self, filter: &CandidateFilter, page: Page) -> RowSourceResult<Vec<Candidate>>;
    fn candidate_count(&self, filter: &CandidateFilter) -> RowSourceResult<u64>;
    fn candidate_by_key(&self, candidate_key: i64) -> RowSourceResult<Option<Candidate>>;
    fn summary(&self, dimension: SummaryDimension) -> RowSourceResult<Vec<SummaryBucket>>;
    fn diseases(&self) -> RowSourceResult<Vec<Disease>>;
    fn products(&self) -> RowSourceResult<Vec<Product>>;
    fn phases(&self) -> RowSourceResult<Vec<Phase>>;

    // Single-valued relationships: at most one row per key.
    fn products_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Product>>;
    fn snapshots_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>>;
    fn diseases_by_keys(&self, keys: &[String]) -> RowSourceResult<Vec<Disease>>;
    fn phases_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Phase>>;

    // Multi-valued relationships: zero or more rows per key.
    fn developers_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Developer)>>;
    fn technologies_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Technology)>>;
    fn snapshots_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>>;
    fn priorities_by_diseases(&self, keys: &[String]) -> RowSourceResult<Vec<Priority>>;
}

pub type SharedRowSource = Arc<dyn RowSource>;

/// Runs one row source call on tokio's blocking pool.
pub async fn run_blocking<T, F>(source: &SharedRowSource, call: F) -> RowSourceResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn RowSource) -> RowSourceResult<T> + Send + 'static,
{
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || call(source.as_ref()))
        .await
        .map_err(|e| RowSourceError::Join(e.to_string()))?
}
