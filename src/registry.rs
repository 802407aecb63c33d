use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    batch_function::BatchFunction,
    error::LoadError,
    loader::{DispatchMode, Loader},
    model::{Developer, Disease, Phase, Priority, Product, Snapshot, Technology},
    reindex::{align_many, align_owned, align_single},
    row_source::{run_blocking, SharedRowSource},
};

pub struct ProductByKey;

#[async_trait]
impl BatchFunction<i64, Option<Product>> for ProductByKey {
    type Context = SharedRowSource;

    async fn load(
        keys: &[i64],
        source: &SharedRowSource,
    ) -> Result<Vec<Option<Product>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.products_by_keys(&owned)).await?;
        Ok(align_single(keys, rows, |p| p.product_key))
    }
}

pub struct SnapshotByKey;

#[async_trait]
impl BatchFunction<i64, Option<Snapshot>> for SnapshotByKey {
    type Context = SharedRowSource;

    async fn load(
        keys: &[i64],
        source: &SharedRowSource,
    ) -> Result<Vec<Option<Snapshot>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.snapshots_by_keys(&owned)).await?;
        Ok(align_single(keys, rows, |s| s.snapshot_key))
    }
}

pub struct DiseaseByKey;

#[async_trait]
impl BatchFunction<String, Option<Disease>> for DiseaseByKey {
    type Context = SharedRowSource;

    async fn load(
        keys: &[String],
        source: &SharedRowSource,
    ) -> Result<Vec<Option<Disease>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.diseases_by_keys(&owned)).await?;
        Ok(align_single(keys, rows, |d| d.disease_key.clone()))
    }
}

pub struct PhaseByKey;

#[async_trait]
impl BatchFunction<i64, Option<Phase>> for PhaseByKey {
    type Context = SharedRowSource;

    async fn load(keys: &[i64], source: &SharedRowSource) -> Result<Vec<Option<Phase>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.phases_by_keys(&owned)).await?;
        Ok(align_single(keys, rows, |p| p.phase_key))
    }
}

pub struct DevelopersByCandidate;

#[async_trait]
impl BatchFunction<i64, Vec<Developer>> for DevelopersByCandidate {
    type Context = SharedRowSource;

    async fn load(
        keys: &[i64],
        source: &SharedRowSource,
    ) -> Result<Vec<Vec<Developer>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.developers_by_candidates(&owned)).await?;
        Ok(align_owned(keys, rows))
    }
}

pub struct TechnologiesByCandidate;

#[async_trait]
impl BatchFunction<i64, Vec<Technology>> for TechnologiesByCandidate {
    type Context = SharedRowSource;

    async fn load(
        keys: &[i64],
        source: &SharedRowSource,
    ) -> Result<Vec<Vec<Technology>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.technologies_by_candidates(&owned)).await?;
        Ok(align_owned(keys, rows))
    }
}

pub struct SnapshotsByCandidate;

#[async_trait]
impl BatchFunction<i64, Vec<Snapshot>> for SnapshotsByCandidate {
    type Context = SharedRowSource;

    async fn load(keys: &[i64], source: &SharedRowSource) -> Result<Vec<Vec<Snapshot>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.snapshots_by_candidates(&owned)).await?;
        Ok(align_many(keys, rows, |s| s.candidate_key))
    }
}

pub struct PrioritiesByDisease;

#[async_trait]
impl BatchFunction<String, Vec<Priority>> for PrioritiesByDisease {
    type Context = SharedRowSource;

    async fn load(
        keys: &[String],
        source: &SharedRowSource,
    ) -> Result<Vec<Vec<Priority>>, LoadError> {
        let owned = keys.to_vec();
        let rows = run_blocking(source, move |s| s.priorities_by_diseases(&owned)).await?;
        Ok(align_many(keys, rows, |p| p.disease_key.clone()))
    }
}

/// One loader per relationship kind. Build a new registry for every inbound request; nothing in
/// it is shared with other registries except the read-only row source.
///
/// Every loader runs in [`DispatchMode::Explicit`]: a batch holds exactly the keys loaded before
/// the next [`LoaderRegistry::dispatch`], however the runtime schedules the workers. Each batch
/// function makes one row source call on the blocking pool and reindexes the rows into one slot
/// per key, `None` for single-valued lookups without a match and an empty `Vec` otherwise.
///
/// Must be created inside a tokio runtime, since every loader spawns its worker task.
pub struct LoaderRegistry {
    pub product_by_key: Loader<i64, Option<Product>>,
    pub snapshot_by_key: Loader<i64, Option<Snapshot>>,
    pub disease_by_key: Loader<String, Option<Disease>>,
    pub phase_by_key: Loader<i64, Option<Phase>>,
    pub developers_by_candidate: Loader<i64, Vec<Developer>>,
    pub technologies_by_candidate: Loader<i64, Vec<Technology>>,
    pub snapshots_by_candidate: Loader<i64, Vec<Snapshot>>,
    pub priorities_by_disease: Loader<String, Vec<Priority>>,
}

impl LoaderRegistry {
    pub fn new(source: SharedRowSource) -> Self {
        let mode = DispatchMode::Explicit;
        Self {
            product_by_key: Loader::with_name(
                ProductByKey,
                Arc::clone(&source),
                mode,
                "product_by_key",
            ),
            snapshot_by_key: Loader::with_name(
                SnapshotByKey,
                Arc::clone(&source),
                mode,
                "snapshot_by_key",
            ),
            disease_by_key: Loader::with_name(
                DiseaseByKey,
                Arc::clone(&source),
                mode,
                "disease_by_key",
            ),
            phase_by_key: Loader::with_name(PhaseByKey, Arc::clone(&source), mode, "phase_by_key"),
            developers_by_candidate: Loader::with_name(
                DevelopersByCandidate,
                Arc::clone(&source),
                mode,
                "developers_by_candidate",
            ),
            technologies_by_candidate: Loader::with_name(
                TechnologiesByCandidate,
                Arc::clone(&source),
                mode,
                "technologies_by_candidate",
            ),
            snapshots_by_candidate: Loader::with_name(
                SnapshotsByCandidate,
                Arc::clone(&source),
                mode,
                "snapshots_by_candidate",
            ),
            priorities_by_disease: Loader::with_name(
                PrioritiesByDisease,
                source,
                mode,
                "priorities_by_disease",
            ),
        }
    }

    /// Flushes every loader. Loaders with nothing queued ignore it.
    pub fn dispatch(&self) {
        self.product_by_key.dispatch();
        self.snapshot_by_key.dispatch();
        self.disease_by_key.dispatch();
        self.phase_by_key.dispatch();
        self.developers_by_candidate.dispatch();
        self.technologies_by_candidate.dispatch();
        self.snapshots_by_candidate.dispatch();
        self.priorities_by_disease.dispatch();
    }
}
