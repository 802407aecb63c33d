use std::collections::{BTreeMap, HashSet};

use parking_lot::{Mutex, RwLock};

use crate::error::{RowSourceError, RowSourceResult};
use crate::model::{
    Candidate, CandidateFilter, Developer, Disease, Page, Phase, Priority, Product, Snapshot,
    SummaryBucket, SummaryDimension, Technology,
};
use crate::row_source::RowSource;

/// Full content of the pipeline star schema.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub candidates: Vec<Candidate>,
    pub products: Vec<Product>,
    pub developers: Vec<Developer>,
    pub technologies: Vec<Technology>,
    pub snapshots: Vec<Snapshot>,
    pub diseases: Vec<Disease>,
    pub phases: Vec<Phase>,
    pub priorities: Vec<Priority>,
    /// `(candidate_key, developer_key)` bridge rows.
    pub candidate_developers: Vec<(i64, i64)>,
    /// `(candidate_key, technology_key)` bridge rows.
    pub candidate_technologies: Vec<(i64, i64)>,
}

/// One recorded relationship lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSourceCall {
    pub relationship: &'static str,
    pub keys: Vec<String>,
}

/// In-memory row source, used by tests and demos in place of the data file.
///
/// Every relationship lookup is recorded so callers can assert how many round-trips a resolution
/// made and with which keys. Replacing the dataset simulates a data file swap.
#[derive(Default)]
pub struct InMemoryRowSource {
    dataset: RwLock<Dataset>,
    calls: Mutex<Vec<RowSourceCall>>,
    failing: Mutex<HashSet<&'static str>>,
    unavailable: Mutex<bool>,
}

impl InMemoryRowSource {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset: RwLock::new(dataset), ..Default::default() }
    }

    /// Swaps the whole dataset, as an atomic data file replacement would.
    pub fn replace(&self, dataset: Dataset) {
        *self.dataset.write() = dataset;
    }

    /// Edits the dataset in place.
    pub fn update(&self, edit: impl FnOnce(&mut Dataset)) {
        edit(&mut self.dataset.write());
    }

    /// Relationship lookups made so far, in call order.
    pub fn calls(&self) -> Vec<RowSourceCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, relationship: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.relationship == relationship)
            .map(|call| call.keys.clone())
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Makes every later lookup of `relationship` fail with a query error.
    pub fn fail_relationship(&self, relationship: &'static str) {
        self.failing.lock().insert(relationship);
    }

    /// Makes every later call fail as if the data file were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    fn check_available(&self) -> RowSourceResult<()> {
        if *self.unavailable.lock() {
            return Err(RowSourceError::Unavailable {
                path: "memory".to_owned(),
                message: "dataset withdrawn".to_owned(),
            });
        }
        Ok(())
    }

    fn record<K: ToString>(&self, relationship: &'static str, keys: &[K]) -> RowSourceResult<()> {
        self.check_available()?;
        self.calls.lock().push(RowSourceCall {
            relationship,
            keys: keys.iter().map(ToString::to_string).collect(),
        });
        if self.failing.lock().contains(relationship) {
            return Err(RowSourceError::Query(format!("{relationship} lookup failed")));
        }
        Ok(())
    }

    fn filtered(&self, data: &Dataset, filter: &CandidateFilter) -> Vec<Candidate> {
        let phase_of = |snapshot_key: i64| {
            data.snapshots.iter().find(|s| s.snapshot_key == snapshot_key).map(|s| s.phase_key)
        };
        let developers_of = |candidate_key: i64| {
            data.candidate_developers
                .iter()
                .filter(|(c, _)| *c == candidate_key)
                .map(|(_, d)| *d)
                .collect::<Vec<_>>()
        };
        let mut rows = data
            .candidates
            .iter()
            .filter(|c| filter.matches(c, &phase_of, &developers_of))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            a.candidate_name.cmp(&b.candidate_name).then(a.candidate_key.cmp(&b.candidate_key))
        });
        rows
    }
}

/// Sort position of a summary bucket: `(sort_order, numeric key, label, text key)`.
type BucketOrder = (i64, i64, String, String);

fn count_buckets(
    groups: impl IntoIterator<Item = (BucketOrder, String, String)>,
) -> Vec<SummaryBucket> {
    let mut counts: BTreeMap<BucketOrder, SummaryBucket> = BTreeMap::new();
    for (order, key, label) in groups {
        counts
            .entry(order)
            .or_insert(SummaryBucket { key, label, candidate_count: 0 })
            .candidate_count += 1;
    }
    counts.into_values().collect()
}

impl RowSource for InMemoryRowSource {
    fn candidate_page(
        &self,
        filter: &CandidateFilter,
        page: Page,
    ) -> RowSourceResult<(Vec<Candidate>, u64)> {
        self.check_available()?;
        let data = self.dataset.read();
        let rows = self.filtered(&data, filter);
        let total = rows.len() as u64;
        let page_rows =
            rows.into_iter().skip(page.offset as usize).take(page.limit as usize).collect();
        Ok((page_rows, total))
    }

    fn candidates(&self, filter: &CandidateFilter, page: Page) -> RowSourceResult<Vec<Candidate>> {
        self.check_available()?;
        let data = self.dataset.read();
        Ok(self
            .filtered(&data, filter)
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    fn candidate_count(&self, filter: &CandidateFilter) -> RowSourceResult<u64> {
        self.check_available()?;
        let data = self.dataset.read();
        Ok(self.filtered(&data, filter).len() as u64)
    }

    fn candidate_by_key(&self, candidate_key: i64) -> RowSourceResult<Option<Candidate>> {
        self.check_available()?;
        let data = self.dataset.read();
        Ok(data.candidates.iter().find(|c| c.candidate_key == candidate_key).cloned())
    }

    fn summary(&self, dimension: SummaryDimension) -> RowSourceResult<Vec<SummaryBucket>> {
        self.check_available()?;
        let data = self.dataset.read();
        let disease_of = |c: &Candidate| {
            c.disease_key
                .as_ref()
                .and_then(|key| data.diseases.iter().find(|d| &d.disease_key == key))
        };
        let groups = data
            .candidates
            .iter()
            .filter_map(|c| match dimension {
                SummaryDimension::Phase => {
                    let snapshot = data
                        .snapshots
                        .iter()
                        .find(|s| Some(s.snapshot_key) == c.latest_snapshot_key)?;
                    let phase = data.phases.iter().find(|p| p.phase_key == snapshot.phase_key)?;
                    Some((
                        (phase.sort_order as i64, phase.phase_key, String::new(), String::new()),
                        phase.phase_key.to_string(),
                        phase.phase_name.clone(),
                    ))
                }
                SummaryDimension::ProductCategory => {
                    let product =
                        data.products.iter().find(|p| Some(p.product_key) == c.product_key)?;
                    let category = product.product_category.clone();
                    Some(((0, 0, category.clone(), String::new()), category.clone(), category))
                }
                SummaryDimension::Disease => {
                    let disease = disease_of(c)?;
                    Some((
                        (0, 0, disease.disease_name.clone(), disease.disease_key.clone()),
                        disease.disease_key.clone(),
                        disease.disease_name.clone(),
                    ))
                }
                SummaryDimension::GlobalHealthArea => {
                    let area = disease_of(c)?.global_health_area.clone();
                    Some(((0, 0, area.clone(), String::new()), area.clone(), area))
                }
            })
            .collect::<Vec<_>>();
        Ok(count_buckets(groups))
    }

    fn diseases(&self) -> RowSourceResult<Vec<Disease>> {
        self.check_available()?;
        let mut rows = self.dataset.read().diseases.clone();
        rows.sort_by(|a, b| {
            a.disease_name.cmp(&b.disease_name).then(a.disease_key.cmp(&b.disease_key))
        });
        Ok(rows)
    }

    fn products(&self) -> RowSourceResult<Vec<Product>> {
        self.check_available()?;
        let mut rows = self.dataset.read().products.clone();
        rows.sort_by(|a, b| {
            a.product_name.cmp(&b.product_name).then(a.product_key.cmp(&b.product_key))
        });
        Ok(rows)
    }

    fn phases(&self) -> RowSourceResult<Vec<Phase>> {
        self.check_available()?;
        let mut rows = self.dataset.read().phases.clone();
        rows.sort_by_key(|p| (p.sort_order, p.phase_key));
        Ok(rows)
    }

    fn products_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Product>> {
        self.record("products_by_keys", keys)?;
        let data = self.dataset.read();
        Ok(data.products.iter().filter(|p| keys.contains(&p.product_key)).cloned().collect())
    }

    fn snapshots_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        self.record("snapshots_by_keys", keys)?;
        let data = self.dataset.read();
        Ok(data.snapshots.iter().filter(|s| keys.contains(&s.snapshot_key)).cloned().collect())
    }

    fn diseases_by_keys(&self, keys: &[String]) -> RowSourceResult<Vec<Disease>> {
        self.record("diseases_by_keys", keys)?;
        let data = self.dataset.read();
        Ok(data.diseases.iter().filter(|d| keys.contains(&d.disease_key)).cloned().collect())
    }

    fn phases_by_keys(&self, keys: &[i64]) -> RowSourceResult<Vec<Phase>> {
        self.record("phases_by_keys", keys)?;
        let data = self.dataset.read();
        Ok(data.phases.iter().filter(|p| keys.contains(&p.phase_key)).cloned().collect())
    }

    fn developers_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Developer)>> {
        self.record("developers_by_candidates", keys)?;
        let data = self.dataset.read();
        Ok(data
            .candidate_developers
            .iter()
            .filter(|(candidate_key, _)| keys.contains(candidate_key))
            .filter_map(|(candidate_key, developer_key)| {
                let developer = data.developers.iter().find(|d| d.developer_key == *developer_key)?;
                Some((*candidate_key, developer.clone()))
            })
            .collect())
    }

    fn technologies_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<(i64, Technology)>> {
        self.record("technologies_by_candidates", keys)?;
        let data = self.dataset.read();
        Ok(data
            .candidate_technologies
            .iter()
            .filter(|(candidate_key, _)| keys.contains(candidate_key))
            .filter_map(|(candidate_key, technology_key)| {
                let technology =
                    data.technologies.iter().find(|t| t.technology_key == *technology_key)?;
                Some((*candidate_key, technology.clone()))
            })
            .collect())
    }

    fn snapshots_by_candidates(&self, keys: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        self.record("snapshots_by_candidates", keys)?;
        let data = self.dataset.read();
        let mut rows = data
            .snapshots
            .iter()
            .filter(|s| keys.contains(&s.candidate_key))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|s| (s.snapshot_year, s.snapshot_key));
        Ok(rows)
    }

    fn priorities_by_diseases(&self, keys: &[String]) -> RowSourceResult<Vec<Priority>> {
        self.record("priorities_by_diseases", keys)?;
        let data = self.dataset.read();
        Ok(data.priorities.iter().filter(|p| keys.contains(&p.disease_key)).cloned().collect())
    }
}
