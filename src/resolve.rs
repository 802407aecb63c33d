use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;

use crate::{
    config::Config,
    error::{LoadError, LoadResult, ResolveError},
    loader::Loader,
    model::{
        Candidate, CandidateFilter, Disease, Page, Phase, Product, SummaryBucket, SummaryDimension,
    },
    registry::LoaderRegistry,
    response::{CandidatePage, FieldError, FieldValue, ResolvedCandidate, Response},
    row_source::{run_blocking, SharedRowSource, SqliteRowSource},
};

/// Nested fields of a candidate that can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Product,
    Developers,
    Technologies,
    /// Every snapshot of the candidate, oldest first.
    History,
    /// Priorities of the candidate's primary indication.
    Priorities,
    /// Phase of the latest snapshot.
    CurrentPhase,
    /// Disease of the latest snapshot.
    CurrentDisease,
}

impl Relationship {
    pub const ALL: [Relationship; 7] = [
        Relationship::Product,
        Relationship::Developers,
        Relationship::Technologies,
        Relationship::History,
        Relationship::Priorities,
        Relationship::CurrentPhase,
        Relationship::CurrentDisease,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            Relationship::Product => "product",
            Relationship::Developers => "developers",
            Relationship::Technologies => "technologies",
            Relationship::History => "history",
            Relationship::Priorities => "priorities",
            Relationship::CurrentPhase => "current_phase",
            Relationship::CurrentDisease => "current_disease",
        }
    }

    pub fn all() -> HashSet<Relationship> {
        Self::ALL.into_iter().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidateQuery {
    pub filter: CandidateFilter,
    /// 0 selects the configured default page size.
    pub limit: u32,
    pub offset: u32,
    pub fields: HashSet<Relationship>,
}

/// State scoped to one inbound query. Dropping it stops every loader worker of the request.
pub struct RequestContext {
    pub loaders: LoaderRegistry,
}

impl RequestContext {
    pub fn new(source: SharedRowSource) -> Self {
        Self { loaders: LoaderRegistry::new(source) }
    }
}

/// Entry point of the query layer.
///
/// Root rows come from one direct row source call. Nested fields never touch the row source
/// themselves: every row issues a `load` on the loader of each requested relationship, and the
/// registry is flushed only after all rows have issued theirs. Fields keyed by another load's
/// result (the current phase and disease come from the latest snapshot) resolve in a second
/// round.
pub struct Resolver {
    source: SharedRowSource,
    config: Config,
}

impl Resolver {
    pub fn new(source: SharedRowSource, config: Config) -> Self {
        Self { source, config }
    }

    /// Opens the configured data file.
    pub fn from_config(config: Config) -> Result<Self, ResolveError> {
        let source = SqliteRowSource::from_config(&config)?;
        Ok(Self::new(Arc::new(source), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fresh context for one request.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(Arc::clone(&self.source))
    }

    #[tracing::instrument(skip(self))]
    pub async fn candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Response<CandidatePage>, ResolveError> {
        let page = Page::new(
            query.limit,
            query.offset,
            self.config.default_page_limit,
            self.config.max_page_limit,
        );
        let filter = query.filter.clone();
        let (rows, total) =
            run_blocking(&self.source, move |s| s.candidate_page(&filter, page)).await?;

        let ctx = self.request_context();
        let (items, errors) = resolve_nested(&ctx, rows, &query.fields, "candidates").await;
        escalate_unavailable(&errors)?;
        tracing::debug!(rows = items.len(), total, errors = errors.len(), "resolved candidates");
        Ok(Response {
            data: CandidatePage { total, limit: page.limit, offset: page.offset, items },
            errors,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn candidate(
        &self,
        candidate_key: i64,
        fields: &HashSet<Relationship>,
    ) -> Result<Response<Option<ResolvedCandidate>>, ResolveError> {
        let row = run_blocking(&self.source, move |s| s.candidate_by_key(candidate_key)).await?;
        let Some(row) = row else {
            return Ok(Response { data: None, errors: Vec::new() });
        };

        let ctx = self.request_context();
        let (mut items, errors) = resolve_nested(&ctx, vec![row], fields, "candidate").await;
        escalate_unavailable(&errors)?;
        Ok(Response { data: items.pop(), errors })
    }

    #[tracing::instrument(skip(self))]
    pub async fn summary(
        &self,
        dimension: SummaryDimension,
    ) -> Result<Vec<SummaryBucket>, ResolveError> {
        Ok(run_blocking(&self.source, move |s| s.summary(dimension)).await?)
    }

    pub async fn diseases(&self) -> Result<Vec<Disease>, ResolveError> {
        Ok(run_blocking(&self.source, |s| s.diseases()).await?)
    }

    pub async fn products(&self) -> Result<Vec<Product>, ResolveError> {
        Ok(run_blocking(&self.source, |s| s.products()).await?)
    }

    pub async fn phases(&self) -> Result<Vec<Phase>, ResolveError> {
        Ok(run_blocking(&self.source, |s| s.phases()).await?)
    }
}

type Issued<T> = Option<BoxFuture<'static, LoadResult<T>>>;

/// Issues a load for one row's field. A row without a key resolves to the empty value without
/// touching the loader; an unrequested field issues nothing.
fn issue<K, T>(requested: bool, key: Option<K>, loader: &Loader<K, T>) -> Issued<T>
where
    K: 'static + Eq + Debug + Clone + Send + Sync,
    T: 'static + Send + Debug + Clone + Default,
{
    if !requested {
        return None;
    }
    Some(match key {
        Some(key) => loader.load(key).boxed(),
        None => future::ready(Ok(T::default())).boxed(),
    })
}

async fn settle<T>(issued: Vec<Issued<T>>) -> Vec<FieldValue<T>> {
    future::join_all(issued.into_iter().map(|load| async move {
        match load {
            Some(load) => FieldValue::from(load.await),
            None => FieldValue::Skipped,
        }
    }))
    .await
}

/// Second-round load keyed by a value of a first-round result.
fn issue_dependent<P, K, T>(
    requested: bool,
    parent: &FieldValue<Option<P>>,
    key_of: impl Fn(&P) -> K,
    loader: &Loader<K, T>,
) -> Issued<T>
where
    K: 'static + Eq + Debug + Clone + Send + Sync,
    T: 'static + Send + Debug + Clone + Default,
{
    if !requested {
        return None;
    }
    match parent {
        FieldValue::Value(parent) => issue(true, parent.as_ref().map(key_of), loader),
        FieldValue::Error(error) => Some(future::ready(Err(error.clone())).boxed()),
        FieldValue::Skipped => None,
    }
}

async fn resolve_nested(
    ctx: &RequestContext,
    rows: Vec<Candidate>,
    fields: &HashSet<Relationship>,
    path: &str,
) -> (Vec<ResolvedCandidate>, Vec<FieldError>) {
    let loaders = &ctx.loaders;
    let wants = |relationship: Relationship| fields.contains(&relationship);
    let wants_snapshot = wants(Relationship::CurrentPhase) || wants(Relationship::CurrentDisease);

    // Round one: every row issues its one-hop loads before anything is awaited.
    let mut products = Vec::with_capacity(rows.len());
    let mut developers = Vec::with_capacity(rows.len());
    let mut technologies = Vec::with_capacity(rows.len());
    let mut history = Vec::with_capacity(rows.len());
    let mut priorities = Vec::with_capacity(rows.len());
    let mut snapshots = Vec::with_capacity(rows.len());
    for row in &rows {
        let key = Some(row.candidate_key);
        products.push(issue(
            wants(Relationship::Product),
            row.product_key,
            &loaders.product_by_key,
        ));
        developers.push(issue(
            wants(Relationship::Developers),
            key,
            &loaders.developers_by_candidate,
        ));
        technologies.push(issue(
            wants(Relationship::Technologies),
            key,
            &loaders.technologies_by_candidate,
        ));
        history.push(issue(wants(Relationship::History), key, &loaders.snapshots_by_candidate));
        priorities.push(issue(
            wants(Relationship::Priorities),
            row.disease_key.clone(),
            &loaders.priorities_by_disease,
        ));
        snapshots.push(issue(wants_snapshot, row.latest_snapshot_key, &loaders.snapshot_by_key));
    }
    loaders.dispatch();
    let (products, developers, technologies, history, priorities, snapshots) = futures::join!(
        settle(products),
        settle(developers),
        settle(technologies),
        settle(history),
        settle(priorities),
        settle(snapshots),
    );

    // Round two: keys that only the latest snapshot knows.
    let mut phases = Vec::with_capacity(rows.len());
    let mut diseases = Vec::with_capacity(rows.len());
    for snapshot in &snapshots {
        phases.push(issue_dependent(
            wants(Relationship::CurrentPhase),
            snapshot,
            |s| s.phase_key,
            &loaders.phase_by_key,
        ));
        diseases.push(issue_dependent(
            wants(Relationship::CurrentDisease),
            snapshot,
            |s| s.disease_key.clone(),
            &loaders.disease_by_key,
        ));
    }
    if wants_snapshot {
        loaders.dispatch();
    }
    let (phases, diseases) = futures::join!(settle(phases), settle(diseases));

    let mut items = Vec::with_capacity(rows.len());
    let fields = rows
        .into_iter()
        .zip(products)
        .zip(developers)
        .zip(technologies)
        .zip(history)
        .zip(priorities)
        .zip(phases)
        .zip(diseases);
    for (((((((row, product), developers), technologies), history), priorities), phase), disease) in
        fields
    {
        items.push(ResolvedCandidate {
            candidate: row,
            product,
            developers,
            technologies,
            history,
            priorities,
            current_phase: phase,
            current_disease: disease,
        });
    }

    let errors = items
        .iter()
        .enumerate()
        .flat_map(|(index, item)| {
            item.errors().into_iter().map(move |(relationship, error)| FieldError {
                path: format!("{path}.{index}.{}", relationship.field_name()),
                relationship,
                message: error.to_string(),
                error: error.clone(),
            })
        })
        .collect::<Vec<_>>();
    for error in &errors {
        tracing::warn!(path = %error.path, error = %error.message, "relationship field failed");
    }
    (items, errors)
}

/// A missing data file fails the whole request even when only a nested load noticed it.
fn escalate_unavailable(errors: &[FieldError]) -> Result<(), ResolveError> {
    match errors.iter().find_map(|e| match &e.error {
        LoadError::RowSourceUnavailable(message) => Some(message.clone()),
        _ => None,
    }) {
        Some(message) => Err(ResolveError::RowSourceUnavailable(message)),
        None => Ok(()),
    }
}
