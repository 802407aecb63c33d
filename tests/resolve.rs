mod common;

use std::collections::HashSet;
use std::sync::Arc;

use pipeline_dataload::error::RowSourceResult;
use pipeline_dataload::model::{
    Candidate, CandidateFilter, Developer, Disease, Page, Phase, Priority, Product, Snapshot,
    SummaryBucket, SummaryDimension, Technology,
};
use pipeline_dataload::row_source::{InMemoryRowSource, RowSource};
use pipeline_dataload::{
    CandidateQuery, Config, FieldValue, LoadError, Relationship, ResolveError, Resolver,
    RowSourceError, SharedRowSource,
};
use serde_json::json;

fn fields(relationships: &[Relationship]) -> HashSet<Relationship> {
    relationships.iter().copied().collect()
}

fn query(relationships: &[Relationship]) -> CandidateQuery {
    CandidateQuery { fields: fields(relationships), ..Default::default() }
}

#[tokio::test]
async fn candidates_sharing_a_disease_share_one_priority_lookup() {
    common::init_tracing();
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let response = resolver.candidates(&query(&[Relationship::Priorities])).await.unwrap();
    let items = &response.data.items;

    assert_eq!(source.calls_for("priorities_by_diseases"), vec![vec!["X", "Y"]]);
    assert_eq!(items[0].candidate.candidate_key, 10);
    assert_eq!(items[2].candidate.candidate_key, 30);
    let alpha = items[0].priorities.value().unwrap();
    assert_eq!(alpha.iter().map(|p| p.priority_key).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(items[2].priorities.value(), Some(alpha));
    assert_eq!(items[3].priorities.value(), Some(&vec![]));
    assert!(response.errors.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_page_is_one_lookup_per_relationship_on_a_multi_thread_runtime() {
    let source = common::memory_source();
    source.update(|data| {
        for i in 0..96 {
            let key = 1000 + i;
            let mut row = data.candidates[0].clone();
            row.candidate_key = key;
            row.candidate_name = format!("Echo {i:03}");
            data.candidates.push(row);
            data.candidate_developers.push((key, 1));
        }
    });
    let config = Config { max_page_limit: 200, ..Default::default() };
    let resolver = common::resolver(&source, config);
    let request = CandidateQuery {
        fields: fields(&[Relationship::Developers, Relationship::Product]),
        limit: 100,
        ..Default::default()
    };

    for _ in 0..20 {
        source.reset_calls();
        let response = resolver.candidates(&request).await.unwrap();
        assert_eq!(response.data.items.len(), 100);

        let developer_calls = source.calls_for("developers_by_candidates");
        assert_eq!(developer_calls.len(), 1);
        assert_eq!(developer_calls[0].len(), 100);
        assert_eq!(source.calls_for("products_by_keys").len(), 1);
    }
}

#[tokio::test]
async fn unrequested_relationships_are_never_loaded() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let response = resolver.candidates(&query(&[])).await.unwrap();

    assert_eq!(response.data.items.len(), 4);
    assert!(response.data.items.iter().all(|item| item.product.is_skipped()));
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn every_relationship_is_one_lookup_per_request() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let all = CandidateQuery { fields: Relationship::all(), ..Default::default() };
    let response = resolver.candidates(&all).await.unwrap();
    assert!(response.errors.is_empty());

    let calls = source.calls();
    let relationships = calls.iter().map(|call| call.relationship).collect::<HashSet<_>>();
    assert_eq!(calls.len(), 8);
    assert_eq!(relationships.len(), 8);
}

#[tokio::test]
async fn latest_snapshot_fields_resolve_in_a_second_round() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let response = resolver
        .candidates(&query(&[Relationship::CurrentPhase, Relationship::CurrentDisease]))
        .await
        .unwrap();

    let calls = source.calls();
    let position = |name: &str| calls.iter().position(|call| call.relationship == name).unwrap();
    assert_eq!(calls.len(), 3);
    assert!(position("snapshots_by_keys") < position("phases_by_keys"));
    assert!(position("snapshots_by_keys") < position("diseases_by_keys"));
    assert_eq!(source.calls_for("snapshots_by_keys"), vec![vec!["101", "201", "301"]]);
    assert_eq!(source.calls_for("phases_by_keys"), vec![vec!["2", "3"]]);
    assert_eq!(source.calls_for("diseases_by_keys"), vec![vec!["X", "Y"]]);

    let phases = response
        .data
        .items
        .iter()
        .map(|item| item.current_phase.value().unwrap().as_ref().map(|p| p.phase_name.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(phases, vec![Some("Phase I"), Some("Phase II"), Some("Phase I"), None]);

    let bravo = &response.data.items[1];
    assert_eq!(
        bravo.current_disease.value().unwrap().as_ref().map(|d| d.disease_name.as_str()),
        Some("Tuberculosis")
    );
}

#[tokio::test]
async fn failed_relationship_becomes_field_errors() {
    let source = common::memory_source();
    source.fail_relationship("developers_by_candidates");
    let resolver = common::resolver(&source, Config::default());

    let filter = CandidateFilter { active_only: true, ..Default::default() };
    let query = CandidateQuery {
        filter,
        fields: fields(&[Relationship::Developers, Relationship::Product]),
        ..Default::default()
    };
    let response = resolver.candidates(&query).await.unwrap();

    let paths = response.errors.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
    assert_eq!(
        paths,
        vec!["candidates.0.developers", "candidates.1.developers", "candidates.2.developers"]
    );
    assert!(response.errors.iter().all(|e| e.relationship == Relationship::Developers));
    assert_eq!(
        response.errors[0].error,
        LoadError::Query("developers_by_candidates lookup failed".to_owned())
    );

    // Sibling fields of the failed ones still resolve.
    let json = response.to_json().unwrap();
    assert_eq!(json["data"]["items"][0]["developers"], json!(null));
    assert_eq!(json["data"]["items"][0]["product"]["product_name"], json!("Malaria vaccine"));
    assert_eq!(json["errors"][0]["path"], json!("candidates.0.developers"));
}

#[tokio::test]
async fn failed_snapshot_fails_both_dependent_fields() {
    let source = common::memory_source();
    source.fail_relationship("snapshots_by_keys");
    let resolver = common::resolver(&source, Config::default());

    let response = resolver
        .candidates(&query(&[Relationship::CurrentPhase, Relationship::CurrentDisease]))
        .await
        .unwrap();

    let paths = response.errors.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
    assert_eq!(
        paths,
        vec![
            "candidates.0.current_phase",
            "candidates.0.current_disease",
            "candidates.1.current_phase",
            "candidates.1.current_disease",
            "candidates.2.current_phase",
            "candidates.2.current_disease",
        ]
    );
    let expected = LoadError::Query("snapshots_by_keys lookup failed".to_owned());
    assert!(response.errors.iter().all(|e| e.error == expected));
    assert!(source.calls_for("phases_by_keys").is_empty());
    assert!(source.calls_for("diseases_by_keys").is_empty());

    // Delta has no latest snapshot, so nothing failed for it.
    let delta = &response.data.items[3];
    assert_eq!(delta.candidate.candidate_key, 40);
    assert_eq!(delta.current_phase, FieldValue::Value(None));
    assert_eq!(delta.current_disease, FieldValue::Value(None));
}

#[tokio::test]
async fn missing_data_file_fails_the_request() {
    let source = common::memory_source();
    source.set_unavailable(true);
    let resolver = common::resolver(&source, Config::default());

    let result = resolver.candidates(&query(&[Relationship::Product])).await;
    assert!(matches!(result, Err(ResolveError::RowSourceUnavailable(_))));
    assert!(matches!(resolver.phases().await, Err(ResolveError::RowSourceUnavailable(_))));
}

/// Answers root queries but reports the data file as gone for every relationship lookup.
struct WithdrawnAfterRoot(InMemoryRowSource);

fn withdrawn<T>() -> RowSourceResult<T> {
    Err(RowSourceError::Unavailable {
        path: "pipeline.sqlite".to_owned(),
        message: "gone".to_owned(),
    })
}

impl RowSource for WithdrawnAfterRoot {
    fn candidate_page(
        &self,
        filter: &CandidateFilter,
        page: Page,
    ) -> RowSourceResult<(Vec<Candidate>, u64)> {
        self.0.candidate_page(filter, page)
    }
    fn candidates(&self, filter: &CandidateFilter, page: Page) -> RowSourceResult<Vec<Candidate>> {
        self.0.candidates(filter, page)
    }
    fn candidate_count(&self, filter: &CandidateFilter) -> RowSourceResult<u64> {
        self.0.candidate_count(filter)
    }
    fn candidate_by_key(&self, candidate_key: i64) -> RowSourceResult<Option<Candidate>> {
        self.0.candidate_by_key(candidate_key)
    }
    fn summary(&self, dimension: SummaryDimension) -> RowSourceResult<Vec<SummaryBucket>> {
        self.0.summary(dimension)
    }
    fn diseases(&self) -> RowSourceResult<Vec<Disease>> {
        self.0.diseases()
    }
    fn products(&self) -> RowSourceResult<Vec<Product>> {
        self.0.products()
    }
    fn phases(&self) -> RowSourceResult<Vec<Phase>> {
        self.0.phases()
    }
    fn products_by_keys(&self, _: &[i64]) -> RowSourceResult<Vec<Product>> {
        withdrawn()
    }
    fn snapshots_by_keys(&self, _: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        withdrawn()
    }
    fn diseases_by_keys(&self, _: &[String]) -> RowSourceResult<Vec<Disease>> {
        withdrawn()
    }
    fn phases_by_keys(&self, _: &[i64]) -> RowSourceResult<Vec<Phase>> {
        withdrawn()
    }
    fn developers_by_candidates(&self, _: &[i64]) -> RowSourceResult<Vec<(i64, Developer)>> {
        withdrawn()
    }
    fn technologies_by_candidates(&self, _: &[i64]) -> RowSourceResult<Vec<(i64, Technology)>> {
        withdrawn()
    }
    fn snapshots_by_candidates(&self, _: &[i64]) -> RowSourceResult<Vec<Snapshot>> {
        withdrawn()
    }
    fn priorities_by_diseases(&self, _: &[String]) -> RowSourceResult<Vec<Priority>> {
        withdrawn()
    }
}

#[tokio::test]
async fn data_file_lost_mid_request_fails_the_request() {
    let source: SharedRowSource =
        Arc::new(WithdrawnAfterRoot(InMemoryRowSource::new(common::dataset())));
    let resolver = Resolver::new(source, Config::default());

    let result = resolver.candidates(&query(&[Relationship::Technologies])).await;
    assert!(matches!(result, Err(ResolveError::RowSourceUnavailable(_))));

    // Without nested fields the root rows are still served.
    let response = resolver.candidates(&query(&[])).await.unwrap();
    assert_eq!(response.data.total, 4);
}

#[tokio::test]
async fn page_size_is_defaulted_and_capped() {
    let source = common::memory_source();
    let config = Config { default_page_limit: 3, max_page_limit: 2, ..Default::default() };
    let resolver = common::resolver(&source, config);

    let capped = CandidateQuery { limit: 50, ..Default::default() };
    let page = resolver.candidates(&capped).await.unwrap().data;
    assert_eq!((page.total, page.limit, page.items.len()), (4, 2, 2));

    let defaulted = CandidateQuery { offset: 1, ..Default::default() };
    let page = resolver.candidates(&defaulted).await.unwrap().data;
    assert_eq!((page.limit, page.offset), (2, 1));
    let names = page.items.iter().map(|i| i.candidate.candidate_name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Bravo", "Charlie"]);
}

#[tokio::test]
async fn filters_narrow_the_root_list() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let by_developer = CandidateQuery {
        filter: CandidateFilter { developer_key: Some(2), ..Default::default() },
        ..Default::default()
    };
    let page = resolver.candidates(&by_developer).await.unwrap().data;
    let keys = page.items.iter().map(|i| i.candidate.candidate_key).collect::<Vec<_>>();
    assert_eq!(keys, vec![10, 20]);
    assert_eq!(page.total, 2);

    let by_phase = CandidateQuery {
        filter: CandidateFilter {
            phase_key: Some(2),
            search: Some("char".to_owned()),
            ..Default::default()
        },
        ..Default::default()
    };
    let page = resolver.candidates(&by_phase).await.unwrap().data;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].candidate.candidate_key, 30);
}

#[tokio::test]
async fn single_candidate_with_every_field() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let response = resolver.candidate(10, &Relationship::all()).await.unwrap();
    let alpha = response.data.as_ref().unwrap();
    assert!(response.errors.is_empty());

    assert_eq!(alpha.product.value().unwrap().as_ref().unwrap().product_category, "Vaccines");
    let developers = alpha.developers.value().unwrap();
    assert_eq!(developers.iter().map(|d| d.developer_key).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(alpha.technologies.value().unwrap().len(), 1);
    let years = alpha.history.value().unwrap().iter().map(|s| s.snapshot_year).collect::<Vec<_>>();
    assert_eq!(years, vec![2022, 2023]);
    assert_eq!(alpha.current_phase.value().unwrap().as_ref().unwrap().phase_key, 2);
    assert_eq!(alpha.current_disease.value().unwrap().as_ref().unwrap().disease_key, "X");

    let json = response.to_json().unwrap();
    assert_eq!(json["data"]["vin_candidate_code"], json!("VIN-010"));
    assert_eq!(json["data"]["developers"][1]["developer_name"], json!("PATH"));
    assert!(json.get("errors").is_none());
}

#[tokio::test]
async fn unknown_candidate_is_null() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let response = resolver.candidate(999, &Relationship::all()).await.unwrap();
    assert_eq!(response.data, None);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn summaries_and_lookups() {
    let source = common::memory_source();
    let resolver = common::resolver(&source, Config::default());

    let by_phase = resolver.summary(SummaryDimension::Phase).await.unwrap();
    assert_eq!(
        by_phase,
        vec![
            SummaryBucket { key: "2".to_owned(), label: "Phase I".to_owned(), candidate_count: 2 },
            SummaryBucket { key: "3".to_owned(), label: "Phase II".to_owned(), candidate_count: 1 },
        ]
    );

    let by_area = resolver.summary(SummaryDimension::GlobalHealthArea).await.unwrap();
    assert_eq!(by_area.len(), 1);
    assert_eq!(by_area[0].candidate_count, 3);

    let diseases = resolver.diseases().await.unwrap();
    assert_eq!(diseases.iter().map(|d| d.disease_key.as_str()).collect::<Vec<_>>(), vec!["X", "Y"]);
    let products = resolver.products().await.unwrap();
    assert_eq!(products[0].product_name, "Malaria vaccine");
    let phases = resolver.phases().await.unwrap();
    assert_eq!(phases.iter().map(|p| p.sort_order).collect::<Vec<_>>(), vec![1, 2, 3]);
}
