#![allow(dead_code)]

use std::sync::Arc;

use pipeline_dataload::model::{
    Candidate, Developer, Disease, Phase, Priority, Product, Snapshot, Technology,
};
use pipeline_dataload::row_source::{Dataset, InMemoryRowSource};
use pipeline_dataload::{Config, Resolver, SharedRowSource};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn candidate(
    candidate_key: i64,
    name: &str,
    product_key: Option<i64>,
    disease_key: Option<&str>,
    latest_snapshot_key: Option<i64>,
    is_active: bool,
) -> Candidate {
    Candidate {
        candidate_key,
        vin_candidate_code: format!("VIN-{candidate_key:03}"),
        candidate_name: name.to_owned(),
        product_key,
        disease_key: disease_key.map(str::to_owned),
        latest_snapshot_key,
        is_active,
    }
}

fn snapshot(
    snapshot_key: i64,
    candidate_key: i64,
    disease_key: &str,
    phase_key: i64,
    year: i32,
) -> Snapshot {
    Snapshot {
        snapshot_key,
        candidate_key,
        disease_key: disease_key.to_owned(),
        phase_key,
        snapshot_year: year,
    }
}

fn priority(priority_key: i64, disease_key: &str, name: &str) -> Priority {
    Priority {
        priority_key,
        disease_key: disease_key.to_owned(),
        priority_name: name.to_owned(),
        source: "WHO".to_owned(),
    }
}

/// Four candidates, listed by name as Alpha (10), Bravo (20), Charlie (30), Delta (40).
///
/// Alpha and Charlie share disease "X"; Bravo targets "Y"; Delta has no product, disease or
/// snapshot and is inactive.
pub fn dataset() -> Dataset {
    Dataset {
        candidates: vec![
            candidate(30, "Charlie", Some(1), Some("X"), Some(301), true),
            candidate(10, "Alpha", Some(1), Some("X"), Some(101), true),
            candidate(20, "Bravo", Some(2), Some("Y"), Some(201), true),
            candidate(40, "Delta", None, None, None, false),
        ],
        products: vec![
            Product {
                product_key: 1,
                product_name: "Malaria vaccine".to_owned(),
                product_category: "Vaccines".to_owned(),
            },
            Product {
                product_key: 2,
                product_name: "TB drug".to_owned(),
                product_category: "Drugs".to_owned(),
            },
        ],
        developers: vec![
            Developer {
                developer_key: 1,
                developer_name: "GSK".to_owned(),
                developer_type: "Industry".to_owned(),
                country: Some("UK".to_owned()),
            },
            Developer {
                developer_key: 2,
                developer_name: "PATH".to_owned(),
                developer_type: "PDP".to_owned(),
                country: None,
            },
        ],
        technologies: vec![Technology {
            technology_key: 1,
            technology_name: "mRNA".to_owned(),
            platform: Some("Nucleic acid".to_owned()),
        }],
        snapshots: vec![
            snapshot(100, 10, "X", 1, 2022),
            snapshot(101, 10, "X", 2, 2023),
            snapshot(201, 20, "Y", 3, 2023),
            snapshot(301, 30, "X", 2, 2023),
        ],
        diseases: vec![
            Disease {
                disease_key: "X".to_owned(),
                disease_name: "Malaria".to_owned(),
                global_health_area: "Neglected disease".to_owned(),
            },
            Disease {
                disease_key: "Y".to_owned(),
                disease_name: "Tuberculosis".to_owned(),
                global_health_area: "Neglected disease".to_owned(),
            },
        ],
        phases: vec![
            Phase { phase_key: 1, phase_name: "Preclinical".to_owned(), sort_order: 1 },
            Phase { phase_key: 2, phase_name: "Phase I".to_owned(), sort_order: 2 },
            Phase { phase_key: 3, phase_name: "Phase II".to_owned(), sort_order: 3 },
        ],
        priorities: vec![
            priority(1, "X", "Priority pathogen"),
            priority(2, "X", "Elimination target"),
            priority(3, "Y", "End TB"),
        ],
        candidate_developers: vec![(10, 1), (10, 2), (20, 2)],
        candidate_technologies: vec![(10, 1)],
    }
}

pub fn memory_source() -> Arc<InMemoryRowSource> {
    Arc::new(InMemoryRowSource::new(dataset()))
}

pub fn resolver(source: &Arc<InMemoryRowSource>, config: Config) -> Resolver {
    let shared: SharedRowSource = source.clone();
    Resolver::new(shared, config)
}
