//! Resolves one candidate page with every relationship and prints it as JSON.
//!
//! Reads `PIPELINE_DATA_FILE` when it exists; otherwise serves a small built-in dataset.
//! `RUST_LOG=pipeline_dataload=debug` shows the dispatches.

use std::sync::Arc;

use pipeline_dataload::model::{Candidate, Disease, Phase, Priority, Product, Snapshot};
use pipeline_dataload::row_source::{Dataset, InMemoryRowSource};
use pipeline_dataload::{CandidateQuery, Config, Relationship, Resolver};
use tracing_subscriber::EnvFilter;

fn sample() -> Dataset {
    let candidate = |key: i64, name: &str, disease: &str, snapshot: i64| Candidate {
        candidate_key: key,
        vin_candidate_code: format!("VIN-{key:04}"),
        candidate_name: name.to_owned(),
        product_key: Some(1),
        disease_key: Some(disease.to_owned()),
        latest_snapshot_key: Some(snapshot),
        is_active: true,
    };
    let snapshot = |key: i64, candidate_key: i64, disease: &str, phase_key: i64| Snapshot {
        snapshot_key: key,
        candidate_key,
        disease_key: disease.to_owned(),
        phase_key,
        snapshot_year: 2023,
    };
    Dataset {
        candidates: vec![
            candidate(1, "R21/Matrix-M", "malaria", 11),
            candidate(2, "M72/AS01E", "tb", 12),
            candidate(3, "RH5.1/Matrix-M", "malaria", 13),
        ],
        products: vec![Product {
            product_key: 1,
            product_name: "Vaccine".to_owned(),
            product_category: "Vaccines".to_owned(),
        }],
        snapshots: vec![
            snapshot(11, 1, "malaria", 4),
            snapshot(12, 2, "tb", 3),
            snapshot(13, 3, "malaria", 2),
        ],
        diseases: vec![
            Disease {
                disease_key: "malaria".to_owned(),
                disease_name: "Malaria".to_owned(),
                global_health_area: "Neglected disease".to_owned(),
            },
            Disease {
                disease_key: "tb".to_owned(),
                disease_name: "Tuberculosis".to_owned(),
                global_health_area: "Neglected disease".to_owned(),
            },
        ],
        phases: vec![
            Phase { phase_key: 2, phase_name: "Phase I".to_owned(), sort_order: 2 },
            Phase { phase_key: 3, phase_name: "Phase II".to_owned(), sort_order: 3 },
            Phase { phase_key: 4, phase_name: "Phase III".to_owned(), sort_order: 4 },
        ],
        priorities: vec![Priority {
            priority_key: 1,
            disease_key: "malaria".to_owned(),
            priority_name: "Malaria eradication".to_owned(),
            source: "WHO".to_owned(),
        }],
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env();
    let resolver = if config.data_file.exists() {
        Resolver::from_config(config)?
    } else {
        let path = config.data_file.display().to_string();
        tracing::info!(%path, "data file not found; using sample data");
        Resolver::new(Arc::new(InMemoryRowSource::new(sample())), config)
    };

    let query = CandidateQuery { fields: Relationship::all(), ..Default::default() };
    let response = resolver.candidates(&query).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
