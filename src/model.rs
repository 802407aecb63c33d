use serde::Serialize;

/// A product candidate in the R&D pipeline; the primary entity of the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub candidate_key: i64,
    pub vin_candidate_code: String,
    pub candidate_name: String,
    pub product_key: Option<i64>,
    /// Primary indication.
    pub disease_key: Option<String>,
    pub latest_snapshot_key: Option<i64>,
    pub is_active: bool,
}

/// Product type (vaccine, drug, diagnostic, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub product_key: i64,
    pub product_name: String,
    pub product_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Developer {
    pub developer_key: i64,
    pub developer_name: String,
    pub developer_type: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Technology {
    pub technology_key: i64,
    pub technology_name: String,
    pub platform: Option<String>,
}

/// One yearly observation of a candidate's development status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub snapshot_key: i64,
    pub candidate_key: i64,
    pub disease_key: String,
    pub phase_key: i64,
    pub snapshot_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Disease {
    pub disease_key: String,
    pub disease_name: String,
    pub global_health_area: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub phase_key: i64,
    pub phase_name: String,
    pub sort_order: i32,
}

/// A published R&D priority (for example a priority pathogen list entry) for a disease.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Priority {
    pub priority_key: i64,
    pub disease_key: String,
    pub priority_name: String,
    pub source: String,
}

/// Root filter for candidate lists. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    /// Substring of the candidate name or code. Case folding covers ASCII letters only, the way
    /// SQLite's `LIKE` does, so `"é"` does not match `"É"`.
    pub search: Option<String>,
    pub product_key: Option<i64>,
    pub disease_key: Option<String>,
    /// Phase of the latest snapshot.
    pub phase_key: Option<i64>,
    pub developer_key: Option<i64>,
    pub active_only: bool,
}

impl CandidateFilter {
    /// In-memory evaluation of the filter. `phase_of` maps a snapshot key to its phase and
    /// `developers_of` returns the developer keys of a candidate.
    pub fn matches(
        &self,
        candidate: &Candidate,
        phase_of: impl Fn(i64) -> Option<i64>,
        developers_of: impl Fn(i64) -> Vec<i64>,
    ) -> bool {
        if self.active_only && !candidate.is_active {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_ascii_lowercase();
            if !candidate.candidate_name.to_ascii_lowercase().contains(&needle)
                && !candidate.vin_candidate_code.to_ascii_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.product_key.is_some() && candidate.product_key != self.product_key {
            return false;
        }
        if self.disease_key.is_some() && candidate.disease_key != self.disease_key {
            return false;
        }
        if let Some(phase_key) = self.phase_key {
            if candidate.latest_snapshot_key.and_then(&phase_of) != Some(phase_key) {
                return false;
            }
        }
        if let Some(developer_key) = self.developer_key {
            if !developers_of(candidate.candidate_key).contains(&developer_key) {
                return false;
            }
        }
        true
    }
}

/// Offset/limit window over a root list. Build it with [`Page::new`] to apply the limit cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// `limit == 0` selects `default_limit`; anything above `max_limit` is capped.
    pub fn new(limit: u32, offset: u32, default_limit: u32, max_limit: u32) -> Self {
        let limit = if limit == 0 { default_limit } else { limit };
        Self { limit: limit.min(max_limit), offset }
    }
}

/// Grouping used by the aggregate summary root query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryDimension {
    /// Phase of each candidate's latest snapshot.
    Phase,
    ProductCategory,
    /// Each candidate's primary indication.
    Disease,
    GlobalHealthArea,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryBucket {
    pub key: String,
    pub label: String,
    pub candidate_count: u64,
}
