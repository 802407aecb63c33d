use serde::{Serialize, Serializer};

use crate::error::{LoadError, LoadResult};
use crate::model::{Candidate, Developer, Disease, Phase, Priority, Product, Snapshot, Technology};
use crate::resolve::Relationship;

/// Outcome of one nested field on one row. Serializes as the value, or `null` when it failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<T> {
    /// The field was not requested.
    Skipped,
    Value(T),
    Error(LoadError),
}

impl<T> FieldValue<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FieldValue::Skipped)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            FieldValue::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<LoadResult<T>> for FieldValue<T> {
    fn from(result: LoadResult<T>) -> Self {
        match result {
            Ok(value) => FieldValue::Value(value),
            Err(error) => FieldValue::Error(error),
        }
    }
}

impl<T: Serialize> Serialize for FieldValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Value(value) => value.serialize(serializer),
            FieldValue::Skipped | FieldValue::Error(_) => serializer.serialize_none(),
        }
    }
}

/// A candidate with the nested relationships the query asked for. Fields that were not
/// requested are left out of the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub product: FieldValue<Option<Product>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub developers: FieldValue<Vec<Developer>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub technologies: FieldValue<Vec<Technology>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub history: FieldValue<Vec<Snapshot>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub priorities: FieldValue<Vec<Priority>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub current_phase: FieldValue<Option<Phase>>,
    #[serde(skip_serializing_if = "FieldValue::is_skipped")]
    pub current_disease: FieldValue<Option<Disease>>,
}

impl ResolvedCandidate {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            candidate,
            product: FieldValue::Skipped,
            developers: FieldValue::Skipped,
            technologies: FieldValue::Skipped,
            history: FieldValue::Skipped,
            priorities: FieldValue::Skipped,
            current_phase: FieldValue::Skipped,
            current_disease: FieldValue::Skipped,
        }
    }

    /// Failed fields of this row, in field order.
    pub fn errors(&self) -> Vec<(Relationship, &LoadError)> {
        [
            (Relationship::Product, self.product.error()),
            (Relationship::Developers, self.developers.error()),
            (Relationship::Technologies, self.technologies.error()),
            (Relationship::History, self.history.error()),
            (Relationship::Priorities, self.priorities.error()),
            (Relationship::CurrentPhase, self.current_phase.error()),
            (Relationship::CurrentDisease, self.current_disease.error()),
        ]
        .into_iter()
        .filter_map(|(relationship, error)| error.map(|e| (relationship, e)))
        .collect()
    }
}

/// A relationship field that failed for one row while the rest of the response resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Dotted path of the failed field, e.g. `candidates.1.developers`.
    pub path: String,
    pub relationship: Relationship,
    pub message: String,
    #[serde(skip)]
    pub error: LoadError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl<T: Serialize> Response<T> {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePage {
    /// Number of candidates matching the filter, ignoring the page window.
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub items: Vec<ResolvedCandidate>,
}
