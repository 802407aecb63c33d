mod batch_function;
mod cache;
pub mod config;
pub mod error;
mod loader;
mod loader_op;
mod loader_worker;
pub mod model;
pub mod registry;
pub mod reindex;
pub mod resolve;
pub mod response;
pub mod row_source;
mod worker_stats;

pub use batch_function::BatchFunction;
pub use config::Config;
pub use error::{LoadError, ResolveError, RowSourceError};
pub use loader::{DispatchMode, Loader};
pub use registry::LoaderRegistry;
pub use resolve::{CandidateQuery, Relationship, RequestContext, Resolver};
pub use response::{CandidatePage, FieldError, FieldValue, ResolvedCandidate, Response};
pub use row_source::{RowSource, SharedRowSource};
pub use worker_stats::LoaderStats;
