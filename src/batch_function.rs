use async_trait::async_trait;

use crate::error::LoadError;

/// A `BatchFunction` defines the method through which some `Loader` fetches batched data from
/// some resource. It receives the deduplicated keys that were requested since the `Loader`'s
/// last dispatch, in the order they were first requested, and some user defined context struct.
///
/// The returned `Vec` must hold exactly one value per key, positionally aligned with `keys`.
/// Lookups with no match are expressed in the value type itself (an `Option` or an empty
/// collection); see [`crate::reindex`] for turning an unordered row set into this shape. A
/// result of the wrong length fails every caller of that dispatch with
/// [`LoadError::BatchLengthMismatch`].
///
/// Returning `Err` fails every caller of the dispatch; the affected keys are evicted so that a
/// later `load` retries them.
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    async fn load(keys: &[K], context: &Self::Context) -> Result<Vec<V>, LoadError>;
}
