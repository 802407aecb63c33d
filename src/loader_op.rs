use std::slice;

use tokio::sync::oneshot;

use crate::{error::LoadResult, worker_stats::LoaderStats};

/// Set of possible requests that can be sent to the
/// [`LoaderWorker`](crate::loader_worker::LoaderWorker).
///
/// Load, Prime and Clear each have a single and many variant for convenience. `Dispatch` is the
/// explicit flush that ends a dispatch window, and `Stats` reads the worker counters.
#[derive(Debug)]
pub enum LoaderOp<K, V> {
    /// Fetch data from the resource wrapped by this data loader (or the cache).
    Load(LoadRequest<K, V>),
    /// Add values to the cache that were fetched from elsewhere.
    Prime(K, V),
    PrimeMany(Vec<(K, V)>),
    /// Remove values from the cache so that they will be reloaded when they are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
    /// Run the batch function for every key queued so far.
    Dispatch,
    Stats(oneshot::Sender<LoaderStats>),
}

#[derive(Debug)]
pub enum LoadRequest<K, V> {
    One(K, oneshot::Sender<LoadResult<V>>),
    Many(Vec<K>, oneshot::Sender<Vec<LoadResult<V>>>),
}

impl<K, V> LoadRequest<K, V>
where
    V: Send + Clone + std::fmt::Debug,
{
    pub fn keys(&self) -> &[K] {
        match self {
            LoadRequest::One(ref key, _) => slice::from_ref(key),
            LoadRequest::Many(ref keys, _) => keys,
        }
    }

    /// Sends one result per key, in key order.
    pub fn send_response<I>(self, values: I)
    where
        I: IntoIterator<Item = LoadResult<V>>,
    {
        match self {
            LoadRequest::One(_, response_tx) => {
                let Some(response) = values.into_iter().next() else {
                    tracing::error!("no value produced for single load request");
                    return;
                };
                if let Err(e) = response_tx.send(response) {
                    tracing::debug!(?e, "receiver dropped");
                }
            }
            LoadRequest::Many(_, response_tx) => {
                let response = values.into_iter().collect::<Vec<_>>();
                if let Err(e) = response_tx.send(response) {
                    tracing::debug!(?e, "receiver dropped");
                }
            }
        }
    }
}
