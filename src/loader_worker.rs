use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use futures::future::FutureExt;
use tokio::sync::mpsc;

use crate::{
    batch_function::BatchFunction,
    cache::{Cache, Entry},
    error::{LoadError, LoadResult},
    loader::DispatchMode,
    loader_op::{LoadRequest, LoaderOp},
    worker_stats::WorkerStats,
};

/// A `LoaderWorker` is the "single-thread" worker task that actually does the loading work.
///
/// Once started, it runs in a loop until the parent Loader aborts its `JoinHandle` or drops the
/// request queue tx channel. The worker is the only writer of the cache and the dispatch queue,
/// so callers on any thread observe each key being loaded at most once per loader.
///
/// The worker can be in one of three states during its lifetime:
///
/// 1. Waiting for requests
/// 2. Flushing the request queue and staging keys for loading.
/// 3. Executing its load batch function.
///
/// One cycle through this loop may be called an "execution frame".
///
/// In state (1), the worker awaits any messages on the request queue channel, idling until work
/// arrives.
///
/// In state (2), the worker synchronously pulls requests from the queue until it is empty. Prime
/// and Clear requests are applied to the cache immediately. For Load requests, every key is
/// checked against the cache: resolved keys are served from it, keys already pending join the
/// existing entry, and new keys get a pending entry and are appended to the dispatch queue in
/// first-seen order. Requests whose keys are all resolved are answered right away.
///
/// State (3) is entered at the end of a frame that left keys queued: always in
/// [`DispatchMode::Frame`], and only after a `Dispatch` op in [`DispatchMode::Explicit`]. The
/// worker invokes its `BatchFunction` once with the queued keys, stores the position-aligned
/// values, and answers every outstanding Load request. If the dispatch fails, its keys are evicted
/// and their requesters receive the error.
pub struct LoaderWorker<K, V, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    CacheT: Cache<K = K, V = Entry<V>>,
    ContextT: Send + Sync + 'static,
{
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    keys_to_load: Vec<K>,
    pending_requests: Vec<PendingLoad<K, V>>,
    context: ContextT,
    mode: DispatchMode,
    dispatch_requested: bool,
    stats: WorkerStats,
    phantom_batch_function: PhantomData<F>,
}

/// A load request waiting on a dispatch, with the values it could already read from the cache.
struct PendingLoad<K, V> {
    request: LoadRequest<K, V>,
    ready: Vec<Option<V>>,
}

impl<K, V, F, CacheT, ContextT> LoaderWorker<K, V, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    CacheT: Cache<K = K, V = Entry<V>>,
    ContextT: Send + Sync + 'static,
{
    pub fn new(
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        context: ContextT,
        mode: DispatchMode,
    ) -> Self {
        Self {
            cache,
            request_rx,
            keys_to_load: Vec::new(),
            pending_requests: Vec::new(),
            context,
            mode,
            dispatch_requested: false,
            stats: WorkerStats::new(std::any::type_name::<(K, V)>()),
            phantom_batch_function: PhantomData,
        }
    }

    pub async fn start(mut self) {
        loop {
            // Async await until we receive the first op.
            match self.request_rx.recv().await {
                None => {
                    tracing::debug!("Tx channel closed. Terminating LoaderWorker.");
                    return;
                }
                Some(op) => self.mux_op(op),
            }
            // Flush remainder of the op queue before executing load.
            while let Some(Some(op)) = self.request_rx.recv().now_or_never() {
                self.mux_op(op);
            }
            let dispatch_due = match self.mode {
                DispatchMode::Frame => true,
                DispatchMode::Explicit => self.dispatch_requested,
            };
            if dispatch_due && !self.keys_to_load.is_empty() {
                self.execute_load().await;
            }
            self.dispatch_requested = false;
        }
    }

    #[tracing::instrument(skip(self))]
    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(request) => self.stage_load(request),
            LoaderOp::Prime(key, value) => self.prime(key, value),
            LoaderOp::PrimeMany(key_vals) => {
                for (key, value) in key_vals {
                    self.prime(key, value);
                }
            }
            LoaderOp::Clear(key) => self.clear(std::slice::from_ref(&key)),
            LoaderOp::ClearMany(keys) => self.clear(&keys),
            LoaderOp::ClearAll => self.cache.retain(|_, entry| entry.is_pending()),
            LoaderOp::Dispatch => self.dispatch_requested = true,
            LoaderOp::Stats(response_tx) => {
                if response_tx.send(self.stats.snapshot()).is_err() {
                    tracing::debug!("stats receiver dropped");
                }
            }
        }
    }

    fn stage_load(&mut self, request: LoadRequest<K, V>) {
        let keys = request.keys();
        self.stats.record_load_request(keys.len() as u32);

        let mut hits = 0;
        let mut ready = Vec::with_capacity(keys.len());
        for key in keys {
            match self.cache.get(key) {
                Some(Entry::Ready(value)) => {
                    hits += 1;
                    ready.push(Some(value.clone()));
                }
                Some(Entry::Pending) => {
                    hits += 1;
                    ready.push(None);
                }
                None => {
                    self.cache.insert(key.clone(), Entry::Pending);
                    self.keys_to_load.push(key.clone());
                    ready.push(None);
                }
            }
        }
        self.stats.record_cache_hits(hits);
        tracing::debug!(requested_keys = ?keys, queued = self.keys_to_load.len());

        if ready.iter().all(Option::is_some) {
            request.send_response(ready.into_iter().flatten().map(Ok));
        } else {
            self.pending_requests.push(PendingLoad { request, ready });
        }
    }

    /// Pending entries are never overwritten; their dispatch owns them.
    fn prime(&mut self, key: K, value: V) {
        if !matches!(self.cache.get(&key), Some(Entry::Pending)) {
            self.cache.insert(key, Entry::Ready(value));
        }
    }

    fn clear(&mut self, keys: &[K]) {
        let resolved = keys
            .iter()
            .filter(|k| matches!(self.cache.get(k), Some(Entry::Ready(_))))
            .cloned()
            .collect::<Vec<_>>();
        self.cache.remove(&resolved);
    }

    #[tracing::instrument(skip(self))]
    async fn execute_load(&mut self) {
        let keys = std::mem::take(&mut self.keys_to_load);
        let requests = std::mem::take(&mut self.pending_requests);
        self.stats.record_dispatch(keys.len() as u32);

        let outcome = match F::load(&keys, &self.context).await {
            Ok(values) if values.len() == keys.len() => Ok(values),
            Ok(values) => {
                Err(LoadError::BatchLengthMismatch { expected: keys.len(), actual: values.len() })
            }
            Err(e) => Err(e),
        };

        let mut failures = HashMap::new();
        match outcome {
            Ok(values) => {
                tracing::debug!(batch_size = keys.len(), "dispatch completed");
                self.stats.record_dispatch_completed(keys.len() as u32);
                let resolved = keys.into_iter().zip(values).map(|(k, v)| (k, Entry::Ready(v)));
                self.cache.insert_many(resolved);
            }
            Err(error) => {
                tracing::warn!(%error, batch_size = keys.len(), "dispatch failed");
                self.stats.record_dispatch_failed();
                self.cache.remove(&keys);
                failures.extend(keys.into_iter().map(|k| (k, error.clone())));
            }
        }

        for PendingLoad { request, ready } in requests {
            let values = request
                .keys()
                .iter()
                .zip(ready)
                .map(|(key, ready)| match ready {
                    Some(value) => Ok(value),
                    None => self.resolved(key, &failures),
                })
                .collect::<Vec<_>>();
            request.send_response(values);
        }
    }

    fn resolved(&self, key: &K, failures: &HashMap<K, LoadError>) -> LoadResult<V> {
        match self.cache.get(key) {
            Some(Entry::Ready(value)) => Ok(value.clone()),
            _ => Err(failures.get(key).cloned().unwrap_or(LoadError::LoaderClosed)),
        }
    }
}
