use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::ops::Drop;

use tokio::sync::{mpsc, oneshot};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    cache::Entry,
    error::{LoadError, LoadResult},
    loader_op::{LoadRequest, LoaderOp},
    loader_worker::LoaderWorker,
    worker_stats::LoaderStats,
};

/// When a loader runs its batch function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Dispatch only when [`Loader::dispatch`] is called. Every `load` issued before the call is
    /// part of the batch, however the runtime schedules the worker.
    #[default]
    Explicit,
    /// Dispatch at the end of every worker execution frame that queued keys.
    Frame,
}

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. The cache can be cleared with calls to [`Loader::clear`],
/// [`Loader::clear_many`] and [`Loader::clear_all`], and values can be added to the cache
/// out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks, and the loader will enqueue the requested operations on
/// the request queue for processing by its `LoaderWorker`. The worker processes the requests
/// sequentially and provides results via response oneshot channels back to the Loader.
///
/// A `Loader` and its cache belong to one request. Dropping it aborts the worker, so an in-flight
/// dispatch never lands in a cache nobody can read.
pub struct Loader<K, V>
where
    K: 'static + Eq + Debug + Clone + Send,
    V: 'static + Send + Debug + Clone,
{
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V> Drop for Loader<K, V>
where
    K: 'static + Eq + Debug + Clone + Send,
    V: 'static + Send + Debug + Clone,
{
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Debug + Clone + Hash + Send + Sync,
    V: 'static + Send + Debug + Clone,
{
    /// Creates a new Loader for the provided BatchFunction and Context type.
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    pub fn new<F, ContextT>(f: F, context: ContextT, mode: DispatchMode) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        Self::with_name(f, context, mode, std::any::type_name::<F>())
    }

    /// Like [`Loader::new`], with a name for the worker's tracing span.
    pub fn with_name<F, ContextT>(
        _: F,
        context: ContextT,
        mode: DispatchMode,
        name: &'static str,
    ) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LoaderWorker::<K, V, F, HashMap<K, Entry<V>>, ContextT>::new(
            HashMap::new(),
            rx,
            context,
            mode,
        );
        Self {
            request_tx: tx,
            load_task_handle: tokio::task::spawn(
                worker.start().instrument(tracing::trace_span!("LoaderWorker", loader = name)),
            ),
        }
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Debug + Clone + Send + Sync,
    V: 'static + Send + Debug + Clone,
{
    /// Loads a value from the underlying resource.
    ///
    /// The key is enqueued as soon as `load` is called; the returned future only waits for the
    /// answer. Keys already in the loader cache are answered without a new dispatch. Otherwise the
    /// key joins the next dispatch, which happens at the end of the worker's execution frame
    /// ([`DispatchMode::Frame`]) or on the next [`Loader::dispatch`] ([`DispatchMode::Explicit`]).
    pub fn load(&self, key: K) -> impl Future<Output = LoadResult<V>> + Send + 'static {
        let (response_tx, response_rx) = oneshot::channel();
        let sent = self.request_tx.send(LoaderOp::Load(LoadRequest::One(key, response_tx))).is_ok();
        async move {
            if !sent {
                return Err(LoadError::LoaderClosed);
            }
            response_rx.await.map_err(|_| LoadError::LoaderClosed)?
        }
    }

    /// Loads many values at once, one result per key in key order.
    pub fn load_many(
        &self,
        keys: Vec<K>,
    ) -> impl Future<Output = Vec<LoadResult<V>>> + Send + 'static {
        let key_count = keys.len();
        let (response_tx, response_rx) = oneshot::channel();
        let request = LoaderOp::Load(LoadRequest::Many(keys, response_tx));
        let sent = self.request_tx.send(request).is_ok();
        async move {
            let response = if sent { response_rx.await.ok() } else { None };
            response.unwrap_or_else(|| vec![Err(LoadError::LoaderClosed); key_count])
        }
    }

    /// Ends the current dispatch window: every key requested so far and not yet resolved is sent
    /// to the batch function in one call.
    pub fn dispatch(&self) {
        self.send(LoaderOp::Dispatch);
    }

    /// Adds a value to the cache. Keys with a dispatch in flight keep their pending entry.
    pub fn prime(&self, key: K, value: V) {
        self.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        self.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) {
        self.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: Vec<K>) {
        self.send(LoaderOp::ClearMany(keys));
    }

    /// Removes every resolved value from the cache.
    pub fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    /// Returns the worker's counters as of the frame in which it reads this request.
    pub async fn stats(&self) -> Option<LoaderStats> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx.send(LoaderOp::Stats(response_tx)).ok()?;
        response_rx.await.ok()
    }

    fn send(&self, op: LoaderOp<K, V>) {
        if self.request_tx.send(op).is_err() {
            tracing::warn!("loader worker is gone; dropping op");
        }
    }
}
