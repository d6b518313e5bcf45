//! Hand-off from transport callback threads to the async runtime.
//!
//! Session callbacks run on threads the transport owns and must return
//! promptly. They hand async work (store writes) to a [`Bridge`], which
//! spawns it on the consumer runtime and tracks it until it completes so that
//! shutdown can cancel everything still in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};

type InFlight = Arc<Mutex<HashMap<u64, AbortHandle>>>;

/// Schedules work onto one runtime from any thread.
#[derive(Clone)]
pub struct Bridge {
    handle: Handle,
    in_flight: InFlight,
    next_id: Arc<AtomicU64>,
}

impl Bridge {
    /// Creates a bridge targeting the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a bridge targeting the runtime of the calling context.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| Error::NoRuntime)
    }

    /// Schedules `work` without waiting for it.
    ///
    /// A failure is logged with `label` and dropped; nothing is retried.
    pub fn spawn<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let in_flight = Arc::clone(&self.in_flight);

        // Hold the set while spawning so the task cannot deregister before
        // it has been registered.
        let mut tasks = lock(&self.in_flight);
        let task = self.handle.spawn(async move {
            if let Err(e) = work.await {
                tracing::error!("{label} failed: {e}");
            }
            lock(&in_flight).remove(&id);
        });
        tasks.insert(id, task.abort_handle());
    }

    /// Number of scheduled units that have not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Cancels every unit still in flight.
    pub fn cancel_all(&self) {
        let tasks: Vec<AbortHandle> = lock(&self.in_flight).drain().map(|(_, t)| t).collect();
        if !tasks.is_empty() {
            tracing::debug!("cancelling {} scheduled tasks", tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }

    /// Returns the runtime handle work is scheduled on.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Locks the task set, ignoring poisoning: the map stays consistent because
/// no code panics while holding it.
fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
    in_flight
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
