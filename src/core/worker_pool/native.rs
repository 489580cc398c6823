//! Native implementation of `DispatchPool` using OS threads.
//!
//! Each worker thread owns a single-threaded tokio runtime and alternates
//! between blocking on `take()` and running the dispatch protocol to
//! completion.
//!
//! # Design Principles
//!
//! - **No busy loop**: workers park inside the queue until an entry is due
//! - **Exclusive custody**: a taken entry is always processed, even during shutdown
//! - **Graceful drain**: closing the queue unblocks idle workers; busy workers
//!   finish their current entry before exiting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::{Dispatcher, WorkQueue};

use super::{PoolCounters, PoolError, PoolStats};

/// Pause after a queue error before the worker asks again.
const TAKE_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Fixed-size pool of dispatch workers.
///
/// # Design
///
/// - **Dedicated threads**: sink and store calls never block the caller's runtime
/// - **Lock-free stats**: atomic counters, read without coordination
/// - **Clean shutdown**: `shutdown()` closes the queue and joins with a timeout
pub struct DispatchPool {
    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Queue the workers drain.
    queue: Arc<dyn WorkQueue>,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Shutdown flag (lock-free atomic).
    shutdown: Arc<AtomicBool>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Create a pool and start `config.worker_count` workers.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new(
        config: WorkerPoolConfig,
        dispatcher: Dispatcher,
        queue: Arc<dyn WorkQueue>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            match spawn_worker(
                worker_id,
                Arc::clone(&queue),
                dispatcher.clone(),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                config.thread_stack_size,
            ) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Unwind the workers already started.
                    shutdown.store(true, Ordering::Release);
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Internal(format!(
                        "failed to spawn worker {worker_id}: {e}"
                    )));
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            "DispatchPool started with dedicated OS threads"
        );

        Ok(Self {
            config,
            queue,
            counters,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Whether `shutdown` has been called or the pool dropped.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Shut down the pool gracefully.
    ///
    /// Closes the queue so idle workers return from `take()`, lets busy
    /// workers finish their entry, then joins every worker, waiting at most
    /// `shutdown_timeout` for each. Workers that overrun are detached; their
    /// entry stays held and surfaces as a stuck `PROCESSING` record.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down dispatch pool");
        self.queue.close();

        let timeout = self.config.shutdown_timeout();
        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(timeout) {
                Ok(true) => {
                    debug!(worker_id = idx, "Worker joined successfully");
                    let _ = join_thread.join();
                }
                Ok(false) => {
                    warn!(worker_id = idx, "Worker panicked");
                    let _ = join_thread.join();
                }
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                }
            }
        }

        info!(worker_count = worker_count, "Dispatch pool shut down complete");
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join; explicit shutdown() is the graceful path.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.queue.close();
            debug!("DispatchPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    queue: Arc<dyn WorkQueue>,
    dispatcher: Dispatcher,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("dispatch-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(
                        worker_id = worker_id,
                        error = %e,
                        "Failed to create worker runtime"
                    );
                    return;
                }
            };

            while !shutdown.load(Ordering::Acquire) {
                let held = match rt.block_on(queue.take()) {
                    Ok(Some(held)) => held,
                    Ok(None) => {
                        debug!(worker_id = worker_id, "Queue closed, exiting");
                        break;
                    }
                    Err(e) => {
                        error!(worker_id = worker_id, error = %e, "Failed to take entry");
                        thread::sleep(TAKE_ERROR_BACKOFF);
                        continue;
                    }
                };

                // Custody is exclusive from here on; the entry runs to an
                // outcome regardless of shutdown.
                counters.on_taken();
                let message_id = held.id;
                let outcome = rt.block_on(dispatcher.process(held));
                debug!(
                    worker_id = worker_id,
                    message_id = %message_id,
                    outcome = ?outcome,
                    "Worker finished entry"
                );
                counters.on_finished(&outcome);
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}
