//! Assemble a `DispatchService` from configuration.
//!
//! Every collaborator can be overridden (a networked store, a real transport,
//! a manual clock in tests); anything not supplied is built from the config.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{DispatchConfig, QueueBackendConfig, StoreBackendConfig};
use crate::core::audit::{shared, AuditSink, SharedAudit};
use crate::core::{
    AppResult, DeliverySink, DispatchPool, Dispatcher, Intake, MessageStore, RateCounterStore,
    RetryPolicy, WorkQueue,
};
use crate::infra::{
    FileMessageStore, FileWorkQueue, InMemoryCounterStore, InMemoryMessageStore,
    InMemoryWorkQueue, LogSink,
};
use crate::runtime::DispatchService;
use crate::util::clock::{system_clock, Clock};

/// Builder for [`DispatchService`].
pub struct ServiceBuilder {
    config: DispatchConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn MessageStore>>,
    queue: Option<Arc<dyn WorkQueue>>,
    counters: Option<Arc<dyn RateCounterStore>>,
    sink: Option<Arc<dyn DeliverySink>>,
    audit: Option<SharedAudit>,
    start_workers: bool,
}

impl ServiceBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            clock: None,
            store: None,
            queue: None,
            counters: None,
            sink: None,
            audit: None,
            start_workers: true,
        }
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an existing message store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an existing work queue.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use an existing rate counter store.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<dyn RateCounterStore>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Use `sink` instead of [`LogSink`].
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Mirror status transitions into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(shared(sink));
        self
    }

    /// Build without starting workers (intake and reporting only).
    #[must_use]
    pub const fn without_workers(mut self) -> Self {
        self.start_workers = false;
        self
    }

    /// Validate the config, open backends, run the startup sweep if enabled,
    /// and start the worker pool.
    pub async fn build(self) -> AppResult<DispatchService> {
        let config = self.config;
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid dispatch configuration")?;

        let clock = self.clock.unwrap_or_else(system_clock);
        let policy = RetryPolicy::from(config.retry);

        let store: Arc<dyn MessageStore> = match self.store {
            Some(store) => store,
            None => match &config.store {
                StoreBackendConfig::InMemory => {
                    Arc::new(InMemoryMessageStore::new(Arc::clone(&clock)))
                }
                StoreBackendConfig::File { path } => Arc::new(
                    FileMessageStore::open(path, Arc::clone(&clock))
                        .with_context(|| format!("opening message store at {}", path.display()))?,
                ),
            },
        };

        let queue: Arc<dyn WorkQueue> = match self.queue {
            Some(queue) => queue,
            None => match &config.queue {
                QueueBackendConfig::InMemory => {
                    Arc::new(InMemoryWorkQueue::new(Arc::clone(&clock), policy))
                }
                QueueBackendConfig::File { path } => Arc::new(
                    FileWorkQueue::open(path, Arc::clone(&clock), policy)
                        .with_context(|| format!("opening work queue at {}", path.display()))?,
                ),
            },
        };

        let counters: Arc<dyn RateCounterStore> = self
            .counters
            .unwrap_or_else(|| Arc::new(InMemoryCounterStore::new(Arc::clone(&clock))));
        let sink: Arc<dyn DeliverySink> = self.sink.unwrap_or_else(|| Arc::new(LogSink));

        let mut intake = Intake::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&clock),
            config.intake.into(),
        );
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&counters),
            sink,
            Arc::clone(&queue),
            Arc::clone(&clock),
            config.throttle.into(),
        );
        if let Some(audit) = self.audit {
            intake = intake.with_audit(Arc::clone(&audit));
            dispatcher = dispatcher.with_audit(audit);
        }

        let mut service = DispatchService {
            config,
            store,
            queue,
            counters,
            clock,
            intake,
            pool: None,
        };

        if service.config.recovery.on_startup {
            let report = service
                .recover()
                .await
                .context("startup reconciliation failed")?;
            info!(requeued = report.requeued, "startup reconciliation done");
        }

        if self.start_workers {
            let pool = DispatchPool::new(
                service.config.pool.clone(),
                dispatcher,
                Arc::clone(&service.queue),
            )
            .context("starting dispatch workers")?;
            service.pool = Some(pool);
        }

        Ok(service)
    }
}
