//! # Throttled Dispatch
//!
//! A time-ordered, per-sender-throttled outbound message scheduler.
//!
//! A caller submits a batch (one sender, many recipients, a start time, a
//! per-recipient delay and an hourly cap). Each recipient becomes a persisted
//! message plus a delayed queue entry. A fixed pool of workers picks entries
//! up when they fall due and, for each one, enforces the sender's hourly cap
//! and minimum spacing before handing it to a delivery sink. Entries that are
//! throttled are pushed to a later due time instead of being dropped.
//!
//! ## Key Features
//!
//! - **Hourly caps**: a shared counter per sender and UTC hour, with rollback
//!   of provisional admissions
//! - **Minimum spacing**: a last-sent marker guarded by a per-sender lease
//! - **Exclusive custody**: a queue entry is held by at most one worker
//! - **Retry with backoff**: failed attempts retry exponentially, then become
//!   dead letters
//! - **Durable backends**: JSONL-journaled queue and append-only message store
//! - **Reconciliation**: a sweep re-enqueues records that lost their entry
//!
//! ## Service assembly
//!
//! ```rust,ignore
//! use throttled_dispatch::builders::ServiceBuilder;
//! use throttled_dispatch::config::DispatchConfig;
//! use throttled_dispatch::core::ScheduleRequest;
//!
//! throttled_dispatch::util::init_tracing();
//! let service = ServiceBuilder::new(DispatchConfig::from_env()?)
//!     .build()
//!     .await?;
//!
//! let receipt = service.schedule(&request).await?;
//! // ...
//! service.shutdown();
//! ```
//!
//! ## Worker pool
//!
//! `DispatchPool` runs dedicated OS threads, each with its own
//! single-threaded tokio runtime, so slow sinks or stores never stall the
//! caller's runtime.
//!
//! ```rust,ignore
//! use throttled_dispatch::config::WorkerPoolConfig;
//! use throttled_dispatch::core::DispatchPool;
//!
//! let pool = DispatchPool::new(
//!     WorkerPoolConfig::new().with_worker_count(5),
//!     dispatcher,
//!     queue.clone(),
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core dispatch abstractions and the throttle protocol.
pub mod core;
/// Configuration models for the pool, backends, and throttle timing.
pub mod config;
/// Builders to assemble the service from configuration.
pub mod builders;
/// Infrastructure adapters for queues, stores, counters, and delivery.
pub mod infra;
/// The assembled service and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
