//! Configuration models for the worker pool, backends, and throttle timing.

pub mod dispatch;
pub mod pool;

pub use dispatch::{
    DispatchConfig, IntakeConfig, QueueBackendConfig, RecoveryConfig, RetryConfig,
    StoreBackendConfig, ThrottleConfig,
};
pub use pool::WorkerPoolConfig;
